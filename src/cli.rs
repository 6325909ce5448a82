use crate::config::engine::EngineConfig;
use crate::config::types::{GraderError, GradingRequest, GradingResult, Language};
use crate::grader::Grader;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON). Defaults to ./grader.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Number of sandbox slots
    #[arg(long, global = true)]
    pool_size: Option<usize>,
    /// Parent directory of the slot workspaces
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the slot layout and print the pool status
    Init,
    /// Grade a program against one or more inputs and print the result as JSON
    Grade {
        /// Language identifier (python, c, cpp)
        #[arg(long)]
        language: String,
        /// Source file to grade
        #[arg(long)]
        code: PathBuf,
        /// Input file, fed as stdin to one run (repeatable)
        #[arg(long = "input", value_name = "FILE")]
        inputs: Vec<PathBuf>,
        /// Literal stdin for one run, after any --input files (repeatable)
        #[arg(long = "stdin", value_name = "TEXT")]
        stdin: Vec<String>,
        /// Per-run wall-clock limit in milliseconds
        #[arg(long)]
        time_limit_ms: Option<u64>,
        /// Reject unknown language identifiers instead of falling back to python
        #[arg(long)]
        strict_language: bool,
        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },
    /// Check that the configured interpreter is installed
    CheckDeps {
        /// Show interpreter version details
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Init => {
            let grader = Grader::new(&config)?;
            println!("{}", serde_json::to_string_pretty(&grader.status())?);
            Ok(())
        }
        Commands::Grade {
            language,
            code,
            inputs,
            stdin,
            time_limit_ms,
            strict_language,
            pretty,
        } => {
            let language = map_language(&language, strict_language)?;
            let request = build_request(language, &code, &inputs, stdin, time_limit_ms)?;
            let grader = Grader::new(&config)?;

            match grader.grade(request) {
                Ok(result) => emit_result(&result, pretty),
                Err(GraderError::RunAborted { partial, source }) => {
                    // The partial result still goes to stdout; the exit status reports the abort
                    emit_result(&partial, pretty)?;
                    Err(GraderError::RunAborted { partial, source }.into())
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::CheckDeps { verbose } => check_dependencies(&config, verbose),
    }
}

/// Exit status for an error returned by [`run`]
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<GraderError>()
        .map(GraderError::exit_code)
        .unwrap_or(1)
}

fn resolve_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(pool_size) = cli.pool_size {
        config.pool_size = pool_size;
    }
    if let Some(root) = &cli.workspace_root {
        config.workspace_root = root.clone();
    }
    Ok(config)
}

fn map_language(identifier: &str, strict: bool) -> Result<Language> {
    if strict {
        Ok(identifier.parse()?)
    } else {
        Ok(Language::from_identifier(identifier))
    }
}

fn build_request(
    language: Language,
    code: &Path,
    inputs: &[PathBuf],
    stdin: Vec<String>,
    time_limit_ms: Option<u64>,
) -> Result<GradingRequest> {
    let source = std::fs::read_to_string(code)
        .with_context(|| format!("Failed to read source file {}", code.display()))?;

    let mut payloads = Vec::with_capacity(inputs.len() + stdin.len());
    for path in inputs {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?;
        payloads.push(content);
    }
    payloads.extend(stdin);

    let mut request = GradingRequest::new(source, language, payloads);
    request.time_limit_ms = time_limit_ms;
    Ok(request)
}

fn emit_result(result: &GradingResult, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{}", json);
    Ok(())
}

fn check_dependencies(config: &EngineConfig, verbose: bool) -> Result<()> {
    use std::process::Command;

    println!("🔍 Checking language dependencies...");
    println!();

    let interpreter = &config.python_interpreter;
    match Command::new(interpreter).arg("--version").output() {
        Ok(output) if output.status.success() => {
            println!("✅ Python - OK");
            if verbose {
                let version = if output.stdout.is_empty() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                };
                println!("  {} -> {}", interpreter, version.lines().next().unwrap_or("").trim());
            }
        }
        Ok(_) => {
            println!("❌ Python - FAILED");
            anyhow::bail!("{} --version exited with an error", interpreter);
        }
        Err(e) => {
            println!("❌ Python - MISSING");
            anyhow::bail!("{} not found: {}", interpreter, e);
        }
    }

    for language in [Language::C, Language::Cpp] {
        println!("⏭️  {} - not implemented", language);
    }
    println!();
    println!("✅ Grader is ready to use");
    Ok(())
}
