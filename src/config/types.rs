/// Core types and structures for the grading engine
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Source languages accepted by the engine. The set is closed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Interpreted directly; the only runnable language today
    Python,
    /// Compiled placeholder
    C,
    /// Compiled placeholder
    Cpp,
}

impl Language {
    /// File extension used for `main.<ext>` in a slot workspace
    pub fn source_extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Source filename inside the slot root
    pub fn source_file_name(self) -> String {
        format!("main.{}", self.source_extension())
    }

    /// Permissive boundary mapping: unknown identifiers fall back to Python.
    ///
    /// Callers should not use this for validation; see [`Language::from_str`].
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier.parse() {
            Ok(language) => language,
            Err(_) => {
                log::warn!(
                    "Unrecognized language identifier '{}', defaulting to python",
                    identifier
                );
                Language::Python
            }
        }
    }

    pub fn all() -> [Language; 3] {
        [Language::Python, Language::C, Language::Cpp]
    }
}

impl FromStr for Language {
    type Err = GraderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" | "cc" => Ok(Language::Cpp),
            _ => Err(GraderError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

/// Lifecycle state of a sandbox slot
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Available,
    Busy,
    /// Cleanup failed; withheld from the pool until recovered
    Errored,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Available => write!(f, "available"),
            SlotState::Busy => write!(f, "busy"),
            SlotState::Errored => write!(f, "errored"),
        }
    }
}

/// One grading request as handed over by the external boundary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingRequest {
    /// Program source text
    pub code: String,
    /// Source language
    pub language: Language,
    /// Input payloads, each fed as stdin to one run
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Per-run wall-clock limit override
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

impl GradingRequest {
    pub fn new(code: impl Into<String>, language: Language, inputs: Vec<String>) -> Self {
        Self {
            code: code.into(),
            language,
            inputs,
            time_limit_ms: None,
        }
    }

    pub fn with_time_limit_ms(mut self, time_limit_ms: u64) -> Self {
        self.time_limit_ms = Some(time_limit_ms);
        self
    }
}

/// Verdict of a single run. Abbreviations follow the usual judge taxonomy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RunVerdict {
    /// Clean exit
    #[default]
    #[serde(rename = "OK")]
    Ok,
    /// Non-zero exit or fatal signal not caused by the engine
    #[serde(rename = "RE")]
    RuntimeError,
    /// Killed at the wall-clock deadline
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Killed by the monitor, or failed on the hard address-space limit
    #[serde(rename = "MLE")]
    MemoryLimit,
}

/// Cause recorded when the engine terminates a run
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    Deadline,
    MemoryCeiling,
}

/// Typed result of one run
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub verdict: RunVerdict,
    pub is_error: bool,
    pub is_timeout: bool,
    pub is_memory_exceeded: bool,
    /// Position of the input in the request
    pub input_index: usize,
    pub input_content: String,
    /// Captured output; empty unless the run exited cleanly
    pub output_content: String,
    pub output_truncated: bool,
    pub execution_time_ms: u64,
    pub memory_usage_kb: u64,
    /// Short diagnostic excerpt for failed runs
    pub error: Option<String>,
}

impl RunOutcome {
    /// Build an outcome whose flags are derived from the verdict, so at most
    /// one of them is ever set.
    pub fn with_verdict(verdict: RunVerdict, input_index: usize, input_content: String) -> Self {
        Self {
            verdict,
            is_error: verdict == RunVerdict::RuntimeError,
            is_timeout: verdict == RunVerdict::TimeLimit,
            is_memory_exceeded: verdict == RunVerdict::MemoryLimit,
            input_index,
            input_content,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.verdict == RunVerdict::Ok
    }
}

/// Aggregate result of one grading request
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GradingResult {
    /// The per-input loop was aborted by an infrastructure failure
    pub is_error: bool,
    /// Some run timed out
    pub is_timeout: bool,
    /// Some run exceeded the memory ceiling
    pub is_memory_exceeded: bool,
    /// Some run exited with a runtime error
    pub has_runtime_errors: bool,
    pub outcomes: Vec<RunOutcome>,
}

impl GradingResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Custom error types for the grading engine
#[derive(Error, Debug)]
pub enum GraderError {
    #[error("No sandbox slot available (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    #[error("Slot {slot_id} does not exist (capacity {capacity})")]
    InvalidSlot { slot_id: usize, capacity: usize },

    #[error("Slot {slot_id} cannot become {to}: it is {from}")]
    InvalidTransition {
        slot_id: usize,
        from: SlotState,
        to: SlotState,
    },

    #[error("Workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Execution of {language} programs is not implemented")]
    NotImplemented { language: Language },

    #[error("Failed to start '{command}': {source}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    ProcessWait(#[source] std::io::Error),

    #[error("Run aborted after {} completed input(s): {source}", partial.outcomes.len())]
    RunAborted {
        partial: Box<GradingResult>,
        #[source]
        source: Box<GraderError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraderError {
    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraderError::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Pool exhaustion is the only error a caller is expected to retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GraderError::PoolExhausted { .. })
    }

    /// Process exit status for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            GraderError::PoolExhausted { .. } => 75, // EX_TEMPFAIL
            GraderError::InvalidSlot { .. } | GraderError::InvalidTransition { .. } => 70, // EX_SOFTWARE
            GraderError::Workspace { .. } | GraderError::Io(_) => 74, // EX_IOERR
            GraderError::UnsupportedLanguage(_) => 65,                // EX_DATAERR
            GraderError::NotImplemented { .. } => 69,                 // EX_UNAVAILABLE
            GraderError::ProcessLaunch { .. } | GraderError::ProcessWait(_) => 71, // EX_OSERR
            GraderError::RunAborted { source, .. } => source.exit_code(),
            GraderError::Config(_) => 78, // EX_CONFIG
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, GraderError>;

/// Limits applied to every run of one request
#[derive(Clone, Debug, PartialEq)]
pub struct RunLimits {
    pub timeout: Duration,
    pub memory_limit_kb: u64,
    /// Hard RLIMIT_AS in KB; `None` leaves the address space unlimited
    pub address_space_limit_kb: Option<u64>,
    pub sample_interval: Duration,
    pub output_limit_bytes: usize,
}

impl RunLimits {
    /// Apply a request-level time limit; zero keeps the configured default.
    pub fn with_time_limit_ms(mut self, time_limit_ms: Option<u64>) -> Self {
        if let Some(ms) = time_limit_ms.filter(|ms| *ms > 0) {
            self.timeout = Duration::from_millis(ms);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!(" c ".parse::<Language>().unwrap(), Language::C);

        let err = "brainfuck".parse::<Language>().unwrap_err();
        assert!(matches!(err, GraderError::UnsupportedLanguage(ref tag) if tag == "brainfuck"));
    }

    #[test]
    fn test_lenient_identifier_defaults_to_python() {
        assert_eq!(Language::from_identifier("cpp"), Language::Cpp);
        assert_eq!(Language::from_identifier("ruby"), Language::Python);
        assert_eq!(Language::from_identifier(""), Language::Python);
    }

    #[test]
    fn test_source_file_names() {
        assert_eq!(Language::Python.source_file_name(), "main.py");
        assert_eq!(Language::C.source_file_name(), "main.c");
        assert_eq!(Language::Cpp.source_file_name(), "main.cpp");
    }

    #[test]
    fn test_outcome_flags_follow_verdict() {
        for verdict in [
            RunVerdict::Ok,
            RunVerdict::RuntimeError,
            RunVerdict::TimeLimit,
            RunVerdict::MemoryLimit,
        ] {
            let outcome = RunOutcome::with_verdict(verdict, 0, String::new());
            let raised = [outcome.is_error, outcome.is_timeout, outcome.is_memory_exceeded]
                .iter()
                .filter(|flag| **flag)
                .count();
            let expected = if verdict == RunVerdict::Ok { 0 } else { 1 };
            assert_eq!(raised, expected, "verdict {:?}", verdict);
        }
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_string(&RunVerdict::MemoryLimit).unwrap();
        assert_eq!(json, "\"MLE\"");
        let json = serde_json::to_string(&Language::Cpp).unwrap();
        assert_eq!(json, "\"cpp\"");
    }

    #[test]
    fn test_time_limit_override() {
        let limits = RunLimits {
            timeout: Duration::from_millis(1000),
            memory_limit_kb: 65536,
            address_space_limit_kb: Some(65536),
            sample_interval: Duration::from_millis(100),
            output_limit_bytes: 1024,
        };
        assert_eq!(
            limits.clone().with_time_limit_ms(Some(200)).timeout,
            Duration::from_millis(200)
        );
        assert_eq!(
            limits.clone().with_time_limit_ms(Some(0)).timeout,
            Duration::from_millis(1000)
        );
        assert_eq!(limits.with_time_limit_ms(None).timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_exit_codes_distinguish_taxonomy() {
        assert_eq!(GraderError::PoolExhausted { capacity: 1 }.exit_code(), 75);
        assert_eq!(GraderError::Config("x".into()).exit_code(), 78);
        let aborted = GraderError::RunAborted {
            partial: Box::new(GradingResult::empty()),
            source: Box::new(GraderError::ProcessWait(std::io::Error::other("boom"))),
        };
        assert_eq!(aborted.exit_code(), 71);
        assert!(GraderError::PoolExhausted { capacity: 1 }.is_recoverable());
        assert!(!GraderError::UnsupportedLanguage("x".into()).is_recoverable());
    }
}
