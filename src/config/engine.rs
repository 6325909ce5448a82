/// Engine configuration: defaults, `grader.json` loading and environment overrides
use crate::config::types::{GraderError, Result, RunLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 8;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MEMORY_LIMIT_KB: u64 = 64 * 1024;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 8 * 1024 * 1024;

/// Config file looked up in the current directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "grader.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of sandbox slots, fixed at startup
    pub pool_size: usize,
    /// Parent directory of the per-slot workspaces
    pub workspace_root: PathBuf,
    /// Per-run wall-clock limit
    pub timeout_ms: u64,
    /// Resident memory ceiling enforced by the monitor
    pub memory_limit_kb: u64,
    /// Hard RLIMIT_AS applied before exec. Unset means "same as the ceiling",
    /// zero disables it.
    pub address_space_limit_kb: Option<u64>,
    /// Monitor sampling cadence
    pub sample_interval_ms: u64,
    /// Cap on captured output per run
    pub output_limit_bytes: usize,
    /// How long a request may wait for a free slot; unset blocks indefinitely
    pub acquire_timeout_ms: Option<u64>,
    /// Interpreter used for Python programs
    pub python_interpreter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            workspace_root: PathBuf::from("./tmp/sandbox"),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
            address_space_limit_kb: None,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            acquire_timeout_ms: None,
            python_interpreter: "python3".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. Missing fields keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraderError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            GraderError::Config(format!(
                "Failed to parse config JSON {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolve the effective configuration: explicit file, else `./grader.json`
    /// when present, else defaults; environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let candidate = Path::new(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    log::info!("Loading configuration from {}", candidate.display());
                    Self::load_from_file(candidate)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `GRADER_*` overrides using the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GRADER_POOL_SIZE") {
            self.pool_size = parse_override("GRADER_POOL_SIZE", &value)?;
        }
        if let Some(value) = lookup("GRADER_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("GRADER_TIMEOUT_MS") {
            self.timeout_ms = parse_override("GRADER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("GRADER_MEMORY_LIMIT_KB") {
            self.memory_limit_kb = parse_override("GRADER_MEMORY_LIMIT_KB", &value)?;
        }
        if let Some(value) = lookup("GRADER_SAMPLE_INTERVAL_MS") {
            self.sample_interval_ms = parse_override("GRADER_SAMPLE_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("GRADER_PYTHON_INTERPRETER") {
            self.python_interpreter = value;
        }
        Ok(())
    }

    /// Effective hard address-space limit
    pub fn effective_address_space_limit_kb(&self) -> Option<u64> {
        match self.address_space_limit_kb {
            Some(0) => None,
            Some(kb) => Some(kb),
            None => Some(self.memory_limit_kb),
        }
    }

    /// Limits every run starts from before per-request overrides
    pub fn run_limits(&self) -> RunLimits {
        RunLimits {
            timeout: Duration::from_millis(self.timeout_ms),
            memory_limit_kb: self.memory_limit_kb,
            address_space_limit_kb: self.effective_address_space_limit_kb(),
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        GraderError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}
