// Config validation
// Startup validation fails fast with actionable errors; questionable values only warn.

use crate::config::engine::EngineConfig;
use crate::config::types::{GraderError, Result};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate engine config at startup. Any error is fatal.
pub fn validate_config(config: &EngineConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_pool(config, &mut result);
    validate_limits(config, &mut result);
    validate_runtime(config, &mut result);

    if !result.is_valid() {
        return Err(GraderError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_pool(config: &EngineConfig, result: &mut ValidationResult) {
    if config.pool_size == 0 {
        result.add_error("pool_size must be at least 1".to_string());
    }
    if config.workspace_root.as_os_str().is_empty() {
        result.add_error("workspace_root cannot be empty".to_string());
    }
    if config.acquire_timeout_ms == Some(0) {
        result.add_warning(
            "acquire_timeout_ms is 0; requests fail immediately when the pool is full".to_string(),
        );
    }
}

fn validate_limits(config: &EngineConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 {
        result.add_error("timeout_ms cannot be zero".to_string());
    }
    if config.memory_limit_kb == 0 {
        result.add_error("memory_limit_kb cannot be zero".to_string());
    }
    if config.sample_interval_ms == 0 {
        result.add_error("sample_interval_ms cannot be zero".to_string());
    }
    if config.output_limit_bytes == 0 {
        result.add_error("output_limit_bytes cannot be zero".to_string());
    }

    if config.sample_interval_ms >= config.timeout_ms && config.timeout_ms > 0 {
        result.add_warning(format!(
            "sample_interval_ms {} is not shorter than timeout_ms {}; memory may never be sampled",
            config.sample_interval_ms, config.timeout_ms
        ));
    }

    if let Some(hard_kb) = config.effective_address_space_limit_kb() {
        if hard_kb < config.memory_limit_kb {
            result.add_warning(format!(
                "address_space_limit_kb {} is below memory_limit_kb {}; the hard limit will fire first",
                hard_kb, config.memory_limit_kb
            ));
        }
    }
}

fn validate_runtime(config: &EngineConfig, result: &mut ValidationResult) {
    if config.python_interpreter.trim().is_empty() {
        result.add_error("python_interpreter cannot be empty".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&EngineConfig::default()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let mut config = EngineConfig::default();
        config.pool_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, GraderError::Config(ref msg) if msg.contains("pool_size")));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = EngineConfig::default();
        config.timeout_ms = 0;
        config.sample_interval_ms = 0;
        config.python_interpreter = "  ".to_string();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("timeout_ms"));
        assert!(err.contains("sample_interval_ms"));
        assert!(err.contains("python_interpreter"));
    }

    #[test]
    fn test_slow_sampling_warns() {
        let mut config = EngineConfig::default();
        config.timeout_ms = 100;
        config.sample_interval_ms = 100;
        let result = validate_config(&config).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("sample_interval_ms"));
    }

    #[test]
    fn test_low_hard_limit_warns() {
        let mut config = EngineConfig::default();
        config.address_space_limit_kb = Some(1024);
        let result = validate_config(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("address_space_limit_kb")));
    }
}
