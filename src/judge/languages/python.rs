use crate::config::types::{Language, Result};
use crate::judge::adapter::LanguageAdapter;

#[derive(Debug, Clone)]
pub struct PythonAdapter {
    interpreter: String,
}

impl PythonAdapter {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for PythonAdapter {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn run_command(&self) -> Result<Vec<String>> {
        // -B: no bytecode caches left in the slot
        Ok(vec![
            self.interpreter.clone(),
            "-B".to_string(),
            self.source_file_name(),
        ])
    }

    fn memory_error_markers(&self) -> &[&'static str] {
        &["MemoryError"]
    }
}
