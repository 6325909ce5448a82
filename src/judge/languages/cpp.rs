use crate::config::types::{GraderError, Language, Result};
use crate::judge::adapter::LanguageAdapter;

/// C++ has a source file name but no build step yet
#[derive(Debug, Clone, Copy, Default)]
pub struct CppAdapter;

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn run_command(&self) -> Result<Vec<String>> {
        Err(GraderError::NotImplemented {
            language: Language::Cpp,
        })
    }

    fn memory_error_markers(&self) -> &[&'static str] {
        &["std::bad_alloc"]
    }

    /// libstdc++ ends an uncaught exception with `  what():  <message>`
    fn is_out_of_memory(&self, diagnostic: &str) -> bool {
        diagnostic
            .trim()
            .strip_prefix("what():")
            .map_or(diagnostic.trim(), str::trim)
            == "std::bad_alloc"
    }
}
