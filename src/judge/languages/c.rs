use crate::config::types::{GraderError, Language, Result};
use crate::judge::adapter::LanguageAdapter;

#[derive(Debug, Clone, Copy, Default)]
pub struct CAdapter;

impl LanguageAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    fn run_command(&self) -> Result<Vec<String>> {
        Err(GraderError::NotImplemented {
            language: Language::C,
        })
    }
}
