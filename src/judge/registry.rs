use crate::config::engine::EngineConfig;
use crate::config::types::Language;
use crate::judge::adapter::LanguageAdapter;
use crate::judge::languages::{c::CAdapter, cpp::CppAdapter, python::PythonAdapter};

/// Adapters for every supported language, configured once at startup
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    python: PythonAdapter,
    c: CAdapter,
    cpp: CppAdapter,
}

impl AdapterRegistry {
    pub fn new(python_interpreter: impl Into<String>) -> Self {
        Self {
            python: PythonAdapter::new(python_interpreter),
            c: CAdapter,
            cpp: CppAdapter,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.python_interpreter.clone())
    }

    pub fn adapter_for(&self, language: Language) -> &dyn LanguageAdapter {
        match language {
            Language::Python => &self.python,
            Language::C => &self.c,
            Language::Cpp => &self.cpp,
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::GraderError;

    #[test]
    fn test_registry_covers_every_language() {
        let registry = AdapterRegistry::default();
        for language in Language::all() {
            assert_eq!(registry.adapter_for(language).language(), language);
        }
    }

    #[test]
    fn test_compiled_languages_not_implemented() {
        let registry = AdapterRegistry::default();
        for language in [Language::C, Language::Cpp] {
            let err = registry.adapter_for(language).run_command().unwrap_err();
            assert!(matches!(err, GraderError::NotImplemented { language: l } if l == language));
        }
    }
}
