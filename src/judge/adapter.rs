use crate::config::types::{Language, Result};

/// Language adapter contract used by the process runner.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Argument vector run from inside the slot directory. Languages without
    /// an execution path return `NotImplemented`.
    fn run_command(&self) -> Result<Vec<String>>;

    /// Exception names the runtime reports when it runs out of memory
    fn memory_error_markers(&self) -> &[&'static str] {
        &[]
    }

    /// Whether `diagnostic`, the final line a failed run printed, is the
    /// runtime's out-of-memory report: a marker alone or followed by `:`.
    fn is_out_of_memory(&self, diagnostic: &str) -> bool {
        let line = diagnostic.trim();
        self.memory_error_markers().iter().any(|marker| {
            line.strip_prefix(marker)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
        })
    }

    fn source_file_name(&self) -> String {
        self.language().source_file_name()
    }
}
