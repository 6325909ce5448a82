/// Slot workspace layout and per-run artifacts
///
/// Layout, per slot: `<root>/<slot>/main.<ext>` and `<root>/<slot>/inputs/<index>.in`.
/// Input names are zero-padded so lexical order equals index order.
use crate::config::types::{GraderError, Language, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const INPUTS_DIR: &str = "inputs";
const INPUT_EXTENSION: &str = "in";
const INDEX_WIDTH: usize = 10;

/// Writes source and inputs into slot directories
#[derive(Debug, Clone)]
pub struct WorkspaceWriter {
    root: PathBuf,
    capacity: usize,
}

impl WorkspaceWriter {
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            root: root.into(),
            capacity,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create one directory per slot. Existing directories are kept.
    pub fn create_layout(&self) -> Result<()> {
        for slot_id in 0..self.capacity {
            let dir = self.slot_dir(slot_id)?;
            fs::create_dir_all(&dir).map_err(|e| GraderError::workspace(&dir, e))?;
        }
        log::info!(
            "Prepared {} slot workspace(s) under {}",
            self.capacity,
            self.root.display()
        );
        Ok(())
    }

    pub fn slot_dir(&self, slot_id: usize) -> Result<PathBuf> {
        if slot_id >= self.capacity {
            return Err(GraderError::InvalidSlot {
                slot_id,
                capacity: self.capacity,
            });
        }
        Ok(self.root.join(slot_id.to_string()))
    }

    pub fn inputs_dir(&self, slot_id: usize) -> Result<PathBuf> {
        Ok(self.slot_dir(slot_id)?.join(INPUTS_DIR))
    }

    pub fn source_path(&self, slot_id: usize, language: Language) -> Result<PathBuf> {
        Ok(self.slot_dir(slot_id)?.join(language.source_file_name()))
    }

    /// Deterministic input filename for `index`
    pub fn input_file_name(index: usize) -> String {
        format!("{:0width$}.{}", index, INPUT_EXTENSION, width = INDEX_WIDTH)
    }

    pub fn input_path(&self, slot_id: usize, index: usize) -> Result<PathBuf> {
        Ok(self.inputs_dir(slot_id)?.join(Self::input_file_name(index)))
    }

    /// Write `main.<ext>` into the slot root, replacing any previous source
    pub fn write_source(&self, slot_id: usize, language: Language, code: &str) -> Result<PathBuf> {
        let path = self.source_path(slot_id, language)?;
        fs::write(&path, code).map_err(|e| GraderError::workspace(&path, e))?;
        log::debug!("Wrote {} source ({} bytes) to {}", language, code.len(), path.display());
        Ok(path)
    }

    /// Write the input for `index`, creating `inputs/` if needed
    pub fn write_input(&self, slot_id: usize, content: &str, index: usize) -> Result<PathBuf> {
        let dir = self.inputs_dir(slot_id)?;
        fs::create_dir_all(&dir).map_err(|e| GraderError::workspace(&dir, e))?;

        let path = dir.join(Self::input_file_name(index));
        fs::write(&path, content).map_err(|e| GraderError::workspace(&path, e))?;
        Ok(path)
    }

    /// Recorded inputs of a slot in index order. A missing `inputs/` directory
    /// means no inputs.
    pub fn list_inputs(&self, slot_id: usize) -> Result<Vec<(usize, PathBuf)>> {
        let dir = self.inputs_dir(slot_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GraderError::workspace(&dir, e)),
        };

        let mut inputs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GraderError::workspace(&dir, e))?;
            let path = entry.path();
            match parse_input_index(&path) {
                Some(index) => inputs.push((index, path)),
                None => log::warn!("Ignoring stray file in inputs: {}", path.display()),
            }
        }

        inputs.sort_by_key(|(index, _)| *index);
        Ok(inputs)
    }

    pub fn read_input(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| GraderError::workspace(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Remove everything a run leaves behind: the inputs directory and any
    /// source file. Already-absent artifacts are not an error.
    pub fn purge_run_artifacts(&self, slot_id: usize) -> Result<()> {
        let inputs = self.inputs_dir(slot_id)?;
        match fs::remove_dir_all(&inputs) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(GraderError::workspace(&inputs, e)),
        }

        for language in Language::all() {
            let source = self.source_path(slot_id, language)?;
            match fs::remove_file(&source) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(GraderError::workspace(&source, e)),
            }
        }

        Ok(())
    }
}

fn parse_input_index(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != INPUT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
