//! Model archives: where tree blobs and metadata come from.
//!
//! An archive is a flat namespace of named binary entries. Trees live under
//! `trees/`, one entry per tree group and class:
//!
//! ```text
//! model.json               ensemble metadata
//! trees/t00_000.bin        class 0, tree group 0
//! trees/t00_000_aux.bin    auxiliary node records for the same tree
//! trees/t01_000.bin        class 1, tree group 0
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Entry holding the JSON-encoded [`EnsembleMeta`](super::EnsembleMeta).
pub const META_ENTRY: &str = "model.json";

/// Entry name of the tree for `class` in tree group `group`.
pub fn tree_entry(class: usize, group: usize) -> String {
    format!("trees/t{class:02}_{group:03}.bin")
}

/// Entry name of the auxiliary node records for a tree.
pub fn aux_tree_entry(class: usize, group: usize) -> String {
    format!("trees/t{class:02}_{group:03}_aux.bin")
}

/// Errors raised while reading archive entries.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive has no entry {0:?}")]
    MissingEntry(String),

    #[error("entry {0:?} is not valid UTF-8")]
    NotUtf8(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read access to the entries of a model archive.
///
/// Reading may block on I/O; it happens once per model, before scoring.
pub trait ModelArchive {
    /// Raw bytes of an entry.
    fn get_binary_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError>;

    /// Whether an entry exists.
    fn contains(&self, name: &str) -> bool;

    /// An entry decoded as UTF-8 text.
    fn get_text_file(&self, name: &str) -> Result<String, ArchiveError> {
        String::from_utf8(self.get_binary_file(name)?)
            .map_err(|_| ArchiveError::NotUtf8(name.to_string()))
    }
}

// =============================================================================
// DirArchive
// =============================================================================

/// An archive unpacked into a directory.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ModelArchive for DirArchive {
    fn get_binary_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        std::fs::read(self.entry_path(name)).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ArchiveError::MissingEntry(name.to_string()),
            _ => ArchiveError::Io(err),
        })
    }

    fn contains(&self, name: &str) -> bool {
        self.entry_path(name).is_file()
    }
}

// =============================================================================
// MemoryArchive
// =============================================================================

/// An archive held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry below `root`, creating directories as needed.
    pub fn write_to_dir(&self, root: &Path) -> Result<DirArchive, ArchiveError> {
        let archive = DirArchive::new(root);
        for (name, bytes) in &self.entries {
            let path = archive.entry_path(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(archive)
    }
}

impl ModelArchive for MemoryArchive {
    fn get_binary_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ArchiveError::MissingEntry(name.to_string()))
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
