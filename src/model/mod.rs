//! Ensemble metadata, archives and loading.

mod archive;
mod ensemble;
mod meta;

pub use archive::{
    aux_tree_entry, tree_entry, ArchiveError, DirArchive, MemoryArchive, ModelArchive, META_ENTRY,
};
pub use ensemble::{Ensemble, LoadError};
pub use meta::{Algorithm, EnsembleMeta, MetaError};
