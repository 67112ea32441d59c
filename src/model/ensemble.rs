//! Loaded tree ensembles.

use log::{debug, trace, warn};

use super::archive::{aux_tree_entry, tree_entry, ArchiveError, ModelArchive, META_ENTRY};
use super::meta::{EnsembleMeta, MetaError};
use crate::codec::{AuxTree, CodecError};
use crate::inference::{inspect_tree, TreeShape};

/// Errors raised while assembling an [`Ensemble`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("expected {expected} tree slots ({what}), got {actual}")]
    TreeCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("tree for class {class} in group {group} is malformed: {source}")]
    InvalidTree {
        group: usize,
        class: usize,
        #[source]
        source: CodecError,
    },
}

type TreeSlots = Vec<Option<Box<[u8]>>>;

/// Compressed trees plus the metadata needed to score them.
///
/// Trees are stored class-major: slot `class * n_tree_groups + group`.
/// A slot is `None` for trees training never produced; they contribute
/// nothing to the scores. The ensemble is immutable once built.
#[derive(Debug, Clone)]
pub struct Ensemble {
    meta: EnsembleMeta,
    trees: TreeSlots,
    aux_trees: Option<TreeSlots>,
}

impl Ensemble {
    /// Assemble an ensemble from tree blobs in class-major order.
    ///
    /// Every present tree is decoded once up front, so malformed bytes fail
    /// here rather than while scoring.
    pub fn new(meta: EnsembleMeta, trees: Vec<Option<Vec<u8>>>) -> Result<Self, LoadError> {
        let expected = meta.n_trees();
        if trees.len() != expected {
            return Err(LoadError::TreeCount {
                what: "trees",
                expected,
                actual: trees.len(),
            });
        }

        let ensemble = Self {
            trees: trees.into_iter().map(|t| t.map(Vec::into_boxed_slice)).collect(),
            meta,
            aux_trees: None,
        };
        for (slot, tree) in ensemble.trees.iter().enumerate() {
            if let Some(tree) = tree {
                let (group, class) = ensemble.slot_position(slot);
                inspect_tree(tree, ensemble.meta.n_classes)
                    .map_err(|source| LoadError::InvalidTree { group, class, source })?;
            }
        }
        Ok(ensemble)
    }

    /// Attach auxiliary node records, in the same order as the trees.
    pub fn with_aux_trees(mut self, aux_trees: Vec<Option<Vec<u8>>>) -> Result<Self, LoadError> {
        if aux_trees.len() != self.trees.len() {
            return Err(LoadError::TreeCount {
                what: "auxiliary trees",
                expected: self.trees.len(),
                actual: aux_trees.len(),
            });
        }
        self.aux_trees = Some(
            aux_trees
                .into_iter()
                .map(|t| t.map(Vec::into_boxed_slice))
                .collect(),
        );
        Ok(self)
    }

    /// Load metadata, trees and (if present) auxiliary trees from an archive.
    pub fn load(archive: &impl ModelArchive) -> Result<Self, LoadError> {
        let meta = EnsembleMeta::from_json(&archive.get_text_file(META_ENTRY)?)?;
        debug!(
            "Loading ensemble: {} tree groups, {} classes, {} tree slots",
            meta.n_tree_groups,
            meta.n_classes,
            meta.n_trees()
        );
        if meta.balance_classes && meta.calibration().is_none() {
            warn!("balance_classes is set but class distributions are missing; scores will not be corrected");
        }

        let mut trees = Vec::with_capacity(meta.n_trees());
        let mut aux_trees = Vec::with_capacity(meta.n_trees());
        for class in 0..meta.effective_classes() {
            for group in 0..meta.n_tree_groups {
                let name = tree_entry(class, group);
                if archive.contains(&name) {
                    let bytes = archive.get_binary_file(&name)?;
                    trace!("Read {name} ({} bytes)", bytes.len());
                    trees.push(Some(bytes));
                } else {
                    trace!("No tree {name}");
                    trees.push(None);
                }

                let aux_name = aux_tree_entry(class, group);
                aux_trees.push(if archive.contains(&aux_name) {
                    Some(archive.get_binary_file(&aux_name)?)
                } else {
                    None
                });
            }
        }

        let n_present = trees.iter().filter(|t| t.is_some()).count();
        let n_aux = aux_trees.iter().filter(|t| t.is_some()).count();
        debug!("Read {n_present} trees and {n_aux} auxiliary trees");
        if n_present == 0 {
            warn!("Ensemble has no trees; every prediction is the output of empty sums");
        }

        let ensemble = Self::new(meta, trees)?;
        if n_aux > 0 {
            ensemble.with_aux_trees(aux_trees)
        } else {
            Ok(ensemble)
        }
    }

    #[inline]
    pub fn meta(&self) -> &EnsembleMeta {
        &self.meta
    }

    #[inline]
    pub fn n_tree_groups(&self) -> usize {
        self.meta.n_tree_groups
    }

    #[inline]
    pub fn effective_classes(&self) -> usize {
        self.meta.effective_classes()
    }

    /// Tree for `class` in tree group `group`, if one was stored.
    #[inline]
    pub fn tree(&self, group: usize, class: usize) -> Option<&[u8]> {
        self.slot(group, class)
            .and_then(|slot| self.trees[slot].as_deref())
    }

    /// Auxiliary records for a tree, if they were loaded.
    pub fn aux_tree(&self, group: usize, class: usize) -> Option<AuxTree<'_>> {
        self.aux_trees
            .as_ref()
            .zip(self.slot(group, class))
            .and_then(|(slots, slot)| slots[slot].as_deref())
            .map(AuxTree::new)
    }

    #[inline]
    pub fn has_aux_trees(&self) -> bool {
        self.aux_trees.is_some()
    }

    /// Number of trees actually stored.
    pub fn n_present_trees(&self) -> usize {
        self.trees.iter().filter(|t| t.is_some()).count()
    }

    /// Structure of the tree in a slot.
    pub fn tree_shape(&self, group: usize, class: usize) -> Option<Result<TreeShape, CodecError>> {
        self.tree(group, class)
            .map(|tree| inspect_tree(tree, self.meta.n_classes))
    }

    #[inline]
    fn slot(&self, group: usize, class: usize) -> Option<usize> {
        (group < self.meta.n_tree_groups && class < self.meta.effective_classes())
            .then(|| class * self.meta.n_tree_groups + group)
    }

    #[inline]
    fn slot_position(&self, slot: usize) -> (usize, usize) {
        (slot % self.meta.n_tree_groups, slot / self.meta.n_tree_groups)
    }
}
