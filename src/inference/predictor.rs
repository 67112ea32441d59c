//! Row and batch prediction over a loaded [`Ensemble`].
//!
//! A prediction accumulates every tree's leaf value into its class slot,
//! then lets the [`EnsembleScorer`] turn the sums into the final vector:
//!
//! ```text
//! preds = [0; 1 + n_classes]
//! for class in 0..effective_classes:
//!     k = class + (n_classes == 1 ? 0 : 1)
//!     for group in 0..n_tree_groups:
//!         preds[k] += score(tree(group, class), row)
//! scorer.unify(preds)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use compact_trees::inference::Predictor;
//! use compact_trees::Parallelism;
//!
//! let predictor = Predictor::new(&ensemble);
//! let preds = predictor.predict_row(&[3.0, f64::NAN])?;
//! let batch = predictor.predict_rows(features.view(), Parallelism::Parallel)?;
//! ```

use std::borrow::Cow;
use std::ops::Range;

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};

use super::scorer::EnsembleScorer;
use super::traversal::TreeWalker;
use crate::codec::{BitsetDecoder, CodecError, CurrentBitsets, DecisionPath};
use crate::model::Ensemble;
use crate::Parallelism;

/// Default block size for batch processing.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Where one row ended up in one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafAssignment {
    pub group: usize,
    pub class: usize,
    pub path: DecisionPath,
    /// Leaf node id, when auxiliary trees are loaded.
    pub node_id: Option<i32>,
}

/// Predictor for a compressed tree ensemble.
///
/// Borrows the ensemble; creating one is cheap.
///
/// # Type Parameters
///
/// - `D`: bitset semantics for categorical splits (see [`BitsetDecoder`]).
#[derive(Debug, Clone)]
pub struct Predictor<'e, D: BitsetDecoder = CurrentBitsets> {
    ensemble: &'e Ensemble,
    walker: TreeWalker<'e, D>,
    scorer: EnsembleScorer<'e>,
    block_size: usize,
}

impl<'e> Predictor<'e, CurrentBitsets> {
    pub fn new(ensemble: &'e Ensemble) -> Self {
        Self::with_decoder(ensemble)
    }
}

impl<'e, D: BitsetDecoder> Predictor<'e, D> {
    /// Predictor with an explicit bitset decoder.
    pub fn with_decoder(ensemble: &'e Ensemble) -> Self {
        let meta = ensemble.meta();
        let mut walker = TreeWalker::with_decoder(meta.n_classes);
        if let Some(domains) = meta.domain_sizes.as_deref() {
            walker = walker.with_domain_sizes(domains);
        }
        Self {
            ensemble,
            walker,
            scorer: EnsembleScorer::from_meta(meta),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Rows handed to a worker at a time in batch prediction.
    #[inline]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    #[inline]
    pub fn ensemble(&self) -> &Ensemble {
        self.ensemble
    }

    #[inline]
    pub fn scorer(&self) -> &EnsembleScorer<'e> {
        &self.scorer
    }

    /// Length of a prediction vector.
    #[inline]
    pub fn n_outputs(&self) -> usize {
        self.ensemble.meta().n_outputs()
    }

    /// Add the raw outputs of tree groups `groups` to `preds`.
    ///
    /// Does not apply the output transform. Absent trees are skipped.
    pub fn score_tree_range(
        &self,
        row: &[f64],
        groups: Range<usize>,
        preds: &mut [f64],
    ) -> Result<(), CodecError> {
        debug_assert_eq!(preds.len(), self.n_outputs());
        let first_slot = usize::from(self.ensemble.meta().n_classes != 1);
        let end = groups.end.min(self.ensemble.n_tree_groups());
        for class in 0..self.ensemble.effective_classes() {
            let k = first_slot + class;
            for group in groups.start..end {
                if let Some(tree) = self.ensemble.tree(group, class) {
                    preds[k] += self.walker.score(tree, row)?;
                }
            }
        }
        Ok(())
    }

    /// Predict one row into `preds`, with a per-row margin offset.
    pub fn predict_row_into(
        &self,
        row: &[f64],
        offset: f64,
        preds: &mut [f64],
    ) -> Result<(), CodecError> {
        preds.fill(0.0);
        self.score_tree_range(row, 0..self.ensemble.n_tree_groups(), preds)?;
        self.scorer.unify(preds, row, offset);
        Ok(())
    }

    /// Predict one row.
    ///
    /// Returns `[decision, class scores...]`, or `[value, 0]` for regression.
    pub fn predict_row(&self, row: &[f64]) -> Result<Vec<f64>, CodecError> {
        let mut preds = vec![0.0; self.n_outputs()];
        self.predict_row_into(row, 0.0, &mut preds)?;
        Ok(preds)
    }

    /// Predict every row of a `[n_rows, n_features]` matrix.
    ///
    /// Returns `[n_rows, n_outputs]`.
    pub fn predict_rows(
        &self,
        features: ArrayView2<f64>,
        parallelism: Parallelism,
    ) -> Result<Array2<f64>, CodecError> {
        let mut output = Array2::zeros((features.nrows(), self.n_outputs()));
        self.predict_into(features, None, parallelism, output.view_mut())?;
        Ok(output)
    }

    /// Predict into a preallocated `[n_rows, n_outputs]` buffer.
    ///
    /// `offsets`, if given, holds one margin offset per row.
    pub fn predict_into(
        &self,
        features: ArrayView2<f64>,
        offsets: Option<&[f64]>,
        parallelism: Parallelism,
        mut output: ArrayViewMut2<f64>,
    ) -> Result<(), CodecError> {
        let n_rows = features.nrows();
        assert_eq!(
            output.shape(),
            &[n_rows, self.n_outputs()],
            "output shape must match (n_rows, n_outputs)"
        );
        if let Some(offsets) = offsets {
            assert_eq!(offsets.len(), n_rows, "offsets length must match number of rows");
        }
        if n_rows == 0 {
            return Ok(());
        }

        let blocks = features
            .axis_chunks_iter(Axis(0), self.block_size)
            .zip(output.axis_chunks_iter_mut(Axis(0), self.block_size))
            .enumerate();

        parallelism.maybe_par_bridge_try_for_each_init(
            blocks,
            || vec![0.0; self.n_outputs()],
            |preds, (block, (rows, mut out))| {
                let start = block * self.block_size;
                for (i, (row, mut out_row)) in rows
                    .axis_iter(Axis(0))
                    .zip(out.axis_iter_mut(Axis(0)))
                    .enumerate()
                {
                    let row = row
                        .as_slice()
                        .map(Cow::Borrowed)
                        .unwrap_or_else(|| Cow::Owned(row.to_vec()));
                    let offset = offsets.map_or(0.0, |o| o[start + i]);
                    self.predict_row_into(&row, offset, preds)?;
                    for (dst, &src) in out_row.iter_mut().zip(preds.iter()) {
                        *dst = src;
                    }
                }
                Ok(())
            },
        )
    }

    /// Decision path (and leaf node id, if available) of `row` in every
    /// present tree, ordered by tree group then class.
    pub fn leaf_assignments(&self, row: &[f64]) -> Result<Vec<LeafAssignment>, CodecError> {
        let mut assignments = Vec::with_capacity(self.ensemble.n_present_trees());
        for group in 0..self.ensemble.n_tree_groups() {
            for class in 0..self.ensemble.effective_classes() {
                let Some(tree) = self.ensemble.tree(group, class) else {
                    continue;
                };
                let path = self.walker.decision_path(tree, row)?;
                let node_id = self
                    .ensemble
                    .aux_tree(group, class)
                    .map(|aux| aux.leaf_node_id(path))
                    .transpose()?;
                assignments.push(LeafAssignment {
                    group,
                    class,
                    path,
                    node_id,
                });
            }
        }
        Ok(assignments)
    }
}
