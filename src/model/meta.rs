//! Ensemble metadata with builder pattern.
//!
//! [`EnsembleMeta`] is everything the scorer needs to know about a model
//! besides the tree bytes themselves. It is read once when the model is
//! loaded, either assembled through the builder or parsed from JSON.
//!
//! # Example
//!
//! ```
//! use compact_trees::model::{Algorithm, EnsembleMeta};
//! use compact_trees::inference::DistributionFamily;
//!
//! let meta = EnsembleMeta::builder()
//!     .n_tree_groups(50)
//!     .n_classes(2)
//!     .algorithm(Algorithm::GradientBoosting)
//!     .family(DistributionFamily::Bernoulli)
//!     .init_f(-0.4)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(meta.effective_classes(), 1);
//! assert_eq!(meta.n_trees(), 50);
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::inference::DistributionFamily;

// =============================================================================
// MetaError
// =============================================================================

/// Errors raised while validating ensemble metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("n_classes must be at least 1")]
    NoClasses,

    #[error("n_tree_groups must be at least 1")]
    NoTreeGroups,

    #[error("{field} has {actual} entries, expected one per class ({expected})")]
    DistributionLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("default_threshold must be in [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("binomial double trees require exactly 2 classes, got {0}")]
    DoubleTreesNotBinomial(usize),

    #[error("binomial double trees are a forest option; boosted two-class models keep one tree per group")]
    DoubleTreesNotForest,

    #[error("family {family:?} cannot model {n_classes} classes")]
    FamilyMismatch {
        family: DistributionFamily,
        n_classes: usize,
    },

    #[error("invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Algorithm
// =============================================================================

/// Training algorithm that produced the ensemble.
///
/// Forests average tree outputs; boosted ensembles sum them into a margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RandomForest,
    #[default]
    GradientBoosting,
}

// =============================================================================
// EnsembleMeta
// =============================================================================

/// Scoring configuration of a tree ensemble.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct EnsembleMeta {
    /// Number of tree groups (boosting rounds or forest size).
    pub n_tree_groups: usize,

    /// Number of response classes; 1 for regression.
    pub n_classes: usize,

    /// Two-class random forest stored with one tree per class instead of one per group.
    #[builder(default)]
    #[serde(default)]
    pub binomial_double_trees: bool,

    #[builder(default)]
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Response distribution. Ignored by forests.
    #[builder(default)]
    #[serde(default)]
    pub family: DistributionFamily,

    /// Initial margin added to boosted sums.
    #[builder(default)]
    #[serde(default)]
    pub init_f: f64,

    /// Class frequencies of the original training frame.
    pub prior_class_distrib: Option<Vec<f64>>,

    /// Class frequencies after class balancing.
    pub model_class_distrib: Option<Vec<f64>>,

    /// Whether training rebalanced classes, so scores need correcting back
    /// to the prior distribution.
    #[builder(default)]
    #[serde(default)]
    pub balance_classes: bool,

    /// Positive-class probability threshold for binary decisions. Default: 0.5.
    #[builder(default = 0.5)]
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Per-column categorical cardinality; `None` entries are numeric columns.
    pub domain_sizes: Option<Vec<Option<u32>>>,
}

fn default_threshold() -> f64 {
    0.5
}

impl<S: ensemble_meta_builder::IsComplete> EnsembleMetaBuilder<S> {
    /// Build and validate the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] if the class count, tree count, threshold,
    /// distribution lengths or family are inconsistent.
    pub fn build(self) -> Result<EnsembleMeta, MetaError> {
        let meta = self.__build_internal();
        meta.validate()?;
        Ok(meta)
    }
}

impl EnsembleMeta {
    /// Parse and validate metadata from JSON.
    pub fn from_json(json: &str) -> Result<Self, MetaError> {
        let meta: Self = serde_json::from_str(json)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, MetaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Trees stored per group.
    ///
    /// Two-class models keep a single tree per group unless they were trained
    /// with double trees.
    #[inline]
    pub fn effective_classes(&self) -> usize {
        if self.n_classes == 2 && !self.binomial_double_trees {
            1
        } else {
            self.n_classes
        }
    }

    /// Total number of tree slots.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.n_tree_groups * self.effective_classes()
    }

    /// Length of a prediction vector: the decision slot plus one per class.
    #[inline]
    pub fn n_outputs(&self) -> usize {
        1 + self.n_classes
    }

    #[inline]
    pub fn is_classifier(&self) -> bool {
        self.n_classes > 1
    }

    /// Prior and model class distributions, when scores must be corrected.
    pub fn calibration(&self) -> Option<(&[f64], &[f64])> {
        if !self.balance_classes {
            return None;
        }
        match (&self.prior_class_distrib, &self.model_class_distrib) {
            (Some(prior), Some(model)) => Some((prior, model)),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), MetaError> {
        if self.n_classes == 0 {
            return Err(MetaError::NoClasses);
        }
        if self.n_tree_groups == 0 {
            return Err(MetaError::NoTreeGroups);
        }
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(MetaError::InvalidThreshold(self.default_threshold));
        }
        if self.binomial_double_trees && self.n_classes != 2 {
            return Err(MetaError::DoubleTreesNotBinomial(self.n_classes));
        }
        if self.binomial_double_trees && self.algorithm != Algorithm::RandomForest {
            return Err(MetaError::DoubleTreesNotForest);
        }

        for (field, distrib) in [
            ("prior_class_distrib", &self.prior_class_distrib),
            ("model_class_distrib", &self.model_class_distrib),
        ] {
            if let Some(distrib) = distrib {
                if distrib.len() != self.n_classes {
                    return Err(MetaError::DistributionLength {
                        field,
                        expected: self.n_classes,
                        actual: distrib.len(),
                    });
                }
            }
        }

        if self.algorithm == Algorithm::GradientBoosting {
            let consistent = match self.family {
                DistributionFamily::Bernoulli | DistributionFamily::QuasiBinomial => {
                    self.n_classes == 2
                }
                DistributionFamily::Multinomial => self.n_classes >= 2,
                _ => self.n_classes == 1,
            };
            if !consistent {
                return Err(MetaError::FamilyMismatch {
                    family: self.family,
                    n_classes: self.n_classes,
                });
            }
        }

        Ok(())
    }
}
