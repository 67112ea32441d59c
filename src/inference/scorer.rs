//! Turning accumulated tree sums into a prediction vector.

use super::output::{correct_probabilities, decide_class, softmax_rescale, OutputKind};
use crate::model::EnsembleMeta;

/// Applies an ensemble's output transform to raw per-class sums.
///
/// Stateless between calls. The raw sums arrive in the prediction vector
/// itself (`preds[0]` for regression, `preds[1..]` for classes) and are
/// overwritten with the final prediction.
#[derive(Debug, Clone)]
pub struct EnsembleScorer<'m> {
    kind: OutputKind,
    n_tree_groups: usize,
    init_f: f64,
    threshold: f64,
    prior: Option<&'m [f64]>,
    calibration: Option<(&'m [f64], &'m [f64])>,
}

impl<'m> EnsembleScorer<'m> {
    /// Scorer for a bare output kind: no bias, no priors, threshold 0.5.
    pub fn new(kind: OutputKind, n_tree_groups: usize) -> Self {
        Self {
            kind,
            n_tree_groups,
            init_f: 0.0,
            threshold: 0.5,
            prior: None,
            calibration: None,
        }
    }

    /// Scorer configured from ensemble metadata.
    pub fn from_meta(meta: &'m EnsembleMeta) -> Self {
        Self {
            kind: OutputKind::for_ensemble(meta),
            n_tree_groups: meta.n_tree_groups,
            init_f: meta.init_f,
            threshold: meta.default_threshold,
            prior: meta.prior_class_distrib.as_deref(),
            calibration: meta.calibration(),
        }
    }

    /// Initial margin added to boosted sums.
    pub fn with_init_f(mut self, init_f: f64) -> Self {
        self.init_f = init_f;
        self
    }

    /// Positive-class threshold for binary decisions.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Prior class distribution, used to weight tie breaks.
    pub fn with_prior(mut self, prior: &'m [f64]) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Correct class scores from the `model` to the `prior` distribution.
    pub fn with_calibration(mut self, prior: &'m [f64], model: &'m [f64]) -> Self {
        self.calibration = Some((prior, model));
        self
    }

    #[inline]
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Finish a prediction in place.
    ///
    /// `row` only feeds the tie-break hash; `offset` is the per-row margin
    /// offset of boosted models (0 when unused).
    pub fn unify(&self, preds: &mut [f64], row: &[f64], offset: f64) {
        let groups = self.n_tree_groups as f64;
        match self.kind {
            OutputKind::Regression => {
                preds[0] /= groups;
                return;
            }
            OutputKind::BinomialAveraged => {
                preds[1] /= groups;
                preds[2] = 1.0 - preds[1];
            }
            OutputKind::MultinomialAveraged => {
                let sum: f64 = preds[1..].iter().sum();
                if sum > 0.0 {
                    for p in &mut preds[1..] {
                        *p /= sum;
                    }
                }
            }
            OutputKind::BinomialDoubleTree => {
                preds[1] += self.init_f + offset;
                preds[2] = -preds[1];
                softmax_rescale(preds);
            }
            OutputKind::GbmLinked { family } => {
                if family.is_binomial() {
                    let margin = preds[1] + self.init_f + offset;
                    preds[2] = family.link_inv(margin);
                    preds[1] = 1.0 - preds[2];
                } else if self.kind.is_classifier() {
                    softmax_rescale(preds);
                } else {
                    preds[0] = family.link_inv(preds[0] + self.init_f + offset);
                    return;
                }
            }
        }

        if let Some((prior, model)) = self.calibration {
            correct_probabilities(preds, prior, model);
        }
        preds[0] = decide_class(preds, self.prior, row, self.threshold) as f64;
    }

    /// Finish a prediction from raw sums into a new vector.
    pub fn score(&self, raw: &[f64], row: &[f64], offset: f64) -> Vec<f64> {
        let mut preds = raw.to_vec();
        self.unify(&mut preds, row, offset);
        preds
    }
}
