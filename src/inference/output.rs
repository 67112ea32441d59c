//! Output transforms from raw tree sums to predictions.
//!
//! The [`OutputKind`] enum is the closed set of ways an ensemble turns
//! accumulated tree outputs into a prediction vector. It is chosen once per
//! model (see [`OutputKind::for_ensemble`]) and dispatched once per row.
//!
//! # Prediction vector layout
//!
//! ```text
//! preds[0]            decided class index (classifiers) or regression value
//! preds[1..=n_class]  per-class scores (probabilities for classifiers)
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{Algorithm, EnsembleMeta};

// =============================================================================
// DistributionFamily
// =============================================================================

/// Response distribution a boosted ensemble was trained for.
///
/// Determines the inverse link applied to the margin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFamily {
    #[default]
    Gaussian,
    Bernoulli,
    QuasiBinomial,
    Multinomial,
    Poisson,
    Gamma,
    /// Tweedie with log link (`link_power == 0`) or a power link.
    Tweedie { link_power: f64 },
    Laplace,
    Quantile,
    Huber,
}

impl DistributionFamily {
    /// Whether the family models a two-class response with a single margin.
    #[inline]
    pub fn is_binomial(self) -> bool {
        matches!(self, Self::Bernoulli | Self::QuasiBinomial)
    }

    /// Inverse link: margin to response scale.
    #[inline]
    pub fn link_inv(self, margin: f64) -> f64 {
        match self {
            Self::Bernoulli | Self::QuasiBinomial => logistic(margin),
            Self::Poisson | Self::Gamma => margin.exp(),
            Self::Tweedie { link_power } if link_power == 0.0 => margin.exp().max(2e-16),
            Self::Tweedie { link_power } => margin.powf(1.0 / link_power),
            Self::Gaussian | Self::Multinomial | Self::Laplace | Self::Quantile | Self::Huber => {
                margin
            }
        }
    }
}

#[inline]
fn logistic(x: f64) -> f64 {
    1.0 / ((-x).exp() + 1.0)
}

// =============================================================================
// OutputKind
// =============================================================================

/// How raw per-class sums become the prediction vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputKind {
    /// Averaged forest regression: `preds[0] = sum / n_trees`.
    Regression,
    /// Averaged two-class forest with one tree per group.
    BinomialAveraged,
    /// Forest vote fractions normalised to sum to one.
    MultinomialAveraged,
    /// Boosted margin through the family's inverse link.
    GbmLinked { family: DistributionFamily },
    /// Boosted two-class multinomial stored as a single tree group.
    BinomialDoubleTree,
}

impl OutputKind {
    /// Select the transform matching an ensemble's metadata.
    pub fn for_ensemble(meta: &EnsembleMeta) -> Self {
        match meta.algorithm {
            Algorithm::RandomForest => match meta.n_classes {
                1 => Self::Regression,
                2 if !meta.binomial_double_trees => Self::BinomialAveraged,
                _ => Self::MultinomialAveraged,
            },
            Algorithm::GradientBoosting => {
                if meta.family == DistributionFamily::Multinomial && meta.n_classes == 2 {
                    Self::BinomialDoubleTree
                } else {
                    Self::GbmLinked { family: meta.family }
                }
            }
        }
    }

    /// Whether `preds[0]` is a class decision rather than a value.
    pub fn is_classifier(self) -> bool {
        match self {
            Self::Regression => false,
            Self::GbmLinked { family } => {
                family.is_binomial() || family == DistributionFamily::Multinomial
            }
            _ => true,
        }
    }
}

// =============================================================================
// Probability utilities
// =============================================================================

/// Rescale class probabilities (`preds[1..]`) from the distribution the model
/// was trained on back to the prior distribution, then renormalise.
///
/// Classes where either fraction is zero keep their score.
pub fn correct_probabilities(preds: &mut [f64], prior: &[f64], model: &[f64]) {
    debug_assert_eq!(preds.len(), prior.len() + 1);
    let mut sum = 0.0;
    for (c, score) in preds.iter_mut().enumerate().skip(1) {
        let original = prior[c - 1];
        let oversampled = model[c - 1];
        debug_assert!(!score.is_nan(), "predicted NaN class probability");
        if original != 0.0 && oversampled != 0.0 {
            *score *= original / oversampled;
        }
        sum += *score;
    }
    if sum > 0.0 {
        for score in &mut preds[1..] {
            *score /= sum;
        }
    }
}

/// Exponentiate class margins (`preds[1..]`) relative to their maximum and
/// normalise them to probabilities.
pub fn softmax_rescale(preds: &mut [f64]) {
    let scores = &mut preds[1..];
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    debug_assert!(max.is_finite(), "non-finite class margin: {scores:?}");
    let mut sum = 0.0;
    for score in scores.iter_mut() {
        *score = (*score - max).exp();
        sum += *score;
    }
    for score in scores.iter_mut() {
        *score /= sum;
    }
}

/// Pick the predicted class (zero-based) from a class distribution.
///
/// Binary models compare the positive-class probability against `threshold`.
/// Otherwise the most probable class wins; ties are broken deterministically
/// from the row contents, weighted by the prior class distribution if given.
pub fn decide_class(preds: &[f64], prior: Option<&[f64]>, row: &[f64], threshold: f64) -> usize {
    if preds.len() == 3 {
        return usize::from(preds[2] >= threshold);
    }

    // Zero-based classes sharing the best score.
    let mut ties = vec![0usize];
    let mut best = 1usize;
    for c in 2..preds.len() {
        if preds[best] < preds[c] {
            best = c;
            ties.clear();
            ties.push(c - 1);
        } else if preds[best] == preds[c] {
            ties.push(c - 1);
        }
    }
    if ties.len() == 1 {
        return best - 1;
    }

    let hash = row_hash(row);

    if let Some(prior) = prior {
        debug_assert_eq!(preds.len(), prior.len() + 1);
        let total: f64 = ties.iter().map(|&i| prior[i]).sum();
        let draw = TieBreakRng::new(hash).next_f64();
        let mut partial = 0.0;
        for &i in &ties {
            partial += prior[i] / total;
            if draw <= partial {
                return i;
            }
        }
    }

    // Truncating cast and signed remainder reproduce the reference pick.
    let target = preds[best];
    let mut pick = (hash as i32) % ties.len() as i32;
    for c in 1..preds.len() {
        if preds[c] == target {
            pick -= 1;
            if pick < 0 {
                return c - 1;
            }
        }
    }
    best - 1
}

/// Hash of a row's raw bits with the 6 lowest mantissa bits dropped.
fn row_hash(row: &[f64]) -> i64 {
    row.iter()
        .fold(0i64, |hash, value| hash ^ ((value.to_bits() as i64) >> 6))
}

/// 48-bit linear congruential generator used for tie breaking.
#[derive(Debug, Clone)]
struct TieBreakRng {
    seed: u64,
}

impl TieBreakRng {
    const MULTIPLIER: u64 = 0x5_DEEC_E66D;
    const ADDEND: u64 = 0xB;
    const MASK: u64 = (1 << 48) - 1;

    fn new(seed: i64) -> Self {
        Self {
            seed: (seed as u64 ^ Self::MULTIPLIER) & Self::MASK,
        }
    }

    fn next_bits(&mut self, bits: u32) -> u64 {
        self.seed = (self
            .seed
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::ADDEND))
            & Self::MASK;
        self.seed >> (48 - bits)
    }

    fn next_f64(&mut self) -> f64 {
        let high = self.next_bits(26);
        let low = self.next_bits(27);
        ((high << 27) + low) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn link_inverses() {
        assert_abs_diff_eq!(DistributionFamily::Bernoulli.link_inv(0.0), 0.5);
        assert_abs_diff_eq!(DistributionFamily::Gaussian.link_inv(-3.5), -3.5);
        assert_abs_diff_eq!(DistributionFamily::Poisson.link_inv(1.0), std::f64::consts::E, epsilon = 1e-12);
        assert_abs_diff_eq!(
            DistributionFamily::Tweedie { link_power: 0.0 }.link_inv(-1000.0),
            2e-16
        );
        assert_abs_diff_eq!(
            DistributionFamily::Tweedie { link_power: 0.5 }.link_inv(3.0),
            9.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn correct_probabilities_rescales_toward_prior() {
        let mut preds = [0.0, 0.5, 0.5];
        correct_probabilities(&mut preds, &[0.9, 0.1], &[0.5, 0.5]);
        assert_abs_diff_eq!(preds[1], 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(preds[2], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn correct_probabilities_skips_zero_fractions() {
        let mut preds = [0.0, 0.25, 0.75];
        correct_probabilities(&mut preds, &[0.0, 1.0], &[0.5, 0.5]);
        // Class 0 keeps 0.25, class 1 scales 0.75 by 1.0 / 0.5.
        assert_abs_diff_eq!(preds[1], 0.25 / 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(preds[2], 1.5 / 1.75, epsilon = 1e-12);
    }

    #[test]
    fn softmax_rescale_sums_to_one() {
        let mut preds = [0.0, 1.0, 2.0, 3.0];
        softmax_rescale(&mut preds);
        assert_abs_diff_eq!(preds[1..].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(preds[3] > preds[2] && preds[2] > preds[1]);
        assert_eq!(preds[0], 0.0);
    }

    #[test]
    fn binary_decision_uses_threshold() {
        assert_eq!(decide_class(&[0.0, 0.6, 0.4], None, &[], 0.5), 0);
        assert_eq!(decide_class(&[0.0, 0.6, 0.4], None, &[], 0.3), 1);
        assert_eq!(decide_class(&[0.0, 0.5, 0.5], None, &[], 0.5), 1);
    }

    #[test]
    fn multiclass_argmax() {
        assert_eq!(decide_class(&[0.0, 0.2, 0.5, 0.3], None, &[], 0.5), 1);
        assert_eq!(decide_class(&[0.0, 0.2, 0.3, 0.5], None, &[], 0.5), 2);
    }

    #[test]
    fn ties_are_deterministic_and_among_tied_classes() {
        let preds = [0.0, 0.4, 0.2, 0.4];
        let row = [1.5, -2.0, 7.25];
        let first = decide_class(&preds, None, &row, 0.5);
        assert!(first == 0 || first == 2);
        for _ in 0..10 {
            assert_eq!(decide_class(&preds, None, &row, 0.5), first);
        }

        let prior = [0.7, 0.1, 0.2];
        let with_prior = decide_class(&preds, Some(&prior), &row, 0.5);
        assert!(with_prior == 0 || with_prior == 2);
    }

    #[test]
    fn prior_weighted_ties_never_pick_a_beaten_class() {
        // Class 0 dominates the prior but lost on score.
        let preds = [0.0, 0.1, 0.45, 0.45];
        let prior = [0.98, 0.01, 0.01];
        for i in 0..50 {
            let row = [f64::from(i) * 0.37, -f64::from(i)];
            let class = decide_class(&preds, Some(&prior), &row, 0.5);
            assert!(class == 1 || class == 2, "row {row:?} picked {class}");
        }
    }

    #[test]
    fn tie_with_empty_row_picks_first() {
        // Zero hash picks the first tied class.
        assert_eq!(decide_class(&[0.0, 0.3, 0.3, 0.3, 0.1], None, &[], 0.5), 0);
    }

    #[test]
    fn tie_break_rng_matches_reference_sequence() {
        // Seed 0 of the 48-bit LCG.
        let mut rng = TieBreakRng::new(0);
        assert_abs_diff_eq!(rng.next_f64(), 0.730967787376657, epsilon = 1e-15);
    }

    #[test]
    fn output_kind_selection() {
        let rf = |n_classes, double| {
            EnsembleMeta::builder()
                .n_tree_groups(3)
                .n_classes(n_classes)
                .algorithm(Algorithm::RandomForest)
                .binomial_double_trees(double)
                .build()
                .unwrap()
        };
        assert_eq!(OutputKind::for_ensemble(&rf(1, false)), OutputKind::Regression);
        assert_eq!(OutputKind::for_ensemble(&rf(2, false)), OutputKind::BinomialAveraged);
        assert_eq!(OutputKind::for_ensemble(&rf(2, true)), OutputKind::MultinomialAveraged);
        assert_eq!(OutputKind::for_ensemble(&rf(4, false)), OutputKind::MultinomialAveraged);

        let gbm = |n_classes, family| {
            EnsembleMeta::builder()
                .n_tree_groups(3)
                .n_classes(n_classes)
                .algorithm(Algorithm::GradientBoosting)
                .family(family)
                .build()
                .unwrap()
        };
        assert_eq!(
            OutputKind::for_ensemble(&gbm(2, DistributionFamily::Multinomial)),
            OutputKind::BinomialDoubleTree
        );
        assert_eq!(
            OutputKind::for_ensemble(&gbm(2, DistributionFamily::Bernoulli)),
            OutputKind::GbmLinked { family: DistributionFamily::Bernoulli }
        );
        assert!(!OutputKind::GbmLinked { family: DistributionFamily::Poisson }.is_classifier());
        assert!(OutputKind::BinomialAveraged.is_classifier());
    }
}
