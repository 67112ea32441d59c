//! Scenario tests for tree scoring and ensemble output transforms.

mod common;

use approx::assert_abs_diff_eq;
use rstest::rstest;

use compact_trees::codec::{
    decode_path, encode_path, ByteCursor, CategoryBitset, LegacyBitsets, NaSplitDir, OwnedBitset,
    TreeNode,
};
use compact_trees::inference::{
    score_tree, DistributionFamily, EnsembleScorer, OutputKind, Predictor, TreeWalker,
};
use compact_trees::model::{Algorithm, Ensemble, EnsembleMeta, MetaError};

use common::{evaluate, forest_meta, mixed_tree, scenario_tree};

// =============================================================================
// Single tree
// =============================================================================

#[rstest]
#[case(3.0, 1.0)]
#[case(7.0, 2.0)]
#[case(5.0, 2.0)]
#[case(f64::NAN, 2.0)]
fn end_to_end_scenario(#[case] value: f64, #[case] expected: f64) {
    let tree = scenario_tree(NaSplitDir::Right).encode().unwrap();
    assert_eq!(score_tree(&tree, &[value], 1, false).unwrap(), expected);
}

#[rstest]
#[case(&[])]
#[case(&[1.0])]
#[case(&[f64::NAN, -1e300, 7.0])]
fn single_leaf_ignores_row(#[case] row: &[f64]) {
    let tree = TreeNode::leaf(-0.125).encode().unwrap();
    assert_eq!(tree, vec![0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0xBE]);
    assert_eq!(score_tree(&tree, row, 1, false).unwrap(), -0.125);
    assert_eq!(decode_path(score_tree(&tree, row, 1, true).unwrap()), "");
}

#[rstest]
#[case(NaSplitDir::NaLeft, 1.0)]
#[case(NaSplitDir::Left, 1.0)]
#[case(NaSplitDir::NaRight, 2.0)]
#[case(NaSplitDir::Right, 2.0)]
fn na_routing(#[case] na_dir: NaSplitDir, #[case] expected: f64) {
    let tree = scenario_tree(na_dir).encode().unwrap();
    assert_eq!(score_tree(&tree, &[f64::NAN], 1, false).unwrap(), expected);
    // Present values are unaffected by the NA direction.
    assert_eq!(score_tree(&tree, &[4.0], 1, false).unwrap(), 1.0);
    assert_eq!(score_tree(&tree, &[6.0], 1, false).unwrap(), 2.0);
}

#[rstest]
#[case(&[6.0, 0.0], 2.5, "RL")]
#[case(&[6.0, f64::NAN], 4.0, "RR")]
#[case(&[f64::NAN, 4.0], -1.5, "LR")]
#[case(&[f64::NAN, 40.0], -1.5, "LR")]
#[case(&[3.0, 2.0], 0.5, "LLR")]
#[case(&[1.0, 2.0], -3.0, "LLL")]
#[case(&[1.0, 0.0], -1.5, "LR")]
#[case(&[1.0, 99.0], -1.5, "LR")]
fn mixed_tree_routes(#[case] row: &[f64], #[case] value: f64, #[case] path: &str) {
    let description = mixed_tree();
    let tree = description.encode().unwrap();
    let walker = TreeWalker::new(1);
    assert_eq!(walker.score(&tree, row).unwrap(), value);
    assert_eq!(walker.decision_path(&tree, row).unwrap().to_string(), path);
    assert_eq!(evaluate(&description, row, false).path, path);
}

#[test]
fn legacy_decoder_sends_unseen_categories_left() {
    let description = mixed_tree();
    let tree = description.encode().unwrap();
    let legacy = TreeWalker::<LegacyBitsets>::with_decoder(1);
    // Category 0 is below the bitset range, 99 above it.
    for row in [[1.0, 0.0], [1.0, 99.0]] {
        assert_eq!(legacy.score(&tree, &row).unwrap(), -3.0);
        assert_eq!(evaluate(&description, &row, true).value, -3.0);
    }
}

// =============================================================================
// Bitsets
// =============================================================================

#[test]
fn bitset_boundary() {
    let owned = OwnedBitset::from_categories(&[0, 2, 5]);
    let bitset = owned.as_view();
    assert!(bitset.contains(5));
    assert!(bitset.contains(0));
    assert!(!bitset.contains(3));
    assert!(!bitset.contains(100));
    assert!(!bitset.contains(-1));
    assert!(!bitset.contains(i32::MAX));
    assert!(!bitset.contains(i32::MIN));
}

#[test]
fn bitset_decoders_advance_exactly() {
    // small: 4 bytes, then a trailing marker byte
    let bytes = [0b0010_0101, 0, 0, 0, 0xAB];
    let mut cursor = ByteCursor::new(&bytes);
    let small = CategoryBitset::decode_small(&mut cursor).unwrap();
    assert_eq!(cursor.position(), 4);
    assert!(small.contains(5) && !small.contains(3));
    assert!(!small.contains(100));

    // large: offset 40, 10 bits (2 bytes), {40, 49}
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&40u16.to_le_bytes());
    bytes.extend_from_slice(&10i32.to_le_bytes());
    bytes.extend_from_slice(&[0b0000_0001, 0b0000_0010]);
    bytes.push(0xAB);
    let mut cursor = ByteCursor::new(&bytes);
    let large = CategoryBitset::decode_large(&mut cursor).unwrap();
    assert_eq!(cursor.position(), 8);
    assert!(large.contains(40) && large.contains(49));
    assert!(!large.contains(41) && !large.contains(50) && !large.contains(0));
}

// =============================================================================
// Decision paths
// =============================================================================

#[rstest]
#[case(0b0, 0, "")]
#[case(0b1, 1, "R")]
#[case(0b0, 1, "L")]
#[case(0b101, 3, "RLR")]
#[case(0b0110, 5, "LRRLL")]
fn decision_path_round_trip(#[case] bits: u64, #[case] depth: usize, #[case] expected: &str) {
    let encoded = encode_path(bits, depth);
    let decoded = decode_path(encoded);
    assert_eq!(decoded, expected);
    assert_eq!(decoded.len(), depth);
}

#[test]
fn decision_path_of_depth_63() {
    let bits = 0x5555_5555_5555_5555u64 & ((1 << 63) - 1);
    let decoded = decode_path(encode_path(bits, 63));
    assert_eq!(decoded.len(), 63);
    assert!(decoded.starts_with("RLRL"));
}

// =============================================================================
// Output transforms
// =============================================================================

#[rstest]
#[case(&[0.0, 1.0, 1.0, 2.0])]
#[case(&[0.0, 0.001, 1e6, 3.5, 0.0])]
#[case(&[0.0, 7.0, 0.0])]
fn multinomial_renormalization(#[case] raw: &[f64]) {
    let scorer = EnsembleScorer::new(OutputKind::MultinomialAveraged, 10);
    let preds = scorer.score(raw, &[], 0.0);
    assert_abs_diff_eq!(preds[1..].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
}

#[test]
fn multinomial_zero_total_stays_zero() {
    let scorer = EnsembleScorer::new(OutputKind::MultinomialAveraged, 10);
    let preds = scorer.score(&[0.0, 0.0, 0.0, 0.0], &[1.0, 2.0], 0.0);
    assert!(preds[1..].iter().all(|&p| p == 0.0));
    assert!(preds.iter().all(|p| p.is_finite()));
}

#[test]
fn forest_binomial_end_to_end() {
    let trees = vec![
        Some(scenario_tree(NaSplitDir::Right).encode().unwrap()),
        Some(
            TreeNode::numeric(0, 6.0, NaSplitDir::NaLeft, TreeNode::leaf(0.0), TreeNode::leaf(1.0))
                .encode()
                .unwrap(),
        ),
    ];
    let ensemble = Ensemble::new(forest_meta(2, 2), trees).unwrap();
    let predictor = Predictor::new(&ensemble);

    // Tree outputs 1.0 and 0.0: mean 0.5 for class 0.
    let preds = predictor.predict_row(&[3.0]).unwrap();
    assert_eq!(preds, vec![1.0, 0.5, 0.5]);

    // Tree outputs 2.0 and 1.0.
    let preds = predictor.predict_row(&[7.0]).unwrap();
    assert_abs_diff_eq!(preds[1], 1.5);
    assert_abs_diff_eq!(preds[2], -0.5);
    assert_eq!(preds[0], 0.0);
}

#[test]
fn boosted_bernoulli_end_to_end() {
    let meta = EnsembleMeta::builder()
        .n_tree_groups(2)
        .n_classes(2)
        .algorithm(Algorithm::GradientBoosting)
        .family(DistributionFamily::Bernoulli)
        .init_f(-1.0)
        .build()
        .unwrap();
    let trees = vec![
        Some(scenario_tree(NaSplitDir::Right).encode().unwrap()),
        Some(scenario_tree(NaSplitDir::Left).encode().unwrap()),
    ];
    let ensemble = Ensemble::new(meta, trees).unwrap();
    let predictor = Predictor::new(&ensemble);

    // margin = 1 + 1 - 1
    let preds = predictor.predict_row(&[3.0]).unwrap();
    let p1 = 1.0 / (1.0 + (-1.0f64).exp());
    assert_abs_diff_eq!(preds[2], p1, epsilon = 1e-12);
    assert_abs_diff_eq!(preds[1], 1.0 - p1, epsilon = 1e-12);
    assert_eq!(preds[0], 1.0);

    // NaN: first tree right (2.0), second left (1.0)
    let preds = predictor.predict_row(&[f64::NAN]).unwrap();
    let p1 = 1.0 / (1.0 + (-2.0f64).exp());
    assert_abs_diff_eq!(preds[2], p1, epsilon = 1e-12);
}

#[test]
fn boosted_double_tree_end_to_end() {
    let meta = EnsembleMeta::builder()
        .n_tree_groups(2)
        .n_classes(2)
        .family(DistributionFamily::Multinomial)
        .build()
        .unwrap();
    assert_eq!(OutputKind::for_ensemble(&meta), OutputKind::BinomialDoubleTree);
    // One tree per group: the second class is the mirror of the first.
    assert_eq!(meta.n_trees(), 2);
    let trees = vec![
        Some(scenario_tree(NaSplitDir::Right).encode().unwrap()),
        Some(TreeNode::leaf(-1.0).encode().unwrap()),
    ];
    let ensemble = Ensemble::new(meta, trees).unwrap();
    let preds = Predictor::new(&ensemble).predict_row(&[7.0]).unwrap();
    // margin 2 - 1 = 1, softmax(1, -1)
    let expected = 1.0 / (1.0 + (-2.0f64).exp());
    assert_abs_diff_eq!(preds[1], expected, epsilon = 1e-12);
    assert_abs_diff_eq!(preds[2], 1.0 - expected, epsilon = 1e-12);
    assert_eq!(preds[0], 0.0);
}

#[test]
fn boosted_models_reject_double_trees() {
    let built = EnsembleMeta::builder()
        .n_tree_groups(1)
        .n_classes(2)
        .algorithm(Algorithm::GradientBoosting)
        .family(DistributionFamily::Multinomial)
        .binomial_double_trees(true)
        .build();
    assert!(matches!(built, Err(MetaError::DoubleTreesNotForest)), "got: {built:?}");
}

#[test]
fn scoring_is_deterministic() {
    let tree = mixed_tree().encode().unwrap();
    let rows = [[6.0, 0.0], [f64::NAN, 4.0], [3.0, 2.0], [1.0, 99.0]];
    for row in rows {
        let first = score_tree(&tree, &row, 1, false).unwrap();
        for _ in 0..5 {
            assert_eq!(score_tree(&tree, &row, 1, false).unwrap().to_bits(), first.to_bits());
        }
    }
}
