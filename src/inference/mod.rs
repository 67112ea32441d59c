//! Scoring rows against compressed tree ensembles.
//!
//! # Module Structure
//!
//! - [`traversal`]: one tree, one row: leaf value or decision path
//! - [`output`]: output kinds, inverse links, probability correction
//! - [`scorer`]: raw class sums to prediction vector
//! - [`predictor`]: accumulation over an [`Ensemble`](crate::model::Ensemble),
//!   single rows and row-parallel batches
//!
//! # Quick Start
//!
//! ```
//! use compact_trees::codec::{NaSplitDir, TreeNode};
//! use compact_trees::inference::score_tree;
//!
//! let tree = TreeNode::numeric(0, 5.0, NaSplitDir::Right, TreeNode::leaf(1.0), TreeNode::leaf(2.0))
//!     .encode()
//!     .unwrap();
//!
//! assert_eq!(score_tree(&tree, &[3.0], 1, false).unwrap(), 1.0);
//! assert_eq!(score_tree(&tree, &[7.0], 1, false).unwrap(), 2.0);
//! assert_eq!(score_tree(&tree, &[f64::NAN], 1, false).unwrap(), 2.0);
//! ```

pub mod output;
pub mod predictor;
pub mod scorer;
pub mod traversal;

pub use output::{correct_probabilities, decide_class, softmax_rescale, DistributionFamily, OutputKind};
pub use predictor::{LeafAssignment, Predictor, DEFAULT_BLOCK_SIZE};
pub use scorer::EnsembleScorer;
pub use traversal::{inspect_tree, score_tree, TreeShape, TreeWalker};
