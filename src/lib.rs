//! compact-trees: decoding and scoring of compressed decision-tree ensembles.
//!
//! Trees are stored as immutable little-endian byte blobs (one per tree group
//! and class) that are walked in place without building node structures.
//!
//! # Modules
//!
//! - [`codec`]: the byte format (cursor, node headers, bitsets, decision
//!   paths, auxiliary records and the encoder)
//! - [`inference`]: tree traversal, output transforms and predictors
//! - [`model`]: ensemble metadata, archives and loading
//!
//! # Example
//!
//! ```
//! use compact_trees::codec::{NaSplitDir, TreeNode};
//! use compact_trees::inference::{DistributionFamily, Predictor};
//! use compact_trees::model::{Ensemble, EnsembleMeta};
//!
//! let meta = EnsembleMeta::builder()
//!     .n_tree_groups(1)
//!     .n_classes(2)
//!     .family(DistributionFamily::Bernoulli)
//!     .build()
//!     .unwrap();
//! let tree = TreeNode::numeric(0, 5.0, NaSplitDir::Right, TreeNode::leaf(-2.0), TreeNode::leaf(2.0));
//! let ensemble = Ensemble::new(meta, vec![Some(tree.encode().unwrap())]).unwrap();
//!
//! let preds = Predictor::new(&ensemble).predict_row(&[7.0]).unwrap();
//! assert_eq!(preds[0], 1.0);
//! assert!(preds[2] > 0.85);
//! ```

pub mod codec;
pub mod inference;
pub mod model;
pub mod utils;

pub use codec::{decode_path, encode_path, CodecError, DecisionPath, TreeNode};
pub use inference::{score_tree, EnsembleScorer, OutputKind, Predictor};
pub use model::{Ensemble, EnsembleMeta, LoadError};
pub use utils::{run_with_threads, Parallelism};
