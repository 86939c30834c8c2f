//! # astdiff
//!
//! Multi-mapping syntax tree matching with edit action derivation, the core
//! of a refactoring miner.
//!
//! Given the syntax trees of a file before and after a change, astdiff
//! computes which nodes correspond. Unlike a classical tree diff, the result
//! is many-to-many: a node may be linked to several counterparts when more
//! than one is plausible, and downstream recognizers pick among them.
//!
//! ## Algorithm Overview
//!
//! 1. **Exact matching**: identical subtrees by hash, tallest first
//! 2. **Leaf matching**: remaining leaves by edit-distance similarity plus a
//!    positional bonus
//! 3. **Container matching**: remaining internal nodes by how many of their
//!    mapped descendants land inside a candidate, bottom-up to a fixed point
//! 4. **Action derivation**: UPDATE, INSERT, MOVE and DELETE actions in the
//!    style of Chawathe et al. (1996)
//!
//! ## Usage
//!
//! ```
//! use astdiff::{MatchingConfig, NodeRecord, Tree, diff_trees};
//!
//! let before = Tree::from_records(vec![
//!     NodeRecord::new(None, "Block", "", 0..12),
//!     NodeRecord::new(Some(0), "SimpleName", "count", 2..7),
//! ])?;
//! let after = Tree::from_records(vec![
//!     NodeRecord::new(None, "Block", "", 0..14),
//!     NodeRecord::new(Some(0), "SimpleName", "counter", 2..9),
//! ])?;
//!
//! let actions = diff_trees(&before, &after, &MatchingConfig::default());
//! assert_eq!(actions.len(), 1);
//! assert_eq!(actions[0].to_string(), "Update(a:1 -> b:1)");
//! # Ok::<(), astdiff::MalformedTreeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod tracing_macros;
#[allow(unused_imports)]
pub(crate) use tracing_macros::{debug, trace};

mod actions;
mod error;
mod export;
mod interner;
/// Node matching pipeline
pub mod matching;
mod simplify;
mod store;
/// Tree model
pub mod tree;

use rayon::prelude::*;

pub use actions::{Action, derive_actions};
pub use error::MalformedTreeError;
pub use export::{export_mappings, render_node};
pub use interner::{Interner, LabelBridge, Symbol};
pub use matching::{
    MatchingConfig, MatchingReport, Phase, compute_matching, compute_matching_into,
    compute_matching_with_report, run_phase,
};
pub use simplify::simplify_actions;
pub use store::MultiMappingStore;
pub use tree::{NodeData, NodeHash, NodeRecord, Tree};

/// Compute the edit actions between two trees.
///
/// This is the main entry point. It:
/// 1. Matches nodes with the three-phase pipeline
/// 2. Derives actions from the resulting multi-mapping
pub fn diff_trees(src: &Tree, dst: &Tree, config: &MatchingConfig) -> Vec<Action> {
    let (actions, _store) = diff_trees_with_matching(src, dst, config);
    actions
}

/// Like [`diff_trees`], but also returns the mapping the actions came from.
///
/// Recognizers that need every candidate pairing read the store directly.
pub fn diff_trees_with_matching(
    src: &Tree,
    dst: &Tree,
    config: &MatchingConfig,
) -> (Vec<Action>, MultiMappingStore) {
    let store = compute_matching(src, dst, config);
    let actions = derive_actions(src, dst, &store);
    (actions, store)
}

/// Everything one matching run produces.
#[derive(Debug, Clone)]
pub struct Diff {
    /// The final mapping.
    pub store: MultiMappingStore,
    /// Actions derived from `store`.
    pub actions: Vec<Action>,
    /// Pairs contributed by each phase.
    pub report: MatchingReport,
}

impl Diff {
    /// Match two trees and derive their actions.
    pub fn compute(src: &Tree, dst: &Tree, config: &MatchingConfig) -> Self {
        let (store, report) = compute_matching_with_report(src, dst, config);
        let actions = derive_actions(src, dst, &store);
        Self {
            store,
            actions,
            report,
        }
    }
}

/// Diff many independent before/after pairs in parallel.
///
/// Each pair gets its own store; results come back in input order.
pub fn diff_batch(pairs: &[(Tree, Tree)], config: &MatchingConfig) -> Vec<Diff> {
    debug!(pairs = pairs.len(), "diff_batch start");
    pairs
        .par_iter()
        .map(|(src, dst)| Diff::compute(src, dst, config))
        .collect()
}
