//! Multi-mapping node matching.
//!
//! Runs three matchers in a fixed order, each adding pairs to a shared
//! [`MultiMappingStore`]:
//! 1. **Exact**: identical subtrees by hash, largest first
//! 2. **Leaf**: unmapped leaves by textual similarity plus positional context
//! 3. **Container**: unmapped internal nodes by containment of their mapped
//!    descendants, iterated bottom-up to a fixed point
//!
//! Later phases read what earlier ones produced but never remove anything.

use core::fmt;

use indextree::NodeId;

use crate::debug;
use crate::interner::LabelBridge;
use crate::store::MultiMappingStore;
use crate::tree::Tree;

mod container;
mod exact;
mod leaf;
pub mod similarity;

/// Default for [`MatchingConfig::min_height`].
pub const DEFAULT_MIN_HEIGHT: usize = 0;

/// Default for [`MatchingConfig::leaf_threshold`].
pub const DEFAULT_LEAF_THRESHOLD: f64 = 0.5;

/// Default for [`MatchingConfig::positional_bonus`].
pub const DEFAULT_POSITIONAL_BONUS: f64 = 0.3;

/// Default for [`MatchingConfig::leaf_comparison_budget`].
pub const DEFAULT_LEAF_COMPARISON_BUDGET: usize = 250_000;

/// Default for [`MatchingConfig::containment_threshold`].
pub const DEFAULT_CONTAINMENT_THRESHOLD: f64 = 0.5;

/// Tunables for the matching pipeline.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Subtrees lower than this are left to the leaf and container phases.
    pub min_height: usize,

    /// A leaf pair is accepted when its score is at least this.
    pub leaf_threshold: f64,

    /// Added to the textual similarity of two leaves sitting at the same child
    /// index under corresponding parents.
    pub positional_bonus: f64,

    /// Maximum number of leaf comparisons for one type label before the leaf
    /// phase only scores candidates at the same position under corresponding
    /// parents.
    pub leaf_comparison_budget: usize,

    /// A container pair is accepted when the fraction of the source node's
    /// mapped descendants whose counterpart lies inside the candidate is
    /// strictly greater than this.
    pub containment_threshold: f64,

    /// Upper bound on container passes. `None` means the taller tree's height
    /// plus one, enough for evidence to climb from the deepest leaf to the root.
    pub max_container_passes: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_height: DEFAULT_MIN_HEIGHT,
            leaf_threshold: DEFAULT_LEAF_THRESHOLD,
            positional_bonus: DEFAULT_POSITIONAL_BONUS,
            leaf_comparison_budget: DEFAULT_LEAF_COMPARISON_BUDGET,
            containment_threshold: DEFAULT_CONTAINMENT_THRESHOLD,
            max_container_passes: None,
        }
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Identical subtrees by hash.
    Exact,
    /// Leaves by textual and positional similarity.
    Leaf,
    /// Internal nodes by descendant containment.
    Container,
}

impl Phase {
    /// Pipeline order.
    pub const ALL: [Phase; 3] = [Phase::Exact, Phase::Leaf, Phase::Container];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Exact => write!(f, "exact"),
            Phase::Leaf => write!(f, "leaf"),
            Phase::Container => write!(f, "container"),
        }
    }
}

/// How many pairs each phase contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchingReport {
    /// Pairs added by the exact phase.
    pub exact: usize,
    /// Pairs added by the leaf phase.
    pub leaf: usize,
    /// Pairs added by the container phase.
    pub container: usize,
    /// Container passes run, including the final one that added nothing.
    pub container_passes: usize,
}

impl MatchingReport {
    /// Pairs added by all phases.
    pub fn total(&self) -> usize {
        self.exact + self.leaf + self.container
    }
}

/// Match two trees with a fresh store.
pub fn compute_matching(src: &Tree, dst: &Tree, config: &MatchingConfig) -> MultiMappingStore {
    compute_matching_with_report(src, dst, config).0
}

/// Like [`compute_matching`], but also reports per-phase contributions.
pub fn compute_matching_with_report(
    src: &Tree,
    dst: &Tree,
    config: &MatchingConfig,
) -> (MultiMappingStore, MatchingReport) {
    let mut store = MultiMappingStore::for_trees(src, dst);
    let report = compute_matching_into(src, dst, &mut store, config);
    (store, report)
}

/// Run the whole pipeline on top of an existing store.
///
/// Pairs already in `store` are treated like pairs from an earlier phase.
///
/// # Panics
/// Panics if `store` was created for trees of different sizes.
pub fn compute_matching_into(
    src: &Tree,
    dst: &Tree,
    store: &mut MultiMappingStore,
    config: &MatchingConfig,
) -> MatchingReport {
    debug!(
        nodes_src = src.node_count(),
        nodes_dst = dst.node_count(),
        "compute_matching start"
    );
    let mut report = MatchingReport::default();
    for phase in Phase::ALL {
        let (added, passes) = run_phase_inner(phase, src, dst, store, config);
        match phase {
            Phase::Exact => report.exact = added,
            Phase::Leaf => report.leaf = added,
            Phase::Container => {
                report.container = added;
                report.container_passes = passes;
            }
        }
        debug!(%phase, added, total = store.len(), "phase done");
    }
    report
}

/// Run a single phase. Returns the number of pairs it added.
///
/// # Panics
/// Panics if `store` was created for trees of different sizes.
pub fn run_phase(
    phase: Phase,
    src: &Tree,
    dst: &Tree,
    store: &mut MultiMappingStore,
    config: &MatchingConfig,
) -> usize {
    run_phase_inner(phase, src, dst, store, config).0
}

fn run_phase_inner(
    phase: Phase,
    src: &Tree,
    dst: &Tree,
    store: &mut MultiMappingStore,
    config: &MatchingConfig,
) -> (usize, usize) {
    let mut run = MatchRun::new(src, dst, store);
    match phase {
        Phase::Exact => (exact::exact_phase(&mut run, config), 0),
        Phase::Leaf => (leaf::leaf_phase(&mut run, config), 0),
        Phase::Container => container::container_phase(&mut run, config),
    }
}

/// Shared state of one phase: both trees, the label bridge, and the store.
struct MatchRun<'a> {
    src: &'a Tree,
    dst: &'a Tree,
    bridge: LabelBridge,
    store: &'a mut MultiMappingStore,
}

impl<'a> MatchRun<'a> {
    fn new(src: &'a Tree, dst: &'a Tree, store: &'a mut MultiMappingStore) -> Self {
        assert!(
            store.fits(src, dst),
            "invariant violation: store was created for different trees"
        );
        Self {
            src,
            dst,
            bridge: LabelBridge::new(src.interner(), dst.interner()),
            store,
        }
    }

    #[inline]
    fn same_label(&self, s: NodeId, d: NodeId) -> bool {
        self.bridge.same(self.src.symbol(s), self.dst.symbol(d))
    }

    /// The only way phases add pairs.
    fn link(&mut self, s: NodeId, d: NodeId) -> bool {
        assert!(
            self.same_label(s, d),
            "invariant violation: cannot map {} (a:{}) to {} (b:{})",
            self.src.label(s),
            self.src.index(s),
            self.dst.label(d),
            self.dst.index(d),
        );
        self.store.add(s, d)
    }
}
