//! Leaf matching by value similarity and position.

use indextree::NodeId;
use rapidhash::RapidHashMap as HashMap;

use super::similarity::text_similarity;
use super::{MatchRun, MatchingConfig};
use crate::interner::Symbol;
use crate::{debug, trace};

/// Pair unmapped leaves of equal label whose score clears the threshold.
///
/// Every accepted candidate of a source leaf is kept, so one leaf may map to
/// several. Scores see the store as it was when the phase started: pairs
/// accepted here do not feed each other's positional bonus.
pub(super) fn leaf_phase(run: &mut MatchRun<'_>, config: &MatchingConfig) -> usize {
    trace!("leaf_phase start");

    let mut dst_leaves: HashMap<Symbol, Vec<NodeId>> = HashMap::default();
    for d in run.dst.nodes_preorder() {
        if run.dst.is_leaf(d) && !run.store.is_mapped_dst(d) {
            dst_leaves.entry(run.dst.symbol(d)).or_default().push(d);
        }
    }

    // Source leaves, each with the after-tree symbol of its label.
    let src_leaves: Vec<(NodeId, Symbol)> = run
        .src
        .nodes_preorder()
        .filter(|&s| run.src.is_leaf(s) && !run.store.is_mapped_src(s))
        .filter_map(|s| run.bridge.to_b(run.src.symbol(s)).map(|sym| (s, sym)))
        .filter(|(_, sym)| dst_leaves.contains_key(sym))
        .collect();

    let mut src_per_label: HashMap<Symbol, usize> = HashMap::default();
    for (_, sym) in &src_leaves {
        *src_per_label.entry(*sym).or_default() += 1;
    }

    let mut context = ParentContext::default();
    let mut accepted: Vec<(NodeId, NodeId)> = Vec::new();
    for &(s, sym) in &src_leaves {
        let candidates = &dst_leaves[&sym];
        let comparisons = src_per_label[&sym].saturating_mul(candidates.len());

        if comparisons > config.leaf_comparison_budget {
            // Too many pairs to score: only look at the same slot of
            // corresponding parents.
            let Some(parent) = run.src.parent(s) else {
                continue;
            };
            let position = run.src.position(s);
            let parents = context.corresponding(run, parent).to_vec();
            for q in parents {
                let Some(d) = context.child_at(run, q, position) else {
                    continue;
                };
                if run.dst.is_leaf(d)
                    && run.dst.symbol(d) == sym
                    && !run.store.is_mapped_dst(d)
                    && score(run, &mut context, config, s, d) >= config.leaf_threshold
                {
                    accepted.push((s, d));
                }
            }
        } else {
            for &d in candidates {
                if score(run, &mut context, config, s, d) >= config.leaf_threshold {
                    accepted.push((s, d));
                }
            }
        }
    }

    let degraded: Vec<Symbol> = src_per_label
        .iter()
        .filter(|&(sym, &n)| {
            n.saturating_mul(dst_leaves[sym].len()) > config.leaf_comparison_budget
        })
        .map(|(&sym, _)| sym)
        .collect();
    if !degraded.is_empty() {
        debug!(
            labels = degraded.len(),
            budget = config.leaf_comparison_budget,
            "leaf_phase: comparison budget exceeded, positional candidates only"
        );
    }

    let mut added = 0;
    for (s, d) in accepted {
        trace!(
            a = run.src.index(s),
            b = run.dst.index(d),
            label = run.src.label(s),
            "leaf: accepted"
        );
        if run.link(s, d) {
            added += 1;
        }
    }

    debug!(added, "leaf_phase done");
    added
}

fn score(
    run: &MatchRun<'_>,
    context: &mut ParentContext,
    config: &MatchingConfig,
    s: NodeId,
    d: NodeId,
) -> f64 {
    let text = text_similarity(run.src.value(s), run.dst.value(d));
    let bonus = match (run.src.parent(s), run.dst.parent(d)) {
        (Some(ps), Some(pd)) if run.src.position(s) == run.dst.position(d) => {
            if context.corresponding(run, ps).contains(&pd) {
                config.positional_bonus
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    (text + bonus).min(1.0)
}

/// Per-parent lookups, each computed once: the after-tree nodes that
/// correspond to a before-tree parent, and the children of after-tree parents.
#[derive(Default)]
struct ParentContext {
    cache: HashMap<NodeId, Vec<NodeId>>,
    dst_children: HashMap<NodeId, Vec<NodeId>>,
}

impl ParentContext {
    /// Counterparts of `parent` in the store, then same-label after-tree
    /// nodes that hold the counterpart of one of its children.
    fn corresponding(&mut self, run: &MatchRun<'_>, parent: NodeId) -> &[NodeId] {
        self.cache.entry(parent).or_insert_with(|| {
            let mut found: Vec<NodeId> = run.store.mappings_for_src(parent).to_vec();
            for child in run.src.children(parent) {
                for &mapped in run.store.mappings_for_src(child) {
                    if let Some(q) = run.dst.parent(mapped)
                        && run.same_label(parent, q)
                        && !found.contains(&q)
                    {
                        found.push(q);
                    }
                }
            }
            found
        })
    }

    /// The child of after-tree node `q` at `position`.
    fn child_at(&mut self, run: &MatchRun<'_>, q: NodeId, position: usize) -> Option<NodeId> {
        self.dst_children
            .entry(q)
            .or_insert_with(|| run.dst.children(q).collect())
            .get(position)
            .copied()
    }
}
