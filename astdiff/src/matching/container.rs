//! Bottom-up container matching by descendant containment.

use indextree::NodeId;
use rapidhash::RapidHashMap as HashMap;

use super::{MatchRun, MatchingConfig};
use crate::{debug, trace};

/// Map unmapped internal nodes to the unmapped same-label nodes that hold
/// most of their mapped descendants' counterparts.
///
/// Passes run in post-order until one adds nothing or the pass bound is
/// reached. Returns `(pairs added, passes run)`.
pub(super) fn container_phase(
    run: &mut MatchRun<'_>,
    config: &MatchingConfig,
) -> (usize, usize) {
    let max_passes = config.max_container_passes.unwrap_or_else(|| {
        run.src.height(run.src.root()).max(run.dst.height(run.dst.root())) + 1
    });
    trace!(max_passes, "container_phase start");

    let mut added = 0;
    let mut passes = 0;
    while passes < max_passes {
        passes += 1;
        let added_this_pass = container_pass(run, config);
        debug!(pass = passes, added = added_this_pass, "container pass done");
        if added_this_pass == 0 {
            break;
        }
        added += added_this_pass;
    }

    debug!(added, passes, "container_phase done");
    (added, passes)
}

fn container_pass(run: &mut MatchRun<'_>, config: &MatchingConfig) -> usize {
    let candidates: Vec<NodeId> = run
        .src
        .post_order()
        .filter(|&s| !run.src.is_leaf(s))
        .collect();

    let mut added = 0;
    for s in candidates {
        // Earlier links in this pass count: children are visited first.
        if run.store.is_mapped_src(s) {
            continue;
        }
        for d in containers_of(run, config, s) {
            trace!(
                a = run.src.index(s),
                b = run.dst.index(d),
                label = run.src.label(s),
                "container: accepted"
            );
            if run.link(s, d) {
                added += 1;
            }
        }
    }
    added
}

/// Unmapped after-tree nodes with `s`'s label whose containment fraction for
/// `s` is strictly above the threshold and that enclose no other such node,
/// in after-tree pre-order.
fn containers_of(run: &MatchRun<'_>, config: &MatchingConfig, s: NodeId) -> Vec<NodeId> {
    let mut mapped = 0usize;
    let mut hits: HashMap<NodeId, usize> = HashMap::default();
    let mut seen: Vec<NodeId> = Vec::new();

    for desc in run.src.descendants(s) {
        let counterparts = run.store.mappings_for_src(desc);
        if counterparts.is_empty() {
            continue;
        }
        mapped += 1;

        // Each descendant votes at most once for a given container.
        seen.clear();
        for &m in counterparts {
            for q in run.dst.ancestors(m) {
                if !seen.contains(&q)
                    && run.same_label(s, q)
                    && !run.store.is_mapped_dst(q)
                {
                    seen.push(q);
                }
            }
        }
        for &q in &seen {
            *hits.entry(q).or_default() += 1;
        }
    }

    if mapped == 0 {
        return Vec::new();
    }

    let clearing: Vec<NodeId> = hits
        .into_iter()
        .filter(|&(_, n)| n as f64 / mapped as f64 > config.containment_threshold)
        .map(|(q, _)| q)
        .collect();

    // Every ancestor of a clearing container clears too. Only the nearest
    // ones are counterparts of `s`; the rest are left to `s`'s ancestors.
    let mut accepted: Vec<NodeId> = clearing
        .iter()
        .copied()
        .filter(|&q| !clearing.iter().any(|&other| run.dst.is_descendant(q, other)))
        .collect();
    accepted.sort_by_key(|&q| run.dst.index(q));
    accepted
}
