//! Exact subtree matching by hash.

use core::cmp::Reverse;
use std::collections::VecDeque;

use indextree::NodeId;
use rapidhash::RapidHashMap as HashMap;

use super::{MatchRun, MatchingConfig};
use crate::tree::{NodeHash, Tree};
use crate::{debug, trace};

/// Nodes sharing one subtree digest, in pre-order.
type Buckets = HashMap<NodeHash, Vec<NodeId>>;

/// Map identical subtrees, tallest first.
///
/// Within one digest, pairs whose parents carry the same label win; ties go
/// to the earliest nodes in pre-order on both sides.
pub(super) fn exact_phase(run: &mut MatchRun<'_>, config: &MatchingConfig) -> usize {
    trace!("exact_phase start");

    let src_buckets = bucket(run.src, config.min_height);
    let dst_buckets = bucket(run.dst, config.min_height);

    // (height, first src index) orders groups deterministically: the
    // first src node of a bucket is unique to that bucket.
    let mut groups: Vec<(usize, usize, NodeHash)> = src_buckets
        .iter()
        .filter(|(hash, _)| dst_buckets.contains_key(*hash))
        .map(|(&hash, nodes)| {
            let first = nodes[0];
            (run.src.height(first), run.src.index(first), hash)
        })
        .collect();
    groups.sort_by_key(|&(height, first, _)| (Reverse(height), first));

    let mut added = 0;
    for (height, _, hash) in groups {
        let srcs = &src_buckets[&hash];
        let dsts = &dst_buckets[&hash];
        for (s, d) in pair_up(run, srcs, dsts) {
            trace!(
                a = run.src.index(s),
                b = run.dst.index(d),
                height,
                label = run.src.label(s),
                "exact: hash match"
            );
            added += match_subtrees(run, s, d);
        }
    }

    debug!(added, "exact_phase done");
    added
}

fn bucket(tree: &Tree, min_height: usize) -> Buckets {
    let mut buckets = Buckets::default();
    for id in tree.nodes_preorder() {
        if tree.height(id) >= min_height {
            buckets.entry(tree.subtree_hash(id)).or_default().push(id);
        }
    }
    buckets
}

/// Greedily pair the still-unmapped members of one digest group.
///
/// Taking pairs in (parent labels agree, src pre-order, dst pre-order) order
/// amounts to zipping each parent-label class, then zipping the leftovers.
fn pair_up(run: &MatchRun<'_>, srcs: &[NodeId], dsts: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    let parent_label = |tree: &Tree, id: NodeId| tree.parent(id).map(|p| tree.label(p).to_owned());

    let mut by_context: HashMap<Option<String>, VecDeque<NodeId>> = HashMap::default();
    for &d in dsts {
        if !run.store.is_mapped_dst(d) {
            by_context
                .entry(parent_label(run.dst, d))
                .or_default()
                .push_back(d);
        }
    }

    let mut pairs = Vec::new();
    let mut leftover_srcs = Vec::new();
    for &s in srcs {
        if run.store.is_mapped_src(s) {
            continue;
        }
        match by_context
            .get_mut(&parent_label(run.src, s))
            .and_then(|queue| queue.pop_front())
        {
            Some(d) => pairs.push((s, d)),
            None => leftover_srcs.push(s),
        }
    }

    if !leftover_srcs.is_empty() {
        let mut leftover_dsts: Vec<NodeId> = by_context.into_values().flatten().collect();
        leftover_dsts.sort_by_key(|&d| run.dst.index(d));
        pairs.extend(leftover_srcs.into_iter().zip(leftover_dsts));
    }

    pairs
}

/// Map two hash-identical subtrees node by node. Returns the pairs added.
fn match_subtrees(run: &mut MatchRun<'_>, s: NodeId, d: NodeId) -> usize {
    let mut added = 0;
    let mut stack = vec![(s, d)];
    while let Some((s, d)) = stack.pop() {
        // Also guards against digest collisions between unrelated subtrees.
        if run.store.is_mapped_src(s)
            || run.store.is_mapped_dst(d)
            || !run.same_label(s, d)
            || run.src.size(s) != run.dst.size(d)
        {
            continue;
        }
        if run.link(s, d) {
            added += 1;
        }

        let children: Vec<(NodeId, NodeId)> =
            run.src.children(s).zip(run.dst.children(d)).collect();
        stack.extend(children.into_iter().rev());
    }
    added
}

#[cfg(test)]
mod tests {
    use crate::matching::{MatchingConfig, Phase, run_phase};
    use crate::store::MultiMappingStore;
    use crate::tree::{NodeRecord, Tree};
    use facet_testhelpers::test;

    fn rec(parent: Option<i64>, label: &str, value: &str) -> NodeRecord {
        NodeRecord::new(parent, label, value, 0..0)
    }

    fn exact(a: &Tree, b: &Tree) -> MultiMappingStore {
        let mut store = MultiMappingStore::for_trees(a, b);
        run_phase(Phase::Exact, a, b, &mut store, &MatchingConfig::default());
        store
    }

    #[test]
    fn test_largest_block_claimed_whole() {
        // The unchanged method body maps as one block, not through the
        // coincidental `x` leaf elsewhere in the tree.
        let a = Tree::from_records(vec![
            rec(None, "TypeDeclaration", ""),
            rec(Some(0), "SimpleName", "x"),
            rec(Some(0), "Block", ""),
            rec(Some(2), "ReturnStatement", ""),
            rec(Some(3), "SimpleName", "x"),
        ])
        .unwrap();
        let b = Tree::from_records(vec![
            rec(None, "TypeDeclaration", ""),
            rec(Some(0), "Block", ""),
            rec(Some(1), "ReturnStatement", ""),
            rec(Some(2), "SimpleName", "x"),
            rec(Some(0), "SimpleName", "y"),
        ])
        .unwrap();

        let store = exact(&a, &b);
        assert_eq!(store.mappings_for_src(a.node_at(2)), &[b.node_at(1)]);
        assert_eq!(store.mappings_for_src(a.node_at(3)), &[b.node_at(2)]);
        assert_eq!(store.mappings_for_src(a.node_at(4)), &[b.node_at(3)]);
        // The only other `x` in b is taken, so a's top-level `x` stays free.
        assert!(!store.is_mapped_src(a.node_at(1)));
        assert!(!store.is_mapped_src(a.root()));
    }

    #[test]
    fn test_parent_context_breaks_ties() {
        // Two identical `x` leaves in a; b has one under a MethodInvocation.
        let a = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "ExpressionStatement", ""),
            rec(Some(1), "SimpleName", "x"),
            rec(Some(0), "MethodInvocation", ""),
            rec(Some(3), "SimpleName", "x"),
        ])
        .unwrap();
        let b = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "MethodInvocation", ""),
            rec(Some(1), "SimpleName", "x"),
            rec(Some(1), "SimpleName", "y"),
        ])
        .unwrap();

        let store = exact(&a, &b);
        assert_eq!(store.mappings_for_dst(b.node_at(2)), &[a.node_at(4)]);
        assert!(!store.is_mapped_src(a.node_at(2)));
    }

    #[test]
    fn test_earliest_preorder_breaks_remaining_ties() {
        let a = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "dup"),
            rec(Some(0), "SimpleName", "dup"),
        ])
        .unwrap();
        let b = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "other"),
            rec(Some(0), "SimpleName", "dup"),
        ])
        .unwrap();

        let store = exact(&a, &b);
        assert_eq!(store.mappings_for_dst(b.node_at(2)), &[a.node_at(1)]);
        assert!(!store.is_mapped_src(a.node_at(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_min_height_leaves_leaves_alone() {
        let a = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "x"),
            rec(Some(0), "ReturnStatement", ""),
            rec(Some(2), "SimpleName", "y"),
        ])
        .unwrap();
        let b = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "ReturnStatement", ""),
            rec(Some(1), "SimpleName", "y"),
            rec(Some(0), "SimpleName", "x"),
        ])
        .unwrap();

        let config = MatchingConfig {
            min_height: 1,
            ..Default::default()
        };
        let mut store = MultiMappingStore::for_trees(&a, &b);
        run_phase(Phase::Exact, &a, &b, &mut store, &config);

        // The statement (height 1) is matched with its leaf; the lone `x` is not.
        assert!(store.contains(a.node_at(2), b.node_at(1)));
        assert!(store.contains(a.node_at(3), b.node_at(2)));
        assert!(!store.is_mapped_src(a.node_at(1)));
    }

    #[test]
    fn test_identical_trees_map_one_to_one() {
        let records = vec![
            rec(None, "CompilationUnit", ""),
            rec(Some(0), "TypeDeclaration", ""),
            rec(Some(1), "SimpleName", "A"),
            rec(Some(1), "MethodDeclaration", ""),
            rec(Some(3), "SimpleName", "run"),
            rec(Some(3), "Block", ""),
        ];
        let a = Tree::from_records(records.clone()).unwrap();
        let b = Tree::from_records(records).unwrap();

        let store = exact(&a, &b);
        assert_eq!(store.len(), a.node_count());
        for id in a.nodes_preorder() {
            assert_eq!(store.mappings_for_src(id), &[b.node_at(a.index(id))]);
        }
    }
}
