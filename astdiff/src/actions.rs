//! Edit action derivation from a finished multi-mapping.
//!
//! Follows the phases of Chawathe et al. (1996), "Change Detection in
//! Hierarchically Structured Information", adapted to a many-to-many store:
//! 1. UPDATE: pairs that stay in place but carry a different value
//! 2. INSERT: after-tree nodes without counterparts
//! 3. MOVE: pairs whose parents do not correspond, or that fell out of
//!    sibling order
//! 4. DELETE: before-tree nodes without counterparts
//!
//! A node mapped to several counterparts yields one action per pair.

use core::fmt;

use indextree::NodeId;
use rapidhash::{RapidHashMap as HashMap, RapidHashSet as HashSet};

use crate::store::MultiMappingStore;
use crate::tree::Tree;
use crate::{debug, trace};

/// One edit turning the before-tree ("a") into the after-tree ("b").
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Change the value of a node that stays in place.
    Update {
        /// The node in the before-tree
        src: NodeId,
        /// Its counterpart in the after-tree
        dst: NodeId,
    },

    /// Insert a node that has no counterpart.
    Insert {
        /// The new node in the after-tree
        dst: NodeId,
        /// Its parent in the after-tree, `None` for a new root
        parent: Option<NodeId>,
        /// Position among its siblings (0-indexed)
        position: usize,
        /// The node's type label
        label: String,
    },

    /// Relocate a mapped node.
    Move {
        /// The node in the before-tree
        src: NodeId,
        /// Its counterpart in the after-tree
        dst: NodeId,
        /// Parent of `dst`, `None` when `dst` is the root
        new_parent: Option<NodeId>,
        /// Position of `dst` among its siblings
        position: usize,
    },

    /// Remove a node that has no counterpart.
    Delete {
        /// The node in the before-tree
        src: NodeId,
    },
}

impl Action {
    /// The before-tree node, if any.
    pub fn src(&self) -> Option<NodeId> {
        match self {
            Action::Update { src, .. } | Action::Move { src, .. } | Action::Delete { src } => {
                Some(*src)
            }
            Action::Insert { .. } => None,
        }
    }

    /// The after-tree node, if any.
    pub fn dst(&self) -> Option<NodeId> {
        match self {
            Action::Update { dst, .. } | Action::Move { dst, .. } | Action::Insert { dst, .. } => {
                Some(*dst)
            }
            Action::Delete { .. } => None,
        }
    }
}

/// Pre-order index of a node. Trees allocate ids in pre-order, starting at 1.
fn ix(id: NodeId) -> usize {
    usize::from(id) - 1
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Update { src, dst } => write!(f, "Update(a:{} -> b:{})", ix(*src), ix(*dst)),
            Action::Insert {
                dst,
                parent,
                position,
                label,
            } => {
                write!(f, "Insert(b:{} {} @{}", ix(*dst), label, position)?;
                if let Some(parent) = parent {
                    write!(f, " under b:{}", ix(*parent))?;
                }
                write!(f, ")")
            }
            Action::Move {
                src,
                dst,
                new_parent,
                position,
            } => {
                write!(f, "Move(a:{} -> b:{} @{}", ix(*src), ix(*dst), position)?;
                if let Some(parent) = new_parent {
                    write!(f, " under b:{}", ix(*parent))?;
                }
                write!(f, ")")
            }
            Action::Delete { src } => write!(f, "Delete(a:{})", ix(*src)),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Wrapper for collecting actions with automatic tracing.
struct Ops {
    inner: Vec<Action>,
}

impl Ops {
    fn new() -> Self {
        Self { inner: Vec::new() }
    }

    fn push(&mut self, action: Action) {
        debug!(%action, "emit");
        self.inner.push(action);
    }

    fn into_inner(self) -> Vec<Action> {
        self.inner
    }
}

/// Derive the edit actions implied by `store`.
///
/// Order: updates (store order), inserts (after-tree pre-order), moves (store
/// order), deletes (before-tree post-order).
///
/// # Panics
/// Panics if `store` was created for trees of different sizes.
pub fn derive_actions(src: &Tree, dst: &Tree, store: &MultiMappingStore) -> Vec<Action> {
    assert!(
        store.fits(src, dst),
        "invariant violation: store was created for different trees"
    );
    trace!(pairs = store.len(), "derive_actions start");

    let mut order = SiblingOrder::default();
    let mut moved: Vec<(NodeId, NodeId)> = Vec::new();
    let mut updated: Vec<(NodeId, NodeId)> = Vec::new();
    for (s, d) in store.all_pairs() {
        if is_move(src, dst, store, &mut order, s, d) {
            moved.push((s, d));
        } else if src.value(s) != dst.value(d) {
            updated.push((s, d));
        }
    }

    let mut ops = Ops::new();

    for (s, d) in updated {
        ops.push(Action::Update { src: s, dst: d });
    }

    for d in dst.nodes_preorder() {
        if !store.is_mapped_dst(d) {
            ops.push(Action::Insert {
                dst: d,
                parent: dst.parent(d),
                position: dst.position(d),
                label: dst.label(d).to_owned(),
            });
        }
    }

    for (s, d) in moved {
        ops.push(Action::Move {
            src: s,
            dst: d,
            new_parent: dst.parent(d),
            position: dst.position(d),
        });
    }

    for s in src.post_order() {
        if !store.is_mapped_src(s) {
            ops.push(Action::Delete { src: s });
        }
    }

    debug!(total_ops = ops.inner.len(), "derive_actions done");
    ops.into_inner()
}

fn is_move(
    src: &Tree,
    dst: &Tree,
    store: &MultiMappingStore,
    order: &mut SiblingOrder,
    s: NodeId,
    d: NodeId,
) -> bool {
    match (src.parent(s), dst.parent(d)) {
        (None, None) => false,
        (Some(ps), Some(pd)) => {
            if !store.contains(ps, pd) {
                trace!(a = src.index(s), b = dst.index(d), "move: parent changed");
                return true;
            }
            let out_of_order = order.displaced(src, dst, store, ps, pd).contains(&(s, d));
            if out_of_order {
                trace!(a = src.index(s), b = dst.index(d), "move: sibling order changed");
            }
            out_of_order
        }
        // Only one side is a root.
        _ => true,
    }
}

/// Child pairs that are not on the longest in-order chain under a parent
/// pair, computed once per parent pair.
#[derive(Default)]
struct SiblingOrder {
    cache: HashMap<(NodeId, NodeId), HashSet<(NodeId, NodeId)>>,
}

impl SiblingOrder {
    fn displaced(
        &mut self,
        src: &Tree,
        dst: &Tree,
        store: &MultiMappingStore,
        ps: NodeId,
        pd: NodeId,
    ) -> &HashSet<(NodeId, NodeId)> {
        self.cache.entry((ps, pd)).or_insert_with(|| {
            // Sorted by (src position, dst position).
            let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
            for cs in src.children(ps) {
                let start = pairs.len();
                for &cd in store.mappings_for_src(cs) {
                    if dst.parent(cd) == Some(pd) {
                        pairs.push((cs, cd));
                    }
                }
                pairs[start..].sort_by_key(|&(_, cd)| dst.position(cd));
            }
            let keys: Vec<usize> = pairs.iter().map(|&(_, cd)| dst.position(cd)).collect();
            let kept = longest_increasing(&keys);

            let mut displaced = HashSet::default();
            let mut next = kept.iter().peekable();
            for (i, pair) in pairs.into_iter().enumerate() {
                if next.peek() == Some(&&i) {
                    next.next();
                } else {
                    displaced.insert(pair);
                }
            }
            displaced
        })
    }
}

/// Indices of one longest strictly increasing subsequence of `keys`, in
/// ascending order. Among equally long chains, the one ending earliest wins.
fn longest_increasing(keys: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of a chain of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; keys.len()];

    for (i, &key) in keys.iter().enumerate() {
        let k = tails.partition_point(|&t| keys[t] < key);
        if k > 0 {
            prev[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut chain = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        chain.push(i);
        cursor = prev[i];
    }
    chain.reverse();
    chain
}
