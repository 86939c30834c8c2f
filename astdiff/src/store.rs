//! Many-to-many correspondence between the nodes of two trees.

use indextree::NodeId;
use smallvec::SmallVec;

use crate::tree::Tree;

/// Counterparts of one node, in insertion order. Most nodes have at most one.
type Peers = SmallVec<[NodeId; 2]>;

#[derive(Debug, Clone, Default)]
struct Links {
    node: Option<NodeId>,
    peers: Peers,
}

/// A bidirectional many-to-many mapping between nodes of a before-tree
/// ("src") and an after-tree ("dst").
///
/// Slots are indexed by `usize::from(NodeId)`; trees allocate their ids in
/// pre-order, so slot order is pre-order. The store only ever grows.
#[derive(Debug, Clone, Default)]
pub struct MultiMappingStore {
    src_to_dst: Vec<Links>,
    dst_to_src: Vec<Links>,
    len: usize,
    /// Node counts of the trees this store was created for, if known.
    dims: Option<(usize, usize)>,
}

impl MultiMappingStore {
    /// Create an empty store not bound to particular trees.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store sized for (and bound to) two trees.
    pub fn for_trees(src: &Tree, dst: &Tree) -> Self {
        Self {
            src_to_dst: vec![Links::default(); src.node_count() + 1],
            dst_to_src: vec![Links::default(); dst.node_count() + 1],
            len: 0,
            dims: Some((src.node_count(), dst.node_count())),
        }
    }

    /// Whether this store can describe the given pair of trees.
    ///
    /// Unbound stores fit anything.
    pub fn fits(&self, src: &Tree, dst: &Tree) -> bool {
        self.dims
            .is_none_or(|dims| dims == (src.node_count(), dst.node_count()))
    }

    /// Add a pair. Returns `false` if it was already present.
    pub fn add(&mut self, src: NodeId, dst: NodeId) -> bool {
        let forward = slot_mut(&mut self.src_to_dst, src);
        if forward.peers.contains(&dst) {
            return false;
        }
        forward.node = Some(src);
        forward.peers.push(dst);

        let backward = slot_mut(&mut self.dst_to_src, dst);
        backward.node = Some(dst);
        backward.peers.push(src);

        self.len += 1;
        true
    }

    /// Whether the exact pair is present.
    #[inline]
    pub fn contains(&self, src: NodeId, dst: NodeId) -> bool {
        self.mappings_for_src(src).contains(&dst)
    }

    /// After-tree counterparts of a before-tree node, in insertion order.
    #[inline]
    pub fn mappings_for_src(&self, src: NodeId) -> &[NodeId] {
        peers(&self.src_to_dst, src)
    }

    /// Before-tree counterparts of an after-tree node, in insertion order.
    #[inline]
    pub fn mappings_for_dst(&self, dst: NodeId) -> &[NodeId] {
        peers(&self.dst_to_src, dst)
    }

    /// Whether a before-tree node has at least one counterpart.
    #[inline(always)]
    pub fn is_mapped_src(&self, src: NodeId) -> bool {
        !self.mappings_for_src(src).is_empty()
    }

    /// Whether an after-tree node has at least one counterpart.
    #[inline(always)]
    pub fn is_mapped_dst(&self, dst: NodeId) -> bool {
        !self.mappings_for_dst(dst).is_empty()
    }

    /// Every pair: src nodes in pre-order, each src's counterparts in
    /// insertion order. The iterator can be cloned to restart it.
    pub fn all_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + Clone + '_ {
        self.src_to_dst
            .iter()
            .filter_map(|links| links.node.map(|node| (node, &links.peers)))
            .flat_map(|(src, peers)| peers.iter().map(move |&dst| (src, dst)))
    }

    /// Mapped before-tree nodes in pre-order.
    pub fn mapped_srcs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.src_to_dst.iter().filter_map(|links| links.node)
    }

    /// Mapped after-tree nodes in pre-order.
    pub fn mapped_dsts(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dst_to_src.iter().filter_map(|links| links.node)
    }

    /// Add every pair of `other`, in its iteration order. Returns how many
    /// pairs were new.
    ///
    /// # Panics
    /// Panics if both stores are bound to trees of different sizes.
    pub fn merge_from(&mut self, other: &MultiMappingStore) -> usize {
        if let (Some(mine), Some(theirs)) = (self.dims, other.dims) {
            assert_eq!(
                mine, theirs,
                "invariant violation: merging stores built for different trees"
            );
        }
        let mut added = 0;
        for (src, dst) in other.all_pairs() {
            if self.add(src, dst) {
                added += 1;
            }
        }
        added
    }

    /// Number of pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no pairs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[inline]
fn peers(slots: &[Links], id: NodeId) -> &[NodeId] {
    slots
        .get(usize::from(id))
        .map(|links| links.peers.as_slice())
        .unwrap_or(&[])
}

fn slot_mut(slots: &mut Vec<Links>, id: NodeId) -> &mut Links {
    let idx = usize::from(id);
    if idx >= slots.len() {
        slots.resize(idx + 1, Links::default());
    }
    &mut slots[idx]
}
