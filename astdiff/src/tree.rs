//! Labeled ordered trees built from pre-order record streams.
//!
//! Nodes live in an [`indextree::Arena`]; parent links are arena indices, so
//! ownership only ever flows from a node to its children. Subtree hashes,
//! heights and sizes are folded in while the records stream in, and the tree
//! is read-only afterwards.

use core::hash::{Hash, Hasher};
use core::ops::Range;

use facet::Facet;
use indextree::{Arena, NodeEdge, NodeId};
use rapidhash::RapidHasher;

use crate::error::MalformedTreeError;
use crate::interner::{Interner, Symbol};

/// One node as produced by a parsing front-end.
///
/// A tree is described by a sequence of records in pre-order; `parent` is the
/// position of the parent record in that sequence, or `None` for the root.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Index of the parent record, `None` for the root.
    pub parent: Option<i64>,
    /// Syntactic category, e.g. `MethodDeclaration`.
    pub type_label: String,
    /// Identifier or literal text; empty for purely structural nodes.
    pub value: String,
    /// Start of the source range (inclusive).
    pub range_start: usize,
    /// End of the source range (exclusive).
    pub range_end: usize,
}

impl NodeRecord {
    /// Convenience constructor.
    pub fn new(
        parent: Option<i64>,
        type_label: impl Into<String>,
        value: impl Into<String>,
        range: Range<usize>,
    ) -> Self {
        Self {
            parent,
            type_label: type_label.into(),
            value: value.into(),
            range_start: range.start,
            range_end: range.end,
        }
    }
}

/// Content digest over a node's label, value and its children's digests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeHash(pub u64);

/// Per-node payload stored in the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Interned type label (only comparable within the owning tree).
    pub label: Symbol,
    /// Text payload.
    pub value: String,
    /// Source range, for diagnostics and export only.
    pub range: Range<usize>,
    /// Subtree digest.
    pub hash: NodeHash,
    /// Longest downward path to a leaf; leaves have height 0.
    pub height: usize,
    /// Number of nodes in the subtree, this one included.
    pub size: usize,
    /// Dense pre-order index within the tree.
    pub index: usize,
    /// Index among the parent's children.
    pub position: usize,
}

/// An immutable labeled ordered tree.
#[derive(Debug, Clone)]
pub struct Tree {
    arena: Arena<NodeData>,
    root: NodeId,
    /// Node ids by pre-order index.
    order: Vec<NodeId>,
    interner: Interner,
}

/// A node whose subtree is still receiving children during construction.
struct OpenNode {
    id: NodeId,
    hasher: RapidHasher,
    height: usize,
    size: usize,
    child_count: usize,
}

impl Tree {
    /// Build a tree from records in pre-order.
    ///
    /// Every record's parent must be an already-seen record that is still on
    /// the open ancestor path; anything else is rejected and nothing is built.
    pub fn from_records<I>(records: I) -> Result<Self, MalformedTreeError>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        let mut arena: Arena<NodeData> = Arena::new();
        let mut interner = Interner::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut open: Vec<OpenNode> = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            if record.range_start > record.range_end {
                return Err(MalformedTreeError::InvalidRange {
                    index,
                    start: record.range_start,
                    end: record.range_end,
                });
            }

            match record.parent {
                None if index > 0 => return Err(MalformedTreeError::MultipleRoots { index }),
                None => {}
                Some(parent) if parent < 0 => {
                    return Err(MalformedTreeError::NegativeParent { index, parent });
                }
                Some(parent) => {
                    let parent = parent as usize;
                    if parent == index {
                        return Err(MalformedTreeError::SelfReference { index });
                    }
                    if parent > index {
                        return Err(MalformedTreeError::ForwardReference { index, parent });
                    }
                    // Close finished siblings until the parent is on top.
                    loop {
                        let Some(top) = open.last() else {
                            return Err(MalformedTreeError::NotPreOrder { index, parent });
                        };
                        if arena[top.id].get().index == parent {
                            break;
                        }
                        close_top(&mut arena, &mut open);
                    }
                }
            }

            let mut hasher = RapidHasher::default();
            record.type_label.hash(&mut hasher);
            record.value.hash(&mut hasher);

            let position = match open.last_mut() {
                Some(top) => {
                    top.child_count += 1;
                    top.child_count - 1
                }
                None => 0,
            };

            let id = arena.new_node(NodeData {
                label: interner.intern(&record.type_label),
                value: record.value,
                range: record.range_start..record.range_end,
                hash: NodeHash(0),
                height: 0,
                size: 1,
                index,
                position,
            });
            if let Some(top) = open.last() {
                top.id.append(id, &mut arena);
            }

            order.push(id);
            open.push(OpenNode {
                id,
                hasher,
                height: 0,
                size: 1,
                child_count: 0,
            });
        }

        let Some(&root) = order.first() else {
            return Err(MalformedTreeError::Empty);
        };
        while !open.is_empty() {
            close_top(&mut arena, &mut open);
        }

        Ok(Self {
            arena,
            root,
            order,
            interner,
        })
    }

    /// Serialize back into pre-order records.
    pub fn to_records(&self) -> Vec<NodeRecord> {
        self.order
            .iter()
            .map(|&id| {
                let data = self.get(id);
                NodeRecord {
                    parent: self.parent(id).map(|p| self.index(p) as i64),
                    type_label: self.label(id).to_owned(),
                    value: data.value.clone(),
                    range_start: data.range.start,
                    range_end: data.range.end,
                }
            })
            .collect()
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// The node payload.
    #[inline]
    pub fn get(&self, id: NodeId) -> &NodeData {
        self.arena[id].get()
    }

    /// The label interner owned by this tree.
    #[inline]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Type label text.
    #[inline]
    pub fn label(&self, id: NodeId) -> &str {
        self.interner.resolve(self.get(id).label)
    }

    /// Interned type label.
    #[inline]
    pub fn symbol(&self, id: NodeId) -> Symbol {
        self.get(id).label
    }

    /// Text payload.
    #[inline]
    pub fn value(&self, id: NodeId) -> &str {
        &self.get(id).value
    }

    /// Source range.
    #[inline]
    pub fn range(&self, id: NodeId) -> Range<usize> {
        self.get(id).range.clone()
    }

    /// Subtree digest.
    #[inline]
    pub fn subtree_hash(&self, id: NodeId) -> NodeHash {
        self.get(id).hash
    }

    /// Height of the subtree rooted at `id`.
    #[inline]
    pub fn height(&self, id: NodeId) -> usize {
        self.get(id).height
    }

    /// Number of nodes in the subtree rooted at `id`.
    #[inline]
    pub fn size(&self, id: NodeId) -> usize {
        self.get(id).size
    }

    /// Dense pre-order index.
    #[inline]
    pub fn index(&self, id: NodeId) -> usize {
        self.get(id).index
    }

    /// The node with a given pre-order index.
    ///
    /// # Panics
    /// Panics if `index >= node_count()`.
    #[inline]
    pub fn node_at(&self, index: usize) -> NodeId {
        self.order[index]
    }

    /// Index among the parent's children (0 for the root).
    #[inline]
    pub fn position(&self, id: NodeId) -> usize {
        self.get(id).position
    }

    /// Parent node, `None` for the root.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Children in source order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Number of children.
    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    /// Whether the node has no children.
    #[inline]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.arena[id].first_child().is_none()
    }

    /// All nodes in pre-order. Calling it again restarts the walk.
    pub fn nodes_preorder(&self) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.order.iter().copied()
    }

    /// All nodes in post-order (children before parents).
    pub fn post_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.root.traverse(&self.arena).filter_map(|edge| match edge {
            NodeEdge::End(id) => Some(id),
            NodeEdge::Start(_) => None,
        })
    }

    /// Strict descendants of `id` in post-order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.traverse(&self.arena).filter_map(move |edge| match edge {
            NodeEdge::End(n) if n != id => Some(n),
            _ => None,
        })
    }

    /// Pre-order indices of the strict descendants of `id`.
    ///
    /// A subtree occupies a contiguous block of pre-order indices.
    #[inline]
    pub fn descendant_indices(&self, id: NodeId) -> Range<usize> {
        let data = self.get(id);
        data.index + 1..data.index + data.size
    }

    /// Whether `node` lies strictly inside the subtree rooted at `ancestor`.
    #[inline]
    pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.descendant_indices(ancestor).contains(&self.index(node))
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.ancestors(&self.arena).skip(1)
    }
}

/// Finish the innermost open node and fold its digest into its parent.
fn close_top(arena: &mut Arena<NodeData>, open: &mut Vec<OpenNode>) {
    let Some(done) = open.pop() else {
        return;
    };
    let hash = NodeHash(done.hasher.finish());

    let data = arena[done.id].get_mut();
    data.hash = hash;
    data.height = done.height;
    data.size = done.size;

    if let Some(parent) = open.last_mut() {
        parent.hasher.write_u64(hash.0);
        parent.height = parent.height.max(done.height + 1);
        parent.size += done.size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    fn rec(parent: Option<i64>, label: &str, value: &str) -> NodeRecord {
        NodeRecord::new(parent, label, value, 0..0)
    }

    /// MethodDeclaration
    ///   SimpleName: foo
    ///   Block
    ///     ReturnStatement
    ///       NumberLiteral: 1
    ///   Block
    ///     ReturnStatement
    ///       NumberLiteral: 1
    fn sample() -> Tree {
        Tree::from_records(vec![
            rec(None, "MethodDeclaration", ""),
            rec(Some(0), "SimpleName", "foo"),
            rec(Some(0), "Block", ""),
            rec(Some(2), "ReturnStatement", ""),
            rec(Some(3), "NumberLiteral", "1"),
            rec(Some(0), "Block", ""),
            rec(Some(5), "ReturnStatement", ""),
            rec(Some(6), "NumberLiteral", "1"),
        ])
        .unwrap()
    }

    #[test]
    fn test_structure() {
        let tree = sample();
        assert_eq!(tree.node_count(), 8);

        let root = tree.root();
        assert_eq!(tree.label(root), "MethodDeclaration");
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.child_count(root), 3);

        let kids: Vec<_> = tree.children(root).map(|c| tree.index(c)).collect();
        assert_eq!(kids, vec![1, 2, 5]);
        assert_eq!(tree.position(tree.node_at(5)), 2);
        assert_eq!(tree.parent(tree.node_at(4)), Some(tree.node_at(3)));
    }

    #[test]
    fn test_heights_and_sizes() {
        let tree = sample();
        assert_eq!(tree.height(tree.root()), 3);
        assert_eq!(tree.size(tree.root()), 8);
        assert_eq!(tree.height(tree.node_at(1)), 0);
        assert_eq!(tree.height(tree.node_at(2)), 2);
        assert_eq!(tree.size(tree.node_at(2)), 3);
        assert!(tree.is_leaf(tree.node_at(4)));
        assert!(!tree.is_leaf(tree.node_at(3)));
    }

    #[test]
    fn test_identical_subtrees_share_hash() {
        let tree = sample();
        assert_eq!(
            tree.subtree_hash(tree.node_at(2)),
            tree.subtree_hash(tree.node_at(5))
        );
        assert_ne!(
            tree.subtree_hash(tree.node_at(2)),
            tree.subtree_hash(tree.node_at(3))
        );
    }

    #[test]
    fn test_hash_covers_values_and_order() {
        let a = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "x"),
            rec(Some(0), "SimpleName", "y"),
        ])
        .unwrap();
        let swapped = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "y"),
            rec(Some(0), "SimpleName", "x"),
        ])
        .unwrap();
        let renamed = Tree::from_records(vec![
            rec(None, "Block", ""),
            rec(Some(0), "SimpleName", "x"),
            rec(Some(0), "SimpleName", "z"),
        ])
        .unwrap();
        let copy = Tree::from_records(a.to_records()).unwrap();

        assert_ne!(a.subtree_hash(a.root()), swapped.subtree_hash(swapped.root()));
        assert_ne!(a.subtree_hash(a.root()), renamed.subtree_hash(renamed.root()));
        assert_eq!(a.subtree_hash(a.root()), copy.subtree_hash(copy.root()));
    }

    #[test]
    fn test_traversals() {
        let tree = sample();
        let pre: Vec<_> = tree.nodes_preorder().map(|n| tree.index(n)).collect();
        assert_eq!(pre, (0..8).collect::<Vec<_>>());

        // Restartable
        let walk = tree.nodes_preorder();
        assert_eq!(walk.clone().count(), walk.count());

        let post: Vec<_> = tree.post_order().map(|n| tree.index(n)).collect();
        assert_eq!(post, vec![1, 4, 3, 2, 7, 6, 5, 0]);

        let desc: Vec<_> = tree
            .descendants(tree.node_at(2))
            .map(|n| tree.index(n))
            .collect();
        assert_eq!(desc, vec![4, 3]);
        assert_eq!(tree.descendant_indices(tree.node_at(2)), 3..5);
        assert!(tree.is_descendant(tree.node_at(2), tree.node_at(4)));
        assert!(!tree.is_descendant(tree.node_at(2), tree.node_at(5)));
        assert!(!tree.is_descendant(tree.node_at(2), tree.node_at(2)));

        let up: Vec<_> = tree.ancestors(tree.node_at(4)).map(|n| tree.index(n)).collect();
        assert_eq!(up, vec![3, 2, 0]);
    }

    #[test]
    fn test_records_roundtrip() {
        let tree = sample();
        let records = tree.to_records();
        assert_eq!(records[4].parent, Some(3));
        assert_eq!(records[4].value, "1");
        let rebuilt = Tree::from_records(records.clone()).unwrap();
        assert_eq!(rebuilt.to_records(), records);
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(
            Tree::from_records(Vec::new()).unwrap_err(),
            MalformedTreeError::Empty
        );
        assert_eq!(
            Tree::from_records(vec![rec(Some(0), "A", "")]).unwrap_err(),
            MalformedTreeError::SelfReference { index: 0 }
        );
        assert_eq!(
            Tree::from_records(vec![rec(None, "A", ""), rec(Some(2), "B", "")]).unwrap_err(),
            MalformedTreeError::ForwardReference {
                index: 1,
                parent: 2
            }
        );
        assert_eq!(
            Tree::from_records(vec![rec(None, "A", ""), rec(Some(-1), "B", "")]).unwrap_err(),
            MalformedTreeError::NegativeParent {
                index: 1,
                parent: -1
            }
        );
        assert_eq!(
            Tree::from_records(vec![rec(None, "A", ""), rec(None, "B", "")]).unwrap_err(),
            MalformedTreeError::MultipleRoots { index: 1 }
        );
        // 2 is closed once 3 starts a sibling subtree; 4 cannot reopen it.
        assert_eq!(
            Tree::from_records(vec![
                rec(None, "A", ""),
                rec(Some(0), "B", ""),
                rec(Some(1), "C", ""),
                rec(Some(1), "D", ""),
                rec(Some(2), "E", ""),
            ])
            .unwrap_err(),
            MalformedTreeError::NotPreOrder {
                index: 4,
                parent: 2
            }
        );
        assert_eq!(
            Tree::from_records(vec![NodeRecord::new(None, "A", "", 5..3)]).unwrap_err(),
            MalformedTreeError::InvalidRange {
                index: 0,
                start: 5,
                end: 3
            }
        );
    }
}
