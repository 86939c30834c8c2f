use facet::Facet;

/// Errors raised while building a [`Tree`](crate::Tree) from a record stream.
///
/// Construction is all-or-nothing: when one of these is returned, no tree exists.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum MalformedTreeError {
    /// record stream is empty
    Empty,

    /// record {index} names itself as its parent
    SelfReference { index: usize },

    /// record {index} references parent {parent}, which has not been seen yet
    ForwardReference { index: usize, parent: usize },

    /// record {index} has negative parent index {parent}
    NegativeParent { index: usize, parent: i64 },

    /// record {index} has no parent but the tree already has a root
    MultipleRoots { index: usize },

    /// record {index} attaches to closed subtree {parent}; records are not in pre-order
    NotPreOrder { index: usize, parent: usize },

    /// record {index} has inverted range [{start},{end})
    InvalidRange {
        index: usize,
        start: usize,
        end: usize,
    },
}
