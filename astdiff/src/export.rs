//! Stable textual export of a mapping.
//!
//! One line per pair, `<label>: <value> [<start>,<end>] -> <label>: <value> [<start>,<end>]`,
//! sorted bytewise and terminated by `\n`. Nodes without a value render as
//! `<label> [<start>,<end>]`. Downstream oracles compare this text byte for
//! byte.

use core::fmt::Write;

use indextree::NodeId;

use crate::store::MultiMappingStore;
use crate::tree::Tree;

/// Render every pair of `store`.
///
/// # Panics
/// Panics if `store` was created for trees of different sizes.
pub fn export_mappings(src: &Tree, dst: &Tree, store: &MultiMappingStore) -> String {
    assert!(
        store.fits(src, dst),
        "invariant violation: store was created for different trees"
    );

    let mut lines: Vec<String> = store
        .all_pairs()
        .map(|(s, d)| {
            let mut line = String::new();
            write_node(&mut line, src, s);
            line.push_str(" -> ");
            write_node(&mut line, dst, d);
            line
        })
        .collect();
    lines.sort_unstable();

    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Render one node as it appears on either side of an export line.
pub fn render_node(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    write_node(&mut out, tree, id);
    out
}

fn write_node(out: &mut String, tree: &Tree, id: NodeId) {
    let range = tree.range(id);
    let value = tree.value(id);
    // Writing to a String cannot fail.
    let _ = if value.is_empty() {
        write!(out, "{} [{},{}]", tree.label(id), range.start, range.end)
    } else {
        write!(
            out,
            "{}: {} [{},{}]",
            tree.label(id),
            value,
            range.start,
            range.end
        )
    };
}
