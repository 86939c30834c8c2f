//! Shared helpers for integration tests.
//!
//! Trees are written as indented outlines, one node per line:
//! ```text
//! Block
//!   SimpleName: count
//!   NumberLiteral: 1
//! ```
//! Two spaces per depth level. A node's range is the byte span of its line.
//! Case files put the before-tree and the after-tree on either side of a
//! `===` line.

#![allow(dead_code)]

use astdiff::{
    Action, MatchingConfig, MultiMappingStore, NodeRecord, Phase, Tree, derive_actions,
    export_mappings, run_phase,
};

/// Parse an outline into pre-order records.
pub fn parse_outline(text: &str) -> Result<Vec<NodeRecord>, String> {
    let mut records: Vec<NodeRecord> = Vec::new();
    // (depth, record index) of the open ancestors
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut offset = 0;

    for (lineno, line) in text.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += line.len();
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent % 2 != 0 {
            return Err(format!("line {}: odd indentation", lineno + 1));
        }
        let depth = indent / 2;
        let content = &line[indent..];
        let (label, value) = match content.split_once(": ") {
            Some((label, value)) => (label, value),
            None => (content, ""),
        };

        while open.last().is_some_and(|&(d, _)| d >= depth) {
            open.pop();
        }
        let parent = match open.last() {
            Some(&(d, index)) if d + 1 == depth => Some(index as i64),
            Some(_) => return Err(format!("line {}: indentation skips a level", lineno + 1)),
            None if depth == 0 => None,
            None => return Err(format!("line {}: indented root", lineno + 1)),
        };

        open.push((depth, records.len()));
        records.push(NodeRecord::new(parent, label, value, start..start + line.len()));
    }

    Ok(records)
}

/// Build a tree from an outline.
pub fn outline(text: &str) -> Tree {
    let records = parse_outline(text).unwrap();
    Tree::from_records(records).unwrap()
}

/// Split a case file into its before and after trees.
pub fn parse_case(text: &str) -> Result<(Tree, Tree), String> {
    let parts: Vec<&str> = text.split("\n===\n").collect();
    if parts.len() != 2 {
        return Err(format!(
            "case must have exactly one '===' separator, found {} parts",
            parts.len()
        ));
    }
    let build = |part: &str| -> Result<Tree, String> {
        let records = parse_outline(part)?;
        Tree::from_records(records).map_err(|e| format!("{e:?}"))
    };
    Ok((build(parts[0])?, build(parts[1])?))
}

/// Everything a matching run produces, rendered for comparison.
pub struct Run {
    pub store: MultiMappingStore,
    pub actions: Vec<Action>,
    pub export: String,
    /// Pairs present after each phase.
    pub snapshots: Vec<Vec<(usize, usize)>>,
}

/// Run the pipeline phase by phase, keeping a snapshot after each.
pub fn run(a: &Tree, b: &Tree, config: &MatchingConfig) -> Run {
    let mut store = MultiMappingStore::for_trees(a, b);
    let mut snapshots = Vec::new();
    for phase in Phase::ALL {
        run_phase(phase, a, b, &mut store, config);
        snapshots.push(
            store
                .all_pairs()
                .map(|(s, d)| (a.index(s), b.index(d)))
                .collect(),
        );
    }
    let actions = derive_actions(a, b, &store);
    let export = export_mappings(a, b, &store);
    Run {
        store,
        actions,
        export,
        snapshots,
    }
}

/// Check determinism, monotonicity, label soundness and coverage.
pub fn check_invariants(a: &Tree, b: &Tree, config: &MatchingConfig) -> Result<(), String> {
    let first = run(a, b, config);
    let second = run(a, b, config);

    if first.export != second.export {
        return Err(format!(
            "export differs between runs:\n{}\n---\n{}",
            first.export, second.export
        ));
    }
    let rendered = |actions: &[Action]| actions.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    if rendered(&first.actions) != rendered(&second.actions) {
        return Err(format!(
            "actions differ between runs: {:?} vs {:?}",
            first.actions, second.actions
        ));
    }

    for (phase, window) in Phase::ALL.iter().skip(1).zip(first.snapshots.windows(2)) {
        if let Some(lost) = window[0].iter().find(|pair| !window[1].contains(pair)) {
            return Err(format!("{phase} phase dropped pair {lost:?}"));
        }
    }

    let store = &first.store;
    for (s, d) in store.all_pairs() {
        if a.label(s) != b.label(d) {
            return Err(format!(
                "pair a:{} {} -> b:{} {} crosses labels",
                a.index(s),
                a.label(s),
                b.index(d),
                b.label(d)
            ));
        }
    }

    for s in a.nodes_preorder() {
        let deletes = first
            .actions
            .iter()
            .filter(|x| matches!(x, Action::Delete { src } if *src == s))
            .count();
        let expected = usize::from(!store.is_mapped_src(s));
        if deletes != expected {
            return Err(format!(
                "a:{} appears in {deletes} deletes, expected {expected}",
                a.index(s)
            ));
        }
        if !store.is_mapped_src(s) && first.actions.iter().any(|x| {
            !matches!(x, Action::Delete { .. }) && x.src() == Some(s)
        }) {
            return Err(format!("unmapped a:{} used outside a delete", a.index(s)));
        }
    }
    for d in b.nodes_preorder() {
        let inserts = first
            .actions
            .iter()
            .filter(|x| matches!(x, Action::Insert { dst, .. } if *dst == d))
            .count();
        let expected = usize::from(!store.is_mapped_dst(d));
        if inserts != expected {
            return Err(format!(
                "b:{} appears in {inserts} inserts, expected {expected}",
                b.index(d)
            ));
        }
        if !store.is_mapped_dst(d) && first.actions.iter().any(|x| {
            !matches!(x, Action::Insert { .. }) && x.dst() == Some(d)
        }) {
            return Err(format!("unmapped b:{} used outside an insert", b.index(d)));
        }
    }

    Ok(())
}
