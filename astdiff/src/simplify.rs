//! Condensed action view.
//!
//! Drops actions already implied by an action on an ancestor:
//! - When a subtree is inserted, don't report individual child inserts
//! - When a subtree is deleted, don't report individual child deletes
//!
//! Moves are never implied: children carried along with a moved parent get no
//! action of their own, so a child `Move` is always a reorder or a re-parent.

use indextree::NodeId;
use rapidhash::RapidHashSet as HashSet;

use crate::actions::Action;
use crate::tree::Tree;
use crate::{debug, trace};

/// Keep only the actions not covered by an action on a parent.
///
/// Updates and moves are always kept. The relative order of kept actions is unchanged.
pub fn simplify_actions(actions: Vec<Action>, src: &Tree, dst: &Tree) -> Vec<Action> {
    debug!(actions = actions.len(), "simplify_actions start");

    let mut inserted: HashSet<NodeId> = HashSet::default();
    let mut deleted: HashSet<NodeId> = HashSet::default();
    for action in &actions {
        match action {
            Action::Insert { dst, .. } => {
                inserted.insert(*dst);
            }
            Action::Delete { src } => {
                deleted.insert(*src);
            }
            Action::Move { .. } | Action::Update { .. } => {}
        }
    }

    let before = actions.len();
    let result: Vec<Action> = actions
        .into_iter()
        .filter(|action| {
            let dominated = match action {
                Action::Insert { dst: d, .. } => {
                    dst.parent(*d).is_some_and(|p| inserted.contains(&p))
                }
                Action::Delete { src: s } => src.parent(*s).is_some_and(|p| deleted.contains(&p)),
                Action::Move { .. } | Action::Update { .. } => false,
            };
            if dominated {
                trace!(%action, "simplify: dropping dominated action");
            }
            !dominated
        })
        .collect();

    debug!(before, after = result.len(), "simplify_actions done");
    result
}
