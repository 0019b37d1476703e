//! `Close(target)` (§4.2), merging the source's two divergent
//! sibling-promotion code paths into one semantics per §9 Open Question (a):
//! promotion always means "splice the target's sibling into the slot the
//! target's parent branch used to occupy", whether that slot is the
//! grandparent's child pointer or the root pointer itself.

use loom_toolkit::{ToolkitGateway, WidgetId};

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::transaction::{WidgetOperation, WidgetTransaction};
use crate::tree::stack;
use crate::tree::{NodeId, PaneKind, WorkspaceTree};

/// What a [`close`] call did, so the caller can drive C7 rebalancing and
/// window attachment appropriately.
pub enum CloseResult {
	/// `target` was the workspace's only leaf; the main loop should quit.
	QuitWorkspace,
	/// `target`'s sibling (or, for a stack, the surviving pane) took over
	/// the position `target`'s removed ancestor occupied. If `promoted` is
	/// now the root, `new_root_widget` names its widget so the caller can
	/// attach it to the window after the transaction commits.
	Promoted { promoted: NodeId, new_root_widget: Option<WidgetId> },
}

pub struct CloseOutcome {
	pub result: CloseResult,
	pub transaction: WidgetTransaction,
	/// Widgets safe to destroy once `transaction` has committed: the
	/// target's own widget, plus (for the general/root cases) the removed
	/// parent branch's divider, plus (for a stack shrinking to one pane) the
	/// stack's box and the remaining pane's title bar.
	pub widgets_to_destroy: Vec<WidgetId>,
}

pub fn close(tree: &mut WorkspaceTree, target: NodeId, transaction_id: u64) -> WorkspaceResult<CloseOutcome> {
	let node = tree.node(target).ok_or_else(|| WorkspaceError::invalid_target(Some(target), "unknown node"))?;
	if !node.kind.is_leaf() {
		return Err(WorkspaceError::invalid_target(Some(target), "close target must be a leaf"));
	}

	if tree.leaf_count() <= 1 && tree.root() == Some(target) {
		let widget = node.kind.container();
		let mut txn = WidgetTransaction::new(transaction_id);
		txn.add(WidgetOperation::unparent(widget));
		return Ok(CloseOutcome { result: CloseResult::QuitWorkspace, transaction: txn, widgets_to_destroy: vec![widget] });
	}

	let in_stack = matches!(node.parent.and_then(|p| tree.node(p)).map(|p| &p.kind), Some(PaneKind::Stack(_)));
	if in_stack {
		return stack::close_from_stack(tree, target, transaction_id);
	}

	close_general(tree, target, transaction_id)
}

/// Target is a plain leaf whose parent is a split branch. Promotes the
/// sibling into the grandparent's slot (§4.2 case 4), or, if the parent is
/// itself the root, promotes the sibling to root directly (§4.2 case 3) —
/// the same operation, the only difference being whether a grandparent
/// exists to splice into.
fn close_general(tree: &mut WorkspaceTree, target: NodeId, transaction_id: u64) -> WorkspaceResult<CloseOutcome> {
	let parent_id = tree.node(target).unwrap().parent.ok_or_else(|| WorkspaceError::invalid_target(Some(target), "target has no parent to promote a sibling into"))?;
	let parent_split = tree.node(parent_id).unwrap().kind.as_split().cloned().ok_or_else(|| WorkspaceError::invalid_target(Some(target), "target's parent is not a split branch"))?;
	let sibling = if parent_split.left == target { parent_split.right } else { parent_split.left };
	let sibling_widget = tree.node(sibling).unwrap().kind.container();
	let parent_widget = parent_split.container;
	let target_widget = tree.node(target).unwrap().kind.container();

	let grandparent = tree.node(parent_id).unwrap().parent;
	let mut txn = WidgetTransaction::new(transaction_id);
	let mut new_root_widget = None;

	match grandparent {
		Some(grandparent_id) => {
			let grandparent_divider = tree.node(grandparent_id).unwrap().kind.container();
			let sibling_is_start = tree.node(grandparent_id).unwrap().kind.as_split().is_some_and(|s| s.left == parent_id);
			tree.set_child_slot(grandparent_id, parent_id, sibling);
			if let Some(n) = tree.node_mut(sibling) {
				n.parent = Some(grandparent_id);
			}
			txn.add(WidgetOperation::reparent(grandparent_divider, sibling_widget, sibling_is_start).with_priority(10));
		}
		None => {
			txn.add(WidgetOperation::unparent(sibling_widget).with_priority(10));
			tree.replace_root(sibling);
			new_root_widget = Some(sibling_widget);
		}
	}

	tree.destroy(target);
	tree.destroy(parent_id);

	Ok(CloseOutcome {
		result: CloseResult::Promoted { promoted: sibling, new_root_widget },
		transaction: txn,
		widgets_to_destroy: vec![target_widget, parent_widget],
	})
}
