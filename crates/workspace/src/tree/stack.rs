//! `Stack(target)` (§4.2) and closing a pane that lives inside a stack (C9, §4.9).

use loom_toolkit::{Orientation, ToolkitGateway, WidgetId};

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::tree::close::{CloseOutcome, CloseResult};
use crate::transaction::{WidgetOperation, WidgetTransaction};
use crate::tree::{LeafState, NodeId, PaneFactory, PaneKind, StackState, WorkspaceTree};

pub struct StackOutcome {
	pub new_leaf: NodeId,
	pub transaction: WidgetTransaction,
	/// `Some` iff stacking replaced the root (the target was the workspace's
	/// only pane); the caller must attach this widget to the window only
	/// after the transaction commits, same contract as [`crate::tree::split::SplitOutcome::new_root_widget`].
	pub new_root_widget: Option<WidgetId>,
}

/// Resolves the stack container `target` should be appended to: `target`'s
/// own container if it is already a stack pane, otherwise a brand new
/// container wrapping `target`.
pub fn stack(tree: &mut WorkspaceTree, gateway: &dyn ToolkitGateway, factory: &dyn PaneFactory, target: NodeId, transaction_id: u64) -> WorkspaceResult<StackOutcome> {
	let node = tree.node(target).ok_or_else(|| WorkspaceError::invalid_target(Some(target), "unknown node"))?;
	if !node.kind.is_leaf() {
		return Err(WorkspaceError::invalid_target(Some(target), "stack target must be a leaf"));
	}

	let already_in_stack = matches!(node.parent.and_then(|p| tree.node(p)).map(|p| &p.kind), Some(PaneKind::Stack(_)));

	let (webview, new_widget) = factory.create_pane();
	let title_bar = gateway.create_box(Orientation::Horizontal);

	let mut txn = WidgetTransaction::new(transaction_id);

	let mut new_root_widget = None;
	let (container_id, new_leaf) = if already_in_stack {
		let container_id = tree.node(target).unwrap().parent.unwrap();
		let new_leaf = tree.alloc(Some(container_id), PaneKind::Leaf({
			let mut l = LeafState::new(webview, new_widget);
			l.title_bar = Some(title_bar);
			l
		}));
		let container_widget = if let PaneKind::Stack(s) = &mut tree.node_mut(container_id).unwrap().kind {
			s.panes.push(new_leaf);
			s.active_index = s.panes.len() - 1;
			s.container
		} else {
			unreachable!("already_in_stack guarantees a Stack parent")
		};
		gateway.box_append(container_widget, title_bar).ok();
		(container_id, new_leaf)
	} else {
		let old_parent = node.parent;
		let target_widget = node.kind.container();
		let stack_box = gateway.create_box(Orientation::Vertical);
		let old_title_bar = gateway.create_box(Orientation::Horizontal);

		let container_id = tree.alloc(old_parent, PaneKind::Stack(StackState { panes: Vec::new(), active_index: 0, container: stack_box }));
		if let Some(n) = tree.node_mut(target) {
			n.parent = Some(container_id);
			if let PaneKind::Leaf(l) = &mut n.kind {
				l.title_bar = Some(old_title_bar);
			}
		}
		let new_leaf = tree.alloc(Some(container_id), PaneKind::Leaf({
			let mut l = LeafState::new(webview, new_widget);
			l.title_bar = Some(title_bar);
			l
		}));
		if let PaneKind::Stack(s) = &mut tree.node_mut(container_id).unwrap().kind {
			s.panes = vec![target, new_leaf];
			s.active_index = 1;
		}

		match old_parent {
			Some(p) => {
				tree.set_child_slot(p, target, container_id);
				let p_divider = tree.node(p).unwrap().kind.container();
				let start = tree.node(p).unwrap().kind.as_split().is_some_and(|s| s.left == container_id);
				txn.add(WidgetOperation::reparent(p_divider, stack_box, start).with_priority(10));
			}
			None => {
				tree.replace_root(container_id);
				tree.set_root_child_widget(Some(stack_box));
				new_root_widget = Some(stack_box);
			}
		}
		gateway.box_append(stack_box, old_title_bar).ok();
		gateway.box_append(stack_box, target_widget).ok();
		gateway.box_append(stack_box, title_bar).ok();
		(container_id, new_leaf)
	};

	gateway.box_append(container_id_widget(tree, container_id), new_widget).ok();
	apply_stack_visibility(tree, &mut txn, container_id);

	Ok(StackOutcome { new_leaf, transaction: txn, new_root_widget })
}

fn container_id_widget(tree: &WorkspaceTree, container_id: NodeId) -> WidgetId {
	tree.node(container_id).unwrap().kind.container()
}

/// Shows the active pane's content and hides the rest; shows every
/// non-active pane's title bar and hides the active pane's.
fn apply_stack_visibility(tree: &WorkspaceTree, txn: &mut WidgetTransaction, container_id: NodeId) {
	let Some(PaneKind::Stack(s)) = tree.node(container_id).map(|n| &n.kind) else { return };
	for (i, &pane) in s.panes.iter().enumerate() {
		let Some(PaneKind::Leaf(l)) = tree.node(pane).map(|n| &n.kind) else { continue };
		let active = i == s.active_index;
		txn.add(WidgetOperation::visibility(l.container, active).with_priority(5));
		if let Some(title_bar) = l.title_bar {
			txn.add(WidgetOperation::visibility(title_bar, !active).with_priority(5));
		}
	}
}

/// C9: validates and delegates the close of a pane living inside a stack.
pub fn close_from_stack(tree: &mut WorkspaceTree, target: NodeId, transaction_id: u64) -> WorkspaceResult<CloseOutcome> {
	let container_id = tree.node(target).unwrap().parent.ok_or_else(|| WorkspaceError::InvalidStackOperation { reason: "stacked pane has no parent" })?;
	{
		let Some(PaneKind::Stack(s)) = tree.node(container_id).map(|n| &n.kind) else {
			return Err(WorkspaceError::InvalidStackOperation { reason: "parent is not a stack container" });
		};
		if s.panes.is_empty() {
			return Err(WorkspaceError::InvalidStackOperation { reason: "stack is empty" });
		}
		if s.active_index >= s.panes.len() {
			return Err(WorkspaceError::InvalidStackOperation { reason: "active index out of range" });
		}
		for &pane in &s.panes {
			if tree.node(pane).and_then(|n| n.parent) != Some(container_id) {
				return Err(WorkspaceError::InvalidStackOperation { reason: "stacked pane parent mismatch" });
			}
		}
	}

	let target_widget = tree.node(target).unwrap().kind.container();
	let target_title_bar = tree.node(target).unwrap().kind.as_leaf().and_then(|l| l.title_bar);
	let mut txn = WidgetTransaction::new(transaction_id);

	{
		let PaneKind::Stack(s) = &mut tree.node_mut(container_id).unwrap().kind else { unreachable!() };
		let idx = s.panes.iter().position(|&p| p == target).expect("validated above");
		s.panes.remove(idx);
		if s.active_index > idx {
			s.active_index -= 1;
		} else if s.active_index >= s.panes.len() && !s.panes.is_empty() {
			s.active_index = s.panes.len() - 1;
		}
	}

	txn.add(WidgetOperation::unparent(target_widget).with_priority(20));
	if let Some(tb) = target_title_bar {
		txn.add(WidgetOperation::unparent(tb).with_priority(20));
	}

	let remaining = tree.node(container_id).unwrap().kind.as_stack().unwrap().panes.clone();
	let mut widgets_to_destroy = vec![target_widget];
	if let Some(tb) = target_title_bar {
		widgets_to_destroy.push(tb);
	}
	tree.destroy(target);

	if remaining.len() == 1 {
		let survivor = remaining[0];
		let stack_widget = tree.node(container_id).unwrap().kind.container();
		let survivor_widget = tree.node(survivor).unwrap().kind.container();
		let survivor_title_bar = tree.node(survivor).unwrap().kind.as_leaf().and_then(|l| l.title_bar);
		if let Some(tb) = survivor_title_bar {
			widgets_to_destroy.push(tb);
		}
		widgets_to_destroy.push(stack_widget);
		txn.add(WidgetOperation::unparent(survivor_widget).with_priority(20));
		if let Some(tb) = survivor_title_bar {
			txn.add(WidgetOperation::unparent(tb).with_priority(19));
		}
		if let Some(n) = tree.node_mut(survivor) {
			if let PaneKind::Leaf(l) = &mut n.kind {
				l.title_bar = None;
			}
		}

		let grandparent = tree.node(container_id).unwrap().parent;
		let mut new_root_widget = None;
		match grandparent {
			Some(gp) => {
				tree.set_child_slot(gp, container_id, survivor);
				let gp_divider = tree.node(gp).unwrap().kind.container();
				let start = tree.node(gp).unwrap().kind.as_split().is_some_and(|s| s.left == survivor);
				if let Some(n) = tree.node_mut(survivor) {
					n.parent = Some(gp);
				}
				txn.add(WidgetOperation::reparent(gp_divider, survivor_widget, start).with_priority(10));
			}
			None => {
				if let Some(n) = tree.node_mut(survivor) {
					n.parent = None;
				}
				tree.replace_root(survivor);
				new_root_widget = Some(survivor_widget);
			}
		}
		tree.destroy(container_id);
		Ok(CloseOutcome { result: CloseResult::Promoted { promoted: survivor, new_root_widget }, transaction: txn, widgets_to_destroy })
	} else {
		apply_stack_visibility(tree, &mut txn, container_id);
		let active = tree.node(container_id).unwrap().kind.as_stack().unwrap().active_pane().unwrap();
		Ok(CloseOutcome { result: CloseResult::Promoted { promoted: active, new_root_widget: None }, transaction: txn, widgets_to_destroy })
	}
}
