//! `Split(target, direction)` (§4.2).

use loom_toolkit::ToolkitGateway;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::transaction::{WidgetOperation, WidgetTransaction};
use crate::tree::{Direction, LeafState, NodeId, PaneFactory, PaneKind, SplitState, WorkspaceTree};

pub struct SplitOutcome {
	pub new_leaf: NodeId,
	pub transaction: WidgetTransaction,
	/// `Some` iff the split replaced the root; the caller must attach this
	/// widget to the window only after the transaction commits.
	pub new_root_widget: Option<loom_toolkit::WidgetId>,
}

/// Resolves the actual node a split operates on: `target` itself, unless it
/// is a leaf living inside a stack, in which case the split wraps the
/// enclosing stack container instead.
fn resolve_split_target(tree: &WorkspaceTree, target: NodeId) -> WorkspaceResult<NodeId> {
	let node = tree.node(target).ok_or_else(|| WorkspaceError::invalid_target(Some(target), "unknown node"))?;
	if !node.kind.is_leaf() {
		return Err(WorkspaceError::invalid_target(Some(target), "split target must be a leaf"));
	}
	match node.parent.and_then(|p| tree.node(p)) {
		Some(parent) if matches!(parent.kind, PaneKind::Stack(_)) => Ok(node.parent.unwrap()),
		_ => Ok(target),
	}
}

/// Mutates `tree` into its post-split shape and assembles (but does not
/// execute) the widget transaction that realizes it. On transaction
/// failure, the caller is responsible for restoring the tree from a
/// pre-call [`crate::tree::Tombstone`]; this function does not self-revert.
pub fn split(tree: &mut WorkspaceTree, gateway: &dyn ToolkitGateway, factory: &dyn PaneFactory, target: NodeId, direction: Direction, transaction_id: u64) -> WorkspaceResult<SplitOutcome> {
	let split_target = resolve_split_target(tree, target)?;
	let old_parent = tree.node(split_target).unwrap().parent;
	let split_target_container = tree.node(split_target).unwrap().kind.container();

	let (webview, new_widget) = factory.create_pane();
	let orientation = direction.orientation();
	let divider = gateway.create_paned(orientation);

	let new_leaf = tree.alloc(None, PaneKind::Leaf(LeafState::new(webview, new_widget)));
	let (left, right) = if direction.existing_is_start() { (split_target, new_leaf) } else { (new_leaf, split_target) };
	let branch = tree.alloc(old_parent, PaneKind::Split(SplitState { orientation, left, right, container: divider }));
	if let Some(n) = tree.node_mut(split_target) {
		n.parent = Some(branch);
	}
	if let Some(n) = tree.node_mut(new_leaf) {
		n.parent = Some(branch);
	}

	let mut new_root_widget = None;
	match old_parent {
		Some(grandparent) => tree.set_child_slot(grandparent, split_target, branch),
		None => {
			tree.replace_root(branch);
			new_root_widget = Some(divider);
		}
	}

	let mut txn = WidgetTransaction::new(transaction_id);
	txn.add(WidgetOperation::reparent(divider, split_target_container, left == split_target).with_priority(20));
	txn.add(WidgetOperation::reparent(divider, new_widget, left == new_leaf).with_priority(20));
	if let Some(grandparent) = old_parent {
		let grandparent_divider = tree.node(grandparent).unwrap().kind.container();
		let branch_is_start = tree.node(grandparent).unwrap().kind.as_split().is_some_and(|s| s.left == branch);
		txn.add(WidgetOperation::reparent(grandparent_divider, divider, branch_is_start).with_priority(10));
	}

	Ok(SplitOutcome { new_leaf, transaction: txn, new_root_widget })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::WebViewId;
	use loom_toolkit::mock::MockGateway;
	use loom_toolkit::{Orientation, ToolkitGateway};
	use std::sync::atomic::{AtomicU64, Ordering};

	struct CountingFactory<'g> {
		gateway: &'g MockGateway,
		next: AtomicU64,
	}

	impl PaneFactory for CountingFactory<'_> {
		fn create_pane(&self) -> (WebViewId, loom_toolkit::WidgetId) {
			let id = self.next.fetch_add(1, Ordering::Relaxed);
			let widget = self.gateway.create_box(Orientation::Horizontal);
			(WebViewId(1000 + id), widget)
		}
	}

	fn fresh() -> (MockGateway, WorkspaceTree) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		gateway.set_allocation(root_widget, loom_toolkit::Allocation { x: 0, y: 0, width: 1200, height: 800 });
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		(gateway, tree)
	}

	#[test]
	fn horizontal_split_right_keeps_existing_as_left() {
		let (gateway, mut tree) = fresh();
		let factory = CountingFactory { gateway: &gateway, next: AtomicU64::new(0) };
		let root = tree.root().unwrap();
		let mut outcome = split(&mut tree, &gateway, &factory, root, Direction::Right, 1).unwrap();
		let result = outcome.transaction.execute(&gateway);
		assert!(result.committed);
		let new_root = tree.root().unwrap();
		let branch = tree.node(new_root).unwrap().kind.as_split().unwrap();
		assert_eq!(branch.left, root);
		assert_eq!(branch.right, outcome.new_leaf);
		assert_eq!(branch.orientation, Orientation::Horizontal);
	}

	#[test]
	fn downward_split_is_existing_first_vertical() {
		let (gateway, mut tree) = fresh();
		let factory = CountingFactory { gateway: &gateway, next: AtomicU64::new(0) };
		let root = tree.root().unwrap();
		let mut outcome = split(&mut tree, &gateway, &factory, root, Direction::Down, 1).unwrap();
		outcome.transaction.execute(&gateway);
		let new_root = tree.root().unwrap();
		let branch = tree.node(new_root).unwrap().kind.as_split().unwrap();
		assert_eq!(branch.left, root);
		assert_eq!(branch.right, outcome.new_leaf);
		assert_eq!(branch.orientation, Orientation::Vertical);
	}

	#[test]
	fn left_split_puts_new_pane_first() {
		let (gateway, mut tree) = fresh();
		let factory = CountingFactory { gateway: &gateway, next: AtomicU64::new(0) };
		let root = tree.root().unwrap();
		let mut outcome = split(&mut tree, &gateway, &factory, root, Direction::Left, 1).unwrap();
		outcome.transaction.execute(&gateway);
		let new_root = tree.root().unwrap();
		let branch = tree.node(new_root).unwrap().kind.as_split().unwrap();
		assert_eq!(branch.left, outcome.new_leaf);
		assert_eq!(branch.right, root);
	}
}
