//! Tree rebalancer (C7, §4.7). Only ever invoked after a close promotion;
//! never after split, since the toolkit's own layout handles sizing there.
//!
//! The original AVL-style rotation logic is intentionally not implemented:
//! §4.7 notes it is disabled in production, and §9 Open Question (c) leaves
//! rotation as an optional feature-gated extra this crate does not guess at.

use loom_toolkit::{ToolkitGateway, WidgetId};

use crate::tree::{NodeId, WorkspaceTree};

/// Outcome of a single rebalance attempt against a promoted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceOutcome {
	/// The promoted widget already has a non-trivial allocation.
	Settled,
	/// The allocation is still zero; caller should retry after pumping the
	/// idle loop, up to `rebalance_max_idle_retries` times.
	Pending,
}

/// Ensures the widget that was promoted into a new tree slot (after a close)
/// gets the layout attributes and allocation refresh it needs: expand flags,
/// no stale fixed-size request, and a queued re-allocate for itself and every
/// ancestor up to the root.
pub fn rebalance_after_close(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, promoted: NodeId) -> RebalanceOutcome {
	let Some(node) = tree.node(promoted) else {
		tracing::warn!(?promoted, "rebalance target no longer present");
		return RebalanceOutcome::Settled;
	};
	let widget = node.kind.container();

	let _ = gateway.set_expand(widget, true, true);
	let _ = gateway.set_size_request(widget, None);
	queue_allocate_chain(tree, gateway, promoted);

	match gateway.allocation(widget) {
		Ok(alloc) if !alloc.is_zero() => RebalanceOutcome::Settled,
		_ => RebalanceOutcome::Pending,
	}
}

/// Queues an allocation pass on `node` and every ancestor up to the root,
/// deduplicated by widget identity (an ancestor's widget may repeat if the
/// tree is shallow, e.g. `node` is the new root itself).
fn queue_allocate_chain(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, node: NodeId) {
	let mut seen: Vec<WidgetId> = Vec::new();
	let mut queue_one = |id: NodeId| {
		if let Some(n) = tree.node(id) {
			let widget = n.kind.container();
			if !seen.contains(&widget) {
				seen.push(widget);
				let _ = gateway.queue_allocate(widget);
			}
		}
	};
	queue_one(node);
	for ancestor in tree.ancestors(node) {
		queue_one(ancestor);
	}
}

/// Retry driver for the case where [`rebalance_after_close`] reports
/// [`RebalanceOutcome::Pending`]. Runs up to `max_retries` idle cycles,
/// re-checking the allocation between each one, giving up with a diagnostic
/// log rather than erroring (the operation itself already succeeded).
pub fn retry_until_settled(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, promoted: NodeId, max_retries: u32) {
	for attempt in 0..max_retries {
		if rebalance_after_close(tree, gateway, promoted) == RebalanceOutcome::Settled {
			return;
		}
		gateway.iterate_main_loop_step();
		tracing::debug!(?promoted, attempt, "rebalance allocation still zero, retrying");
	}
	tracing::warn!(?promoted, max_retries, "gave up waiting for promoted widget to receive a non-trivial allocation");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::{PaneKind, WebViewId};
	use loom_toolkit::mock::MockGateway;
	use loom_toolkit::{Allocation, Orientation};

	#[test]
	fn settled_when_allocation_non_zero() {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let widget = gateway.create_box(Orientation::Horizontal);
		gateway.set_allocation(widget, Allocation { x: 0, y: 0, width: 400, height: 300 });
		let tree = WorkspaceTree::new(root_container, WebViewId(0), widget, 50);
		let root = tree.root().unwrap();
		assert!(matches!(tree.node(root).unwrap().kind, PaneKind::Leaf(_)));
		assert_eq!(rebalance_after_close(&tree, &gateway, root), RebalanceOutcome::Settled);
	}

	#[test]
	fn pending_when_allocation_still_zero() {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), widget, 50);
		let root = tree.root().unwrap();
		assert_eq!(rebalance_after_close(&tree, &gateway, root), RebalanceOutcome::Pending);
	}
}
