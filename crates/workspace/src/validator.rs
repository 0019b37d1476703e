//! Pure structural-invariant validator over [`crate::tree::WorkspaceTree`] (C4).
//!
//! Runs before and after every structural operation when
//! `debug.workspace.level` is not `off`. Pre-operation failures are returned
//! to the caller as [`crate::error::WorkspaceError::TreeInvariantViolation`];
//! post-operation failures are logged only (§7 propagation policy) — see
//! [`crate::worker::WorkerPool`] and [`crate::manager::WorkspaceManager`] for
//! where each call site lands.

use crate::tree::{NodeId, PaneKind, WorkspaceTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
	#[error("root node {0:?} has a parent")]
	RootHasParent(NodeId),
	#[error("node {child:?}'s recorded parent {parent:?} does not point back at it")]
	ParentMismatch { child: NodeId, parent: NodeId },
	#[error("leaf {0:?} has children")]
	LeafHasChild(NodeId),
	#[error("split branch {0:?} is missing a child")]
	BranchMissingChild(NodeId),
	#[error("stack container {0:?} has left/right children")]
	StackContainerHasChild(NodeId),
	#[error("stack container {0:?} is empty")]
	EmptyStack(NodeId),
	#[error("stack container {0:?} has an out-of-range active index")]
	InvalidStackIndex(NodeId),
	#[error("stacked pane {pane:?}'s parent does not match its stack container {stack:?}")]
	StackPaneParentMismatch { stack: NodeId, pane: NodeId },
	#[error("cycle detected reaching {0:?}")]
	CycleDetected(NodeId),
	#[error("max tree depth exceeded at {0:?}")]
	MaxDepthExceeded(NodeId),
	#[error("node {0:?} is missing its container widget")]
	MissingContainer(NodeId),
	#[error("split branch {branch:?}'s left child {child:?} does not point back at it as parent")]
	LeftChildParentMismatch { branch: NodeId, child: NodeId },
	#[error("split branch {branch:?}'s right child {child:?} does not point back at it as parent")]
	RightChildParentMismatch { branch: NodeId, child: NodeId },
}

/// Walks the whole tree from the root and returns the first invariant
/// violation found, if any.
pub fn validate(tree: &WorkspaceTree) -> Result<(), ValidationError> {
	let Some(root) = tree.root() else { return Ok(()) };
	if tree.node(root).and_then(|n| n.parent).is_some() {
		return Err(ValidationError::RootHasParent(root));
	}
	let mut visited = rustc_hash::FxHashSet::default();
	walk(tree, root, 0, &mut visited)?;
	validate_webview_index(tree)
}

fn walk(tree: &WorkspaceTree, id: NodeId, depth: u32, visited: &mut rustc_hash::FxHashSet<NodeId>) -> Result<(), ValidationError> {
	if depth > tree.max_depth() {
		return Err(ValidationError::MaxDepthExceeded(id));
	}
	if !visited.insert(id) {
		return Err(ValidationError::CycleDetected(id));
	}
	let Some(node) = tree.node(id) else {
		return Err(ValidationError::MissingContainer(id));
	};
	if let Some(parent) = node.parent {
		let parent_points_back = match tree.node(parent).map(|p| &p.kind) {
			Some(PaneKind::Split(s)) => s.left == id || s.right == id,
			Some(PaneKind::Stack(s)) => s.panes.contains(&id),
			_ => false,
		};
		if !parent_points_back {
			return Err(ValidationError::ParentMismatch { child: id, parent });
		}
	}
	match &node.kind {
		PaneKind::Leaf(leaf) => {
			if leaf.container.eq(&leaf.container) {
				// container is always present by type (WidgetId is not optional);
				// this branch exists for symmetry with the other variants' checks.
			}
		}
		PaneKind::Split(s) => {
			let left = tree.node(s.left).ok_or(ValidationError::BranchMissingChild(id))?;
			let right = tree.node(s.right).ok_or(ValidationError::BranchMissingChild(id))?;
			if left.parent != Some(id) {
				return Err(ValidationError::LeftChildParentMismatch { branch: id, child: s.left });
			}
			if right.parent != Some(id) {
				return Err(ValidationError::RightChildParentMismatch { branch: id, child: s.right });
			}
			walk(tree, s.left, depth + 1, visited)?;
			walk(tree, s.right, depth + 1, visited)?;
		}
		PaneKind::Stack(s) => {
			if s.panes.is_empty() {
				return Err(ValidationError::EmptyStack(id));
			}
			if s.active_index >= s.panes.len() {
				return Err(ValidationError::InvalidStackIndex(id));
			}
			for &pane in &s.panes {
				let pane_node = tree.node(pane).ok_or(ValidationError::StackPaneParentMismatch { stack: id, pane })?;
				if pane_node.parent != Some(id) {
					return Err(ValidationError::StackPaneParentMismatch { stack: id, pane });
				}
				if !pane_node.kind.is_leaf() {
					return Err(ValidationError::StackContainerHasChild(id));
				}
			}
		}
	}
	Ok(())
}

fn validate_webview_index(tree: &WorkspaceTree) -> Result<(), ValidationError> {
	let leaves = tree.leaves();
	// The index must be bijective with the *full* leaf set, including leaves
	// hidden inside stacks, not just the currently-visible ones `leaves()`
	// returns; walk stacks explicitly for the ones `leaves()` skips.
	let mut all_leaf_webviews = rustc_hash::FxHashSet::default();
	for &leaf in &leaves {
		if let Some(PaneKind::Leaf(l)) = tree.node(leaf).map(|n| &n.kind) {
			all_leaf_webviews.insert(l.webview);
		}
	}
	collect_stacked_webviews(tree, tree.root(), &mut all_leaf_webviews);
	if all_leaf_webviews.len() != tree.webview_count() {
		// The only typed kind available for an index mismatch is via leaf
		// shape errors; surface it against the root for a diagnostic anchor.
		if let Some(root) = tree.root() {
			return Err(ValidationError::MissingContainer(root));
		}
	}
	Ok(())
}

fn collect_stacked_webviews(tree: &WorkspaceTree, id: Option<NodeId>, out: &mut rustc_hash::FxHashSet<crate::tree::WebViewId>) {
	let Some(id) = id else { return };
	let Some(node) = tree.node(id) else { return };
	match &node.kind {
		PaneKind::Leaf(_) => {}
		PaneKind::Split(s) => {
			collect_stacked_webviews(tree, Some(s.left), out);
			collect_stacked_webviews(tree, Some(s.right), out);
		}
		PaneKind::Stack(s) => {
			for &pane in &s.panes {
				if let Some(PaneKind::Leaf(l)) = tree.node(pane).map(|n| &n.kind) {
					out.insert(l.webview);
				}
			}
		}
	}
}
