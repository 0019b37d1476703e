//! Guarded tree snapshots for post-mortem logs (C10, §4.10 and the
//! "Supplemental surface" expansion).
//!
//! Unlike [`crate::validator`], this module never fails: a cycle or an
//! over-depth subtree is truncated in the snapshot rather than rejected,
//! since the whole point of a diagnostic dump is to describe whatever state
//! the tree is actually in, including a broken one.

use crate::tree::{NodeId, PaneKind, WebViewId, WorkspaceTree};

/// One node of a [`Diagnostics::snapshot`] dump. Deliberately `serde_json`-free
/// (§5 "Supplemental surface"): a plain owned tree a caller can `Debug`-print,
/// walk, or convert on the spot, with no serialization format imposed here.
#[derive(Debug, Clone)]
pub struct DiagnosticNode {
	pub id: NodeId,
	pub generation: u64,
	pub kind: DiagnosticKind,
	pub children: Vec<DiagnosticNode>,
}

#[derive(Debug, Clone)]
pub enum DiagnosticKind {
	Leaf { webview: WebViewId, in_stack: bool },
	Split { orientation: loom_toolkit::Orientation },
	Stack { active_index: usize, pane_count: usize },
	/// Emitted in place of descending further once the depth guard trips or a
	/// node is revisited, instead of aborting the whole snapshot.
	Truncated { reason: &'static str },
}

/// Depth ceiling applied independent of `WorkspaceTree::max_depth`, so a
/// snapshot never produces an unbounded dump even if the tree's own depth
/// guard were somehow bypassed.
const SNAPSHOT_DEPTH_GUARD: u32 = 256;

pub struct Diagnostics;

impl Diagnostics {
	/// Walks the tree from the root and returns a full snapshot, or `None` if
	/// the tree is empty. Gated at the call site by `debug.pane-close`
	/// (`WorkspaceConfig::debug_pane_close`); this function itself has no
	/// opinion on whether it should run.
	pub fn snapshot(tree: &WorkspaceTree) -> Option<DiagnosticNode> {
		let root = tree.root()?;
		let mut visited = rustc_hash::FxHashSet::default();
		Some(walk(tree, root, 0, &mut visited))
	}

	/// Renders a snapshot as an indented text tree, the shape a post-mortem
	/// log line actually wants rather than a formatted `Debug` dump.
	pub fn render(node: &DiagnosticNode) -> String {
		let mut out = String::new();
		render_into(node, 0, &mut out);
		out
	}
}

fn walk(tree: &WorkspaceTree, id: NodeId, depth: u32, visited: &mut rustc_hash::FxHashSet<NodeId>) -> DiagnosticNode {
	let generation = tree.generation_of(id).unwrap_or(0);
	if depth > SNAPSHOT_DEPTH_GUARD {
		return DiagnosticNode { id, generation, kind: DiagnosticKind::Truncated { reason: "depth guard exceeded" }, children: Vec::new() };
	}
	if !visited.insert(id) {
		return DiagnosticNode { id, generation, kind: DiagnosticKind::Truncated { reason: "cycle detected" }, children: Vec::new() };
	}
	let Some(node) = tree.node(id) else {
		return DiagnosticNode { id, generation, kind: DiagnosticKind::Truncated { reason: "node missing from arena" }, children: Vec::new() };
	};
	match &node.kind {
		PaneKind::Leaf(leaf) => {
			let in_stack = node.parent.and_then(|p| tree.node(p)).is_some_and(|p| matches!(p.kind, PaneKind::Stack(_)));
			DiagnosticNode { id, generation, kind: DiagnosticKind::Leaf { webview: leaf.webview, in_stack }, children: Vec::new() }
		}
		PaneKind::Split(s) => {
			let children = vec![walk(tree, s.left, depth + 1, visited), walk(tree, s.right, depth + 1, visited)];
			DiagnosticNode { id, generation, kind: DiagnosticKind::Split { orientation: s.orientation }, children }
		}
		PaneKind::Stack(s) => {
			let children = s.panes.iter().map(|&pane| walk(tree, pane, depth + 1, visited)).collect();
			DiagnosticNode { id, generation, kind: DiagnosticKind::Stack { active_index: s.active_index, pane_count: s.panes.len() }, children }
		}
	}
}

fn render_into(node: &DiagnosticNode, depth: u32, out: &mut String) {
	for _ in 0..depth {
		out.push_str("  ");
	}
	match &node.kind {
		DiagnosticKind::Leaf { webview, in_stack } => {
			out.push_str(&format!("leaf {:?} webview={:?} in_stack={}\n", node.id, webview, in_stack));
		}
		DiagnosticKind::Split { orientation } => {
			out.push_str(&format!("split {:?} orientation={:?}\n", node.id, orientation));
		}
		DiagnosticKind::Stack { active_index, pane_count } => {
			out.push_str(&format!("stack {:?} active={} panes={}\n", node.id, active_index, pane_count));
		}
		DiagnosticKind::Truncated { reason } => {
			out.push_str(&format!("truncated {:?} reason={}\n", node.id, reason));
		}
	}
	for child in &node.children {
		render_into(child, depth + 1, out);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::WorkspaceTree;
	use loom_toolkit::{mock::MockGateway, Orientation, ToolkitGateway};

	#[test]
	fn single_leaf_tree_snapshots_as_one_leaf_node() {
		let gateway = MockGateway::new_on_current_thread();
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_widget, WebViewId(0), root_widget, 50);
		let snapshot = Diagnostics::snapshot(&tree).unwrap();
		assert!(matches!(snapshot.kind, DiagnosticKind::Leaf { in_stack: false, .. }));
		assert!(snapshot.children.is_empty());
	}

	#[test]
	fn empty_tree_has_no_snapshot() {
		let gateway = MockGateway::new_on_current_thread();
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let mut tree = WorkspaceTree::new(root_widget, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();
		tree.destroy(root);
		assert!(Diagnostics::snapshot(&tree).is_none());
	}

	#[test]
	fn render_produces_one_line_per_node() {
		let gateway = MockGateway::new_on_current_thread();
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_widget, WebViewId(0), root_widget, 50);
		let snapshot = Diagnostics::snapshot(&tree).unwrap();
		let rendered = Diagnostics::render(&snapshot);
		assert_eq!(rendered.lines().count(), 1);
	}
}
