//! `FocusNeighbor(direction)` (§4.2): stack wrap-around, a structural
//! ancestor walk, and a geometric fallback scan.

use loom_toolkit::ToolkitGateway;

use crate::tree::{Direction, NodeId, PaneKind, WorkspaceTree};

#[derive(Debug, Clone, Copy)]
struct Center {
	x: f64,
	y: f64,
}

fn center_of(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, leaf: NodeId) -> Option<Center> {
	let widget = tree.node(leaf)?.kind.container();
	let alloc = gateway.allocation(widget).ok()?;
	Some(Center { x: alloc.x as f64 + alloc.width as f64 / 2.0, y: alloc.y as f64 + alloc.height as f64 / 2.0 })
}

/// Outcome of a navigation attempt.
pub struct NavigateOutcome {
	pub moved: bool,
	pub new_active: Option<NodeId>,
}

pub fn focus_neighbor(tree: &mut WorkspaceTree, gateway: &dyn ToolkitGateway, active: NodeId, direction: Direction) -> NavigateOutcome {
	if direction.is_vertical_nav() {
		if let Some(outcome) = try_stack_wrap(tree, active, direction) {
			return outcome;
		}
	}
	if let Some(target) = structural_neighbor(tree, gateway, active, direction) {
		return NavigateOutcome { moved: true, new_active: Some(target) };
	}
	if let Some(target) = geometric_fallback(tree, gateway, active, direction) {
		return NavigateOutcome { moved: true, new_active: Some(target) };
	}
	NavigateOutcome { moved: false, new_active: None }
}

fn try_stack_wrap(tree: &mut WorkspaceTree, active: NodeId, direction: Direction) -> Option<NavigateOutcome> {
	let container_id = tree.node(active)?.parent?;
	let stack = tree.node(container_id)?.kind.as_stack()?;
	if stack.panes.len() <= 1 {
		return None;
	}
	let len = stack.panes.len() as isize;
	let cur = stack.active_index as isize;
	let delta = if direction == Direction::Up { -1 } else { 1 };
	let new_index = (cur + delta).rem_euclid(len) as usize;
	let new_active = tree.node(container_id)?.kind.as_stack()?.panes[new_index];
	if let PaneKind::Stack(s) = &mut tree.node_mut(container_id)?.kind {
		s.active_index = new_index;
	}
	Some(NavigateOutcome { moved: true, new_active: Some(new_active) })
}

/// Walks up from `active` (or its enclosing stack container) looking for a
/// split ancestor whose orientation matches `direction` and whose
/// active-side-to-target relationship allows crossing into the sibling.
fn structural_neighbor(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, active: NodeId, direction: Direction) -> Option<NodeId> {
	let start = match tree.node(active)?.parent.and_then(|p| tree.node(p)) {
		Some(p) if matches!(p.kind, PaneKind::Stack(_)) => tree.node(active)?.parent?,
		_ => active,
	};
	let forward = matches!(direction, Direction::Right | Direction::Down);
	let origin_center = center_of(tree, gateway, active)?;

	let mut current = start;
	let mut depth = 0;
	while let Some(parent) = tree.node(current)?.parent {
		depth += 1;
		if depth > tree.max_depth() {
			break;
		}
		let Some(split) = tree.node(parent)?.kind.as_split() else {
			current = parent;
			continue;
		};
		if split.orientation != direction.orientation() {
			current = parent;
			continue;
		}
		let on_left = split.left == current;
		let qualifies = (on_left && forward) || (!on_left && !forward);
		if !qualifies {
			current = parent;
			continue;
		}
		let other_side = if on_left { split.right } else { split.left };
		return closest_leaf_in_subtree(tree, gateway, other_side, origin_center, direction);
	}
	None
}

fn closest_leaf_in_subtree(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, subtree: NodeId, origin: Center, direction: Direction) -> Option<NodeId> {
	let leaves = leaves_under(tree, subtree);
	leaves
		.into_iter()
		.filter_map(|leaf| center_of(tree, gateway, leaf).map(|c| (leaf, score(origin, c, direction))))
		.min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
		.map(|(leaf, _)| leaf)
}

fn leaves_under(tree: &WorkspaceTree, id: NodeId) -> Vec<NodeId> {
	let mut out = Vec::new();
	collect(tree, id, 0, &mut out);
	out
}

fn collect(tree: &WorkspaceTree, id: NodeId, depth: u32, out: &mut Vec<NodeId>) {
	if depth > tree.max_depth() {
		return;
	}
	let Some(node) = tree.node(id) else { return };
	match &node.kind {
		PaneKind::Leaf(_) => out.push(id),
		PaneKind::Split(s) => {
			collect(tree, s.left, depth + 1, out);
			collect(tree, s.right, depth + 1, out);
		}
		PaneKind::Stack(s) => {
			if let Some(active) = s.active_pane() {
				out.push(active);
			}
		}
	}
}

const FOCUS_EPSILON: f64 = 1e-3;

fn score(origin: Center, candidate: Center, direction: Direction) -> f64 {
	let (primary_delta, secondary_delta) = match direction {
		Direction::Left | Direction::Right => (candidate.x - origin.x, candidate.y - origin.y),
		Direction::Up | Direction::Down => (candidate.y - origin.y, candidate.x - origin.x),
	};
	primary_delta.abs() * 1000.0 + secondary_delta.abs()
}

fn in_half_plane(origin: Center, candidate: Center, direction: Direction) -> bool {
	match direction {
		Direction::Right => candidate.x - origin.x > FOCUS_EPSILON,
		Direction::Left => origin.x - candidate.x > FOCUS_EPSILON,
		Direction::Down => candidate.y - origin.y > FOCUS_EPSILON,
		Direction::Up => origin.y - candidate.y > FOCUS_EPSILON,
	}
}

fn geometric_fallback(tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, active: NodeId, direction: Direction) -> Option<NodeId> {
	let origin = center_of(tree, gateway, active)?;
	tree.leaves()
		.into_iter()
		.filter(|&leaf| leaf != active)
		.filter_map(|leaf| center_of(tree, gateway, leaf).map(|c| (leaf, c)))
		.filter(|(_, c)| in_half_plane(origin, *c, direction))
		.map(|(leaf, c)| (leaf, score(origin, c, direction)))
		.min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
		.map(|(leaf, _)| leaf)
}
