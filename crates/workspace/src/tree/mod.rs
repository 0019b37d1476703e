//! In-memory binary tree of panes and the arena that owns it (C2).
//!
//! # Purpose
//!
//! - Owns: [`PaneNode`] storage in a [`slab::Slab`] keyed by [`NodeId`], the
//!   root and "main pane" pointers, and the webview→node index.
//! - Does not own: widget lifetime (the toolkit does), geometry policy
//!   ([`crate::geometry`]), or structural-invariant enforcement
//!   ([`crate::validator`] runs *over* this module's data).
//!
//! # Key types
//!
//! | Type | Role |
//! |---|---|
//! | [`NodeId`] | arena handle; stable for a node's lifetime, never reused while the node is live |
//! | [`PaneKind`] | tagged variant replacing the source's `isLeaf`/`isStacked` flags |
//! | [`WorkspaceTree`] | the arena plus root/main-pane/index bookkeeping |
//!
//! # Invariants
//!
//! See §3.2's invariant list; enforced by [`crate::validator`]
//! and by construction in [`split`], [`close`], and [`stack`]. A node's
//! `generation` is a value from a single globally monotonic counter
//! ([`WorkspaceTree::next_generation`]) rather than a per-slot counter, so an
//! asynchronous callback that captured `(NodeId, generation)` before a slot
//! was freed and reused can never alias onto the new occupant: the new
//! occupant always gets a strictly larger generation.
//!
//! # Data flow
//!
//! [`split`], [`close`], [`stack`], and [`navigate`] mutate the arena and
//! describe the required widget mutations as a [`crate::transaction::WidgetTransaction`].
//! They do not execute that transaction; the caller (typically
//! [`crate::worker::WorkerPool`] or [`crate::manager::WorkspaceManager`] on
//! the UI thread) executes it and is responsible for restoring a
//! [`Tombstone`] if execution fails partway.

pub mod close;
pub mod navigate;
pub mod split;
pub mod stack;

pub use loom_toolkit::Orientation;
use loom_toolkit::{ControllerId, WidgetId};
use rustc_hash::FxHashMap;
use slab::Slab;
use std::time::Instant;

/// Out-of-scope collaborator (§1: "web-content rendering... referenced only
/// by interface") that hands back a freshly created browser pane when a
/// structural operation needs one.
pub trait PaneFactory: Send + Sync {
	/// Creates a new webview-backed pane, returning its identity and the
	/// widget that is its content root.
	fn create_pane(&self) -> (WebViewId, WidgetId);
}

/// Opaque identity of a webview-backed browser pane, assigned by the
/// out-of-scope content-rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebViewId(pub u64);

/// Arena handle to a [`PaneNode`]. Stable for the node's lifetime; never
/// reused (in the sense of aliasing) while the node it names is still valid,
/// because validity is always checked together with [`PaneNode::generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Direction of a split or a focus-navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Left,
	Right,
	Up,
	Down,
}

impl Direction {
	/// Left/Right divide width (horizontal divider); Up/Down divide height.
	pub fn orientation(self) -> Orientation {
		match self {
			Direction::Left | Direction::Right => Orientation::Horizontal,
			Direction::Up | Direction::Down => Orientation::Vertical,
		}
	}

	/// Right/Down keep the existing pane first (start child); Left/Up put
	/// the new pane first.
	pub fn existing_is_start(self) -> bool {
		matches!(self, Direction::Right | Direction::Down)
	}

	pub fn is_vertical_nav(self) -> bool {
		matches!(self, Direction::Up | Direction::Down)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
	Tab,
	Popup,
}

/// A popup pane's loose, non-owning link back to the pane that opened it.
#[derive(Debug, Clone, Copy)]
pub struct PopupState {
	pub kind: WindowKind,
	/// Weak reference: not consulted for ownership or traversal, only to
	/// answer "who opened this popup".
	pub opener: Option<NodeId>,
}

/// State specific to a leaf pane: exactly one webview and its controllers.
#[derive(Debug, Clone)]
pub struct LeafState {
	pub webview: WebViewId,
	/// Equal to the webview's root widget.
	pub container: WidgetId,
	pub popup: Option<PopupState>,
	pub auto_close: bool,
	pub hover_controller: Option<ControllerId>,
	pub focus_controller: Option<ControllerId>,
	pub last_focus: Option<Instant>,
	/// `Some` iff this leaf currently lives inside a [`StackState`].
	pub title_bar: Option<WidgetId>,
}

impl LeafState {
	pub fn new(webview: WebViewId, container: WidgetId) -> Self {
		Self {
			webview,
			container,
			popup: None,
			auto_close: false,
			hover_controller: None,
			focus_controller: None,
			last_focus: None,
			title_bar: None,
		}
	}
}

/// State specific to a split branch: orientation and exactly two children.
#[derive(Debug, Clone)]
pub struct SplitState {
	pub orientation: Orientation,
	pub left: NodeId,
	pub right: NodeId,
	/// The two-child divider widget; start/end correspond to left/right.
	pub container: WidgetId,
}

/// State specific to a stack container: an ordered list of leaf nodes, one
/// of which is active (visible). Each entry is a real arena [`NodeId`] whose
/// own [`PaneNode::parent`] points back at this container — stacked panes
/// are still leaves, just reachable through `panes` instead of `left`/`right`.
#[derive(Debug, Clone)]
pub struct StackState {
	pub panes: Vec<NodeId>,
	pub active_index: usize,
	/// Vertical box holding one title-bar widget per pane plus the active
	/// pane's content.
	pub container: WidgetId,
}

impl StackState {
	pub fn active_pane(&self) -> Option<NodeId> {
		self.panes.get(self.active_index).copied()
	}
}

/// Tagged replacement for the source's `isLeaf`/`isStacked` boolean flags.
#[derive(Debug, Clone)]
pub enum PaneKind {
	Leaf(LeafState),
	Split(SplitState),
	Stack(StackState),
}

impl PaneKind {
	pub fn is_leaf(&self) -> bool {
		matches!(self, PaneKind::Leaf(_))
	}

	pub fn as_leaf(&self) -> Option<&LeafState> {
		match self {
			PaneKind::Leaf(l) => Some(l),
			_ => None,
		}
	}

	pub fn as_leaf_mut(&mut self) -> Option<&mut LeafState> {
		match self {
			PaneKind::Leaf(l) => Some(l),
			_ => None,
		}
	}

	pub fn as_split(&self) -> Option<&SplitState> {
		match self {
			PaneKind::Split(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_stack(&self) -> Option<&StackState> {
		match self {
			PaneKind::Stack(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_stack_mut(&mut self) -> Option<&mut StackState> {
		match self {
			PaneKind::Stack(s) => Some(s),
			_ => None,
		}
	}

	/// The widget that represents this node in the toolkit tree.
	pub fn container(&self) -> WidgetId {
		match self {
			PaneKind::Leaf(l) => l.container,
			PaneKind::Split(s) => s.container,
			PaneKind::Stack(s) => s.container,
		}
	}
}

#[derive(Debug, Clone)]
pub struct PaneNode {
	pub parent: Option<NodeId>,
	pub kind: PaneKind,
	/// Cleared the instant a node is logically destroyed, before its slot is
	/// freed. Checked alongside `generation` by asynchronous callbacks.
	pub valid: bool,
	pub generation: u64,
}

/// The pane tree plus the root pointer, main-pane pointer, and webview
/// index (§3.1 `WorkspaceTree`).
///
/// Cloning a `WorkspaceTree` takes a full structural snapshot; this is the
/// basis for the [`Tombstone`] mechanism §4.10 calls for, since every piece
/// of state that must be restored on a failed operation (tree shape,
/// focus's notion of the main pane, the index) is reachable from this one
/// struct.
#[derive(Debug, Clone)]
pub struct WorkspaceTree {
	arena: Slab<PaneNode>,
	root: Option<NodeId>,
	main_pane: Option<NodeId>,
	webview_index: FxHashMap<WebViewId, NodeId>,
	/// The toolkit-side box the root node's widget is attached to. Stands in
	/// for "the window" (§4.2): attaching/detaching the root is expressed as
	/// removing/appending this box's single child, reusing the C1 box
	/// primitives instead of inventing a window-specific one.
	pub root_container: WidgetId,
	root_child: Option<WidgetId>,
	next_generation: u64,
	max_depth: u32,
}

/// Snapshot used to restore model state after a failed structural operation
/// (§3.1 `StateTombstone`, §4.10 step 1/7).
pub type Tombstone = WorkspaceTree;

impl WorkspaceTree {
	/// Builds a fresh workspace whose root is a single leaf owning
	/// `root_webview`/`root_widget`, already attached to `root_container`.
	pub fn new(root_container: WidgetId, root_webview: WebViewId, root_widget: WidgetId, max_depth: u32) -> Self {
		let mut arena = Slab::new();
		let root_id = NodeId(arena.insert(PaneNode {
			parent: None,
			kind: PaneKind::Leaf(LeafState::new(root_webview, root_widget)),
			valid: true,
			generation: 0,
		}) as u32);
		let mut webview_index = FxHashMap::default();
		webview_index.insert(root_webview, root_id);
		Self {
			arena,
			root: Some(root_id),
			main_pane: Some(root_id),
			webview_index,
			root_container,
			root_child: Some(root_widget),
			next_generation: 1,
			max_depth,
		}
	}

	pub fn root(&self) -> Option<NodeId> {
		self.root
	}

	pub fn main_pane(&self) -> Option<NodeId> {
		self.main_pane
	}

	pub fn set_main_pane(&mut self, node: Option<NodeId>) {
		self.main_pane = node;
	}

	pub fn root_child_widget(&self) -> Option<WidgetId> {
		self.root_child
	}

	pub fn set_root_child_widget(&mut self, widget: Option<WidgetId>) {
		self.root_child = widget;
	}

	pub fn max_depth(&self) -> u32 {
		self.max_depth
	}

	pub fn node(&self, id: NodeId) -> Option<&PaneNode> {
		self.arena.get(id.0 as usize)
	}

	pub fn node_mut(&mut self, id: NodeId) -> Option<&mut PaneNode> {
		self.arena.get_mut(id.0 as usize)
	}

	pub fn contains(&self, id: NodeId) -> bool {
		self.arena.get(id.0 as usize).is_some_and(|n| n.valid)
	}

	/// Returns `true` iff `id` still names a valid node whose generation
	/// matches `generation` — the check every asynchronous callback must run
	/// before acting (§5 destruction race policy).
	pub fn is_current(&self, id: NodeId, generation: u64) -> bool {
		self.arena.get(id.0 as usize).is_some_and(|n| n.valid && n.generation == generation)
	}

	pub fn generation_of(&self, id: NodeId) -> Option<u64> {
		self.arena.get(id.0 as usize).map(|n| n.generation)
	}

	fn next_generation(&mut self) -> u64 {
		let g = self.next_generation;
		self.next_generation += 1;
		g
	}

	pub(crate) fn alloc(&mut self, parent: Option<NodeId>, kind: PaneKind) -> NodeId {
		let generation = self.next_generation();
		let id = NodeId(self.arena.insert(PaneNode { parent, kind, valid: true, generation }) as u32);
		if let PaneKind::Leaf(leaf) = &self.node(id).unwrap().kind {
			self.webview_index.insert(leaf.webview, id);
		}
		id
	}

	/// Marks `id` invalid and frees its slot. Any stacked-leaf children are
	/// *not* recursively removed; callers must remove them first (a stack
	/// container only holds leaves, never branches).
	pub(crate) fn destroy(&mut self, id: NodeId) {
		if let Some(node) = self.arena.get_mut(id.0 as usize) {
			node.valid = false;
			if let PaneKind::Leaf(leaf) = &node.kind {
				self.webview_index.remove(&leaf.webview);
			}
		}
		self.arena.remove(id.0 as usize);
		if self.main_pane == Some(id) {
			self.main_pane = None;
		}
	}

	pub fn node_for_webview(&self, webview: WebViewId) -> Option<NodeId> {
		self.webview_index.get(&webview).copied()
	}

	pub fn webview_count(&self) -> usize {
		self.webview_index.len()
	}

	pub fn leaf_count(&self) -> usize {
		self.leaves().len()
	}

	/// Depth-limited, cycle-guarded traversal yielding leaf nodes in
	/// left-to-right order. For a stack container, yields only the active
	/// pane (§4.2 "leaf collection"), so focus/CSS logic never sees more than
	/// one "active" candidate per stack.
	pub fn leaves(&self) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut visited = rustc_hash::FxHashSet::default();
		if let Some(root) = self.root {
			self.collect_leaves(root, 0, &mut visited, &mut out);
		}
		out
	}

	fn collect_leaves(&self, id: NodeId, depth: u32, visited: &mut rustc_hash::FxHashSet<NodeId>, out: &mut Vec<NodeId>) {
		if depth > self.max_depth {
			tracing::warn!(?id, depth, "leaf collection hit max depth, truncating");
			return;
		}
		if !visited.insert(id) {
			tracing::warn!(?id, "cycle detected during leaf collection, truncating");
			return;
		}
		let Some(node) = self.node(id) else { return };
		match &node.kind {
			PaneKind::Leaf(_) => out.push(id),
			PaneKind::Split(s) => {
				self.collect_leaves(s.left, depth + 1, visited, out);
				self.collect_leaves(s.right, depth + 1, visited, out);
			}
			PaneKind::Stack(s) => {
				if let Some(active) = s.active_pane() {
					out.push(active);
				}
			}
		}
	}

	/// Replaces whichever of `parent`'s children equals `old_child` with
	/// `new_child`. No-op if `parent` is not a split branch or does not
	/// currently hold `old_child`.
	pub(crate) fn set_child_slot(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
		if let Some(PaneKind::Split(s)) = self.node_mut(parent).map(|n| &mut n.kind) {
			if s.left == old_child {
				s.left = new_child;
			} else if s.right == old_child {
				s.right = new_child;
			}
		}
	}

	/// Makes `new_root` the tree's root, clearing its parent pointer. Does
	/// not touch the old root's widget; callers attach `new_root`'s widget
	/// to [`Self::root_container`] themselves once any transaction commits.
	pub(crate) fn replace_root(&mut self, new_root: NodeId) {
		self.root = Some(new_root);
		if let Some(n) = self.node_mut(new_root) {
			n.parent = None;
		}
	}

	/// Ancestors of `id`, nearest first, ending at (and including) the root.
	pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut cur = self.node(id).and_then(|n| n.parent);
		let mut guard = 0;
		while let Some(a) = cur {
			out.push(a);
			guard += 1;
			if guard > self.max_depth {
				tracing::warn!(?id, "ancestor walk hit max depth, truncating");
				break;
			}
			cur = self.node(a).and_then(|n| n.parent);
		}
		out
	}
}
