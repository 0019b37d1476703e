//! Focus state machine (C8, §4.8): the central authority for "which pane is
//! active". Accepts prioritized requests, deduplicates and coalesces,
//! validates, applies toolkit focus and active-border styling, records
//! history, and self-heals CSS inconsistencies.
//!
//! Simplification versus the letter of §4.8: the 50-ms settling timer is
//! modeled as an inline sleep at the end of processing a request rather than
//! a separately scheduled timer, since this crate's processor only ever
//! handles one request at a time anyway (there is nothing concurrent for a
//! separately-scheduled timer to race against). Likewise, "if a
//! higher-priority request arrives during processing, requeue the current
//! and switch" only has observable meaning *between* requests here, since a
//! single transition (style toggle + toolkit focus grab) is not itself
//! interruptible; newly arrived higher-priority requests are simply
//! processed next, which the priority heap already guarantees.

pub mod ring;

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use loom_toolkit::ToolkitGateway;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::tree::{NodeId, PaneKind, WorkspaceTree};
use crate::Source;
use ring::{FocusTransition, TransitionRing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
	Initializing,
	Idle,
	Transitioning,
	Focused,
	Reconciling,
}

const ACTIVE_CLASS: &str = "active";
const ACTIVE_STACKED_CLASS: &str = "active-outline";

struct QueuedRequest {
	target: NodeId,
	source: Source,
	priority: u8,
	submitted_at: TokioInstant,
}

impl PartialEq for QueuedRequest {
	fn eq(&self, other: &Self) -> bool {
		self.priority == other.priority && self.submitted_at == other.submitted_at
	}
}
impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for QueuedRequest {
	/// Higher priority sorts greater (max-heap pops it first); among equal
	/// priorities, the *earlier* submission sorts greater, so FIFO order is
	/// preserved within a priority tier (§4.8 P4).
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.priority.cmp(&other.priority).then_with(|| other.submitted_at.cmp(&self.submitted_at))
	}
}

/// The synchronous core of C8: request intake (dedup/coalesce), the
/// priority queue, and the processing step. Does not itself own any timers
/// or background tasks; [`FocusDriver`] wraps this with the async plumbing.
pub struct FocusMachine {
	state: FocusState,
	active: Option<NodeId>,
	queue: BinaryHeap<QueuedRequest>,
	dedup: HashMap<(NodeId, Source), TokioInstant>,
	ring: TransitionRing,
	dedup_window: Duration,
	coalesce_window: Duration,
	reconcile_attempts: VecDeque<TokioInstant>,
	max_reconcile_attempts_per_second: u32,
}

impl FocusMachine {
	pub fn new(dedup_window_ms: u64, coalesce_window_ms: u64, ring_capacity: usize, max_reconcile_attempts_per_second: u32) -> Self {
		Self {
			state: FocusState::Initializing,
			active: None,
			queue: BinaryHeap::new(),
			dedup: HashMap::new(),
			ring: TransitionRing::new(ring_capacity),
			dedup_window: Duration::from_millis(dedup_window_ms),
			coalesce_window: Duration::from_millis(coalesce_window_ms),
			reconcile_attempts: VecDeque::new(),
			max_reconcile_attempts_per_second,
		}
	}

	pub fn active(&self) -> Option<NodeId> {
		self.active
	}

	pub fn state(&self) -> FocusState {
		self.state
	}

	pub fn history(&self) -> &TransitionRing {
		&self.ring
	}

	/// §4.8 request path, steps 1-5. Returns `Ok(true)` if the request was
	/// queued, `Ok(false)` if it was dropped as a duplicate or coalesced.
	pub fn request_focus(&mut self, target: Option<NodeId>, source: Source) -> WorkspaceResult<bool> {
		let Some(target) = target else {
			return Err(WorkspaceError::invalid_target(None, "focus target must not be nil"));
		};
		let now = TokioInstant::now();

		self.dedup.retain(|_, seen_at| now.duration_since(*seen_at) < self.dedup_window);
		let signature = (target, source);
		if self.dedup.contains_key(&signature) {
			return Ok(false);
		}

		if self.queue.iter().any(|q| q.target == target && now.duration_since(q.submitted_at) < self.coalesce_window) {
			return Ok(false);
		}

		self.dedup.insert(signature, now);
		self.queue.push(QueuedRequest { target, source, priority: source.priority(), submitted_at: now });
		if self.state == FocusState::Initializing {
			self.state = FocusState::Idle;
		}
		Ok(true)
	}

	/// Pops and processes the single highest-priority pending request, if
	/// any. Returns the recorded transition.
	pub fn process_next(&mut self, tree: &WorkspaceTree, gateway: &dyn ToolkitGateway) -> Option<FocusTransition> {
		let request = self.queue.pop()?;
		Some(self.process(request, tree, gateway))
	}

	fn process(&mut self, request: QueuedRequest, tree: &WorkspaceTree, gateway: &dyn ToolkitGateway) -> FocusTransition {
		let from = self.active;
		let now = TokioInstant::now();

		if Some(request.target) == self.active {
			let transition = FocusTransition { from, to: request.target, source: request.source, timestamp: std::time::Instant::now(), success: true, error: None };
			self.ring.push(transition.clone());
			return transition;
		}

		let validation = self.validate(tree, request.target);
		let result = validation.and_then(|widget| {
			self.state = FocusState::Transitioning;
			gateway.grab_focus(widget).map_err(|_| "grab_focus failed")?;
			self.restyle(tree, gateway, from, request.target);
			Ok(())
		});

		let success = result.is_ok();
		if success {
			self.active = Some(request.target);
			self.state = FocusState::Focused;
		} else {
			self.state = FocusState::Idle;
		}
		let _ = now;

		let transition = FocusTransition { from, to: request.target, source: request.source, timestamp: std::time::Instant::now(), success, error: result.err() };
		self.ring.push(transition.clone());
		transition
	}

	fn validate(&self, tree: &WorkspaceTree, target: NodeId) -> Result<loom_toolkit::WidgetId, &'static str> {
		let node = tree.node(target).ok_or("target no longer present")?;
		let leaf = node.kind.as_leaf().ok_or("target is not a leaf")?;
		if tree.node_for_webview(leaf.webview) != Some(target) {
			return Err("target's webview is not in the index");
		}
		Ok(leaf.container)
	}

	/// Removes the active-border class from the previous pane and adds it to
	/// the new one, using the stacked variant when the new pane lives in a
	/// stack (§4.8 "context-appropriate class").
	fn restyle(&self, tree: &WorkspaceTree, gateway: &dyn ToolkitGateway, previous: Option<NodeId>, next: NodeId) {
		if let Some(prev) = previous {
			if let Some(node) = tree.node(prev) {
				let widget = node.kind.container();
				let _ = gateway.remove_style_class(widget, ACTIVE_CLASS);
				let _ = gateway.remove_style_class(widget, ACTIVE_STACKED_CLASS);
			}
		}
		if let Some(node) = tree.node(next) {
			let widget = node.kind.container();
			let in_stack = node.parent.and_then(|p| tree.node(p)).is_some_and(|p| matches!(p.kind, PaneKind::Stack(_)));
			let class = if in_stack { ACTIVE_STACKED_CLASS } else { ACTIVE_CLASS };
			let _ = gateway.add_style_class(widget, class);
		}
	}

	/// Moves a settled `Focused` pane back to `Idle` once its settling timer
	/// has elapsed (§4.8 "Focused → Idle").
	pub fn settle(&mut self) {
		if self.state == FocusState::Focused {
			self.state = FocusState::Idle;
		}
	}

	/// C8's only synchronous write path exposed to destruction: clears the
	/// active-pane reference if it names `node` (§4.8 `InvalidateActivePane`).
	pub fn invalidate_active_pane(&mut self, node: NodeId) {
		if self.active == Some(node) {
			self.active = None;
			self.state = FocusState::Idle;
		}
	}

	/// Periodic CSS-consistency check (§4.8 "reconciliation loop"). Returns
	/// `true` if a reconciliation ran, `false` if consistent or the
	/// rolling-second cap was hit.
	pub fn reconcile(&mut self, tree: &WorkspaceTree, gateway: &dyn ToolkitGateway) -> bool {
		if self.css_consistent(tree, gateway) {
			return false;
		}
		let now = TokioInstant::now();
		self.reconcile_attempts.retain(|t| now.duration_since(*t) < Duration::from_secs(1));
		if self.reconcile_attempts.len() as u32 >= self.max_reconcile_attempts_per_second {
			tracing::warn!("reconciliation cap reached for this rolling second, skipping");
			return false;
		}
		self.reconcile_attempts.push_back(now);
		self.state = FocusState::Reconciling;
		if let Some(active) = self.active {
			self.restyle(tree, gateway, None, active);
		}
		for leaf in tree.leaves() {
			if Some(leaf) != self.active {
				if let Some(node) = tree.node(leaf) {
					let widget = node.kind.container();
					let _ = gateway.remove_style_class(widget, ACTIVE_CLASS);
					let _ = gateway.remove_style_class(widget, ACTIVE_STACKED_CLASS);
				}
			}
		}
		self.state = FocusState::Idle;
		true
	}

	fn css_consistent(&self, tree: &WorkspaceTree, gateway: &dyn ToolkitGateway) -> bool {
		for leaf in tree.leaves() {
			let Some(node) = tree.node(leaf) else { continue };
			let widget = node.kind.container();
			let has_active = gateway.has_style_class(widget, ACTIVE_CLASS).unwrap_or(false) || gateway.has_style_class(widget, ACTIVE_STACKED_CLASS).unwrap_or(false);
			let should_be_active = Some(leaf) == self.active;
			if has_active != should_be_active {
				return false;
			}
		}
		true
	}
}

/// Owns the async plumbing around [`FocusMachine`]: an incoming command
/// channel and a periodic reconciliation ticker, both driven by one task.
pub struct FocusDriver {
	tx: mpsc::Sender<FocusCommand>,
	machine: Arc<Mutex<FocusMachine>>,
}

enum FocusCommand {
	Request { target: Option<NodeId>, source: Source },
	Invalidate { target: NodeId },
}

impl FocusDriver {
	#[allow(clippy::too_many_arguments)]
	pub fn spawn(
		tree: Arc<parking_lot::RwLock<WorkspaceTree>>,
		gateway: Arc<dyn ToolkitGateway + Send + Sync>,
		dedup_window_ms: u64,
		coalesce_window_ms: u64,
		ring_capacity: usize,
		reconcile_interval_ms: u64,
		max_reconcile_attempts_per_second: u32,
		settle_ms: u64,
	) -> Self {
		let machine = Arc::new(Mutex::new(FocusMachine::new(dedup_window_ms, coalesce_window_ms, ring_capacity, max_reconcile_attempts_per_second)));
		let (tx, mut rx) = mpsc::channel(256);

		let task_machine = Arc::clone(&machine);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(Duration::from_millis(reconcile_interval_ms.max(1)));
			loop {
				tokio::select! {
					cmd = rx.recv() => {
						let Some(cmd) = cmd else { return };
						match cmd {
							FocusCommand::Request { target, source } => {
								let queued = { task_machine.lock().request_focus(target, source) };
								if matches!(queued, Ok(true)) {
									drain(&task_machine, &tree, gateway.as_ref(), settle_ms).await;
								}
							}
							FocusCommand::Invalidate { target } => {
								task_machine.lock().invalidate_active_pane(target);
							}
						}
					}
					_ = ticker.tick() => {
						let guard = tree.read();
						task_machine.lock().reconcile(&guard, gateway.as_ref());
					}
				}
			}
		});

		Self { tx, machine }
	}

	pub async fn request_focus(&self, target: NodeId, source: Source) -> WorkspaceResult<()> {
		self.tx.send(FocusCommand::Request { target: Some(target), source }).await.map_err(|_| WorkspaceError::ShuttingDown)
	}

	pub async fn invalidate_active_pane(&self, target: NodeId) {
		let _ = self.tx.send(FocusCommand::Invalidate { target }).await;
	}

	pub fn active(&self) -> Option<NodeId> {
		self.machine.lock().active()
	}

	pub fn state(&self) -> FocusState {
		self.machine.lock().state()
	}

	pub fn history_snapshot(&self) -> Vec<FocusTransition> {
		self.machine.lock().history().iter().cloned().collect()
	}
}

/// Drains every currently pending request, holding each successful
/// transition `Focused` for `settle_ms` before moving on (§4.8 "schedule a
/// 50-ms settling timer; on expiry, Focused → Idle") — modeled as an inline
/// sleep in this single serialized path rather than a separately scheduled
/// timer, since nothing else can observe `Focused` concurrently here.
async fn drain(machine: &Arc<Mutex<FocusMachine>>, tree: &Arc<parking_lot::RwLock<WorkspaceTree>>, gateway: &dyn ToolkitGateway, settle_ms: u64) {
	loop {
		let transition = {
			let guard = tree.read();
			let mut m = machine.lock();
			m.process_next(&guard, gateway)
		};
		let Some(transition) = transition else { break };
		if transition.success {
			tokio::time::sleep(Duration::from_millis(settle_ms)).await;
			let mut m = machine.lock();
			if m.state() == FocusState::Focused {
				m.settle();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::WebViewId;
	use loom_toolkit::mock::MockGateway;
	use loom_toolkit::Orientation;

	fn fresh() -> (MockGateway, WorkspaceTree) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		(gateway, tree)
	}

	#[test]
	fn duplicate_request_within_window_is_dropped() {
		let (gateway, tree) = fresh();
		let root = tree.root().unwrap();
		let mut fsm = FocusMachine::new(200, 50, 50, 3);
		assert_eq!(fsm.request_focus(Some(root), Source::Keyboard).unwrap(), true);
		fsm.process_next(&tree, &gateway);
		assert_eq!(fsm.request_focus(Some(root), Source::Keyboard).unwrap(), false);
	}

	#[test]
	fn priority_supremacy_orders_the_heap() {
		let (_gateway, tree) = fresh();
		let root = tree.root().unwrap();
		let mut fsm = FocusMachine::new(0, 0, 50, 3);
		fsm.request_focus(Some(root), Source::Mouse).unwrap();
		fsm.request_focus(Some(root), Source::System).unwrap();
		assert_eq!(fsm.queue.peek().unwrap().source, Source::System);
	}

	#[test]
	fn already_focused_records_success_without_restyling() {
		let (gateway, tree) = fresh();
		let root = tree.root().unwrap();
		let mut fsm = FocusMachine::new(0, 0, 50, 3);
		fsm.request_focus(Some(root), Source::Keyboard).unwrap();
		fsm.process_next(&tree, &gateway);
		assert_eq!(fsm.active(), Some(root));
		fsm.request_focus(Some(root), Source::Mouse).unwrap();
		let transition = fsm.process_next(&tree, &gateway).unwrap();
		assert!(transition.success);
	}
}
