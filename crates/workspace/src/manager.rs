//! Composition root (C11, §4.10): the one type external code talks to.
//!
//! Owns the shared tree, the toolkit gateway, the worker pool, and the focus
//! driver, and implements the write discipline every structural operation
//! follows: capture a tombstone, run C3/C4 checks, dispatch (directly on the
//! UI thread or through [`worker::WorkerPool`]), reattach a replaced root
//! widget and destroy orphaned ones, then invoke C7 for a close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use loom_toolkit::{ToolkitGateway, WidgetId};
use parking_lot::{Mutex, RwLock};

use crate::config::{DebugLevel, WorkspaceConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::focus::FocusDriver;
use crate::geometry;
use crate::rebalancer;
use crate::tree::close::CloseResult;
use crate::tree::{Direction, NodeId, PaneFactory, Tombstone, WebViewId, WorkspaceTree};
use crate::validator;
use crate::worker::{self, OperationKind, OperationOutcome, WorkerPool};
use crate::Source;

/// Inbound message vocabulary (§6 `OnWorkspaceMessage`): `pane-split`,
/// `pane-stack`, `close-popup`.
#[derive(Debug, Clone)]
pub enum WorkspaceMessage {
	PaneSplit { direction: Direction },
	PaneStack,
	ClosePopup { webview: WebViewId, reason: String },
}

impl WorkspaceMessage {
	fn event_name(&self) -> &'static str {
		match self {
			WorkspaceMessage::PaneSplit { .. } => "pane-split",
			WorkspaceMessage::PaneStack => "pane-stack",
			WorkspaceMessage::ClosePopup { .. } => "close-popup",
		}
	}
}

/// Clears the manager's `splitting` flag on drop, including on unwind, so a
/// panic mid-operation can't permanently lock out split/stack.
struct SplittingGuard<'a>(&'a AtomicBool);

impl Drop for SplittingGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

/// C11: the public entry point. Cheap to clone-share via `Arc` at the call
/// site; this type itself is `Sync` (every field is either atomic, a
/// `parking_lot` lock, or already `Send + Sync`).
pub struct WorkspaceManager {
	tree: Arc<RwLock<WorkspaceTree>>,
	gateway: Arc<dyn ToolkitGateway + Send + Sync>,
	factory: Arc<dyn PaneFactory>,
	workers: WorkerPool,
	focus: FocusDriver,
	config: WorkspaceConfig,
	splitting: AtomicBool,
	next_transaction_id: AtomicU64,
	debounce: Mutex<HashMap<(&'static str, String), Instant>>,
}

impl WorkspaceManager {
	pub fn new(
		root_container: WidgetId,
		root_webview: WebViewId,
		root_widget: WidgetId,
		gateway: Arc<dyn ToolkitGateway + Send + Sync>,
		factory: Arc<dyn PaneFactory>,
		config: WorkspaceConfig,
	) -> Self {
		let tree = Arc::new(RwLock::new(WorkspaceTree::new(root_container, root_webview, root_widget, config.max_tree_depth)));
		let workers = WorkerPool::spawn(Arc::clone(&tree), Arc::clone(&gateway), Arc::clone(&factory), &config);
		let focus = FocusDriver::spawn(
			Arc::clone(&tree),
			Arc::clone(&gateway),
			config.focus_dedup_window_ms,
			config.focus_coalesce_window_ms,
			config.transition_ring_capacity,
			config.reconcile_interval_ms,
			config.max_reconcile_attempts_per_second,
			config.focus_settle_ms,
		);
		Self {
			tree,
			gateway,
			factory,
			workers,
			focus,
			config,
			splitting: AtomicBool::new(false),
			next_transaction_id: AtomicU64::new(1),
			debounce: Mutex::new(HashMap::new()),
		}
	}

	pub fn active_node(&self) -> Option<NodeId> {
		self.focus.active()
	}

	pub fn node_for_webview(&self, webview: WebViewId) -> Option<NodeId> {
		self.tree.read().node_for_webview(webview)
	}

	/// The toolkit widget backing `node`, if it names a leaf.
	pub fn leaf_widget(&self, node: NodeId) -> Option<WidgetId> {
		self.tree.read().node(node).and_then(|n| n.kind.as_leaf()).map(|l| l.container)
	}

	pub fn stats_snapshot(&self) -> Vec<worker::OperationStats> {
		self.workers.stats_snapshot()
	}

	/// Current leaf count and webview-index size (§3.2 P2: these must always
	/// be equal).
	pub fn leaf_count(&self) -> usize {
		self.tree.read().leaf_count()
	}

	pub fn webview_count(&self) -> usize {
		self.tree.read().webview_count()
	}

	/// Runs the same structural-invariant check `pre_validate`/`post_validate`
	/// use internally, on demand. Exists for callers (tests, diagnostics
	/// tooling) that want to assert tree health without waiting on the next
	/// structural operation to trip over it.
	pub fn validate_now(&self) -> WorkspaceResult<()> {
		validator::validate(&self.tree.read()).map_err(WorkspaceError::from)
	}

	/// Renders a [`Diagnostics`] snapshot, gated on `debug.pane_close`
	/// (§6) being enabled — the caller asked for it, this just decides
	/// whether the config says to honor the ask.
	pub fn diagnostic_snapshot(&self) -> Option<String> {
		if !self.config.debug_pane_close {
			return None;
		}
		let guard = self.tree.read();
		Diagnostics::snapshot(&guard).map(|root| Diagnostics::render(&root))
	}

	pub async fn split_pane(&self, target: NodeId, direction: Direction) -> WorkspaceResult<NodeId> {
		self.ensure_running()?;
		let _guard = self.enter_splitting()?;
		let widget = self.target_widget(target)?;
		geometry::validate_split(self.gateway.as_ref(), widget, direction.orientation(), &self.config)?;
		self.pre_validate()?;
		let tombstone = self.tree.read().clone();
		let generation = self.target_generation(target)?;

		match self.run(OperationKind::Split { target, generation, direction }).await {
			Ok(OperationOutcome::Split { new_leaf, new_root_widget }) => {
				self.attach_new_root(new_root_widget);
				self.post_validate();
				let _ = self.focus.request_focus(new_leaf, Source::Split).await;
				Ok(new_leaf)
			}
			Ok(_) => unreachable!("a Split job always produces OperationOutcome::Split"),
			Err(e) => {
				self.restore(tombstone);
				tracing::warn!(?target, error = %e, "split failed");
				Err(e)
			}
		}
	}

	pub async fn close_pane(&self, target: NodeId) -> WorkspaceResult<()> {
		self.ensure_running()?;
		self.pre_validate()?;
		let tombstone = self.tree.read().clone();
		let generation = self.target_generation(target)?;

		match self.run(OperationKind::Close { target, generation }).await {
			Ok(OperationOutcome::Close { result, widgets_to_destroy }) => {
				self.focus.invalidate_active_pane(target).await;
				for widget in widgets_to_destroy {
					let _ = self.gateway.destroy(widget);
				}
				match result {
					CloseResult::QuitWorkspace => self.gateway.quit_main_loop(),
					CloseResult::Promoted { promoted, new_root_widget } => {
						self.attach_new_root(new_root_widget);
						{
							let guard = self.tree.read();
							rebalancer::retry_until_settled(&guard, self.gateway.as_ref(), promoted, self.config.rebalance_max_idle_retries);
						}
						let _ = self.focus.request_focus(promoted, Source::Close).await;
					}
				}
				self.post_validate();
				Ok(())
			}
			Ok(_) => unreachable!("a Close job always produces OperationOutcome::Close"),
			Err(e) => {
				self.restore(tombstone);
				tracing::warn!(?target, error = %e, "close failed");
				Err(e)
			}
		}
	}

	pub async fn stack_pane(&self, target: NodeId) -> WorkspaceResult<NodeId> {
		self.ensure_running()?;
		let _guard = self.enter_splitting()?;
		let widget = self.target_widget(target)?;
		geometry::validate_stack(self.gateway.as_ref(), widget, &self.config)?;
		self.pre_validate()?;
		let tombstone = self.tree.read().clone();
		let generation = self.target_generation(target)?;

		match self.run(OperationKind::Stack { target, generation }).await {
			Ok(OperationOutcome::Stack { new_leaf, new_root_widget }) => {
				self.attach_new_root(new_root_widget);
				self.post_validate();
				// No dedicated `Source` variant exists for a freshly stacked
				// pane; `Split` shares its priority tier with the other
				// structural-creation sources, so it is reused here too.
				let _ = self.focus.request_focus(new_leaf, Source::Split).await;
				Ok(new_leaf)
			}
			Ok(_) => unreachable!("a Stack job always produces OperationOutcome::Stack"),
			Err(e) => {
				self.restore(tombstone);
				tracing::warn!(?target, error = %e, "stack failed");
				Err(e)
			}
		}
	}

	pub async fn focus_neighbor(&self, direction: Direction) -> bool {
		let Some(active) = self.focus.active() else { return false };
		let outcome = {
			let mut guard = self.tree.write();
			crate::tree::navigate::focus_neighbor(&mut guard, self.gateway.as_ref(), active, direction)
		};
		if let Some(target) = outcome.new_active {
			let _ = self.focus.request_focus(target, Source::StackNav).await;
		}
		outcome.moved
	}

	pub async fn set_active_pane(&self, target: NodeId, source: Source) -> WorkspaceResult<()> {
		self.focus.request_focus(target, source).await
	}

	/// Routes one inbound event (§6). Unrecognized or stale targets are
	/// logged and dropped rather than erroring back to the caller, matching
	/// the rest of the event-sourced surface.
	pub async fn on_workspace_message(&self, source: &str, message: WorkspaceMessage) {
		if self.debounced(&message, source) {
			tracing::debug!(event = message.event_name(), source, "debounced, dropping");
			return;
		}
		match message {
			WorkspaceMessage::PaneSplit { direction } => {
				let Some(active) = self.focus.active() else {
					tracing::warn!("pane-split with no active pane, dropping");
					return;
				};
				if let Err(e) = self.split_pane(active, direction).await {
					tracing::warn!(error = %e, "pane-split failed");
				}
			}
			WorkspaceMessage::PaneStack => {
				let Some(active) = self.focus.active() else {
					tracing::warn!("pane-stack with no active pane, dropping");
					return;
				};
				if let Err(e) = self.stack_pane(active).await {
					tracing::warn!(error = %e, "pane-stack failed");
				}
			}
			WorkspaceMessage::ClosePopup { webview, reason } => {
				let Some(node) = self.tree.read().node_for_webview(webview) else {
					tracing::info!(?webview, reason, "close-popup for unknown webview, dropping");
					return;
				};
				let is_popup = self.tree.read().node(node).and_then(|n| n.kind.as_leaf()).is_some_and(|l| l.popup.is_some());
				if !is_popup {
					tracing::info!(?webview, reason, "close-popup target is not a popup, dropping");
					return;
				}
				if let Err(e) = self.close_pane(node).await {
					tracing::warn!(error = %e, "close-popup failed");
				}
			}
		}
	}

	/// Rejects further structural operations once the toolkit main loop has
	/// been asked to quit (S6: "no further operations accepted").
	fn ensure_running(&self) -> WorkspaceResult<()> {
		if self.gateway.is_quit() {
			return Err(WorkspaceError::ShuttingDown);
		}
		Ok(())
	}

	fn target_widget(&self, target: NodeId) -> WorkspaceResult<WidgetId> {
		self.tree
			.read()
			.node(target)
			.map(|n| n.kind.container())
			.ok_or_else(|| WorkspaceError::invalid_target(Some(target), "unknown node"))
	}

	/// Captures `target`'s current generation at request time, to stamp onto
	/// the `OperationKind` the worker pool (or direct dispatch) later checks
	/// against with `WorkspaceTree::is_current`.
	fn target_generation(&self, target: NodeId) -> WorkspaceResult<u64> {
		self.tree.read().generation_of(target).ok_or_else(|| WorkspaceError::invalid_target(Some(target), "unknown node"))
	}

	fn enter_splitting(&self) -> WorkspaceResult<SplittingGuard<'_>> {
		if self.splitting.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			return Err(WorkspaceError::InvalidStackOperation { reason: "a split or stack operation is already in progress" });
		}
		Ok(SplittingGuard(&self.splitting))
	}

	fn pre_validate(&self) -> WorkspaceResult<()> {
		if self.config.debug_workspace_level == DebugLevel::Off {
			return Ok(());
		}
		validator::validate(&self.tree.read()).map_err(WorkspaceError::from)
	}

	/// Logs rather than fails: an operation that already committed must not
	/// be undone by a post-hoc invariant check (§4.10 step 5).
	fn post_validate(&self) {
		if self.config.debug_workspace_level == DebugLevel::Off {
			return;
		}
		if let Err(e) = validator::validate(&self.tree.read()) {
			tracing::error!(error = %e, "post-operation invariant check failed");
		}
	}

	fn restore(&self, tombstone: Tombstone) {
		*self.tree.write() = tombstone;
	}

	/// Runs `kind` directly if already on the UI thread (reusing the same
	/// [`worker::dispatch`] the pool's workers call), otherwise submits it to
	/// the pool and awaits the result (§4.10 step 4).
	async fn run(&self, kind: OperationKind) -> WorkspaceResult<OperationOutcome> {
		if self.gateway.is_ui_thread() {
			let transaction_id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
			let (outcome, mut txn) = {
				let mut guard = self.tree.write();
				worker::dispatch(&mut guard, self.gateway.as_ref(), self.factory.as_ref(), kind, transaction_id)?
			};
			let result = txn.execute(self.gateway.as_ref());
			if result.committed {
				Ok(outcome)
			} else {
				Err(WorkspaceError::WidgetTransactionFailed {
					operation_id: transaction_id,
					source: result.failure.unwrap_or(loom_toolkit::ToolkitError::NotOnUiThread),
				})
			}
		} else {
			let (_handle, rx) = self.workers.submit(kind)?;
			rx.await.map_err(|_| WorkspaceError::ShuttingDown)?
		}
	}

	/// Reattaches a structural operation's new root widget to
	/// [`WorkspaceTree::root_container`], detaching whatever was there
	/// before. No-op unless the operation actually replaced the root.
	fn attach_new_root(&self, new_root_widget: Option<WidgetId>) {
		let Some(widget) = new_root_widget else { return };
		let mut guard = self.tree.write();
		let container = guard.root_container;
		if let Some(old) = guard.root_child_widget() {
			let _ = self.gateway.box_remove(container, old);
		}
		let _ = self.gateway.box_append(container, widget);
		guard.set_root_child_widget(Some(widget));
	}

	fn debounced(&self, message: &WorkspaceMessage, source: &str) -> bool {
		let window = Duration::from_millis(self.config.split_stack_debounce_ms);
		let now = Instant::now();
		let key = (message.event_name(), source.to_string());
		let mut debounce = self.debounce.lock();
		if let Some(&last) = debounce.get(&key) {
			if now.duration_since(last) < window {
				return true;
			}
		}
		debounce.insert(key, now);
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_toolkit::mock::MockGateway;
	use loom_toolkit::Orientation;
	use std::sync::atomic::{AtomicU64 as Counter, Ordering as Ord};

	struct CountingFactory {
		gateway: Arc<MockGateway>,
		next: Counter,
	}

	impl PaneFactory for CountingFactory {
		fn create_pane(&self) -> (WebViewId, WidgetId) {
			let id = self.next.fetch_add(1, Ord::Relaxed);
			(WebViewId(3000 + id), self.gateway.create_box(Orientation::Horizontal))
		}
	}

	fn fresh() -> (Arc<MockGateway>, WorkspaceManager, NodeId) {
		let mock = Arc::new(MockGateway::new_on_current_thread());
		let root_container = mock.create_box(Orientation::Horizontal);
		let root_widget = mock.create_box(Orientation::Horizontal);
		mock.set_allocation(root_widget, loom_toolkit::Allocation { x: 0, y: 0, width: 1200, height: 800 });
		let gateway: Arc<dyn ToolkitGateway + Send + Sync> = mock.clone();
		let factory: Arc<dyn PaneFactory> = Arc::new(CountingFactory { gateway: mock.clone(), next: Counter::new(0) });
		let manager = WorkspaceManager::new(root_container, WebViewId(0), root_widget, gateway, factory, WorkspaceConfig::default());
		let root = manager.tree.read().root().unwrap();
		(mock, manager, root)
	}

	#[tokio::test]
	async fn split_on_ui_thread_dispatches_directly_and_reattaches_root() {
		let (mock, manager, root) = fresh();
		let new_leaf = manager.split_pane(root, Direction::Right).await.unwrap();
		assert_ne!(new_leaf, root);
		let guard = manager.tree.read();
		let new_root = guard.root().unwrap();
		assert_ne!(new_root, root);
		let root_child = guard.root_child_widget().unwrap();
		assert_eq!(mock.parent_of(root_child).unwrap(), Some(guard.root_container));
	}

	#[tokio::test]
	async fn concurrent_split_attempt_is_rejected_not_queued() {
		let (_mock, manager, root) = fresh();
		let _guard = manager.enter_splitting().unwrap();
		let err = manager.split_pane(root, Direction::Right).await.unwrap_err();
		assert!(matches!(err, WorkspaceError::InvalidStackOperation { .. }));
	}

	#[tokio::test]
	async fn closing_the_only_pane_quits_the_main_loop() {
		let (mock, manager, root) = fresh();
		manager.close_pane(root).await.unwrap();
		assert!(mock.is_quit());
	}

	#[tokio::test]
	async fn repeated_messages_within_the_debounce_window_are_dropped() {
		let (_mock, manager, _root) = fresh();
		let message = WorkspaceMessage::PaneStack;
		assert!(!manager.debounced(&message, "kb-1"));
		assert!(manager.debounced(&message, "kb-1"));
	}

	#[tokio::test]
	async fn pane_split_message_with_no_active_pane_is_dropped_without_error() {
		let (_mock, manager, _root) = fresh();
		manager.on_workspace_message("kb-1", WorkspaceMessage::PaneSplit { direction: Direction::Right }).await;
		let leaf_count = manager.tree.read().leaf_count();
		assert_eq!(leaf_count, 1);
	}
}
