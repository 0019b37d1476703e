//! Tunables and debug flags (§6).
//!
//! A host application loads this the way `xeno-registry`'s option tables are
//! loaded, then hands it to [`crate::manager::WorkspaceManager::new`]. Every
//! pinned numeric constant (minimum pane size, queue capacity, retry
//! bounds, timing windows) lives here instead of being scattered as literals
//! through the modules that use them.

use serde::Deserialize;

/// `debug.workspace.level`: gates C3/C4 strictness and verbose logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
	Off,
	#[default]
	Basic,
	Full,
}

/// Default direction for `Split`/popup placement, `workspace.popups.placement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDirection {
	Left,
	Right,
	Up,
	Down,
}

impl Default for DefaultDirection {
	fn default() -> Self {
		Self::Right
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
	/// `debug.workspace.level`
	pub debug_workspace_level: DebugLevel,
	/// `debug.focus.enable`
	pub debug_focus_enable: bool,
	/// `debug.focus.metrics`
	pub debug_focus_metrics: bool,
	/// `debug.pane-close`
	pub debug_pane_close: bool,
	/// `workspace.popups.placement`
	pub popup_placement: DefaultDirection,

	pub min_pane_width: i32,
	pub min_pane_height: i32,
	pub stack_title_bar_height: i32,
	pub focus_epsilon: f64,

	pub operation_queue_capacity: usize,
	pub worker_count: usize,
	pub max_retries: u32,
	pub retry_backoff_ms: u64,
	pub ui_wait_pump_interval_ms: u64,
	pub ui_wait_timeout_ms: u64,

	pub focus_dedup_window_ms: u64,
	pub focus_coalesce_window_ms: u64,
	pub focus_settle_ms: u64,
	pub reconcile_interval_ms: u64,
	pub max_reconcile_attempts_per_second: u32,
	pub transition_ring_capacity: usize,

	pub rebalance_max_idle_retries: u32,

	pub split_stack_debounce_ms: u64,
	pub pane_mode_exited_debounce_ms: u64,

	pub max_tree_depth: u32,
}

impl Default for WorkspaceConfig {
	fn default() -> Self {
		Self {
			debug_workspace_level: DebugLevel::default(),
			debug_focus_enable: true,
			debug_focus_metrics: false,
			debug_pane_close: false,
			popup_placement: DefaultDirection::default(),

			min_pane_width: 300,
			min_pane_height: 200,
			stack_title_bar_height: 30,
			focus_epsilon: 1e-3,

			operation_queue_capacity: 1000,
			worker_count: 2,
			max_retries: 3,
			retry_backoff_ms: 100,
			ui_wait_pump_interval_ms: 10,
			ui_wait_timeout_ms: 30_000,

			focus_dedup_window_ms: 200,
			focus_coalesce_window_ms: 50,
			focus_settle_ms: 50,
			reconcile_interval_ms: 100,
			max_reconcile_attempts_per_second: 3,
			transition_ring_capacity: 50,

			rebalance_max_idle_retries: 5,

			split_stack_debounce_ms: 200,
			pane_mode_exited_debounce_ms: 100,

			max_tree_depth: 50,
		}
	}
}
