//! Typed, narrow gateway to the single-threaded UI toolkit (C1).
//!
//! # Purpose
//!
//! - Owns: the mapping from abstract widget handles ([`WidgetId`]) to whatever
//!   concrete toolkit objects back them, and the handful of primitive
//!   operations (create/reparent/query/style/controller/idle) the workspace
//!   pane subsystem is allowed to perform on them.
//! - Does not own: any policy about *when* those operations happen, what a
//!   split tree looks like, or what focus means. That lives in
//!   `loom-workspace`.
//! - Source of truth: [`ToolkitGateway`]. Every other crate talks to the
//!   toolkit only through this trait.
//!
//! # Mental model
//!
//! The toolkit itself is single-threaded: every widget mutation documented
//! here other than [`ToolkitGateway::is_ui_thread`] and
//! [`ToolkitGateway::schedule_idle`] MUST run on the thread that owns the
//! toolkit main loop. Calling a mutating method off that thread is a
//! programming error and backends are free to panic; callers that are not
//! sure which thread they are on should marshal through `schedule_idle`.
//!
//! Two backends are provided:
//! - [`gtk`] (behind the `gtk-backend` feature): a real GTK4 gateway.
//! - [`mock`] (always available): an in-memory gateway used by tests and by
//!   any headless exercise of the workspace logic. It records the same
//!   parent/child/allocation/style state a real toolkit would, without
//!   linking against GTK.
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[cfg(feature = "gtk-backend")]
pub mod gtk;
pub mod mock;

use std::fmt;

/// Opaque handle to a toolkit-owned widget.
///
/// Handles are never reused while a widget they reference is still valid;
/// backends hand out fresh handles from a growing slab. Holding a `WidgetId`
/// past the widget's destruction and using it again is a programming error
/// that surfaces as [`ToolkitError::UnknownWidget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId(pub(crate) u64);

/// Opaque handle to a registered hover or focus controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId(pub(crate) u64);

/// Orientation of a two-child divider or a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
	Horizontal,
	Vertical,
}

/// The rectangle the toolkit has assigned to a widget after layout.
///
/// A freshly created widget that has not yet been through a layout pass
/// reports the all-zero allocation; callers must treat that specially
/// (see `loom_workspace::geometry`) rather than as "too small".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Allocation {
	pub x: i32,
	pub y: i32,
	pub width: i32,
	pub height: i32,
}

impl Allocation {
	pub fn is_zero(&self) -> bool {
		self.width == 0 && self.height == 0
	}
}

/// Errors a [`ToolkitGateway`] implementation can surface.
///
/// These are programming-error-adjacent: a well-behaved caller that only
/// ever references widgets it just created and hasn't destroyed should never
/// observe one. They exist so the workspace layer can convert toolkit misuse
/// into `WidgetTransactionFailed` instead of panicking.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToolkitError {
	#[error("widget {0:?} is not known to this gateway")]
	UnknownWidget(WidgetId),
	#[error("widget {0:?} is not a two-child divider")]
	NotAPaned(WidgetId),
	#[error("widget {0:?} is not a box container")]
	NotABox(WidgetId),
	#[error("operation requires the UI thread")]
	NotOnUiThread,
	#[error("widget {parent:?} cannot parent {child:?}: {reason}")]
	InvalidReparent {
		parent: WidgetId,
		child: WidgetId,
		reason: &'static str,
	},
}

pub type IdleCallback = Box<dyn FnOnce() + Send>;
pub type HoverCallback = Box<dyn FnMut(f64, f64)>;
pub type FocusCallback = Box<dyn FnMut()>;

/// Narrow, typed, synchronous interface to the UI toolkit (§4.1).
///
/// All entry points other than [`is_ui_thread`](Self::is_ui_thread) and
/// [`schedule_idle`](Self::schedule_idle) must be called from the UI thread.
pub trait ToolkitGateway: fmt::Debug {
	/// Returns whether the calling thread is the toolkit's UI thread.
	fn is_ui_thread(&self) -> bool;

	/// Creates a new two-child divider widget with the given orientation.
	fn create_paned(&self, orientation: Orientation) -> WidgetId;

	/// Creates a new vertical-box container widget.
	fn create_box(&self, orientation: Orientation) -> WidgetId;

	/// Sets (or clears) the start child of a divider.
	fn set_start_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError>;

	/// Sets (or clears) the end child of a divider.
	fn set_end_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError>;

	/// Appends a child to a box container, at the end.
	fn box_append(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError>;

	/// Removes a child from a box container.
	fn box_remove(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError>;

	/// Detaches a widget from its current parent, if any. No-op if unparented.
	fn unparent(&self, widget: WidgetId) -> Result<(), ToolkitError>;

	/// Returns the current parent of a widget, if parented.
	fn parent_of(&self, widget: WidgetId) -> Result<Option<WidgetId>, ToolkitError>;

	/// Returns the widget's last-computed allocation rectangle.
	fn allocation(&self, widget: WidgetId) -> Result<Allocation, ToolkitError>;

	/// Sets horizontal/vertical expand flags.
	fn set_expand(&self, widget: WidgetId, horizontal: bool, vertical: bool) -> Result<(), ToolkitError>;

	/// Sets (or clears, with `None`) an explicit size request.
	fn set_size_request(&self, widget: WidgetId, size: Option<(i32, i32)>) -> Result<(), ToolkitError>;

	/// Marks a widget as needing a fresh allocation pass.
	fn queue_allocate(&self, widget: WidgetId) -> Result<(), ToolkitError>;

	/// Adds a CSS-like style class, idempotently.
	fn add_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError>;

	/// Removes a CSS-like style class, idempotently.
	fn remove_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError>;

	/// Returns whether a widget currently carries the given style class.
	fn has_style_class(&self, widget: WidgetId, class: &str) -> Result<bool, ToolkitError>;

	/// Registers a hover-motion controller; the callback receives local (x, y).
	fn add_hover_controller(&self, widget: WidgetId, callback: HoverCallback) -> Result<ControllerId, ToolkitError>;

	/// Registers a focus-in/focus-out controller pair.
	fn add_focus_controller(&self, widget: WidgetId, on_enter: FocusCallback, on_leave: FocusCallback) -> Result<ControllerId, ToolkitError>;

	/// Grabs toolkit keyboard focus onto a widget.
	fn grab_focus(&self, widget: WidgetId) -> Result<(), ToolkitError>;

	/// Destroys a widget and releases its handle. Any later use of `widget`
	/// returns [`ToolkitError::UnknownWidget`].
	fn destroy(&self, widget: WidgetId) -> Result<(), ToolkitError>;

	/// Schedules `callback` to run on the next idle tick of the UI thread.
	///
	/// Safe to call from any thread.
	fn schedule_idle(&self, callback: IdleCallback);

	/// Runs one step of the main loop (dispatches at most one pending idle
	/// callback / event). Returns whether there is more pending work.
	fn iterate_main_loop_step(&self) -> bool;

	/// Requests that the main loop stop running.
	fn quit_main_loop(&self);

	/// Returns whether [`quit_main_loop`](Self::quit_main_loop) has been called.
	fn is_quit(&self) -> bool;
}
