//! GTK4-backed [`ToolkitGateway`] implementation.
//!
//! Widgets are tracked in a slab keyed by [`WidgetId`] so the rest of the
//! workspace subsystem never touches a `gtk4::Widget` directly. The gateway
//! itself is only safe to construct and drive on the thread that owns the
//! GTK main loop; [`GtkGateway::schedule_idle`] is the one method other
//! threads may call.

use std::cell::RefCell;

use gtk4::prelude::*;
use gtk4::{Box as GtkBox, Orientation as GtkOrientation, Paned, Widget};
use slab::Slab;

use crate::{Allocation, ControllerId, FocusCallback, HoverCallback, IdleCallback, Orientation, ToolkitError, ToolkitGateway, WidgetId};

fn to_gtk_orientation(o: Orientation) -> GtkOrientation {
	match o {
		Orientation::Horizontal => GtkOrientation::Horizontal,
		Orientation::Vertical => GtkOrientation::Vertical,
	}
}

/// Real GTK4 gateway. Must be created on, and used from, the GTK main thread.
pub struct GtkGateway {
	widgets: RefCell<Slab<Widget>>,
	ui_thread: std::thread::ThreadId,
	quit: std::cell::Cell<bool>,
}

impl std::fmt::Debug for GtkGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GtkGateway").field("widget_count", &self.widgets.borrow().len()).finish()
	}
}

// SAFETY: every method that touches `widgets` asserts it is running on
// `ui_thread` and returns `ToolkitError::NotOnUiThread` otherwise, so the
// `RefCell` is never accessed from two threads concurrently. The only method
// callable off the UI thread, `schedule_idle`, touches no shared state of
// its own (`glib::idle_add_once` is documented safe to call from any
// thread). This lets the operation worker pool hold a `GtkGateway` behind an
// `Arc` the same way it would a `Sync` gateway.
unsafe impl Sync for GtkGateway {}

// SAFETY: `GtkGateway` is only ever constructed on the UI thread and every
// widget-touching method re-asserts that it is still running there; moving
// the gateway itself to another thread (e.g. the `Arc` the operation worker
// pool holds being dropped off the UI thread) never races because the worker
// pool only ever calls UI-thread-bound methods from the UI thread and calls
// `schedule_idle` from elsewhere, same as the `Sync` impl above.
unsafe impl Send for GtkGateway {}

impl GtkGateway {
	/// Creates a gateway bound to the calling (GTK main) thread.
	///
	/// # Panics
	///
	/// Panics if called before `gtk4::init()` has succeeded.
	pub fn new() -> Self {
		Self {
			widgets: RefCell::new(Slab::new()),
			ui_thread: std::thread::current().id(),
			quit: std::cell::Cell::new(false),
		}
	}

	fn widget(&self, id: WidgetId) -> Result<Widget, ToolkitError> {
		self.widgets.borrow().get(id.0 as usize).cloned().ok_or(ToolkitError::UnknownWidget(id))
	}

	fn insert(&self, widget: Widget) -> WidgetId {
		WidgetId(self.widgets.borrow_mut().insert(widget) as u64)
	}

	fn assert_ui_thread(&self) -> Result<(), ToolkitError> {
		if std::thread::current().id() == self.ui_thread { Ok(()) } else { Err(ToolkitError::NotOnUiThread) }
	}
}

impl Default for GtkGateway {
	fn default() -> Self {
		Self::new()
	}
}

impl ToolkitGateway for GtkGateway {
	fn is_ui_thread(&self) -> bool {
		std::thread::current().id() == self.ui_thread
	}

	fn create_paned(&self, orientation: Orientation) -> WidgetId {
		let paned = Paned::new(to_gtk_orientation(orientation));
		paned.set_vexpand(true);
		paned.set_hexpand(true);
		self.insert(paned.upcast())
	}

	fn create_box(&self, orientation: Orientation) -> WidgetId {
		let b = GtkBox::new(to_gtk_orientation(orientation), 0);
		b.set_vexpand(true);
		b.set_hexpand(true);
		self.insert(b.upcast())
	}

	fn set_start_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let p: Paned = self.widget(paned)?.downcast().map_err(|_| ToolkitError::NotAPaned(paned))?;
		match child {
			Some(id) => p.set_start_child(Some(&self.widget(id)?)),
			None => p.set_start_child(None::<&Widget>),
		}
		Ok(())
	}

	fn set_end_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let p: Paned = self.widget(paned)?.downcast().map_err(|_| ToolkitError::NotAPaned(paned))?;
		match child {
			Some(id) => p.set_end_child(Some(&self.widget(id)?)),
			None => p.set_end_child(None::<&Widget>),
		}
		Ok(())
	}

	fn box_append(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let b: GtkBox = self.widget(container)?.downcast().map_err(|_| ToolkitError::NotABox(container))?;
		b.append(&self.widget(child)?);
		Ok(())
	}

	fn box_remove(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let b: GtkBox = self.widget(container)?.downcast().map_err(|_| ToolkitError::NotABox(container))?;
		b.remove(&self.widget(child)?);
		Ok(())
	}

	fn unparent(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		self.widget(widget)?.unparent();
		Ok(())
	}

	fn parent_of(&self, widget: WidgetId) -> Result<Option<WidgetId>, ToolkitError> {
		let w = self.widget(widget)?;
		let Some(parent) = w.parent() else { return Ok(None) };
		let widgets = self.widgets.borrow();
		Ok(widgets.iter().find(|(_, candidate)| *candidate == &parent).map(|(idx, _)| WidgetId(idx as u64)))
	}

	fn allocation(&self, widget: WidgetId) -> Result<Allocation, ToolkitError> {
		let w = self.widget(widget)?;
		let a = w.allocation();
		Ok(Allocation {
			x: a.x(),
			y: a.y(),
			width: a.width(),
			height: a.height(),
		})
	}

	fn set_expand(&self, widget: WidgetId, horizontal: bool, vertical: bool) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let w = self.widget(widget)?;
		w.set_hexpand(horizontal);
		w.set_vexpand(vertical);
		Ok(())
	}

	fn set_size_request(&self, widget: WidgetId, size: Option<(i32, i32)>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let w = self.widget(widget)?;
		let (width, height) = size.unwrap_or((-1, -1));
		w.set_size_request(width, height);
		Ok(())
	}

	fn queue_allocate(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		let w = self.widget(widget)?;
		w.queue_allocate();
		Ok(())
	}

	fn add_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		self.widget(widget)?.add_css_class(class);
		Ok(())
	}

	fn remove_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		self.widget(widget)?.remove_css_class(class);
		Ok(())
	}

	fn has_style_class(&self, widget: WidgetId, class: &str) -> Result<bool, ToolkitError> {
		Ok(self.widget(widget)?.has_css_class(class))
	}

	fn add_hover_controller(&self, widget: WidgetId, mut callback: HoverCallback) -> Result<ControllerId, ToolkitError> {
		self.assert_ui_thread()?;
		let w = self.widget(widget)?;
		let motion = gtk4::EventControllerMotion::new();
		motion.connect_motion(move |_, x, y| callback(x, y));
		w.add_controller(motion);
		Ok(ControllerId(widget.0))
	}

	fn add_focus_controller(&self, widget: WidgetId, mut on_enter: FocusCallback, mut on_leave: FocusCallback) -> Result<ControllerId, ToolkitError> {
		self.assert_ui_thread()?;
		let w = self.widget(widget)?;
		let focus = gtk4::EventControllerFocus::new();
		focus.connect_enter(move |_| on_enter());
		focus.connect_leave(move |_| on_leave());
		w.add_controller(focus);
		Ok(ControllerId(widget.0))
	}

	fn grab_focus(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		self.widget(widget)?.grab_focus();
		Ok(())
	}

	fn destroy(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let w = self.widget(widget)?;
		w.unparent();
		self.widgets.borrow_mut().remove(widget.0 as usize);
		Ok(())
	}

	fn schedule_idle(&self, callback: IdleCallback) {
		glib::idle_add_once(move || callback());
	}

	fn iterate_main_loop_step(&self) -> bool {
		let ctx = glib::MainContext::default();
		ctx.iteration(false)
	}

	fn quit_main_loop(&self) {
		self.quit.set(true);
	}

	fn is_quit(&self) -> bool {
		self.quit.get()
	}
}
