//! In-memory [`ToolkitGateway`] used by tests and headless exercise of the
//! workspace logic.
//!
//! Mirrors the parent/child/allocation/style bookkeeping a real toolkit
//! would do, without linking against GTK. `MockGateway` is `Send + Sync` so
//! it can be shared with background operation workers the same way a real
//! gateway handle would be, but every widget-mutating call still panics if
//! invoked off the thread recorded at construction, matching the real
//! contract.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use slab::Slab;

use crate::{Allocation, ControllerId, FocusCallback, HoverCallback, IdleCallback, Orientation, ToolkitError, ToolkitGateway, WidgetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WidgetKind {
	Paned(Orientation),
	Box(Orientation),
	Leaf,
}

struct MockWidget {
	kind: WidgetKind,
	parent: Option<WidgetId>,
	start_child: Option<WidgetId>,
	end_child: Option<WidgetId>,
	box_children: Vec<WidgetId>,
	allocation: Allocation,
	style_classes: HashSet<String>,
	expand_h: bool,
	expand_v: bool,
	size_request: Option<(i32, i32)>,
}

impl MockWidget {
	fn new(kind: WidgetKind) -> Self {
		Self {
			kind,
			parent: None,
			start_child: None,
			end_child: None,
			box_children: Vec::new(),
			allocation: Allocation::default(),
			style_classes: HashSet::new(),
			expand_h: false,
			expand_v: false,
			size_request: None,
		}
	}
}

/// Headless toolkit gateway backed by a slab of synthetic widgets.
pub struct MockGateway {
	widgets: Mutex<Slab<MockWidget>>,
	idle_queue: Mutex<VecDeque<IdleCallback>>,
	next_controller: AtomicU64,
	ui_thread: ThreadId,
	quit: AtomicBool,
}

impl std::fmt::Debug for MockGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MockGateway").field("widget_count", &self.widgets.lock().len()).finish()
	}
}

impl MockGateway {
	/// Creates a gateway whose UI thread is the calling thread.
	pub fn new_on_current_thread() -> Self {
		Self {
			widgets: Mutex::new(Slab::new()),
			idle_queue: Mutex::new(VecDeque::new()),
			next_controller: AtomicU64::new(0),
			ui_thread: std::thread::current().id(),
			quit: AtomicBool::new(false),
		}
	}

	/// Directly sets a widget's allocation, simulating a layout pass.
	///
	/// Test-only helper: real backends compute this from actual window
	/// geometry; here the test drives it explicitly.
	pub fn set_allocation(&self, widget: WidgetId, allocation: Allocation) {
		if let Some(w) = self.widgets.lock().get_mut(widget.0 as usize) {
			w.allocation = allocation;
		}
	}

	/// Drains and runs every idle callback currently queued, simulating one
	/// or more steps of the main loop. Returns how many ran.
	pub fn pump_idle(&self) -> usize {
		let mut ran = 0;
		loop {
			let next = self.idle_queue.lock().pop_front();
			match next {
				Some(cb) => {
					cb();
					ran += 1;
				}
				None => break,
			}
		}
		ran
	}

	fn assert_ui_thread(&self) -> Result<(), ToolkitError> {
		if std::thread::current().id() == self.ui_thread { Ok(()) } else { Err(ToolkitError::NotOnUiThread) }
	}

	fn get(&self, slab: &Slab<MockWidget>, id: WidgetId) -> Result<(), ToolkitError> {
		if slab.contains(id.0 as usize) { Ok(()) } else { Err(ToolkitError::UnknownWidget(id)) }
	}
}

impl Default for MockGateway {
	fn default() -> Self {
		Self::new_on_current_thread()
	}
}

impl ToolkitGateway for MockGateway {
	fn is_ui_thread(&self) -> bool {
		std::thread::current().id() == self.ui_thread
	}

	fn create_paned(&self, orientation: Orientation) -> WidgetId {
		let mut widgets = self.widgets.lock();
		WidgetId(widgets.insert(MockWidget::new(WidgetKind::Paned(orientation))) as u64)
	}

	fn create_box(&self, orientation: Orientation) -> WidgetId {
		let mut widgets = self.widgets.lock();
		WidgetId(widgets.insert(MockWidget::new(WidgetKind::Box(orientation))) as u64)
	}

	fn set_start_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, paned)?;
		if !matches!(widgets[paned.0 as usize].kind, WidgetKind::Paned(_)) {
			return Err(ToolkitError::NotAPaned(paned));
		}
		if let Some(c) = child {
			self.get(&widgets, c)?;
		}
		let old = widgets[paned.0 as usize].start_child;
		widgets[paned.0 as usize].start_child = child;
		if let Some(c) = child {
			widgets[c.0 as usize].parent = Some(paned);
		}
		if let Some(old) = old
			&& Some(old) != child
			&& let Some(w) = widgets.get_mut(old.0 as usize)
		{
			w.parent = None;
		}
		Ok(())
	}

	fn set_end_child(&self, paned: WidgetId, child: Option<WidgetId>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, paned)?;
		if !matches!(widgets[paned.0 as usize].kind, WidgetKind::Paned(_)) {
			return Err(ToolkitError::NotAPaned(paned));
		}
		if let Some(c) = child {
			self.get(&widgets, c)?;
			widgets[c.0 as usize].parent = Some(paned);
		}
		let old = widgets[paned.0 as usize].end_child.take();
		widgets[paned.0 as usize].end_child = child;
		if let Some(old) = old
			&& Some(old) != child
			&& let Some(w) = widgets.get_mut(old.0 as usize)
		{
			w.parent = None;
		}
		Ok(())
	}

	fn box_append(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, container)?;
		self.get(&widgets, child)?;
		if !matches!(widgets[container.0 as usize].kind, WidgetKind::Box(_)) {
			return Err(ToolkitError::NotABox(container));
		}
		widgets[child.0 as usize].parent = Some(container);
		widgets[container.0 as usize].box_children.push(child);
		Ok(())
	}

	fn box_remove(&self, container: WidgetId, child: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, container)?;
		if !matches!(widgets[container.0 as usize].kind, WidgetKind::Box(_)) {
			return Err(ToolkitError::NotABox(container));
		}
		widgets[container.0 as usize].box_children.retain(|c| *c != child);
		if let Some(w) = widgets.get_mut(child.0 as usize)
			&& w.parent == Some(container)
		{
			w.parent = None;
		}
		Ok(())
	}

	fn unparent(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		let parent = widgets[widget.0 as usize].parent;
		if let Some(parent) = parent {
			if let Some(p) = widgets.get_mut(parent.0 as usize) {
				if p.start_child == Some(widget) {
					p.start_child = None;
				}
				if p.end_child == Some(widget) {
					p.end_child = None;
				}
				p.box_children.retain(|c| *c != widget);
			}
			widgets[widget.0 as usize].parent = None;
		}
		Ok(())
	}

	fn parent_of(&self, widget: WidgetId) -> Result<Option<WidgetId>, ToolkitError> {
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(widgets[widget.0 as usize].parent)
	}

	fn allocation(&self, widget: WidgetId) -> Result<Allocation, ToolkitError> {
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(widgets[widget.0 as usize].allocation)
	}

	fn set_expand(&self, widget: WidgetId, horizontal: bool, vertical: bool) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		widgets[widget.0 as usize].expand_h = horizontal;
		widgets[widget.0 as usize].expand_v = vertical;
		Ok(())
	}

	fn set_size_request(&self, widget: WidgetId, size: Option<(i32, i32)>) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		widgets[widget.0 as usize].size_request = size;
		Ok(())
	}

	fn queue_allocate(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(())
	}

	fn add_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		widgets[widget.0 as usize].style_classes.insert(class.to_string());
		Ok(())
	}

	fn remove_style_class(&self, widget: WidgetId, class: &str) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		widgets[widget.0 as usize].style_classes.remove(class);
		Ok(())
	}

	fn has_style_class(&self, widget: WidgetId, class: &str) -> Result<bool, ToolkitError> {
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(widgets[widget.0 as usize].style_classes.contains(class))
	}

	fn add_hover_controller(&self, widget: WidgetId, _callback: HoverCallback) -> Result<ControllerId, ToolkitError> {
		self.assert_ui_thread()?;
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(ControllerId(self.next_controller.fetch_add(1, Ordering::Relaxed)))
	}

	fn add_focus_controller(&self, widget: WidgetId, _on_enter: FocusCallback, _on_leave: FocusCallback) -> Result<ControllerId, ToolkitError> {
		self.assert_ui_thread()?;
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(ControllerId(self.next_controller.fetch_add(1, Ordering::Relaxed)))
	}

	fn grab_focus(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		let widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		Ok(())
	}

	fn destroy(&self, widget: WidgetId) -> Result<(), ToolkitError> {
		self.assert_ui_thread()?;
		self.unparent(widget)?;
		let mut widgets = self.widgets.lock();
		self.get(&widgets, widget)?;
		widgets.remove(widget.0 as usize);
		Ok(())
	}

	fn schedule_idle(&self, callback: IdleCallback) {
		self.idle_queue.lock().push_back(callback);
	}

	fn iterate_main_loop_step(&self) -> bool {
		let next = self.idle_queue.lock().pop_front();
		if let Some(cb) = next {
			cb();
		}
		!self.idle_queue.lock().is_empty()
	}

	fn quit_main_loop(&self) {
		self.quit.store(true, Ordering::SeqCst);
	}

	fn is_quit(&self) -> bool {
		self.quit.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn paned_reparents_children_on_replace() {
		let gw = MockGateway::new_on_current_thread();
		let paned = gw.create_paned(Orientation::Horizontal);
		let a = gw.create_box(Orientation::Vertical);
		let b = gw.create_box(Orientation::Vertical);
		gw.set_start_child(paned, Some(a)).unwrap();
		assert_eq!(gw.parent_of(a).unwrap(), Some(paned));
		gw.set_start_child(paned, Some(b)).unwrap();
		assert_eq!(gw.parent_of(a).unwrap(), None);
		assert_eq!(gw.parent_of(b).unwrap(), Some(paned));
	}

	#[test]
	fn schedule_idle_runs_on_pump() {
		let gw = MockGateway::new_on_current_thread();
		let ran = std::sync::Arc::new(AtomicBool::new(false));
		let ran2 = ran.clone();
		gw.schedule_idle(Box::new(move || ran2.store(true, Ordering::SeqCst)));
		assert!(!ran.load(Ordering::SeqCst));
		gw.pump_idle();
		assert!(ran.load(Ordering::SeqCst));
	}

	#[test]
	fn destroy_removes_widget_and_unparents() {
		let gw = MockGateway::new_on_current_thread();
		let container = gw.create_box(Orientation::Vertical);
		let child = gw.create_box(Orientation::Vertical);
		gw.box_append(container, child).unwrap();
		gw.destroy(child).unwrap();
		assert_eq!(gw.allocation(child), Err(ToolkitError::UnknownWidget(child)));
	}
}
