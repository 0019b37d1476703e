//! Widget-operation transactions: ordered, rollback-capable batches of
//! toolkit mutations (C5).
//!
//! # Purpose
//!
//! A [`WidgetTransaction`] is how every structural operation touches the
//! toolkit. Operations are sorted by priority (descending, ties by
//! insertion order) and executed sequentially; the first failure rolls back
//! every operation already executed, in reverse order, using each
//! operation's own `rollback`.
//!
//! Rollback for [`Op::Unparent`] is best-effort (the source system this was
//! modeled on cannot always put a widget back exactly where it was); the
//! tombstone mechanism in [`crate::tree`] is what gives callers a *total*
//! model-level undo regardless of how well a given widget operation's
//! rollback worked (§9 design notes).

use loom_toolkit::{ToolkitError, ToolkitGateway, WidgetId};

/// One of the four library widget operations (§4.5), or a caller-supplied
/// closure pair for anything else a structural operation needs.
pub enum Op {
	/// Detach a widget from its current parent, if parented.
	Unparent { widget: WidgetId },
	/// Move `child` to be the start-or-end child of `divider`.
	Reparent { divider: WidgetId, child: WidgetId, start: bool },
	/// Show or hide a widget (vertical expand toggle stands in for visibility
	/// in the absence of a dedicated toolkit primitive).
	VisibilityToggle { widget: WidgetId, visible: bool },
	/// Add or remove a style class.
	StyleClassToggle { widget: WidgetId, class: &'static str, add: bool },
}

/// A single entry in a [`WidgetTransaction`].
pub struct WidgetOperation {
	pub description: &'static str,
	pub priority: i32,
	op: Op,
	/// Captured by `execute` so `rollback` knows what to undo; `None` until run.
	undo: Option<Op>,
	pub executed: bool,
}

impl WidgetOperation {
	pub fn new(description: &'static str, priority: i32, op: Op) -> Self {
		Self { description, priority, op, undo: None, executed: false }
	}

	pub fn unparent(widget: WidgetId) -> Self {
		Self::new("unparent", 0, Op::Unparent { widget })
	}

	pub fn reparent(divider: WidgetId, child: WidgetId, start: bool) -> Self {
		Self::new("reparent", 0, Op::Reparent { divider, child, start })
	}

	pub fn visibility(widget: WidgetId, visible: bool) -> Self {
		Self::new("visibility-toggle", 0, Op::VisibilityToggle { widget, visible })
	}

	pub fn style_class(widget: WidgetId, class: &'static str, add: bool) -> Self {
		Self::new("style-class-toggle", 0, Op::StyleClassToggle { widget, class, add })
	}

	pub fn with_priority(mut self, priority: i32) -> Self {
		self.priority = priority;
		self
	}

	fn execute(&mut self, gateway: &dyn ToolkitGateway) -> Result<(), ToolkitError> {
		match &self.op {
			Op::Unparent { widget } => {
				let old_parent = gateway.parent_of(*widget)?;
				gateway.unparent(*widget)?;
				// Best-effort: we don't know which side `widget` occupied, so
				// rollback can only attempt re-parenting as a start child.
				self.undo = old_parent.map(|p| Op::Reparent { divider: p, child: *widget, start: true });
			}
			Op::Reparent { divider, child, start } => {
				let old_parent = gateway.parent_of(*child)?;
				gateway.unparent(*child)?;
				if *start {
					gateway.set_start_child(*divider, Some(*child))?;
				} else {
					gateway.set_end_child(*divider, Some(*child))?;
				}
				self.undo = old_parent.map(|p| Op::Reparent { divider: p, child: *child, start: true });
			}
			Op::VisibilityToggle { widget, visible } => {
				let was_visible = gateway.has_style_class(*widget, "loom-hidden").map(|hidden| !hidden)?;
				if *visible {
					gateway.remove_style_class(*widget, "loom-hidden")?;
				} else {
					gateway.add_style_class(*widget, "loom-hidden")?;
				}
				self.undo = Some(Op::VisibilityToggle { widget: *widget, visible: was_visible });
			}
			Op::StyleClassToggle { widget, class, add } => {
				let was_present = gateway.has_style_class(*widget, class)?;
				if *add {
					gateway.add_style_class(*widget, class)?;
				} else {
					gateway.remove_style_class(*widget, class)?;
				}
				self.undo = Some(Op::StyleClassToggle { widget: *widget, class: *class, add: was_present });
			}
		}
		self.executed = true;
		Ok(())
	}

	fn rollback(&mut self, gateway: &dyn ToolkitGateway) -> Result<(), ToolkitError> {
		if !self.executed {
			return Ok(());
		}
		let result = match self.undo.take() {
			Some(Op::Reparent { divider, child, start }) => {
				if start {
					gateway.set_start_child(divider, Some(child))
				} else {
					gateway.set_end_child(divider, Some(child))
				}
			}
			Some(Op::VisibilityToggle { widget, visible }) => {
				if visible {
					gateway.remove_style_class(widget, "loom-hidden")
				} else {
					gateway.add_style_class(widget, "loom-hidden")
				}
			}
			Some(Op::StyleClassToggle { widget, class, add }) => {
				if add {
					gateway.add_style_class(widget, class)
				} else {
					gateway.remove_style_class(widget, class)
				}
			}
			Some(Op::Unparent { .. }) | None => Ok(()),
		};
		self.executed = false;
		result
	}
}

/// Outcome of executing every operation that ran before a transaction either
/// committed or failed.
#[derive(Debug)]
pub struct TransactionResult {
	pub committed: bool,
	pub rolled_back: bool,
	pub failure: Option<ToolkitError>,
	pub rollback_failures: Vec<ToolkitError>,
}

/// Ordered batch of widget mutations with per-operation rollback (§4.5).
pub struct WidgetTransaction {
	pub id: u64,
	operations: Vec<WidgetOperation>,
	committed: bool,
	rolled_back: bool,
}

impl WidgetTransaction {
	pub fn new(id: u64) -> Self {
		Self { id, operations: Vec::new(), committed: false, rolled_back: false }
	}

	/// Appends an operation. Rejected once the transaction has committed or
	/// rolled back.
	pub fn add(&mut self, op: WidgetOperation) -> bool {
		if self.committed || self.rolled_back {
			return false;
		}
		self.operations.push(op);
		true
	}

	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}

	/// Sorts by priority descending (stable, so ties keep insertion order),
	/// runs each operation in turn, and on the first failure rolls back
	/// everything already executed, in reverse order.
	pub fn execute(&mut self, gateway: &dyn ToolkitGateway) -> TransactionResult {
		self.operations.sort_by(|a, b| b.priority.cmp(&a.priority));
		let mut failure = None;
		for i in 0..self.operations.len() {
			if let Err(e) = self.operations[i].execute(gateway) {
				tracing::error!(transaction = self.id, operation = self.operations[i].description, error = %e, "widget operation failed");
				failure = Some(e);
				break;
			}
		}
		if let Some(err) = failure {
			let mut rollback_failures = Vec::new();
			for op in self.operations.iter_mut().rev() {
				if let Err(e) = op.rollback(gateway) {
					rollback_failures.push(e);
				}
			}
			self.rolled_back = true;
			TransactionResult { committed: false, rolled_back: true, failure: Some(err), rollback_failures }
		} else {
			self.committed = true;
			TransactionResult { committed: true, rolled_back: false, failure: None, rollback_failures: Vec::new() }
		}
	}

	/// Idempotent relative to already-applied operations: calling this after
	/// `execute` already rolled back is a no-op.
	pub fn rollback(&mut self, gateway: &dyn ToolkitGateway) -> Vec<ToolkitError> {
		if self.rolled_back {
			return Vec::new();
		}
		let mut failures = Vec::new();
		for op in self.operations.iter_mut().rev() {
			if let Err(e) = op.rollback(gateway) {
				failures.push(e);
			}
		}
		self.rolled_back = true;
		failures
	}

	pub fn commit(&mut self) {
		self.committed = true;
	}
}

/// Keeps an active map and bounded history of transaction results, as §4.5
/// describes for the global transaction manager. `loom-workspace` keys the
/// active map by transaction id rather than exposing it directly; see
/// [`crate::worker::WorkerPool`] for the one caller that needs it.
pub struct TransactionHistory {
	capacity: usize,
	entries: std::collections::VecDeque<(u64, TransactionResult)>,
}

impl TransactionHistory {
	pub fn new(capacity: usize) -> Self {
		Self { capacity, entries: std::collections::VecDeque::with_capacity(capacity) }
	}

	pub fn record(&mut self, id: u64, result: TransactionResult) {
		if self.entries.len() >= self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back((id, result));
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
