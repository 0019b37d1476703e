//! Geometry validator: decides whether a split or stack would produce
//! unusably small panes (C3).

use loom_toolkit::{Allocation, Orientation, ToolkitGateway, WidgetId};

use crate::config::WorkspaceConfig;
use crate::error::WorkspaceError;

/// Outcome of a geometry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOutcome {
	Valid,
	/// Before the first layout pass the widget reports a 0×0 allocation;
	/// this must not block startup splits, but the caller should revalidate
	/// once real allocation is available.
	ProvisionallyValid,
}

fn too_small(axis: &'static str, have: i32, need: i32) -> WorkspaceError {
	WorkspaceError::GeometryTooSmall { axis, have, need }
}

/// Checks whether splitting `widget` in `orientation` would leave both
/// halves at or above the minimum pane size.
pub fn validate_split(gateway: &dyn ToolkitGateway, widget: WidgetId, orientation: Orientation, config: &WorkspaceConfig) -> Result<GeometryOutcome, WorkspaceError> {
	let alloc = gateway.allocation(widget).unwrap_or_default();
	check(alloc, orientation, config.min_pane_width, config.min_pane_height)
}

/// Checks whether stacking `widget` would satisfy the stack minima (which
/// add room for a title bar).
pub fn validate_stack(gateway: &dyn ToolkitGateway, widget: WidgetId, config: &WorkspaceConfig) -> Result<GeometryOutcome, WorkspaceError> {
	let alloc = gateway.allocation(widget).unwrap_or_default();
	if alloc.is_zero() {
		return Ok(GeometryOutcome::ProvisionallyValid);
	}
	let need_height = config.min_pane_height + config.stack_title_bar_height;
	if alloc.height < need_height {
		return Err(too_small("height", alloc.height, need_height));
	}
	if alloc.width < config.min_pane_width {
		return Err(too_small("width", alloc.width, config.min_pane_width));
	}
	Ok(GeometryOutcome::Valid)
}

fn check(alloc: Allocation, orientation: Orientation, min_width: i32, min_height: i32) -> Result<GeometryOutcome, WorkspaceError> {
	if alloc.is_zero() {
		return Ok(GeometryOutcome::ProvisionallyValid);
	}
	match orientation {
		Orientation::Horizontal => {
			if alloc.width < 2 * min_width {
				return Err(too_small("width", alloc.width, 2 * min_width));
			}
			if alloc.height < min_height {
				return Err(too_small("height", alloc.height, min_height));
			}
		}
		Orientation::Vertical => {
			if alloc.height < 2 * min_height {
				return Err(too_small("height", alloc.height, 2 * min_height));
			}
			if alloc.width < min_width {
				return Err(too_small("width", alloc.width, min_width));
			}
		}
	}
	Ok(GeometryOutcome::Valid)
}
