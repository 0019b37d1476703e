//! Error taxonomy surfaced by the workspace core (§7).

use crate::tree::NodeId;
use crate::validator::ValidationError;

pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

/// Why a structural or focus operation failed.
///
/// Pre-operation variants ([`InvalidTarget`](Self::InvalidTarget),
/// [`GeometryTooSmall`](Self::GeometryTooSmall), and
/// [`TreeInvariantViolation`](Self::TreeInvariantViolation) raised from a
/// pre-check) are returned without the tree having been touched. Everything
/// else reflects a failure partway through an operation that has already
/// been rolled back at the model level.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
	#[error("invalid target {node:?}: {reason}")]
	InvalidTarget { node: Option<NodeId>, reason: &'static str },

	#[error("invalid stack operation: {reason}")]
	InvalidStackOperation { reason: &'static str },

	#[error("{axis} {have} < required {need}")]
	GeometryTooSmall { axis: &'static str, have: i32, need: i32 },

	#[error("tree invariant violated: {0}")]
	TreeInvariantViolation(#[from] ValidationError),

	#[error("operation queue is full")]
	OperationQueueFull,

	#[error("operation conflicted with an in-flight write after exhausting retries")]
	OperationConflict,

	#[error("operation timed out")]
	OperationTimeout,

	#[error("workspace is shutting down")]
	ShuttingDown,

	#[error("widget transaction failed for operation {operation_id}: {source}")]
	WidgetTransactionFailed {
		operation_id: u64,
		#[source]
		source: loom_toolkit::ToolkitError,
	},
}

impl WorkspaceError {
	pub fn invalid_target(node: Option<NodeId>, reason: &'static str) -> Self {
		Self::InvalidTarget { node, reason }
	}
}
