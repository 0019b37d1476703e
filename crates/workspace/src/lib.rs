//! Workspace pane subsystem: the tree of browser panes, the operations that
//! mutate it, and the focus state machine layered on top.
//!
//! # Purpose
//!
//! - Owns: the live binary tree of [`tree::PaneNode`]s, the worker pool that
//!   serializes structural mutations, the focus state machine, and the
//!   public [`manager::WorkspaceManager`] entry point external code talks to.
//! - Does not own: web content, URI/HTTP handling, persistence, key routing,
//!   or the native widgets themselves — those live behind
//!   [`loom_toolkit::ToolkitGateway`], the only way this crate touches the
//!   toolkit.
//! - Source of truth: [`manager::WorkspaceManager`]. Everything else in this
//!   crate is reachable through it or through the types it returns.
//!
//! # Module map
//!
//! | Module | Role |
//! |---|---|
//! | [`error`] | the [`error::WorkspaceError`] taxonomy |
//! | [`config`] | tunables and debug flags |
//! | [`tree`] | the pane arena and its split/close/stack/navigate algorithms |
//! | [`geometry`] | minimum-size gating before a structural op runs |
//! | [`validator`] | pure structural-invariant checker |
//! | [`transaction`] | ordered, rollback-capable widget mutation batches |
//! | [`worker`] | the bounded operation queue and worker pool |
//! | [`rebalancer`] | post-close allocation propagation |
//! | [`focus`] | the prioritized, deduplicated focus state machine |
//! | [`diagnostics`] | guarded tree snapshots |
//! | [`manager`] | composition root |
#![cfg_attr(test, allow(unused_crate_dependencies))]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod focus;
pub mod geometry;
pub mod manager;
pub mod rebalancer;
pub mod transaction;
pub mod tree;
pub mod validator;
pub mod worker;

pub use config::WorkspaceConfig;
pub use error::{WorkspaceError, WorkspaceResult};
pub use manager::WorkspaceManager;
pub use tree::{Direction, NodeId, WebViewId};

/// Source of a structural or focus request, used for priority and dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
	Keyboard,
	Mouse,
	Programmatic,
	System,
	StackNav,
	Split,
	Close,
}

impl Source {
	/// Priority per §4.8: System=100, {Keyboard,StackNav,Split,Close}=90,
	/// {Programmatic,Mouse}=50, anything else (reserved for future sources)=10.
	pub fn priority(self) -> u8 {
		match self {
			Source::System => 100,
			Source::Keyboard | Source::StackNav | Source::Split | Source::Close => 90,
			Source::Programmatic | Source::Mouse => 50,
		}
	}
}
