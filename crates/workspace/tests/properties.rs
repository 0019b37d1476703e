//! Property tests for the invariants and FSM guarantees of §8.1: tree shape
//! and index bijection under random operation sequences (P1, P2, P9, P10),
//! focus validity (P3), and the priority/dedup/coalesce/reconciliation/ring
//! guarantees of the focus state machine (P4-P8, P11, P12).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use loom_toolkit::mock::MockGateway;
use loom_toolkit::{Orientation, ToolkitGateway};
use loom_workspace::focus::FocusMachine;
use loom_workspace::tree::{PaneFactory, WebViewId, WorkspaceTree};
use loom_workspace::{Direction, NodeId, Source, WorkspaceConfig, WorkspaceManager};

struct CountingFactory {
	gateway: Arc<MockGateway>,
	next: AtomicU64,
}

impl PaneFactory for CountingFactory {
	fn create_pane(&self) -> (WebViewId, loom_toolkit::WidgetId) {
		let id = self.next.fetch_add(1, Ordering::Relaxed);
		(WebViewId(5000 + id), self.gateway.create_box(Orientation::Horizontal))
	}
}

fn fresh_manager() -> (Arc<MockGateway>, WorkspaceManager) {
	let mock = Arc::new(MockGateway::new_on_current_thread());
	let root_container = mock.create_box(Orientation::Horizontal);
	let root_widget = mock.create_box(Orientation::Horizontal);
	mock.set_allocation(root_widget, loom_toolkit::Allocation { x: 0, y: 0, width: 4000, height: 4000 });
	let gateway: Arc<dyn ToolkitGateway + Send + Sync> = mock.clone();
	let factory: Arc<dyn PaneFactory> = Arc::new(CountingFactory { gateway: mock.clone(), next: AtomicU64::new(0) });
	let manager = WorkspaceManager::new(root_container, WebViewId(0), root_widget, gateway, factory, WorkspaceConfig::default());
	(mock, manager)
}

#[derive(Debug, Clone, Copy)]
enum FuzzOp {
	Split(Direction),
	Stack,
	Close,
}

fn fuzz_op() -> impl Strategy<Value = FuzzOp> {
	prop_oneof![
		Just(FuzzOp::Split(Direction::Left)),
		Just(FuzzOp::Split(Direction::Right)),
		Just(FuzzOp::Split(Direction::Up)),
		Just(FuzzOp::Split(Direction::Down)),
		Just(FuzzOp::Stack),
		Just(FuzzOp::Close),
	]
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	/// P1 + P2: after every operation in a random sequence (including ones
	/// that fail, e.g. geometry rejection or closing an already-gone node),
	/// the tree's webview index stays a bijection with its live leaves and
	/// every live node is still reachable from whatever the current root is.
	#[test]
	fn p1_p2_tree_stays_internally_consistent(ops in prop::collection::vec(fuzz_op(), 0..24)) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		rt.block_on(async {
			let (_mock, manager) = fresh_manager();
			let mut leaves: Vec<NodeId> = vec![manager.node_for_webview(WebViewId(0)).unwrap()];

			for op in ops {
				if leaves.is_empty() {
					break;
				}
				let target = leaves[0];
				match op {
					FuzzOp::Split(direction) => {
						if let Ok(new_leaf) = manager.split_pane(target, direction).await {
							leaves.push(new_leaf);
						}
					}
					FuzzOp::Stack => {
						if let Ok(new_leaf) = manager.stack_pane(target).await {
							leaves.push(new_leaf);
						}
					}
					FuzzOp::Close => {
						if manager.close_pane(target).await.is_ok() {
							leaves.retain(|&n| n != target);
						}
					}
				}
				prop_assert_eq!(manager.leaf_count(), manager.webview_count());
				prop_assert!(manager.validate_now().is_ok());
			}
			prop_assert_eq!(manager.leaf_count(), leaves.len());
		});
	}

	/// P3: whenever the focus driver reports an active node, that node
	/// resolves to a leaf present in the webview index.
	#[test]
	fn p3_active_node_is_always_a_live_leaf(splits in 0..6usize) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		rt.block_on(async {
			let (_mock, manager) = fresh_manager();
			let mut target = manager.node_for_webview(WebViewId(0)).unwrap();
			for _ in 0..splits {
				if let Ok(new_leaf) = manager.split_pane(target, Direction::Right).await {
					target = new_leaf;
				}
			}
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			if let Some(active) = manager.active_node() {
				prop_assert!(manager.leaf_widget(active).is_some());
			}
		});
	}

	/// P8: a horizontal split on a pane narrower than 2*300 is rejected with
	/// `GeometryTooSmall`, for any width under the threshold.
	#[test]
	fn p8_narrow_panes_reject_horizontal_split(width in 1i32..599) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		rt.block_on(async {
			let (mock, manager) = fresh_manager();
			let root = manager.node_for_webview(WebViewId(0)).unwrap();
			let widget = manager.leaf_widget(root).unwrap();
			mock.set_allocation(widget, loom_toolkit::Allocation { x: 0, y: 0, width, height: 4000 });
			let result = manager.split_pane(root, Direction::Right).await;
			prop_assert!(matches!(result, Err(loom_workspace::WorkspaceError::GeometryTooSmall { .. })));
		});
	}

	/// P9: closing the tree's current root either leaves a live leaf
	/// attached to the window, or quits the main loop; never both, never
	/// neither.
	#[test]
	fn p9_close_root_is_atomic(extra_splits in 0..4usize) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		rt.block_on(async {
			let (mock, manager) = fresh_manager();
			let mut root = manager.node_for_webview(WebViewId(0)).unwrap();
			for _ in 0..extra_splits {
				if let Ok(new_leaf) = manager.split_pane(root, Direction::Right).await {
					root = new_leaf;
				}
			}
			manager.close_pane(root).await.unwrap();
			let quit = mock.is_quit();
			let has_survivor = manager.leaf_count() > 0;
			prop_assert!(quit != has_survivor, "exactly one of {{quit main loop, surviving leaf}} must hold");
		});
	}

	/// P4: requests at the same priority are processed in submission order.
	#[test]
	fn p4_fifo_within_priority(count in 2usize..8) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		// Zero dedup/coalesce windows so every request is independently
		// queued, isolating pure priority-tier ordering from P6/P7.
		let mut fsm = FocusMachine::new(0, 0, 50, 3);
		for i in 0..count {
			fsm.request_focus(Some(root), if i % 2 == 0 { Source::Keyboard } else { Source::StackNav }).unwrap();
			std::thread::sleep(std::time::Duration::from_millis(1));
		}
		let mut order = Vec::new();
		while let Some(t) = fsm.process_next(&tree, &gateway) {
			order.push(t.source);
		}
		let mut expected = Vec::new();
		for i in 0..count {
			expected.push(if i % 2 == 0 { Source::Keyboard } else { Source::StackNav });
		}
		prop_assert_eq!(order, expected);
	}

	/// P5: a higher-priority request is never processed behind a
	/// lower-priority one that was already pending.
	#[test]
	fn p5_priority_supremacy(low_count in 1usize..6, high_count in 1usize..6) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		let mut fsm = FocusMachine::new(0, 0, 50, 3);
		for _ in 0..low_count {
			fsm.request_focus(Some(root), Source::Mouse).unwrap();
			std::thread::sleep(std::time::Duration::from_millis(1));
		}
		for _ in 0..high_count {
			fsm.request_focus(Some(root), Source::System).unwrap();
			std::thread::sleep(std::time::Duration::from_millis(1));
		}
		// Every System-sourced transition must be processed before any
		// Mouse-sourced one, since all Systems were enqueued with priority
		// 100 > Mouse's 50, regardless of submission order.
		let mut seen_mouse = false;
		while let Some(t) = fsm.process_next(&tree, &gateway) {
			if t.source == Source::Mouse {
				seen_mouse = true;
			}
			if t.source == Source::System {
				prop_assert!(!seen_mouse, "a System request was processed after a Mouse one");
			}
		}
	}

	/// P6: two identical (node, source) focus requests inside the dedup
	/// window collapse into at most one queued transition.
	#[test]
	fn p6_dedup_window_collapses_identical_requests(repeats in 2usize..10) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		let mut fsm = FocusMachine::new(200, 0, 50, 3);
		let mut queued = 0;
		for _ in 0..repeats {
			if fsm.request_focus(Some(root), Source::Keyboard).unwrap() {
				queued += 1;
			}
		}
		prop_assert_eq!(queued, 1);
	}

	/// P7: multiple distinct-source requests to the same target within the
	/// coalesce window still collapse to a single queued transition.
	#[test]
	fn p7_coalesce_window_collapses_same_target(repeats in 2usize..6) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		let mut fsm = FocusMachine::new(0, 500, 50, 3);
		let sources = [Source::Keyboard, Source::Mouse, Source::Programmatic, Source::StackNav, Source::Close, Source::Split];
		let mut queued = 0;
		for i in 0..repeats {
			if fsm.request_focus(Some(root), sources[i % sources.len()]).unwrap() {
				queued += 1;
			}
		}
		prop_assert_eq!(queued, 1);
	}

	/// P11: reconciliation never runs more than the configured cap within a
	/// rolling second, even when every tick finds the CSS inconsistent.
	#[test]
	fn p11_reconciliation_cap_is_never_exceeded(cap in 1u32..5, ticks in 1usize..12) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		let mut fsm = FocusMachine::new(0, 0, 50, cap);
		fsm.request_focus(Some(root), Source::Keyboard).unwrap();
		fsm.process_next(&tree, &gateway);

		// Force every CSS check to read inconsistent by stripping the class
		// right back off after the real transition applied it.
		let widget = tree.node(root).unwrap().kind.container();
		let _ = gateway.remove_style_class(widget, "active");

		let mut ran = 0;
		for _ in 0..ticks {
			if fsm.reconcile(&tree, &gateway) {
				ran += 1;
			}
			let _ = gateway.remove_style_class(widget, "active");
		}
		prop_assert!(ran <= cap as usize);
	}

	/// P12: the transition ring never grows past its configured capacity.
	#[test]
	fn p12_ring_never_exceeds_capacity(capacity in 1usize..20, pushes in 0usize..60) {
		let gateway = MockGateway::new_on_current_thread();
		let root_container = gateway.create_box(Orientation::Horizontal);
		let root_widget = gateway.create_box(Orientation::Horizontal);
		let tree = WorkspaceTree::new(root_container, WebViewId(0), root_widget, 50);
		let root = tree.root().unwrap();

		let mut fsm = FocusMachine::new(0, 0, capacity, 1000);
		for _ in 0..pushes {
			if fsm.request_focus(Some(root), Source::Programmatic).unwrap() {
				fsm.process_next(&tree, &gateway);
			}
			// Alternate sources so dedup never blocks re-queuing and every
			// iteration genuinely pushes a transition onto the ring.
			if fsm.request_focus(Some(root), Source::Mouse).unwrap() {
				fsm.process_next(&tree, &gateway);
			}
		}
		prop_assert!(fsm.history().len() <= capacity);
	}
}
