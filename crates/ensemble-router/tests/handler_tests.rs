//! Connection Handler Tests (ensemble-router)
//!
//! Drives `RouterCore` directly with recording doubles:
//! - Connect/close bookkeeping and client notifications
//! - Routing output per mode
//! - Control envelopes (setMode, requestActive)
//! - Malformed and oversized input
//! - Delivery to closed connections

use ensemble_core::{Arg, ClientMessage, RoutedMessage, RoutingMode};
use ensemble_router::{RouterConfig, RouterCore, RouterError};
use ensemble_test_utils::{assert_approx_eq, RecordingEmitter, RecordingSender};
use std::sync::Arc;

struct Harness {
    core: RouterCore,
    emitter: RecordingEmitter,
    clients: Vec<RecordingSender>,
}

impl Harness {
    fn new(mode: RoutingMode) -> Self {
        Self::with_config(RouterConfig {
            initial_mode: mode,
            ..Default::default()
        })
    }

    fn with_config(config: RouterConfig) -> Self {
        let emitter = RecordingEmitter::new();
        let core = RouterCore::new(&config, Arc::new(emitter.clone())).unwrap();
        Self {
            core,
            emitter,
            clients: Vec::new(),
        }
    }

    /// Connect a client; returns its id
    fn connect(&mut self) -> u64 {
        let sender = RecordingSender::new();
        self.clients.push(sender.clone());
        self.core.on_connect(Arc::new(sender)).id
    }

    fn client(&self, id: u64) -> &RecordingSender {
        &self.clients[(id - 1) as usize]
    }

    fn send(&mut self, id: u64, json: &str) {
        self.core.on_message(id, json.as_bytes());
    }

    fn set_mode(&mut self, id: u64, mode: &str) {
        self.send(id, &format!(r#"{{"type":"setMode","mode":"{}"}}"#, mode));
    }

    fn clear(&self) {
        self.emitter.clear();
        for c in &self.clients {
            c.clear();
        }
    }
}

fn msg(address: &str, args: Vec<f64>) -> RoutedMessage {
    RoutedMessage::new(address, args.into_iter().map(Arg::Number).collect())
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_invalid_zone_count_rejected() {
    let result = RouterCore::new(
        &RouterConfig {
            zone_count: 6,
            ..Default::default()
        },
        Arc::new(RecordingEmitter::new()),
    );
    assert!(matches!(result, Err(RouterError::InvalidZoneCount(6))));
}

#[test]
fn test_connect_sends_snapshot_then_count() {
    let mut h = Harness::new(RoutingMode::Separate);
    let id = h.connect();

    let messages = h.client(id).messages();
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        ClientMessage::State(s) => {
            assert_eq!(s.user_id, 1);
            assert_eq!(s.mode, RoutingMode::Separate);
            assert_eq!(s.total_users, 1);
            assert_eq!(s.zone, None);
            assert!(s.is_active);
        }
        other => panic!("Expected snapshot first, got {:?}", other),
    }
    assert_eq!(messages[1], ClientMessage::UserCount { count: 1 });
}

#[test]
fn test_connect_broadcasts_count_to_everyone() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    let b = h.connect();
    let c = h.connect();

    assert_eq!(h.client(a).user_counts(), vec![1, 2, 3]);
    assert_eq!(h.client(b).user_counts(), vec![2, 3]);
    assert_eq!(h.client(c).user_counts(), vec![3]);
    assert_eq!(h.core.session_count(), 3);
}

#[test]
fn test_close_broadcasts_count_to_remaining() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    let b = h.connect();
    h.clear();

    h.core.on_close(a);

    assert_eq!(h.client(b).user_counts(), vec![1]);
    assert_eq!(h.client(a).frame_count(), 0);
    assert!(h.core.registry().get(a).is_none());
    assert_eq!(h.core.registry().aggregate_count(), 1);
}

#[test]
fn test_close_twice_is_noop() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    let b = h.connect();
    h.core.on_close(a);
    h.clear();

    h.core.on_close(a);
    assert_eq!(h.client(b).frame_count(), 0);
}

#[test]
fn test_ids_never_reused() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    h.core.on_close(a);
    let b = h.connect();

    assert_eq!((a, b), (1, 2));
}

#[test]
fn test_messages_after_close_ignored() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    h.core.on_close(a);
    h.clear();

    h.send(a, r#"{"address":"/press","args":[1]}"#);
    assert!(h.emitter.messages().is_empty());
}

// ============================================================================
// Routing Tests
// ============================================================================

#[test]
fn test_separate_press() {
    let mut h = Harness::new(RoutingMode::Separate);
    let id = h.connect();

    h.send(id, r#"{"address":"/press","args":[1]}"#);

    assert_eq!(
        h.emitter.messages(),
        vec![msg("/user/1/press", vec![1.0]), msg("/users/count", vec![1.0])]
    );
}

#[test]
fn test_separate_prefixes_sender_id() {
    let mut h = Harness::new(RoutingMode::Separate);
    for _ in 0..5 {
        h.connect();
    }

    h.send(5, r#"{"address":"/mouse/x","args":[0.7]}"#);

    assert_eq!(
        h.emitter.messages(),
        vec![msg("/user/5/mouse/x", vec![0.7]), msg("/users/count", vec![5.0])]
    );
}

#[test]
fn test_single_ignores_inactive() {
    let mut h = Harness::new(RoutingMode::Single);
    let a = h.connect();
    let b = h.connect();

    h.send(b, r#"{"address":"/mouse/x","args":[0.2]}"#);
    assert!(h.emitter.messages().is_empty());

    h.send(a, r#"{"address":"/mouse/x","args":[0.2]}"#);
    assert_eq!(
        h.emitter.messages(),
        vec![msg("/mouse/x", vec![0.2]), msg("/active/user", vec![1.0])]
    );
}

#[test]
fn test_blended_mean_after_second_event() {
    let mut h = Harness::new(RoutingMode::Blended);
    let a = h.connect();
    let b = h.connect();

    h.send(a, r#"{"address":"/mouse/xy","args":[0,0]}"#);
    h.emitter.clear();
    h.send(b, r#"{"address":"/mouse/xy","args":[1,1]}"#);

    let xy = h.emitter.for_address("/mouse/xy");
    assert_eq!(xy, vec![msg("/mouse/xy", vec![0.5, 0.5])]);
    assert_eq!(
        h.emitter.addresses(),
        vec!["/mouse/x", "/mouse/y", "/mouse/xy", "/users/count"]
    );
}

#[test]
fn test_blended_first_event_includes_seeded_peer() {
    let mut h = Harness::new(RoutingMode::Blended);
    let a = h.connect();
    h.connect();

    h.send(a, r#"{"address":"/mouse/x","args":[0.1]}"#);

    let x = h.emitter.for_address("/mouse/x");
    assert_approx_eq(x[0].args[0].as_f64().unwrap(), 0.3, 1e-9, "mean x");
    assert_eq!(
        h.emitter.for_address("/users/count"),
        vec![msg("/users/count", vec![2.0])]
    );
}

#[test]
fn test_zones_output() {
    let mut h = Harness::new(RoutingMode::Zones);
    let a = h.connect();
    let b = h.connect();
    assert_eq!(h.client(b).last_snapshot().unwrap().zone, Some(2));

    h.send(a, r#"{"address":"/mouse/xy","args":[0.2,0.2]}"#);
    h.send(b, r#"{"address":"/mouse/xy","args":[0.2,0.2]}"#);

    assert_eq!(
        h.emitter.messages(),
        vec![
            msg("/zone/1/mouse/xy", vec![0.2, 0.2]),
            msg("/zone/1/active", vec![1.0]),
            msg("/zone/2/mouse/xy", vec![0.2, 0.2]),
            msg("/zone/2/active", vec![0.0]),
        ]
    );
}

#[test]
fn test_text_args_forwarded() {
    let mut h = Harness::new(RoutingMode::Separate);
    let id = h.connect();

    h.send(id, r#"{"address":"/label","args":["hello",2]}"#);

    assert_eq!(
        h.emitter.messages()[0],
        RoutedMessage::new(
            "/user/1/label",
            vec![Arg::Text("hello".into()), Arg::Number(2.0)]
        )
    );
}

#[test]
fn test_last_position_tracked_in_every_mode() {
    for mode in RoutingMode::ALL {
        let mut h = Harness::new(mode);
        let id = h.connect();
        h.send(id, r#"{"address":"/mouse/xy","args":[0.1,0.9]}"#);
        assert_eq!(
            h.core.registry().get(id).unwrap().last_position,
            (0.1, 0.9),
            "mode {}",
            mode
        );
    }
}

// ============================================================================
// Control Tests
// ============================================================================

#[test]
fn test_set_mode_broadcasts_snapshots() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    let b = h.connect();
    h.clear();

    h.set_mode(a, "single");

    assert_eq!(h.core.mode(), RoutingMode::Single);
    let sa = h.client(a).last_snapshot().unwrap();
    let sb = h.client(b).last_snapshot().unwrap();
    assert_eq!(sa.mode, RoutingMode::Single);
    assert!(sa.is_active);
    assert!(!sb.is_active);
    assert_eq!(sb.total_users, 2);
}

#[test]
fn test_set_mode_is_idempotent() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    h.connect();

    h.set_mode(a, "zones");
    let first: Vec<_> = h.core.registry().all().map(|s| s.zone).collect();
    let snapshot = h.client(a).last_snapshot();
    h.clear();

    h.set_mode(a, "zones");
    let second: Vec<_> = h.core.registry().all().map(|s| s.zone).collect();

    assert_eq!(first, second);
    assert_eq!(h.client(a).last_snapshot(), snapshot);
}

#[test]
fn test_unknown_mode_rejected() {
    let mut h = Harness::new(RoutingMode::Blended);
    let a = h.connect();
    h.clear();

    h.set_mode(a, "chaos");

    assert_eq!(h.core.mode(), RoutingMode::Blended);
    assert_eq!(h.client(a).frame_count(), 0);
}

#[test]
fn test_zones_assigned_on_entry() {
    let mut h = Harness::new(RoutingMode::Separate);
    let ids: Vec<_> = (0..5).map(|_| h.connect()).collect();

    h.set_mode(ids[0], "zones");

    let zones: Vec<_> = ids
        .iter()
        .map(|id| h.client(*id).last_snapshot().unwrap().zone)
        .collect();
    assert_eq!(zones, vec![Some(1), Some(2), Some(3), Some(4), Some(1)]);
}

#[test]
fn test_zone_hidden_outside_zones_mode() {
    let mut h = Harness::new(RoutingMode::Zones);
    let a = h.connect();
    assert_eq!(h.core.snapshot_for(a).unwrap().zone, Some(1));

    h.set_mode(a, "separate");
    assert_eq!(h.core.snapshot_for(a).unwrap().zone, None);
    assert_eq!(h.core.registry().get(a).unwrap().zone, Some(1));
}

#[test]
fn test_request_active() {
    let mut h = Harness::new(RoutingMode::Single);
    let a = h.connect();
    let b = h.connect();
    h.clear();

    h.send(b, r#"{"type":"requestActive"}"#);

    assert_eq!(h.core.policy().active_user(), Some(b));
    assert!(!h.client(a).last_snapshot().unwrap().is_active);
    assert!(h.client(b).last_snapshot().unwrap().is_active);
}

#[test]
fn test_request_active_ignored_outside_single() {
    let mut h = Harness::new(RoutingMode::Separate);
    h.connect();
    let b = h.connect();
    h.clear();

    h.send(b, r#"{"type":"requestActive"}"#);

    assert_eq!(h.core.policy().active_user(), Some(1));
    assert_eq!(h.client(b).frame_count(), 0);
}

#[test]
fn test_active_leaves_in_single() {
    let mut h = Harness::new(RoutingMode::Single);
    let a = h.connect();
    let b = h.connect();
    let c = h.connect();
    h.clear();

    h.core.on_close(a);

    assert_eq!(h.core.policy().active_user(), Some(b));
    assert!(h.client(b).last_snapshot().unwrap().is_active);
    assert!(!h.client(c).last_snapshot().unwrap().is_active);
    assert_eq!(h.client(c).user_counts(), vec![2]);
}

#[test]
fn test_inactive_leaves_without_snapshots() {
    let mut h = Harness::new(RoutingMode::Single);
    h.connect();
    let b = h.connect();
    h.clear();

    h.core.on_close(b);

    assert!(h.client(1).snapshots().is_empty());
    assert_eq!(h.client(1).user_counts(), vec![1]);
}

// ============================================================================
// Negative Tests
// ============================================================================

#[test]
fn test_malformed_input_dropped() {
    let mut h = Harness::new(RoutingMode::Separate);
    let id = h.connect();
    h.clear();

    for bad in [
        "not json",
        "{}",
        "[1,2,3]",
        r#"{"address":"/press"}"#,
        r#"{"args":[1]}"#,
        r#"{"address":"","args":[1]}"#,
        r#"{"address":"/press","args":[true]}"#,
        r#"{"type":"setMode"}"#,
        r#"{"type":"teleport"}"#,
    ] {
        h.send(id, bad);
    }

    assert!(h.emitter.messages().is_empty());
    assert_eq!(h.client(id).frame_count(), 0);

    h.send(id, r#"{"address":"/press","args":[1]}"#);
    assert_eq!(h.emitter.messages().len(), 2, "connection still usable");
}

#[test]
fn test_oversized_frame_dropped() {
    let mut h = Harness::with_config(RouterConfig {
        max_message_size: 64,
        ..Default::default()
    });
    let id = h.connect();

    let padding = "x".repeat(100);
    h.send(id, &format!(r#"{{"address":"/{}","args":[1]}}"#, padding));
    assert!(h.emitter.messages().is_empty());

    h.send(id, r#"{"address":"/press","args":[1]}"#);
    assert_eq!(h.emitter.messages().len(), 2);
}

#[test]
fn test_closed_connection_skipped() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    let b = h.connect();
    h.clear();

    h.client(a).set_connected(false);
    h.connect();

    assert_eq!(h.client(a).frame_count(), 0);
    assert_eq!(h.client(b).user_counts(), vec![3]);
}

#[test]
fn test_shutdown_closes_emitter() {
    let mut h = Harness::new(RoutingMode::Separate);
    let a = h.connect();
    h.connect();

    let senders = h.core.shutdown();

    assert_eq!(senders.len(), 2);
    assert_eq!(h.core.session_count(), 0);
    assert_eq!(h.core.policy().active_user(), None);

    h.send(a, r#"{"address":"/press","args":[1]}"#);
    assert!(h.emitter.messages().is_empty());
}
