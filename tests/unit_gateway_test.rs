use bytes::Bytes;
use primegate::connection::{ConnectionWriter, Outbound};
use primegate::core::dispatcher::WorkDispatcher;
use primegate::core::events::{CompletionEvent, WorkUnit};
use primegate::core::gateway::{Gateway, GatewaySettings, HEALTH_CHECK_BODY, TransportEvent};
use primegate::core::identity::{ConnectionIdentity, IdentityMinter};
use primegate::core::protocol::{HttpResponse, StatusCode};
use primegate::core::pubsub::{InterruptBus, InterruptListener};
use primegate::core::queue::{WorkReceiver, work_queue};
use primegate::core::router::RouteResult;
use primegate::core::state::{ConnectionState, GatewayStats};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

const PRIME_REQUEST: &[u8] = b"GET /is_prime?possible_prime=17 HTTP/1.0\r\n\r\n";

struct Harness {
    gateway: Gateway,
    work: WorkReceiver,
    interrupts: InterruptListener,
    minter: IdentityMinter,
}

impl Harness {
    fn new(settings: GatewaySettings, bound: Option<usize>) -> Self {
        let (queue, work) = work_queue("gateway-test", bound);
        let interrupts = InterruptBus::new();
        let listener = interrupts.listener();
        let gateway = Gateway::new(
            settings,
            WorkDispatcher::new(queue),
            interrupts,
            Arc::new(GatewayStats::new()),
        );
        Self {
            gateway,
            work,
            interrupts: listener,
            minter: IdentityMinter::new(),
        }
    }

    fn standard() -> Self {
        Self::new(GatewaySettings::default(), None)
    }

    fn connect_as(
        &mut self,
        identity: ConnectionIdentity,
        now: Instant,
    ) -> UnboundedReceiver<Outbound> {
        let (writer, rx) = ConnectionWriter::channel();
        self.gateway
            .handle_transport(TransportEvent::Connected { identity, writer }, now);
        rx
    }

    fn connect(&mut self, now: Instant) -> (ConnectionIdentity, UnboundedReceiver<Outbound>) {
        let identity = self.minter.mint();
        let rx = self.connect_as(identity.clone(), now);
        (identity, rx)
    }

    fn send(&mut self, identity: &ConnectionIdentity, chunk: &[u8], now: Instant) {
        self.gateway.handle_transport(
            TransportEvent::Data {
                identity: identity.clone(),
                chunk: Bytes::copy_from_slice(chunk),
            },
            now,
        );
    }

    fn disconnect(&mut self, identity: &ConnectionIdentity) {
        self.gateway.handle_transport(
            TransportEvent::Disconnected {
                identity: identity.clone(),
            },
            Instant::now(),
        );
    }

    fn state_of(&self, identity: &ConnectionIdentity) -> Option<ConnectionState> {
        self.gateway.table().state_of(identity)
    }
}

fn expect_response(rx: &mut UnboundedReceiver<Outbound>) -> HttpResponse {
    match rx.try_recv() {
        Ok(Outbound::Response(response)) => response,
        other => panic!("Expected a response, got {other:?}"),
    }
}

fn expect_final_response(rx: &mut UnboundedReceiver<Outbound>) -> HttpResponse {
    let response = expect_response(rx);
    assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
    response
}

#[test]
fn test_complete_request_is_dispatched_once() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);

    h.send(&id, PRIME_REQUEST, now);

    assert_eq!(h.state_of(&id), Some(ConnectionState::RequestDispatched));
    let unit = h.work.try_dequeue().unwrap();
    assert_eq!(unit.identity, id);
    assert_eq!(&unit.payload[..], PRIME_REQUEST);
    assert!(h.work.try_dequeue().is_none());
    assert!(rx.try_recv().is_err());
    assert_eq!(h.gateway.stats().get_in_flight(), 1);
    assert_eq!(h.gateway.stats().get_requests_dispatched(), 1);
}

#[test]
fn test_completion_answers_and_closes() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);
    h.send(&id, PRIME_REQUEST, now);
    let unit = h.work.try_dequeue().unwrap();

    let result = h
        .gateway
        .handle_completion(CompletionEvent::success(&unit, "17"));
    assert_eq!(result, RouteResult::Delivered(StatusCode::Ok));

    let response = expect_final_response(&mut rx);
    assert_eq!(&response.body[..], b"17");
    assert!(h.gateway.table().is_empty());
    assert_eq!(h.gateway.stats().get_in_flight(), 0);
    assert_eq!(h.gateway.stats().get_open_connections(), 0);
}

#[test]
fn test_request_split_across_chunks() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, _rx) = h.connect(now);

    for chunk in PRIME_REQUEST.chunks(7) {
        assert!(h.work.try_dequeue().is_none());
        h.send(&id, chunk, now);
    }
    assert!(h.work.try_dequeue().is_some());
    assert!(h.work.try_dequeue().is_none());
}

#[test]
fn test_oversized_request_is_rejected() {
    let settings = GatewaySettings {
        max_request_size: 32,
        ..Default::default()
    };
    let mut h = Harness::new(settings, None);
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);

    h.send(&id, &[b'a'; 40], now);

    assert_eq!(expect_final_response(&mut rx).status, StatusCode::BadRequest);
    assert!(h.work.try_dequeue().is_none());
    assert_eq!(h.gateway.assembler().pending(), 0);
    assert!(h.gateway.table().is_empty());
}

#[test]
fn test_parse_errors_map_to_statuses() {
    let cases: [(&[u8], StatusCode); 4] = [
        (b"GET / HTTP/1.0\r\n\r\ntrailing", StatusCode::BadRequest),
        (b"BREW /pot HTTP/1.0\r\n\r\n", StatusCode::NotImplemented),
        (b"GET / HTTP/3\r\n\r\n", StatusCode::VersionNotSupported),
        (b"garbage\r\n\r\n", StatusCode::BadRequest),
    ];
    for (raw, status) in cases {
        let mut h = Harness::standard();
        let now = Instant::now();
        let (id, mut rx) = h.connect(now);
        h.send(&id, raw, now);
        assert_eq!(
            expect_final_response(&mut rx).status,
            status,
            "{:?}",
            String::from_utf8_lossy(raw)
        );
        assert!(h.work.try_dequeue().is_none());
    }
}

#[test]
fn test_full_queue_answers_500_and_releases_buffer() {
    let mut h = Harness::new(GatewaySettings::default(), Some(0));
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);

    h.send(&id, PRIME_REQUEST, now);

    assert_eq!(
        expect_final_response(&mut rx).status,
        StatusCode::InternalServerError
    );
    assert!(h.state_of(&id).is_none());
    assert_eq!(h.gateway.assembler().pending(), 0);
    assert_eq!(h.gateway.stats().get_in_flight(), 0);
}

#[test]
fn test_disconnect_without_data_leaves_nothing_behind() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);
    h.disconnect(&id);

    assert!(h.gateway.table().is_empty());
    assert_eq!(h.gateway.assembler().pending(), 0);
    assert!(h.work.try_dequeue().is_none());
    assert!(rx.try_recv().is_err());
    assert!(!h.interrupts.is_interrupted(&id));
}

#[test]
fn test_disconnect_with_partial_request_releases_buffer() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, _rx) = h.connect(now);
    h.send(&id, b"GET /is_pr", now);
    assert_eq!(h.gateway.assembler().pending(), 1);

    h.disconnect(&id);
    assert_eq!(h.gateway.assembler().pending(), 0);
}

#[test]
fn test_disconnect_after_dispatch_interrupts_and_orphans_result() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, _rx) = h.connect(now);
    h.send(&id, PRIME_REQUEST, now);
    let unit = h.work.try_dequeue().unwrap();

    h.disconnect(&id);
    assert!(h.interrupts.is_interrupted(&id));
    assert_eq!(h.gateway.stats().get_in_flight(), 0);

    let result = h
        .gateway
        .handle_completion(CompletionEvent::success(&unit, "17"));
    assert_eq!(result, RouteResult::Orphaned);
    assert_eq!(h.gateway.stats().get_orphan_events(), 1);
}

#[test]
fn test_second_request_while_dispatched_is_rejected_once() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);
    h.send(&id, PRIME_REQUEST, now);
    let unit = h.work.try_dequeue().unwrap();

    h.send(&id, PRIME_REQUEST, now);
    assert_eq!(expect_response(&mut rx).status, StatusCode::BadRequest);
    assert!(rx.try_recv().is_err(), "connection must stay open");
    assert_eq!(h.state_of(&id), Some(ConnectionState::RequestDispatched));

    h.send(&id, PRIME_REQUEST, now);
    assert!(rx.try_recv().is_err());
    assert!(h.work.try_dequeue().is_none());

    h.gateway
        .handle_completion(CompletionEvent::success(&unit, "17"));
    assert_eq!(&expect_final_response(&mut rx).body[..], b"17");
}

#[test]
fn test_stalled_request_is_swept() {
    let mut h = Harness::standard();
    let start = Instant::now();
    let (id, mut rx) = h.connect(start);
    h.send(&id, b"GET /is_prime", start);

    h.gateway.sweep(start + Duration::from_secs(5));
    assert!(rx.try_recv().is_err());

    h.gateway.sweep(start + Duration::from_secs(11));
    assert_eq!(expect_final_response(&mut rx).status, StatusCode::BadRequest);
    assert_eq!(h.gateway.assembler().pending(), 0);
    assert!(h.gateway.table().is_empty());
}

#[test]
fn test_idle_connection_is_swept() {
    let mut h = Harness::standard();
    let start = Instant::now();
    let (_id, mut rx) = h.connect(start);

    h.gateway.sweep(start + Duration::from_secs(11));
    assert_eq!(expect_final_response(&mut rx).status, StatusCode::BadRequest);
}

#[test]
fn test_unanswered_request_times_out() {
    let mut h = Harness::standard();
    let start = Instant::now();
    let (id, mut rx) = h.connect(start);
    h.send(&id, PRIME_REQUEST, start);
    let unit = h.work.try_dequeue().unwrap();

    h.gateway.sweep(start + Duration::from_secs(29));
    assert!(rx.try_recv().is_err());

    h.gateway.sweep(start + Duration::from_secs(31));
    assert_eq!(
        expect_final_response(&mut rx).status,
        StatusCode::GatewayTimeout
    );
    assert!(h.interrupts.is_interrupted(&id));
    assert_eq!(
        h.gateway
            .handle_completion(CompletionEvent::success(&unit, "17")),
        RouteResult::Orphaned
    );
}

#[test]
fn test_health_check_is_answered_without_pipeline() {
    let settings = GatewaySettings {
        health_check_path: Some("/health".to_string()),
        ..Default::default()
    };
    let mut h = Harness::new(settings, None);
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);

    h.send(&id, b"GET /health HTTP/1.1\r\n\r\n", now);

    let response = expect_final_response(&mut rx);
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(&response.body[..], HEALTH_CHECK_BODY.as_bytes());
    assert!(h.work.try_dequeue().is_none());
}

#[test]
fn test_token_reuse_evicts_previous_generation() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let token = Bytes::from_static(&[0, 0, 0, 0, 42]);
    let first = ConnectionIdentity::new(token.clone(), 1);
    let second = ConnectionIdentity::new(token, 2);

    let mut first_rx = h.connect_as(first.clone(), now);
    h.send(&first, PRIME_REQUEST, now);
    let first_unit = h.work.try_dequeue().unwrap();

    let mut second_rx = h.connect_as(second.clone(), now);
    assert_eq!(first_rx.try_recv().ok(), Some(Outbound::Close));
    assert!(h.interrupts.is_interrupted(&first));
    assert!(!h.interrupts.is_interrupted(&second));

    h.send(&second, PRIME_REQUEST, now);
    let second_unit = h.work.try_dequeue().unwrap();

    assert_eq!(
        h.gateway
            .handle_completion(CompletionEvent::success(&first_unit, "stale")),
        RouteResult::Orphaned
    );
    assert!(second_rx.try_recv().is_err());
    h.gateway
        .handle_completion(CompletionEvent::success(&second_unit, "17"));
    assert_eq!(&expect_final_response(&mut second_rx).body[..], b"17");
}

#[test]
fn test_data_for_unknown_connection_is_ignored() {
    let mut h = Harness::standard();
    let stranger = IdentityMinter::starting_at(99).mint();
    h.send(&stranger, PRIME_REQUEST, Instant::now());
    assert!(h.work.try_dequeue().is_none());
    assert_eq!(h.gateway.assembler().pending(), 0);
}

#[test]
fn test_error_event_is_a_400() {
    let mut h = Harness::standard();
    let now = Instant::now();
    let (id, mut rx) = h.connect(now);
    h.send(&id, PRIME_REQUEST, now);
    let unit: WorkUnit = h.work.try_dequeue().unwrap();

    h.gateway
        .handle_completion(CompletionEvent::error(&unit, "nope"));
    assert_eq!(expect_final_response(&mut rx).status, StatusCode::BadRequest);
}
