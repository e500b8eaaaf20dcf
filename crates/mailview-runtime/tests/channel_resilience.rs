#![forbid(unsafe_code)]

//! Resilient channel behaviour against a scripted transport.
//!
//! Run:
//!   cargo test -p mailview-runtime --test channel_resilience

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use mailview_harness::{
    Attempt, ScriptedTransport, Step, TestItem, collect_states, global_capture, item_page,
    page_json,
};
use mailview_runtime::metrics;
use mailview_runtime::{
    ChannelState, Endpoint, JsonDecoder, Outbound, ReconnectPolicy, ResilientChannel,
    TransportError, next_sub_id,
};
use web_time::Duration;

type Page = Vec<TestItem>;

const TIMEOUT: Duration = Duration::from_secs(5);

fn channel(transport: &ScriptedTransport, delay_ms: u64) -> ResilientChannel<Page> {
    channel_at(transport, "ws://test/mails/acc?offset=0&limit=3", delay_ms)
}

fn channel_at(transport: &ScriptedTransport, url: &str, delay_ms: u64) -> ResilientChannel<Page> {
    ResilientChannel::new(
        Arc::new(transport.clone()),
        Endpoint::parse(url).unwrap(),
        Arc::new(JsonDecoder::<Page>::new()),
    )
    .with_policy(ReconnectPolicy::fixed(Duration::from_millis(delay_ms)))
}

fn ids(state: &ChannelState<Page>) -> Option<Vec<String>> {
    state
        .value()
        .map(|page| page.iter().map(|i| i.id.clone()).collect())
}

fn io_error() -> TransportError {
    TransportError::Io("connection reset".into())
}

// ============================================================================
// Laziness and restart
// ============================================================================

#[test]
fn nothing_connects_until_first_read() {
    let transport = ScriptedTransport::new([Attempt::serve([page_json(&item_page("t", 0, 1))])]);
    let mut stream = channel(&transport, 10).open(None);
    thread::sleep(Duration::from_millis(30));
    assert!(!stream.is_started());
    assert_eq!(transport.connect_count(), 0);

    let first = stream.next().unwrap();
    assert_eq!(first, ChannelState::Connecting { last_value: None });
}

#[test]
fn reopening_starts_from_scratch() {
    let payload = page_json(&item_page("t", 0, 2));
    let transport = ScriptedTransport::new([
        Attempt::serve([payload.clone()]),
        Attempt::serve([payload]),
    ]);
    let ch = channel(&transport, 10);

    for _ in 0..2 {
        let mut stream = ch.open(None);
        let states = collect_states(&mut stream, TIMEOUT, |s| ids(s).is_some_and(|v| v.len() == 2));
        assert_eq!(states[0], ChannelState::Connecting { last_value: None });
        assert_eq!(states[1], ChannelState::Open { value: None });
        assert_eq!(ids(&states[2]), Some(vec!["t0".into(), "t1".into()]));
    }
    assert_eq!(transport.connect_count(), 2);
}

// ============================================================================
// Reconnection
// ============================================================================

#[test]
fn failing_channel_reconnects_and_keeps_last_value() {
    let transport = ScriptedTransport::new([Attempt::Accept(vec![
        Step::Text(page_json(&item_page("t", 0, 3))),
        Step::Fail(io_error()),
    ])]);
    let mut stream = channel(&transport, 20).open(None);

    let mut connecting_after_failure = 0;
    let states = collect_states(&mut stream, TIMEOUT, |s| {
        if matches!(s, ChannelState::Connecting { last_value: Some(_) }) {
            connecting_after_failure += 1;
        }
        connecting_after_failure == 4
    });

    let first_error = states
        .iter()
        .position(|s| matches!(s, ChannelState::Error { .. }))
        .expect("an error state");
    let expected = Some(vec!["t0".to_owned(), "t1".into(), "t2".into()]);
    assert_eq!(ids(&states[first_error - 1]), expected);
    for state in &states[first_error..] {
        assert!(matches!(
            state,
            ChannelState::Error { .. } | ChannelState::Connecting { .. }
        ));
        assert_eq!(ids(state), expected, "state {state:?} lost the last value");
    }

    // Fixed delay between attempts.
    let times = transport.connect_times();
    assert!(times.len() >= 4);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(15));
    }
}

#[test]
fn new_value_after_reconnect_supersedes_retained_one() {
    let transport = ScriptedTransport::new([
        Attempt::Accept(vec![
            Step::Text(page_json(&item_page("a", 0, 1))),
            Step::Fail(io_error()),
        ]),
        Attempt::serve([page_json(&item_page("b", 0, 1))]),
    ]);
    let mut stream = channel(&transport, 5).open(None);
    let states = collect_states(&mut stream, TIMEOUT, |s| {
        ids(s).is_some_and(|v| v == ["b0"])
    });

    let labels: Vec<_> = states.iter().map(ChannelState::label).collect();
    assert_eq!(
        labels,
        ["connecting", "open", "open", "error", "connecting", "open", "open"]
    );
    // Handshake re-emits the retained value before the new one arrives.
    assert_eq!(ids(&states[5]), Some(vec!["a0".into()]));
    assert_eq!(ids(&states[6]), Some(vec!["b0".into()]));
}

#[test]
fn refused_connections_are_retried_indefinitely() {
    let transport = ScriptedTransport::refusing();
    let mut stream = channel(&transport, 1).open(None);
    let mut errors = 0;
    collect_states(&mut stream, TIMEOUT, |s| {
        if let ChannelState::Error { cause, last_value } = s {
            assert!(last_value.is_none());
            assert!(matches!(cause, TransportError::Io(_)));
            errors += 1;
        }
        errors == 25
    });
    assert_eq!(errors, 25);
    assert!(transport.connect_count() >= 25);
}

// ============================================================================
// Decode failures
// ============================================================================

#[test]
fn undecodable_payload_keeps_connection_and_value() {
    let endpoint = "ws://test/mails/decode-failure?offset=0&limit=3";
    let capture = global_capture();
    let failures_before = metrics::decode_failures_total();

    let transport = ScriptedTransport::new([Attempt::serve([
        page_json(&item_page("t", 0, 1)),
        "{not json".to_owned(),
        "{\"id\":\"not-a-page\"}\n".to_owned(),
        page_json(&item_page("t", 5, 1)),
    ])]);
    let mut stream = channel_at(&transport, endpoint, 5).open(None);
    let states = collect_states(&mut stream, TIMEOUT, |s| {
        ids(s).is_some_and(|v| v == ["t5"])
    });

    let labels: Vec<_> = states.iter().map(ChannelState::label).collect();
    assert_eq!(labels, ["connecting", "open", "open", "open"]);
    assert_eq!(ids(&states[2]), Some(vec!["t0".into()]));
    assert_eq!(transport.connect_count(), 1);
    assert!(metrics::decode_failures_total() >= failures_before + 2);

    if let Some(capture) = capture {
        let warnings: Vec<_> = capture
            .events_at(tracing::Level::WARN, "mailview.channel")
            .into_iter()
            .filter(|e| e.fields.get("endpoint").is_some_and(|v| v == endpoint))
            .collect();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "dropping undecodable payload");
    }
}

#[test]
fn validator_rejections_are_dropped_too() {
    let transport = ScriptedTransport::new([Attempt::serve([
        page_json(&item_page("t", 0, 4)),
        page_json(&item_page("t", 0, 2)),
    ])]);
    let decoder = JsonDecoder::<Page>::new().with_validator(|page| {
        if page.len() <= 3 {
            Ok(())
        } else {
            Err("over limit".into())
        }
    });
    let ch = ResilientChannel::new(
        Arc::new(transport.clone()),
        Endpoint::parse("ws://test/mails/acc").unwrap(),
        Arc::new(decoder),
    );
    let mut stream = ch.open(None);
    let states = collect_states(&mut stream, TIMEOUT, |s| ids(s).is_some());
    assert_eq!(ids(states.last().unwrap()).map(|v| v.len()), Some(2));
}

// ============================================================================
// Outbound values
// ============================================================================

#[test]
fn outbound_sends_latest_value_once_per_open() {
    let transport = ScriptedTransport::new([
        Attempt::refuse(),
        Attempt::Accept(vec![Step::AwaitSends(2), Step::Text("[]\n".into())]),
    ]);
    let outbound = Outbound::new();
    // Superseded before any connection exists: only "v3" may ever be sent.
    outbound.set_text("v1");
    outbound.set_text("v2");
    outbound.set_text("v3");

    let mut stream = channel(&transport, 30).open(Some(outbound.clone()));
    let states = collect_states(&mut stream, TIMEOUT, ChannelState::is_open);
    assert_eq!(states.last().map(ChannelState::label), Some("open"));

    assert!(transport.wait_until(TIMEOUT, |t| t.sent().len() == 1));
    outbound.set_text("v4");
    assert!(transport.wait_until(TIMEOUT, |t| t.sent().len() == 2));

    let states = collect_states(&mut stream, TIMEOUT, |s| ids(s).is_some());
    assert!(states.iter().all(|s| !matches!(s, ChannelState::Error { .. })));
    assert_eq!(
        transport.sent(),
        vec![(1, "v3".to_owned()), (1, "v4".to_owned())]
    );
}

#[test]
fn outbound_is_resent_after_reconnect() {
    let transport = ScriptedTransport::new([
        Attempt::Accept(vec![Step::AwaitSends(1), Step::Fail(io_error())]),
        Attempt::Accept(vec![Step::AwaitSends(1)]),
    ]);
    let outbound = Outbound::new();
    outbound.set(&serde_json::json!({"anchor_id": "A", "limit": 10})).unwrap();

    let _stream = {
        let mut s = channel(&transport, 5).open(Some(outbound));
        s.next();
        s
    };
    assert!(transport.wait_until(TIMEOUT, |t| t.sent().len() == 2));
    let sent = transport.sent();
    assert_eq!(sent[0].0, 0);
    assert_eq!(sent[1].0, 1);
    assert_eq!(sent[0].1, sent[1].1);
}

// ============================================================================
// Cancellation and close
// ============================================================================

#[test]
fn cancel_closes_transport_and_stops_reconnecting() {
    let transport = ScriptedTransport::new([Attempt::serve([page_json(&item_page("t", 0, 1))])]);
    let mut stream = channel(&transport, 5).open(None);
    collect_states(&mut stream, TIMEOUT, |s| ids(s).is_some());

    stream.cancel();
    let rest = collect_states(&mut stream, TIMEOUT, ChannelState::is_closed);
    assert_eq!(rest.last(), Some(&ChannelState::Closed));
    assert!(stream.next_timeout(Duration::from_millis(50)).is_none());

    assert!(transport.wait_until(TIMEOUT, |t| t.closed() == vec![0]));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(transport.connect_count(), 1);
}

#[test]
fn remote_close_ends_the_stream_without_reconnect() {
    let transport = ScriptedTransport::new([Attempt::Accept(vec![
        Step::Text(page_json(&item_page("t", 0, 1))),
        Step::Close,
    ])]);
    let stream = channel(&transport, 5).open(None);
    let states: Vec<_> = stream.collect();
    let labels: Vec<_> = states.iter().map(ChannelState::label).collect();
    assert_eq!(labels, ["connecting", "open", "open", "closed"]);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(transport.connect_count(), 1);
}

#[test]
fn dropping_the_stream_stops_retries() {
    let transport = ScriptedTransport::refusing();
    let mut stream = channel(&transport, 2).open(None);
    collect_states(&mut stream, TIMEOUT, |s| matches!(s, ChannelState::Error { .. }));
    drop(stream);

    thread::sleep(Duration::from_millis(20));
    let settled = transport.connect_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.connect_count(), settled);
}

#[test]
fn spawned_channel_ends_when_consumer_goes_away() {
    let transport = ScriptedTransport::refusing();
    let (tx, rx) = mpsc::channel();
    let handle = channel(&transport, 1).spawn(next_sub_id(), None, move |state| {
        tx.send(state.label()).is_ok()
    });
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok("connecting"));
    drop(rx);

    let deadline = web_time::Instant::now() + TIMEOUT;
    while !handle.is_finished() && web_time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert!(handle.is_finished());
    assert!(!handle.is_cancelled());
}
