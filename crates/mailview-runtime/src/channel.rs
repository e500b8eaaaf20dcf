#![forbid(unsafe_code)]

//! Resilient stream channel.
//!
//! A [`ResilientChannel`] turns an unreliable duplex transport into an
//! infinite sequence of [`ChannelState`]s. It reconnects after every failure,
//! for as long as the consumer stays subscribed, and keeps the last decoded
//! value across `Connecting`/`Error` so consumers never flash empty.
//!
//! # State machine
//!
//! ```text
//!   idle ──► connecting ──handshake──► open(last) ──msg──► open(new) ─┐
//!               ▲   │                     │  ▲                        │
//!               │   └──failure──┐         │  └────────────────────────┘
//!               │               ▼         │
//!               └──delay──── error ◄──failure
//!
//!   any ──cancel / remote close──► closed
//! ```
//!
//! # Outbound values
//!
//! An [`Outbound`] cell holds the latest value the consumer wants the server
//! to see. While open, each new version is written once. Versions superseded
//! while disconnected are never queued; after a (re)connect only the current
//! value is written.
//!
//! # Decode failures
//!
//! A payload that fails to decode or validate is dropped with a `warn` event
//! and a [`decode_failures_total`](crate::metrics::decode_failures_total)
//! bump. The connection stays up and `last_value` does not change.

use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use web_time::Duration;

use crate::codec::Decoder;
use crate::metrics;
use crate::reconnect::ReconnectPolicy;
use crate::subscription::{StopSignal, SubId, SubscriptionHandle, next_sub_id};
use crate::transport::{Connection, Endpoint, Inbound, Transport, TransportError};

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

/// One observation of a channel.
pub enum ChannelState<T> {
    /// A connect attempt is in progress.
    Connecting { last_value: Option<Arc<T>> },
    /// Connected. `value` is the retained value right after the handshake and
    /// the freshly decoded one after each inbound message.
    Open { value: Option<Arc<T>> },
    /// The transport failed; a reconnect follows after the policy delay.
    Error {
        cause: TransportError,
        last_value: Option<Arc<T>>,
    },
    /// Cancelled or closed by the remote end. Terminal.
    Closed,
}

impl<T> ChannelState<T> {
    /// The best value this state knows about: the open value or the retained
    /// one.
    #[must_use]
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            Self::Connecting { last_value } | Self::Error { last_value, .. } => last_value.as_ref(),
            Self::Open { value } => value.as_ref(),
            Self::Closed => None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Short state name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Open { .. } => "open",
            Self::Error { .. } => "error",
            Self::Closed => "closed",
        }
    }
}

impl<T> Clone for ChannelState<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Connecting { last_value } => Self::Connecting {
                last_value: last_value.clone(),
            },
            Self::Open { value } => Self::Open {
                value: value.clone(),
            },
            Self::Error { cause, last_value } => Self::Error {
                cause: cause.clone(),
                last_value: last_value.clone(),
            },
            Self::Closed => Self::Closed,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ChannelState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { last_value } => f
                .debug_struct("Connecting")
                .field("last_value", last_value)
                .finish(),
            Self::Open { value } => f.debug_struct("Open").field("value", value).finish(),
            Self::Error { cause, last_value } => f
                .debug_struct("Error")
                .field("cause", cause)
                .field("last_value", last_value)
                .finish(),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

impl<T: PartialEq> PartialEq for ChannelState<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Connecting { last_value: a }, Self::Connecting { last_value: b })
            | (Self::Open { value: a }, Self::Open { value: b }) => a == b,
            (
                Self::Error {
                    cause: ca,
                    last_value: a,
                },
                Self::Error {
                    cause: cb,
                    last_value: b,
                },
            ) => ca == cb && a == b,
            (Self::Closed, Self::Closed) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelMachine
// ---------------------------------------------------------------------------

/// Phase of a [`ChannelMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Error,
    Closed,
}

/// Transition bookkeeping for one channel run.
///
/// Each method performs one transition and returns the state to emit.
/// Calling a transition from a phase that does not allow it is a contract
/// violation and trips a debug assertion.
#[derive(Debug)]
pub struct ChannelMachine<T> {
    phase: Phase,
    last_value: Option<Arc<T>>,
    failures: u32,
}

impl<T> Default for ChannelMachine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChannelMachine<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_value: None,
            failures: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Value retained across reconnects.
    #[must_use]
    pub fn last_value(&self) -> Option<&Arc<T>> {
        self.last_value.as_ref()
    }

    /// Consecutive failures since the last successful handshake.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// `idle | error -> connecting`.
    pub fn connecting(&mut self) -> ChannelState<T> {
        debug_assert!(
            matches!(self.phase, Phase::Idle | Phase::Error),
            "connecting from {:?}",
            self.phase
        );
        self.phase = Phase::Connecting;
        ChannelState::Connecting {
            last_value: self.last_value.clone(),
        }
    }

    /// `connecting -> open(last_value)`.
    pub fn opened(&mut self) -> ChannelState<T> {
        debug_assert_eq!(self.phase, Phase::Connecting);
        self.phase = Phase::Open;
        self.failures = 0;
        ChannelState::Open {
            value: self.last_value.clone(),
        }
    }

    /// `open -> open(value)`; `value` replaces `last_value`.
    pub fn received(&mut self, value: T) -> ChannelState<T> {
        debug_assert_eq!(self.phase, Phase::Open);
        let value = Arc::new(value);
        self.last_value = Some(Arc::clone(&value));
        ChannelState::Open { value: Some(value) }
    }

    /// `connecting | open -> error(cause)`, retaining `last_value`.
    pub fn failed(&mut self, cause: TransportError) -> ChannelState<T> {
        debug_assert!(
            matches!(self.phase, Phase::Connecting | Phase::Open),
            "failure from {:?}",
            self.phase
        );
        self.phase = Phase::Error;
        self.failures = self.failures.saturating_add(1);
        ChannelState::Error {
            cause,
            last_value: self.last_value.clone(),
        }
    }

    /// `any -> closed`. Drops the retained value.
    pub fn closed(&mut self) -> ChannelState<T> {
        self.phase = Phase::Closed;
        self.last_value = None;
        ChannelState::Closed
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct OutboundSlot {
    version: u64,
    text: Option<Arc<str>>,
}

/// Latest-value cell for values pushed to the server.
///
/// Cloneable; clones share the cell. Version `0` means "nothing set yet".
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    slot: Arc<Mutex<OutboundSlot>>,
}

impl Outbound {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` as JSON and make it the current value.
    pub fn set<V: Serialize + ?Sized>(&self, value: &V) -> Result<u64, serde_json::Error> {
        let text = serde_json::to_string(value)?;
        Ok(self.set_text(text))
    }

    /// Make `text` the current value. Returns its version.
    pub fn set_text(&self, text: impl Into<Arc<str>>) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.version += 1;
        slot.text = Some(text.into());
        slot.version
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).version
    }

    /// Current value and its version.
    #[must_use]
    pub fn latest(&self) -> Option<(u64, Arc<str>)> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.text.clone().map(|text| (slot.version, text))
    }

    /// Current value, if newer than `seen`.
    #[must_use]
    pub fn newer_than(&self, seen: u64) -> Option<(u64, Arc<str>)> {
        self.latest().filter(|(version, _)| *version > seen)
    }
}

// ---------------------------------------------------------------------------
// ResilientChannel
// ---------------------------------------------------------------------------

/// How a served connection ended.
enum ServeEnd {
    Cancelled,
    RemoteClosed,
    ConsumerGone,
    Failed(TransportError),
}

/// Reconnecting subscription to one endpoint.
///
/// Cheap to clone; every [`open`](Self::open) or [`spawn`](Self::spawn) runs
/// an independent connection with fresh state.
pub struct ResilientChannel<T> {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    decoder: Arc<dyn Decoder<T>>,
    policy: ReconnectPolicy,
}

impl<T> Clone for ResilientChannel<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            endpoint: self.endpoint.clone(),
            decoder: Arc::clone(&self.decoder),
            policy: self.policy.clone(),
        }
    }
}

impl<T> fmt::Debug for ResilientChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientChannel")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> ResilientChannel<T> {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        decoder: Arc<dyn Decoder<T>>,
    ) -> Self {
        Self {
            transport,
            endpoint,
            decoder,
            policy: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Lazy state stream. Nothing connects until the first `next()`.
    #[must_use]
    pub fn open(&self, outbound: Option<Outbound>) -> ChannelStream<T> {
        ChannelStream {
            channel: self.clone(),
            outbound,
            started: None,
        }
    }

    /// Run the channel on a background thread, handing every state to `emit`.
    ///
    /// The run ends on cancellation, remote close, or when `emit` returns
    /// `false`.
    pub fn spawn<F>(&self, id: SubId, outbound: Option<Outbound>, mut emit: F) -> SubscriptionHandle
    where
        F: FnMut(ChannelState<T>) -> bool + Send + 'static,
    {
        let channel = self.clone();
        let name = format!("mailview-channel-{id}");
        SubscriptionHandle::spawn(id, name, move |stop| {
            channel.run(id, outbound.as_ref(), &stop, &mut emit);
        })
    }

    /// Drive connect / serve / reconnect until stopped.
    fn run(
        &self,
        id: SubId,
        outbound: Option<&Outbound>,
        stop: &StopSignal,
        emit: &mut dyn FnMut(ChannelState<T>) -> bool,
    ) {
        let _span = tracing::debug_span!(
            "channel.run",
            sub_id = id,
            endpoint = %self.endpoint,
        )
        .entered();

        let endpoint = self.endpoint.as_str();
        let mut machine = ChannelMachine::new();

        loop {
            if stop.is_stopped() || !emit(machine.connecting()) {
                break;
            }
            metrics::record_connect_attempt(endpoint, machine.failures());

            let end = match self.transport.connect(&self.endpoint) {
                Ok(mut conn) => {
                    if stop.is_stopped() {
                        conn.close();
                        break;
                    }
                    tracing::info!(target: "mailview.channel", endpoint, sub_id = id, "channel open");
                    let end = if emit(machine.opened()) {
                        self.serve(conn.as_mut(), outbound, stop, &mut machine, emit)
                    } else {
                        ServeEnd::ConsumerGone
                    };
                    conn.close();
                    end
                }
                Err(cause) => ServeEnd::Failed(cause),
            };

            match end {
                ServeEnd::Failed(cause) => {
                    tracing::warn!(
                        target: "mailview.channel",
                        endpoint,
                        sub_id = id,
                        error = %cause,
                        failures = machine.failures() + 1,
                        "channel failed; will reconnect"
                    );
                    if !emit(machine.failed(cause)) {
                        return;
                    }
                }
                ServeEnd::RemoteClosed => {
                    tracing::info!(target: "mailview.channel", endpoint, sub_id = id, "closed by remote");
                    break;
                }
                ServeEnd::Cancelled => break,
                ServeEnd::ConsumerGone => return,
            }

            let delay = self.policy.delay(machine.failures().saturating_sub(1));
            if stop.wait_timeout(delay) {
                break;
            }
        }

        tracing::debug!(target: "mailview.channel", endpoint, sub_id = id, "channel closed");
        emit(machine.closed());
    }

    fn serve(
        &self,
        conn: &mut dyn Connection,
        outbound: Option<&Outbound>,
        stop: &StopSignal,
        machine: &mut ChannelMachine<T>,
        emit: &mut dyn FnMut(ChannelState<T>) -> bool,
    ) -> ServeEnd {
        let endpoint = self.endpoint.as_str();
        let mut sent = 0;

        loop {
            if stop.is_stopped() {
                return ServeEnd::Cancelled;
            }

            if let Some((version, text)) = outbound.and_then(|o| o.newer_than(sent)) {
                if let Err(cause) = conn.send_text(&text) {
                    return ServeEnd::Failed(cause);
                }
                metrics::record_outbound_send(endpoint, version);
                sent = version;
            }

            match conn.recv() {
                Ok(Inbound::Text(payload)) => match self.decoder.decode(&payload) {
                    Ok(value) => {
                        if stop.is_stopped() {
                            return ServeEnd::Cancelled;
                        }
                        if !emit(machine.received(value)) {
                            return ServeEnd::ConsumerGone;
                        }
                    }
                    Err(error) => metrics::record_decode_failure(endpoint, &error),
                },
                Ok(Inbound::Idle) => {}
                Ok(Inbound::Closed) => return ServeEnd::RemoteClosed,
                Err(cause) => return ServeEnd::Failed(cause),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelStream
// ---------------------------------------------------------------------------

struct Started<T> {
    handle: SubscriptionHandle,
    rx: mpsc::Receiver<ChannelState<T>>,
}

/// Blocking iterator over one channel run.
///
/// The worker starts on the first call to [`next`](Iterator::next). Dropping
/// the stream cancels it. The iterator ends after [`ChannelState::Closed`].
pub struct ChannelStream<T> {
    channel: ResilientChannel<T>,
    outbound: Option<Outbound>,
    started: Option<Started<T>>,
}

impl<T: Send + Sync + 'static> ChannelStream<T> {
    fn start(&mut self) -> &Started<T> {
        let channel = &self.channel;
        let outbound = &mut self.outbound;
        self.started.get_or_insert_with(|| {
            let (tx, rx) = mpsc::channel();
            let handle = channel.spawn(next_sub_id(), outbound.take(), move |state| {
                tx.send(state).is_ok()
            });
            Started { handle, rx }
        })
    }

    /// Whether the worker has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Stop the run. Remaining buffered states can still be read, followed
    /// by `Closed`.
    pub fn cancel(&self) {
        if let Some(started) = &self.started {
            started.handle.cancel();
        }
    }

    /// Like `next`, but gives up after `timeout`.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<ChannelState<T>> {
        self.start().rx.recv_timeout(timeout).ok()
    }
}

impl<T: Send + Sync + 'static> Iterator for ChannelStream<T> {
    type Item = ChannelState<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.start().rx.recv().ok()
    }
}

impl<T> fmt::Debug for ChannelStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStream")
            .field("endpoint", &self.channel.endpoint)
            .field("started", &self.started.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
