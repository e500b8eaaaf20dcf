#![forbid(unsafe_code)]

//! Process-wide counters for channel and window activity.
//!
//! Every counter is a monotonic `AtomicU64`. Each `record_*` function bumps
//! its counter and emits a structured `tracing` event, so the same activity is
//! visible both to dashboards polling the counters and to log pipelines.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::subscription::SubId;

// ---------------------------------------------------------------------------
// Monotonic counters
// ---------------------------------------------------------------------------

static CONNECT_ATTEMPTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RECONNECTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DECODE_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
static OUTBOUND_SENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static PAGE_SUBSCRIPTIONS_STARTED_TOTAL: AtomicU64 = AtomicU64::new(0);
static PAGE_SUBSCRIPTIONS_CANCELLED_TOTAL: AtomicU64 = AtomicU64::new(0);
static STALE_UPDATES_DROPPED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Transport connect attempts, first attempts included.
#[must_use]
pub fn connect_attempts_total() -> u64 {
    CONNECT_ATTEMPTS_TOTAL.load(Ordering::Relaxed)
}

/// Connect attempts that followed a failure.
#[must_use]
pub fn reconnects_total() -> u64 {
    RECONNECTS_TOTAL.load(Ordering::Relaxed)
}

/// Inbound payloads dropped because they failed to decode or validate.
#[must_use]
pub fn decode_failures_total() -> u64 {
    DECODE_FAILURES_TOTAL.load(Ordering::Relaxed)
}

/// Outbound values written to a transport.
#[must_use]
pub fn outbound_sends_total() -> u64 {
    OUTBOUND_SENDS_TOTAL.load(Ordering::Relaxed)
}

/// Page subscriptions created by the window manager.
#[must_use]
pub fn page_subscriptions_started_total() -> u64 {
    PAGE_SUBSCRIPTIONS_STARTED_TOTAL.load(Ordering::Relaxed)
}

/// Page subscriptions cancelled by the window manager.
#[must_use]
pub fn page_subscriptions_cancelled_total() -> u64 {
    PAGE_SUBSCRIPTIONS_CANCELLED_TOTAL.load(Ordering::Relaxed)
}

/// Page updates discarded because their subscription had been superseded.
#[must_use]
pub fn stale_updates_dropped_total() -> u64 {
    STALE_UPDATES_DROPPED_TOTAL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Channel instrumentation
// ---------------------------------------------------------------------------

pub(crate) fn record_connect_attempt(endpoint: &str, attempt: u32) {
    CONNECT_ATTEMPTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    if attempt > 0 {
        RECONNECTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(
        target: "mailview.channel",
        endpoint = %endpoint,
        attempt = attempt,
        "connecting"
    );
}

pub(crate) fn record_decode_failure(endpoint: &str, error: &dyn std::fmt::Display) {
    DECODE_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        target: "mailview.channel",
        endpoint = %endpoint,
        error = %error,
        "dropping undecodable payload"
    );
}

pub(crate) fn record_outbound_send(endpoint: &str, version: u64) {
    OUTBOUND_SENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        target: "mailview.channel",
        endpoint = %endpoint,
        version = version,
        "outbound value sent"
    );
}

// ---------------------------------------------------------------------------
// Window instrumentation
// ---------------------------------------------------------------------------

pub(crate) fn record_page_subscription_start(page: usize, sub_id: SubId) {
    PAGE_SUBSCRIPTIONS_STARTED_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        target: "mailview.window",
        page = page,
        sub_id = sub_id,
        "page subscription started"
    );
}

pub(crate) fn record_page_subscription_cancel(page: usize, sub_id: SubId) {
    PAGE_SUBSCRIPTIONS_CANCELLED_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        target: "mailview.window",
        page = page,
        sub_id = sub_id,
        "page subscription cancelled"
    );
}

pub(crate) fn record_stale_update(page: usize, sub_id: SubId) {
    STALE_UPDATES_DROPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(
        target: "mailview.window",
        page = page,
        sub_id = sub_id,
        "stale page update dropped"
    );
}

// ============================================================================
// Tests
// ============================================================================
