#![forbid(unsafe_code)]

//! Deterministic fixtures for MailView tests.
//!
//! - [`scripted`]: a [`Transport`](mailview_runtime::Transport) whose
//!   connections follow a script, recording everything the client does
//! - [`recording`]: page sources and sync publishers that record instead of
//!   connecting
//! - [`items`]: a minimal keyed item type and page builders
//! - [`capture`]: a `tracing` layer that records spans and events
//!
//! Nothing in here touches the network.

pub mod capture;
pub mod items;
pub mod recording;
pub mod scripted;

pub use capture::{CaptureHandle, CapturedEvent, CapturedSpan, global_capture, with_captured_tracing};
pub use items::{TestItem, item_page, page_json, rows_geometry};
pub use recording::{RecordingHandle, RecordingPageSource, RecordingPublisher, SourceLog};
pub use scripted::{Attempt, ScriptedTransport, Step, collect_states};
