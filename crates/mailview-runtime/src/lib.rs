#![forbid(unsafe_code)]

//! MailView runtime: the moving parts of the windowed list engine.
//!
//! - [`channel`]: resilient, reconnecting stream channels over a [`transport`]
//! - [`window`]: the page window manager keeping watched pages subscribed
//! - [`anchor`]: anchored incremental-sync queries
//! - [`session`]: the single-threaded dispatcher a UI drives
//!
//! Background channels run on their own threads ([`subscription`]) and only
//! ever send into a session's inbox; every piece of list state is owned and
//! mutated by the [`ListSession`](session::ListSession) on the caller's thread.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mailview_core::{ContainerGeometry, Email, ListFilter, WindowConfig};
//! use mailview_runtime::{ChannelSession, Routes, WsTransport};
//! use web_time::Duration;
//!
//! let config = WindowConfig::default();
//! let routes = Routes::new("http://localhost:8080", "account-1")?;
//! let transport = Arc::new(WsTransport::new(config.poll_interval()));
//! let mut session: ChannelSession<Email> =
//!     ChannelSession::connect(&config, &routes, ListFilter::mailbox("inbox"), transport);
//!
//! session.on_scroll(&ContainerGeometry::uniform(500, 30.0, 900.0, 600.0));
//! session.pump_timeout(Duration::from_millis(100));
//! let rows = session.render(|email| email.map(|e| e.id.clone()));
//! # let _ = rows;
//! # Ok::<(), mailview_runtime::RouteError>(())
//! ```

pub mod anchor;
pub mod channel;
pub mod codec;
#[cfg(feature = "log-init")]
pub mod logging;
pub mod metrics;
pub mod reconnect;
pub mod routes;
pub mod session;
pub mod source;
pub mod subscription;
pub mod transport;
pub mod window;
pub mod ws;

pub use anchor::{AnchorSyncController, QueryPublisher};
pub use channel::{ChannelMachine, ChannelState, ChannelStream, Outbound, Phase, ResilientChannel};
pub use codec::{DecodeError, Decoder, JsonDecoder};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use routes::{RouteError, Routes};
pub use session::{ChannelSession, ListSession};
pub use source::{Cancel, ChannelPageSource, Inbox, PageEnvelope, PageRequest, PageSource};
pub use subscription::{StopSignal, StopTrigger, SubId, SubscriptionHandle, next_sub_id};
pub use transport::{Connection, Endpoint, Inbound, Transport, TransportError};
pub use window::{PageUpdate, PageWindowManager, ReconcileReport};
pub use ws::WsTransport;
