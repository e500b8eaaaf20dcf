#![forbid(unsafe_code)]

//! MailView core types.
//!
//! Everything in this crate is plain data and pure functions: container
//! geometry and the viewport detector, the watch set and page store, the
//! query shapes sent to the server, item identity, and configuration.
//!
//! # Role in MailView
//! `mailview-core` is the shared vocabulary. `mailview-runtime` builds the
//! moving parts (channels, the page window manager, the sync controller) on
//! top of it, and the rendering layer only ever reads these types.

pub mod config;
pub mod geometry;
pub mod model;
pub mod page;
pub mod query;
pub mod viewport;

pub use config::{ConfigError, WindowConfig};
pub use geometry::{ContainerGeometry, ItemExtent};
pub use model::{Email, Keyed, Mailbox, SyncState, SyncToken, Thread};
pub use page::{PageIndex, PageSlot, PageStore, WatchSet};
pub use query::{ListFilter, PageQuery, SortColumn, SortSpec, SyncQuery};
pub use viewport::{VisibleRange, detect, detect_extents};
