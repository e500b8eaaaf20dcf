#![forbid(unsafe_code)]

//! Headless driver for MailView list sessions.
//!
//! Connects a [`ChannelSession`](mailview_runtime::ChannelSession) to a live
//! server over WebSocket, simulates a scroll position, and prints the watched
//! pages, sync feed, and visible rows.

pub mod cli;
pub mod error;
pub mod watch;

pub use cli::run_from_env;
pub use error::{DemoError, Result};
