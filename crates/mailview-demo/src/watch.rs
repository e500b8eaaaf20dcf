//! `watch`: mount a list over WebSocket and simulate a scrolled viewport.
//!
//! The simulated container has one fixed-height row per rendered slot, the
//! way a real list view would. As pages arrive the container grows, so the
//! viewport can settle at `--scroll-row` once enough rows exist.

use std::sync::Arc;

use clap::Args;
use mailview_core::{ContainerGeometry, Email, Keyed, WindowConfig};
use mailview_runtime::{ChannelSession, WsTransport};
use serde::de::DeserializeOwned;
use web_time::{Duration, Instant};

use crate::cli::{ConfigArgs, TargetArgs};
use crate::error::{DemoError, Result};

const ROW_HEIGHT: f64 = 24.0;

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Row at the top edge of the viewport.
    #[arg(long, default_value_t = 0)]
    pub scroll_row: usize,

    /// Viewport height in rows.
    #[arg(long, default_value_t = 20)]
    pub rows: usize,

    /// How long to keep the list mounted.
    #[arg(long, default_value_t = 10)]
    pub duration_secs: u64,
}

/// One printable line per item.
trait Summary {
    fn summary(&self) -> String;
}

impl Summary for Email {
    fn summary(&self) -> String {
        format!(
            "{}  {}",
            self.id,
            self.subject.as_deref().unwrap_or("(no subject)")
        )
    }
}

pub fn run_watch(args: &WatchArgs) -> Result<()> {
    let config = args.config.load()?;
    watch::<Email>(args, &config)
}

/// Geometry of a list with `slots` rows scrolled to `scroll_row`.
fn geometry(slots: usize, scroll_row: usize, rows: usize) -> ContainerGeometry {
    let top_row = scroll_row.min(slots.saturating_sub(rows));
    ContainerGeometry::uniform(
        slots,
        ROW_HEIGHT,
        top_row as f64 * ROW_HEIGHT,
        rows as f64 * ROW_HEIGHT,
    )
}

fn watch<T>(args: &WatchArgs, config: &WindowConfig) -> Result<()>
where
    T: Keyed + Summary + DeserializeOwned + Send + Sync + 'static,
{
    let routes = args.target.routes()?;
    let transport = Arc::new(WsTransport::new(config.poll_interval()));
    let mut session: ChannelSession<T> =
        ChannelSession::connect(config, &routes, args.target.filter(), transport);

    tracing::info!(
        target: "mailview.demo",
        base = %routes.base(),
        scroll_row = args.scroll_row,
        rows = args.rows,
        "list mounted"
    );

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut received_any = false;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let handled = session.pump_timeout(remaining.min(Duration::from_millis(250)));
        if handled == 0 {
            continue;
        }
        let slots = session.render(|_| ()).len();
        session.on_scroll(&geometry(slots, args.scroll_row, args.rows));

        let loaded = session.store().iter().filter(|(_, s)| !s.is_pending()).count();
        received_any |= loaded > 0;
        let pages: Vec<_> = session.watch_set().iter().collect();
        println!(
            "watching {pages:?}  loaded {loaded}/{}  slots {slots}  terminal {:?}",
            session.store().len(),
            session.window().terminal_page(),
        );
        for token in session.drain_sync_log() {
            println!("sync  {}", serde_json::to_string(&token)?);
        }
    }

    let top = geometry(session.render(|_| ()).len(), args.scroll_row, args.rows);
    let lines = session.render(|item| item.map_or_else(|| "…".to_owned(), Summary::summary));
    if let Some(range) = mailview_core::detect(&top) {
        for (row, line) in lines.iter().enumerate().take(range.last + 1).skip(range.first) {
            println!("{row:>6}  {line}");
        }
    }
    if let Some(anchor) = session.anchor().anchor() {
        println!("anchor {anchor}");
    }

    session.unmount();
    if received_any {
        Ok(())
    } else {
        Err(DemoError::NoData {
            seconds: args.duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailview_core::{VisibleRange, detect};

    #[test]
    fn viewport_clamps_to_loaded_rows() {
        // Only 30 rows loaded; asking for row 100 shows the last 20.
        let g = geometry(30, 100, 20);
        let range = detect(&g).unwrap();
        assert_eq!(range.first, 10);
        assert_eq!(range.last, 29);
    }

    #[test]
    fn viewport_at_requested_row_when_available() {
        let g = geometry(500, 100, 20);
        assert_eq!(detect(&g), Some(VisibleRange::new(100, 121)));
    }

    #[test]
    fn email_summary_falls_back_without_subject() {
        let email: Email = serde_json::from_value(serde_json::json!({"id": "E1"})).unwrap();
        assert_eq!(email.summary(), "E1  (no subject)");
        let email: Email =
            serde_json::from_value(serde_json::json!({"id": "E2", "subject": "hello"})).unwrap();
        assert_eq!(email.summary(), "E2  hello");
    }
}
