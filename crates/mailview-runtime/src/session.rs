#![forbid(unsafe_code)]

//! List session: the single-threaded dispatcher tying everything together.
//!
//! A [`ListSession`] owns the page window manager, the anchor controller and
//! the receiving end of the inbox every background channel writes to. The
//! caller drives it with geometry events ([`on_scroll`](ListSession::on_scroll),
//! [`on_resize`](ListSession::on_resize)) and by pumping the inbox
//! ([`pump`](ListSession::pump), [`pump_timeout`](ListSession::pump_timeout)).
//! Each call runs to completion; no state is shared with the workers.
//!
//! ```text
//!   geometry ──► detect ──► window.on_viewport_changed ──► reconcile ──► anchor
//!   inbox    ──► window.on_page_update ──(watch changed)──► reconcile ──► anchor
//!            └─► sync log
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, mpsc};

use mailview_core::{
    ContainerGeometry, Keyed, ListFilter, PageStore, SyncState, SyncToken, WatchSet, WindowConfig,
    detect,
};
use serde::de::DeserializeOwned;
use web_time::Duration;

use crate::anchor::{AnchorSyncController, QueryPublisher};
use crate::channel::{ChannelState, Outbound, ResilientChannel};
use crate::codec::JsonDecoder;
use crate::reconnect::ReconnectPolicy;
use crate::routes::Routes;
use crate::source::{ChannelPageSource, Inbox, PageSource};
use crate::subscription::{SubscriptionHandle, next_sub_id};
use crate::transport::Transport;
use crate::window::{PageUpdate, PageWindowManager, ReconcileReport};

/// A mounted, windowed list.
pub struct ListSession<T, S: PageSource<T>, P: QueryPublisher> {
    window: PageWindowManager<T, S>,
    anchor: AnchorSyncController<P>,
    inbox: mpsc::Receiver<Inbox<T>>,
    sync_handle: Option<SubscriptionHandle>,
    sync_log: VecDeque<SyncToken>,
    sync_log_capacity: usize,
    last_token: Option<Arc<SyncToken>>,
    sync_state: Option<SyncState>,
    mounted: bool,
}

impl<T, S, P> ListSession<T, S, P>
where
    T: Keyed,
    S: PageSource<T>,
    P: QueryPublisher,
{
    /// Mount a list: subscribes page 0 and publishes the first sync query.
    pub fn new(
        config: &WindowConfig,
        filter: ListFilter,
        source: S,
        publisher: P,
        inbox: mpsc::Receiver<Inbox<T>>,
    ) -> Self {
        let window = PageWindowManager::new(config.page_size, filter.clone(), source);
        let anchor = AnchorSyncController::new(
            publisher,
            config.page_size,
            config.sync_safety_factor,
            filter,
        );
        let mut session = Self {
            window,
            anchor,
            inbox,
            sync_handle: None,
            sync_log: VecDeque::new(),
            sync_log_capacity: config.sync_log_capacity.max(1),
            last_token: None,
            sync_state: None,
            mounted: true,
        };
        session.settle();
        tracing::info!(
            target: "mailview.session",
            page_size = config.page_size,
            "list mounted"
        );
        session
    }

    /// Attach the sync channel so it is cancelled on unmount.
    #[must_use]
    pub fn with_sync_handle(mut self, handle: SubscriptionHandle) -> Self {
        self.sync_handle = Some(handle);
        self
    }

    #[must_use]
    pub fn window(&self) -> &PageWindowManager<T, S> {
        &self.window
    }

    #[must_use]
    pub fn anchor(&self) -> &AnchorSyncController<P> {
        &self.anchor
    }

    #[must_use]
    pub fn watch_set(&self) -> &WatchSet {
        self.window.watch_set()
    }

    #[must_use]
    pub fn store(&self) -> &PageStore<T> {
        self.window.store()
    }

    /// Latest sync progress reported by the server, when its tokens carry one.
    #[must_use]
    pub fn sync_state(&self) -> Option<&SyncState> {
        self.sync_state.as_ref()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// The container scrolled.
    pub fn on_scroll(&mut self, geometry: &ContainerGeometry) -> ReconcileReport {
        self.on_geometry("scroll", geometry)
    }

    /// The container was resized.
    pub fn on_resize(&mut self, geometry: &ContainerGeometry) -> ReconcileReport {
        self.on_geometry("resize", geometry)
    }

    fn on_geometry(&mut self, cause: &'static str, geometry: &ContainerGeometry) -> ReconcileReport {
        if !self.mounted {
            return ReconcileReport::default();
        }
        let Some(range) = detect(geometry) else {
            return ReconcileReport::default();
        };
        if !self.window.on_viewport_changed(range) {
            return ReconcileReport::default();
        }
        tracing::debug!(
            target: "mailview.session",
            cause,
            first = range.first,
            last = range.last,
            "viewport moved"
        );
        self.settle()
    }

    /// Dispatch one inbox message. Returns `true` when rendered contents may
    /// have changed.
    pub fn handle(&mut self, message: Inbox<T>) -> bool {
        if !self.mounted {
            return false;
        }
        match message {
            Inbox::Page(envelope) => match self.window.on_page_update(envelope) {
                PageUpdate::Stored { watch_changed, .. } => {
                    if watch_changed {
                        self.settle();
                    }
                    true
                }
                PageUpdate::Stale | PageUpdate::Unchanged => false,
            },
            Inbox::Sync(state) => {
                self.on_sync_state(state);
                false
            }
        }
    }

    /// Dispatch everything already waiting in the inbox. Never blocks.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for a message, then drain the rest.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    /// Change the extra query dependencies; every page is resubscribed.
    pub fn set_filter(&mut self, filter: ListFilter) -> ReconcileReport {
        if !self.mounted || !self.window.set_filter(filter.clone()) {
            return ReconcileReport::default();
        }
        self.anchor.set_filter(filter);
        self.settle()
    }

    /// Recompute the anchor from current contents and republish the sync
    /// query.
    pub fn resync(&mut self) {
        if self.mounted {
            self.anchor
                .resync(self.window.watch_set(), self.window.store());
        }
    }

    /// Map every slot of every stored page, in page-then-slot order.
    pub fn render<R>(&self, render: impl FnMut(Option<&T>) -> R) -> Vec<R> {
        self.window.render(render)
    }

    /// Take the sync tokens received since the last call, oldest first.
    pub fn drain_sync_log(&mut self) -> Vec<SyncToken> {
        self.sync_log.drain(..).collect()
    }

    /// Cancel every page subscription and the sync channel.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        let cancelled = self.window.unmount();
        if let Some(handle) = self.sync_handle.take() {
            handle.cancel();
        }
        self.anchor.reset();
        while self.inbox.try_recv().is_ok() {}
        tracing::info!(target: "mailview.session", cancelled, "list unmounted");
    }

    fn settle(&mut self) -> ReconcileReport {
        let report = self.window.reconcile();
        self.anchor
            .on_watch_changed(self.window.watch_set(), self.window.store());
        report
    }

    fn on_sync_state(&mut self, state: ChannelState<SyncToken>) {
        match &state {
            ChannelState::Open { value: Some(token) } => {
                if self
                    .last_token
                    .as_ref()
                    .is_some_and(|last| Arc::ptr_eq(last, token))
                {
                    return;
                }
                self.last_token = Some(Arc::clone(token));
                if let Some(sync_state) = SyncState::from_token(token) {
                    if self.sync_state.as_ref() != Some(&sync_state) {
                        tracing::debug!(target: "mailview.session", ?sync_state, "sync state");
                    }
                    self.sync_state = Some(sync_state);
                }
                if self.sync_log.len() == self.sync_log_capacity {
                    self.sync_log.pop_front();
                }
                self.sync_log.push_back((**token).clone());
            }
            ChannelState::Error { cause, .. } => {
                tracing::debug!(target: "mailview.session", error = %cause, "sync channel error");
            }
            ChannelState::Closed => {
                tracing::debug!(target: "mailview.session", "sync channel closed");
            }
            ChannelState::Connecting { .. } | ChannelState::Open { value: None } => {}
        }
    }
}

impl<T, S, P> Drop for ListSession<T, S, P>
where
    S: PageSource<T>,
    P: QueryPublisher,
{
    fn drop(&mut self) {
        if let Some(handle) = self.sync_handle.take() {
            handle.cancel();
        }
        // The window manager cancels its own subscriptions on drop.
    }
}

/// Production session type.
pub type ChannelSession<T> = ListSession<T, ChannelPageSource<T>, Outbound>;

impl<T> ListSession<T, ChannelPageSource<T>, Outbound>
where
    T: Keyed + DeserializeOwned + Send + Sync + 'static,
{
    /// Mount a list backed by one channel per page plus a sync channel, all
    /// over `transport`.
    pub fn connect(
        config: &WindowConfig,
        routes: &Routes,
        filter: ListFilter,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let policy = ReconnectPolicy::fixed(config.reconnect_delay());
        let (tx, rx) = mpsc::channel();

        let source =
            ChannelPageSource::new(Arc::clone(&transport), routes.clone(), policy.clone(), tx.clone());

        let outbound = Outbound::new();
        let sync = ResilientChannel::<SyncToken>::new(
            transport,
            routes.sync_endpoint(),
            Arc::new(JsonDecoder::new()),
        )
        .with_policy(policy);
        let sync_handle = sync.spawn(next_sub_id(), Some(outbound.clone()), move |state| {
            tx.send(Inbox::Sync(state)).is_ok()
        });

        tracing::debug!(
            target: "mailview.session",
            base = %routes.base(),
            account = routes.account_id(),
            "connecting list session"
        );
        Self::new(config, filter, source, outbound, rx).with_sync_handle(sync_handle)
    }
}
