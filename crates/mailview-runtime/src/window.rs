#![forbid(unsafe_code)]

//! Page window manager.
//!
//! Owns the watch set, the page store and one live subscription per watched
//! page. All mutation goes through four entry points, called from the
//! session's dispatch loop:
//!
//! 1. [`on_viewport_changed`](PageWindowManager::on_viewport_changed) derives
//!    the watch set from the visible item range.
//! 2. [`reconcile`](PageWindowManager::reconcile) starts, replaces and cancels
//!    subscriptions until they match the watch set exactly.
//! 3. [`on_page_update`](PageWindowManager::on_page_update) applies one
//!    channel state, dropping it when it comes from a superseded
//!    subscription.
//! 4. [`unmount`](PageWindowManager::unmount) cancels everything.
//!
//! # Terminal page
//!
//! A page shorter than its limit proves there is nothing after it. The store
//! and the watch set are truncated to it immediately and later watch sets are
//! clamped to it, until the page fills up again or the filter changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use mailview_core::{ListFilter, PageIndex, PageQuery, PageStore, VisibleRange, WatchSet};

use crate::metrics;
use crate::source::{Cancel, PageEnvelope, PageRequest, PageSource};
use crate::subscription::{SubId, next_sub_id};

/// What one [`reconcile`](PageWindowManager::reconcile) pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pages that got a new subscription.
    pub started: Vec<PageIndex>,
    /// Pages whose subscription was cancelled (replaced or unwatched).
    pub cancelled: Vec<PageIndex>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.cancelled.is_empty()
    }
}

/// Outcome of [`on_page_update`](PageWindowManager::on_page_update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageUpdate {
    /// From a cancelled or replaced subscription; ignored.
    Stale,
    /// The state carried no value; nothing stored.
    Unchanged,
    /// The page contents were replaced.
    Stored {
        len: usize,
        /// The page is shorter than its limit.
        terminal: bool,
        /// The watch set changed as a consequence; reconcile next.
        watch_changed: bool,
    },
}

impl PageUpdate {
    #[must_use]
    pub fn watch_changed(&self) -> bool {
        matches!(
            self,
            Self::Stored {
                watch_changed: true,
                ..
            }
        )
    }
}

struct PageSubscription<H> {
    sub_id: SubId,
    query: PageQuery,
    handle: H,
}

/// Keeps exactly the watched pages subscribed and stored.
pub struct PageWindowManager<T, S: PageSource<T>> {
    page_size: usize,
    filter: ListFilter,
    watch: WatchSet,
    store: PageStore<T>,
    subs: BTreeMap<PageIndex, PageSubscription<S::Handle>>,
    terminal: Option<PageIndex>,
    last_range: Option<VisibleRange>,
    source: S,
}

impl<T, S: PageSource<T>> PageWindowManager<T, S> {
    /// New manager watching `{0}`. Nothing is subscribed until the first
    /// [`reconcile`](Self::reconcile).
    pub fn new(page_size: usize, filter: ListFilter, source: S) -> Self {
        debug_assert!(page_size > 0, "page_size must be > 0");
        Self {
            page_size: page_size.max(1),
            filter,
            watch: WatchSet::initial(),
            store: PageStore::new(),
            subs: BTreeMap::new(),
            terminal: None,
            last_range: None,
            source,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    #[must_use]
    pub fn watch_set(&self) -> &WatchSet {
        &self.watch
    }

    #[must_use]
    pub fn store(&self) -> &PageStore<T> {
        &self.store
    }

    /// Known terminal page, if any.
    #[must_use]
    pub fn terminal_page(&self) -> Option<PageIndex> {
        self.terminal
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subs.len()
    }

    /// Pages with a live subscription, ascending.
    pub fn subscribed_pages(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.subs.keys().copied()
    }

    /// Current subscription id of `page`.
    #[must_use]
    pub fn subscription_id(&self, page: PageIndex) -> Option<SubId> {
        self.subs.get(&page).map(|s| s.sub_id)
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Derive the watch set from a visible range. Returns `false` when the
    /// result equals the current watch set.
    pub fn on_viewport_changed(&mut self, range: VisibleRange) -> bool {
        self.last_range = Some(range);
        self.set_watch(self.derive_watch(range))
    }

    /// Bring subscriptions in line with the watch set.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for page in self.watch.iter() {
            let query = PageQuery::for_page(page, self.page_size, &self.filter);
            if self.subs.get(&page).is_some_and(|s| s.query == query) {
                continue;
            }
            if let Some(old) = self.subs.remove(&page) {
                cancel(page, &old);
                report.cancelled.push(page);
            }

            let sub_id = next_sub_id();
            let handle = self.source.subscribe(PageRequest {
                sub_id,
                page,
                query: query.clone(),
            });
            metrics::record_page_subscription_start(page, sub_id);
            self.subs.insert(
                page,
                PageSubscription {
                    sub_id,
                    query,
                    handle,
                },
            );
            self.store.ensure(page);
            report.started.push(page);
        }

        let unwatched: Vec<PageIndex> = self
            .subs
            .keys()
            .copied()
            .filter(|&page| !self.watch.contains(page))
            .collect();
        for page in unwatched {
            if let Some(old) = self.subs.remove(&page) {
                cancel(page, &old);
            }
            self.store.remove(page);
            report.cancelled.push(page);
        }

        if !report.is_noop() {
            tracing::debug!(
                target: "mailview.window",
                started = ?report.started,
                cancelled = ?report.cancelled,
                live = self.subs.len(),
                "reconciled page subscriptions"
            );
        }
        report
    }

    /// Apply one channel state from a page subscription.
    pub fn on_page_update(&mut self, envelope: PageEnvelope<T>) -> PageUpdate {
        let PageEnvelope {
            sub_id,
            page,
            state,
        } = envelope;

        let limit = match self.subs.get(&page) {
            Some(sub) if sub.sub_id == sub_id && self.watch.contains(page) => sub.query.limit,
            _ => {
                metrics::record_stale_update(page, sub_id);
                return PageUpdate::Stale;
            }
        };
        let Some(items) = state.value().map(Arc::clone) else {
            return PageUpdate::Unchanged;
        };

        let len = items.len();
        self.store.put(page, items);

        if len < limit {
            let watch_changed = self.mark_terminal(page);
            return PageUpdate::Stored {
                len,
                terminal: true,
                watch_changed,
            };
        }

        let mut watch_changed = false;
        if self.terminal == Some(page) {
            self.terminal = None;
            tracing::debug!(target: "mailview.window", page, "terminal page filled up");
            if let Some(range) = self.last_range {
                watch_changed = self.set_watch(self.derive_watch(range));
            }
        }
        PageUpdate::Stored {
            len,
            terminal: false,
            watch_changed,
        }
    }

    /// Replace the extra query dependencies. Every live subscription is
    /// replaced on the next [`reconcile`](Self::reconcile).
    pub fn set_filter(&mut self, filter: ListFilter) -> bool {
        if filter == self.filter {
            return false;
        }
        tracing::debug!(target: "mailview.window", ?filter, "filter changed");
        self.filter = filter;
        self.terminal = None;
        if let Some(range) = self.last_range {
            self.set_watch(self.derive_watch(range));
        }
        true
    }

    /// Map every stored slot through `render`, page by page.
    pub fn render<R>(&self, render: impl FnMut(Option<&T>) -> R) -> Vec<R> {
        self.store.render(self.page_size, render)
    }

    /// Cancel every subscription and forget all pages. Returns the number of
    /// cancelled subscriptions.
    pub fn unmount(&mut self) -> usize {
        let subs = std::mem::take(&mut self.subs);
        let count = subs.len();
        for (page, sub) in &subs {
            cancel(*page, sub);
        }
        self.store.clear();
        self.watch = WatchSet::initial();
        self.terminal = None;
        self.last_range = None;
        if count > 0 {
            tracing::debug!(target: "mailview.window", cancelled = count, "window unmounted");
        }
        count
    }

    fn derive_watch(&self, range: VisibleRange) -> WatchSet {
        let watch = WatchSet::for_visible(range, self.page_size);
        match self.terminal {
            Some(terminal) => watch.clamped_to(terminal),
            None => watch,
        }
    }

    fn set_watch(&mut self, watch: WatchSet) -> bool {
        if watch == self.watch {
            return false;
        }
        tracing::trace!(
            target: "mailview.window",
            from = ?self.watch.bounds(),
            to = ?watch.bounds(),
            "watch set changed"
        );
        self.watch = watch;
        true
    }

    fn mark_terminal(&mut self, page: PageIndex) -> bool {
        if self.terminal != Some(page) {
            tracing::debug!(target: "mailview.window", page, "terminal page");
        }
        self.terminal = Some(page);
        let evicted = self.store.truncate_after(page);
        let before = self.watch.len();
        let max_before = self.watch.max();
        self.watch.truncate_after(page);
        if evicted > 0 {
            tracing::trace!(target: "mailview.window", page, evicted, "truncated past terminal page");
        }
        self.watch.len() != before || self.watch.max() != max_before
    }
}

impl<T, S: PageSource<T>> Drop for PageWindowManager<T, S> {
    fn drop(&mut self) {
        for (page, sub) in &self.subs {
            cancel(*page, sub);
        }
    }
}

fn cancel<H: Cancel>(page: PageIndex, sub: &PageSubscription<H>) {
    sub.handle.cancel();
    metrics::record_page_subscription_cancel(page, sub.sub_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        subscribed: Vec<PageRequest>,
        cancelled: Vec<SubId>,
    }

    struct FakeHandle {
        sub_id: SubId,
        log: Rc<RefCell<Log>>,
    }

    impl Cancel for FakeHandle {
        fn cancel(&self) {
            self.log.borrow_mut().cancelled.push(self.sub_id);
        }
    }

    #[derive(Default, Clone)]
    struct FakeSource {
        log: Rc<RefCell<Log>>,
    }

    impl PageSource<u32> for FakeSource {
        type Handle = FakeHandle;

        fn subscribe(&mut self, request: PageRequest) -> FakeHandle {
            let sub_id = request.sub_id;
            self.log.borrow_mut().subscribed.push(request);
            FakeHandle {
                sub_id,
                log: Rc::clone(&self.log),
            }
        }
    }

    fn manager(page_size: usize) -> (PageWindowManager<u32, FakeSource>, Rc<RefCell<Log>>) {
        let source = FakeSource::default();
        let log = Rc::clone(&source.log);
        (
            PageWindowManager::new(page_size, ListFilter::mailbox("inbox"), source),
            log,
        )
    }

    fn page(start: u32, len: u32) -> Vec<u32> {
        (start..start + len).collect()
    }

    fn watched(w: &PageWindowManager<u32, FakeSource>) -> Vec<PageIndex> {
        w.watch_set().iter().collect()
    }

    #[test]
    fn first_reconcile_subscribes_page_zero() {
        let (mut w, log) = manager(5);
        let report = w.reconcile();
        assert_eq!(report.started, vec![0]);
        assert!(report.cancelled.is_empty());
        let req = &log.borrow().subscribed[0];
        assert_eq!((req.page, req.query.offset, req.query.limit), (0, 0, 5));
        assert!(w.store().get(0).is_some_and(|s| s.is_pending()));
    }

    #[test]
    fn viewport_change_derives_watch_set() {
        let (mut w, _) = manager(5);
        assert!(w.on_viewport_changed(VisibleRange::new(12, 18)));
        assert_eq!(watched(&w), vec![1, 2, 3, 4]);
        assert!(!w.on_viewport_changed(VisibleRange::new(11, 19)));
    }

    #[test]
    fn identical_watch_set_starts_nothing() {
        let (mut w, log) = manager(5);
        w.on_viewport_changed(VisibleRange::new(12, 18));
        w.reconcile();
        let before = log.borrow().subscribed.len();
        w.on_viewport_changed(VisibleRange::new(12, 18));
        assert!(w.reconcile().is_noop());
        assert_eq!(log.borrow().subscribed.len(), before);
    }

    #[test]
    fn leaving_pages_are_cancelled_and_evicted() {
        let (mut w, log) = manager(5);
        w.reconcile();
        let id0 = w.subscription_id(0).unwrap();
        w.on_page_update(PageEnvelope::open(id0, 0, page(0, 5)));

        w.on_viewport_changed(VisibleRange::new(30, 34));
        let report = w.reconcile();
        assert_eq!(report.started, vec![5, 6, 7]);
        assert_eq!(report.cancelled, vec![0]);
        assert!(log.borrow().cancelled.contains(&id0));
        assert!(w.store().get(0).is_none());
        assert_eq!(w.subscription_count(), 3);
    }

    #[test]
    fn stale_update_is_discarded() {
        let (mut w, _) = manager(5);
        w.reconcile();
        let old = w.subscription_id(0).unwrap();
        w.set_filter(ListFilter::mailbox("archive"));
        w.reconcile();
        let new = w.subscription_id(0).unwrap();
        assert_ne!(old, new);

        assert_eq!(
            w.on_page_update(PageEnvelope::open(new, 0, page(100, 5))),
            PageUpdate::Stored {
                len: 5,
                terminal: false,
                watch_changed: false
            }
        );
        assert_eq!(
            w.on_page_update(PageEnvelope::open(old, 0, page(0, 5))),
            PageUpdate::Stale
        );
        assert_eq!(w.store().items(0).unwrap()[0], 100);
    }

    #[test]
    fn short_page_truncates_store_and_watch_set() {
        let (mut w, _) = manager(100);
        w.on_viewport_changed(VisibleRange::new(150, 210));
        w.reconcile();
        assert_eq!(watched(&w), vec![0, 1, 2, 3]);

        let ids: Vec<_> = (0..4).map(|p| w.subscription_id(p).unwrap()).collect();
        w.on_page_update(PageEnvelope::open(ids[0], 0, page(0, 100)));
        w.on_page_update(PageEnvelope::open(ids[1], 1, page(100, 100)));
        let update = w.on_page_update(PageEnvelope::open(ids[2], 2, page(200, 37)));
        assert_eq!(
            update,
            PageUpdate::Stored {
                len: 37,
                terminal: true,
                watch_changed: true
            }
        );
        assert_eq!(w.terminal_page(), Some(2));
        assert_eq!(watched(&w), vec![0, 1, 2]);
        assert_eq!(w.store().len(), 3);

        let report = w.reconcile();
        assert_eq!(report.cancelled, vec![3]);

        // Late data for page 3 no longer lands.
        assert_eq!(
            w.on_page_update(PageEnvelope::open(ids[3], 3, page(300, 100))),
            PageUpdate::Stale
        );

        // Scrolling further stays clamped.
        w.on_viewport_changed(VisibleRange::new(230, 236));
        assert!(watched(&w).iter().all(|&p| p <= 2));
    }

    #[test]
    fn terminal_page_filling_up_reopens_the_window() {
        let (mut w, _) = manager(10);
        w.on_viewport_changed(VisibleRange::new(5, 15));
        w.reconcile();
        let id1 = w.subscription_id(1).unwrap();
        w.on_page_update(PageEnvelope::open(id1, 1, page(10, 4)));
        assert_eq!(watched(&w), vec![0, 1]);
        w.reconcile();

        let update = w.on_page_update(PageEnvelope::open(id1, 1, page(10, 10)));
        assert!(update.watch_changed());
        assert_eq!(w.terminal_page(), None);
        assert_eq!(watched(&w), vec![0, 1, 2]);
    }

    #[test]
    fn values_survive_connecting_and_error_states() {
        let (mut w, _) = manager(3);
        w.reconcile();
        let id = w.subscription_id(0).unwrap();
        w.on_page_update(PageEnvelope::open(id, 0, vec![1, 2, 3]));
        let update = w.on_page_update(PageEnvelope {
            sub_id: id,
            page: 0,
            state: ChannelState::Connecting { last_value: None },
        });
        assert_eq!(update, PageUpdate::Unchanged);
        assert_eq!(w.store().items(0), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn render_synthesizes_placeholders() {
        let (mut w, _) = manager(2);
        w.on_viewport_changed(VisibleRange::new(0, 1));
        w.reconcile();
        let id0 = w.subscription_id(0).unwrap();
        w.on_page_update(PageEnvelope::open(id0, 0, vec![7, 8]));
        let slots = w.render(|item| item.copied());
        assert_eq!(slots, vec![Some(7), Some(8), None, None]);
    }

    #[test]
    fn unmount_cancels_everything() {
        let (mut w, log) = manager(5);
        w.on_viewport_changed(VisibleRange::new(12, 18));
        w.reconcile();
        assert_eq!(w.unmount(), 4);
        assert_eq!(log.borrow().cancelled.len(), 4);
        assert_eq!(w.subscription_count(), 0);
        assert!(w.store().is_empty());
        assert_eq!(watched(&w), vec![0]);
    }

    #[test]
    fn drop_cancels_live_subscriptions() {
        let (mut w, log) = manager(5);
        w.reconcile();
        drop(w);
        assert_eq!(log.borrow().cancelled.len(), 1);
    }
}
