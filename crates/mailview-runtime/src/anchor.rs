#![forbid(unsafe_code)]

//! Anchor-based sync controller.
//!
//! Offsets drift when the server inserts items above the viewport. The sync
//! query is therefore anchored to the key of the first item of the earliest
//! watched page that has data, and sized to cover the whole watched span
//! with some headroom.
//!
//! The anchor is always read from the current page contents. It is
//! recomputed when the watch set's `(min, max)` bounds move, or on an
//! explicit [`resync`](AnchorSyncController::resync).

use mailview_core::{Keyed, ListFilter, PageIndex, PageStore, SyncQuery, WatchSet};

use crate::channel::Outbound;

/// Destination of sync queries.
pub trait QueryPublisher {
    fn publish(&mut self, query: &SyncQuery);
}

impl QueryPublisher for Outbound {
    fn publish(&mut self, query: &SyncQuery) {
        match self.set(query) {
            Ok(version) => tracing::trace!(target: "mailview.sync", version, "sync query queued"),
            Err(error) => {
                tracing::error!(target: "mailview.sync", %error, "failed to serialize sync query");
            }
        }
    }
}

impl<P: QueryPublisher + ?Sized> QueryPublisher for &mut P {
    fn publish(&mut self, query: &SyncQuery) {
        (**self).publish(query);
    }
}

/// Computes anchored sync queries and hands them to a [`QueryPublisher`].
#[derive(Debug)]
pub struct AnchorSyncController<P> {
    publisher: P,
    page_size: usize,
    safety_factor: f64,
    filter: ListFilter,
    bounds: Option<(PageIndex, PageIndex)>,
    last_query: Option<SyncQuery>,
}

impl<P: QueryPublisher> AnchorSyncController<P> {
    pub fn new(publisher: P, page_size: usize, safety_factor: f64, filter: ListFilter) -> Self {
        Self {
            publisher,
            page_size,
            safety_factor,
            filter,
            bounds: None,
            last_query: None,
        }
    }

    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    /// Last published query.
    #[must_use]
    pub fn last_query(&self) -> Option<&SyncQuery> {
        self.last_query.as_ref()
    }

    /// Anchor of the last published query.
    #[must_use]
    pub fn anchor(&self) -> Option<&str> {
        self.last_query.as_ref().and_then(|q| q.anchor_id.as_deref())
    }

    /// React to a (possibly) new watch set. Publishes and returns the new
    /// query when the bounds moved and the query changed.
    pub fn on_watch_changed<T: Keyed>(
        &mut self,
        watch: &WatchSet,
        store: &PageStore<T>,
    ) -> Option<SyncQuery> {
        let bounds = watch.bounds();
        if self.bounds == Some(bounds) {
            return None;
        }
        self.bounds = Some(bounds);
        self.recompute(bounds, store, false)
    }

    /// Recompute from the current contents and publish unconditionally.
    pub fn resync<T: Keyed>(&mut self, watch: &WatchSet, store: &PageStore<T>) -> Option<SyncQuery> {
        let bounds = watch.bounds();
        self.bounds = Some(bounds);
        self.recompute(bounds, store, true)
    }

    /// Replace the filter; the next watch notification recomputes.
    pub fn set_filter(&mut self, filter: ListFilter) {
        if filter != self.filter {
            self.filter = filter;
            self.bounds = None;
        }
    }

    /// Forget the last bounds and query.
    pub fn reset(&mut self) {
        self.bounds = None;
        self.last_query = None;
    }

    fn recompute<T: Keyed>(
        &mut self,
        (min, max): (PageIndex, PageIndex),
        store: &PageStore<T>,
        force: bool,
    ) -> Option<SyncQuery> {
        let query = SyncQuery {
            anchor_id: store.first_item_in(min, max).map(|item| item.key().to_owned()),
            filter: self.filter.clone(),
            limit: SyncQuery::limit_for_span(min, max, self.page_size, self.safety_factor),
        };
        if !force && self.last_query.as_ref() == Some(&query) {
            return None;
        }

        tracing::debug!(
            target: "mailview.sync",
            anchor = query.anchor_id.as_deref().unwrap_or("<start>"),
            min,
            max,
            limit = query.limit.get(),
            "publishing sync query"
        );
        self.publisher.publish(&query);
        self.last_query = Some(query.clone());
        Some(query)
    }
}
