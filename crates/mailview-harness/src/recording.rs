#![forbid(unsafe_code)]

//! Page sources and publishers that record calls instead of connecting.

use std::sync::{Arc, Mutex, MutexGuard};

use mailview_core::{PageIndex, SyncQuery};
use mailview_runtime::{Cancel, PageEnvelope, PageRequest, PageSource, QueryPublisher, SubId};

/// Everything a [`RecordingPageSource`] saw.
#[derive(Debug, Default, Clone)]
pub struct SourceLog {
    pub requests: Vec<PageRequest>,
    pub cancelled: Vec<SubId>,
}

impl SourceLog {
    /// Requests whose subscription has not been cancelled.
    #[must_use]
    pub fn live(&self) -> Vec<&PageRequest> {
        self.requests
            .iter()
            .filter(|r| !self.cancelled.contains(&r.sub_id))
            .collect()
    }

    /// Most recent request for `page`.
    #[must_use]
    pub fn latest_for(&self, page: PageIndex) -> Option<&PageRequest> {
        self.requests.iter().rev().find(|r| r.page == page)
    }
}

/// [`PageSource`] that only records. Clones share the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingPageSource {
    log: Arc<Mutex<SourceLog>>,
}

impl RecordingPageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock and read the log.
    pub fn log(&self) -> MutexGuard<'_, SourceLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Envelope answering the latest request for `page` with `items`.
    ///
    /// # Panics
    /// If `page` was never requested.
    #[must_use]
    pub fn answer<T>(&self, page: PageIndex, items: Vec<T>) -> PageEnvelope<T> {
        let sub_id = self
            .log()
            .latest_for(page)
            .map(|r| r.sub_id)
            .unwrap_or_else(|| panic!("page {page} was never requested"));
        PageEnvelope::open(sub_id, page, items)
    }
}

/// Handle returned by [`RecordingPageSource`].
#[derive(Debug)]
pub struct RecordingHandle {
    sub_id: SubId,
    log: Arc<Mutex<SourceLog>>,
}

impl Cancel for RecordingHandle {
    fn cancel(&self) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        if !log.cancelled.contains(&self.sub_id) {
            log.cancelled.push(self.sub_id);
        }
    }
}

impl<T> PageSource<T> for RecordingPageSource {
    type Handle = RecordingHandle;

    fn subscribe(&mut self, request: PageRequest) -> RecordingHandle {
        let sub_id = request.sub_id;
        self.log().requests.push(request);
        RecordingHandle {
            sub_id,
            log: Arc::clone(&self.log),
        }
    }
}

/// [`QueryPublisher`] that records every published query. Clones share the
/// record.
#[derive(Debug, Default, Clone)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<SyncQuery>>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn published(&self) -> Vec<SyncQuery> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<SyncQuery> {
        self.published().pop()
    }
}

impl QueryPublisher for RecordingPublisher {
    fn publish(&mut self, query: &SyncQuery) {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());
    }
}
