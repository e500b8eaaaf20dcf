#![forbid(unsafe_code)]

//! Request shapes sent to the paged and incremental-sync endpoints.
//!
//! Field names follow the server's JSON contract (`snake_case`), so a
//! [`SyncQuery`] serializes to exactly what the sync endpoint expects:
//!
//! ```json
//! {"anchor_id":"t-42","mailbox_id":"inbox","search_keyword":null,
//!  "sorts":[{"column":"Date","asc":false}],"limit":240}
//! ```

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::page::PageIndex;

/// Column a list can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortColumn {
    /// Received date.
    Date,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub asc: bool,
}

impl SortSpec {
    /// Newest first.
    #[must_use]
    pub fn newest_first() -> Self {
        Self {
            column: SortColumn::Date,
            asc: false,
        }
    }
}

/// Extra dependencies of every page query.
///
/// Anything in here changing invalidates every live page subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ListFilter {
    pub mailbox_id: Option<String>,
    pub search_keyword: Option<String>,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
}

impl ListFilter {
    /// Filter for one mailbox, newest first.
    #[must_use]
    pub fn mailbox(mailbox_id: impl Into<String>) -> Self {
        Self {
            mailbox_id: Some(mailbox_id.into()),
            search_keyword: None,
            sorts: vec![SortSpec::newest_first()],
        }
    }

    /// Add a search keyword. Empty keywords are ignored.
    #[must_use]
    pub fn with_search(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.search_keyword = (!keyword.trim().is_empty()).then_some(keyword);
        self
    }

    /// Replace the sort keys.
    #[must_use]
    pub fn with_sorts(mut self, sorts: Vec<SortSpec>) -> Self {
        self.sorts = sorts;
        self
    }
}

/// Dependency tuple of one page subscription: `(offset, limit, filter)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageQuery {
    pub offset: usize,
    pub limit: usize,
    pub filter: ListFilter,
}

impl PageQuery {
    /// The query that populates `page` at the given page size.
    #[must_use]
    pub fn for_page(page: PageIndex, page_size: usize, filter: &ListFilter) -> Self {
        Self {
            offset: page * page_size,
            limit: page_size,
            filter: filter.clone(),
        }
    }
}

/// Anchored query pushed to the incremental sync endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQuery {
    /// Key of the first item of the earliest watched page with data.
    /// Absent means "from the start".
    pub anchor_id: Option<String>,
    #[serde(flatten)]
    pub filter: ListFilter,
    pub limit: NonZeroUsize,
}

impl SyncQuery {
    /// Row budget covering pages `min..=max`, inflated by `safety_factor`.
    ///
    /// Never less than one full page span.
    #[must_use]
    pub fn limit_for_span(
        min: PageIndex,
        max: PageIndex,
        page_size: usize,
        safety_factor: f64,
    ) -> NonZeroUsize {
        let span = (max.saturating_sub(min) + 1).saturating_mul(page_size.max(1));
        let inflated = (span as f64 * safety_factor.max(1.0)).ceil();
        let limit = if inflated.is_finite() && inflated < usize::MAX as f64 {
            inflated as usize
        } else {
            usize::MAX
        };
        NonZeroUsize::new(limit.max(span)).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_offsets() {
        let f = ListFilter::mailbox("inbox");
        let q = PageQuery::for_page(3, 50, &f);
        assert_eq!(q.offset, 150);
        assert_eq!(q.limit, 50);
        assert_eq!(q.filter, f);
    }

    #[test]
    fn filter_change_changes_query() {
        let a = PageQuery::for_page(1, 10, &ListFilter::mailbox("inbox"));
        let b = PageQuery::for_page(1, 10, &ListFilter::mailbox("archive"));
        assert_ne!(a, b);
    }

    #[test]
    fn blank_search_is_dropped() {
        let f = ListFilter::mailbox("inbox").with_search("   ");
        assert_eq!(f.search_keyword, None);
        let f = ListFilter::mailbox("inbox").with_search("invoice");
        assert_eq!(f.search_keyword.as_deref(), Some("invoice"));
    }

    #[test]
    fn sync_limit_covers_span_with_margin() {
        let limit = SyncQuery::limit_for_span(1, 4, 5, 2.0);
        assert_eq!(limit.get(), 40);
        let limit = SyncQuery::limit_for_span(0, 0, 50, 1.5);
        assert_eq!(limit.get(), 75);
    }

    #[test]
    fn sync_limit_never_below_span() {
        let limit = SyncQuery::limit_for_span(2, 3, 10, 0.1);
        assert_eq!(limit.get(), 20);
    }

    #[test]
    fn sync_query_json_shape() {
        let q = SyncQuery {
            anchor_id: Some("t-1".into()),
            filter: ListFilter::mailbox("inbox"),
            limit: NonZeroUsize::new(20).unwrap(),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["anchor_id"], "t-1");
        assert_eq!(v["mailbox_id"], "inbox");
        assert_eq!(v["limit"], 20);
        assert_eq!(v["sorts"][0]["column"], "Date");
        assert_eq!(v["sorts"][0]["asc"], false);
    }

    #[test]
    fn sort_keys_serialize_as_the_server_reads_them() {
        let json = serde_json::to_string(&[SortSpec::newest_first()]).unwrap();
        assert_eq!(json, r#"[{"column":"Date","asc":false}]"#);
    }
}
