#![forbid(unsafe_code)]

//! Pages, the watch set, and the page store.
//!
//! The page store is the only place list contents live. It is keyed by page
//! index and kept in index order so that rendering can walk it front to back.
//! A page that has been requested but not answered yet is [`PageSlot::Pending`]
//! and renders as `page_size` placeholder slots, which keeps the scroll
//! metrics of the list stable while data is in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::viewport::VisibleRange;

/// Index of a page; `index * page_size` is its nominal offset.
pub type PageIndex = usize;

// ---------------------------------------------------------------------------
// WatchSet
// ---------------------------------------------------------------------------

/// Set of page indices that must be kept live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSet {
    pages: BTreeSet<PageIndex>,
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::initial()
    }
}

impl WatchSet {
    /// The seed set `{0}`.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            pages: BTreeSet::from([0]),
        }
    }

    /// Build from explicit indices. Returns `None` for an empty input.
    #[must_use]
    pub fn from_pages(pages: impl IntoIterator<Item = PageIndex>) -> Option<Self> {
        let pages: BTreeSet<_> = pages.into_iter().collect();
        (!pages.is_empty()).then_some(Self { pages })
    }

    /// Pages covering a visible item range plus one page of slack each side.
    ///
    /// `{first-1 (if first > 0), first, last, last+1}` where `first`/`last`
    /// are the pages holding the first/last visible item. Pages strictly
    /// between `first` and `last` are watched too, so a viewport taller than
    /// two pages has no holes. Whenever `last - first <= 1` there are no such
    /// pages and the result is exactly the four-element set above.
    #[must_use]
    pub fn for_visible(range: VisibleRange, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let first_page = range.first / page_size;
        let last_page = range.last / page_size;

        let mut pages = BTreeSet::new();
        if first_page > 0 {
            pages.insert(first_page - 1);
        }
        pages.extend(first_page..=last_page);
        pages.insert(last_page.saturating_add(1));
        Self { pages }
    }

    /// Lowest watched index.
    #[must_use]
    pub fn min(&self) -> PageIndex {
        self.pages.first().copied().unwrap_or(0)
    }

    /// Highest watched index.
    #[must_use]
    pub fn max(&self) -> PageIndex {
        self.pages.last().copied().unwrap_or(0)
    }

    /// `(min, max)` bounds.
    #[must_use]
    pub fn bounds(&self) -> (PageIndex, PageIndex) {
        (self.min(), self.max())
    }

    /// Whether `page` is watched.
    #[must_use]
    pub fn contains(&self, page: PageIndex) -> bool {
        self.pages.contains(&page)
    }

    /// Number of watched pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Never true for a set built through this API.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Watched indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.pages.iter().copied()
    }

    /// Drop every index above `last`, keeping at least `last` itself
    /// watched when nothing at or below it remains.
    pub fn truncate_after(&mut self, last: PageIndex) {
        self.pages.retain(|&p| p <= last);
        if self.pages.is_empty() {
            self.pages.insert(last);
        }
    }

    /// Copy limited to indices `<= last`, with the same non-empty guarantee
    /// as [`truncate_after`](Self::truncate_after).
    #[must_use]
    pub fn clamped_to(&self, last: PageIndex) -> Self {
        let mut out = self.clone();
        out.truncate_after(last);
        out
    }
}

// ---------------------------------------------------------------------------
// PageStore
// ---------------------------------------------------------------------------

/// Contents of one stored page.
#[derive(Debug, PartialEq)]
pub enum PageSlot<T> {
    /// Requested, no data received yet.
    Pending,
    /// Most recent snapshot received for the page.
    Loaded(Arc<Vec<T>>),
}

impl<T> Clone for PageSlot<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending => Self::Pending,
            Self::Loaded(items) => Self::Loaded(Arc::clone(items)),
        }
    }
}

impl<T> PageSlot<T> {
    /// Loaded items, if any.
    #[must_use]
    pub fn items(&self) -> Option<&[T]> {
        match self {
            Self::Pending => None,
            Self::Loaded(items) => Some(items.as_slice()),
        }
    }

    /// Whether the page is still waiting for data.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Ordered map of page index to page contents.
#[derive(Debug)]
pub struct PageStore<T> {
    pages: BTreeMap<PageIndex, PageSlot<T>>,
}

impl<T> Default for PageStore<T> {
    fn default() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }
}

impl<T> PageStore<T> {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending slot for `page` unless one already exists.
    pub fn ensure(&mut self, page: PageIndex) {
        self.pages.entry(page).or_insert(PageSlot::Pending);
    }

    /// Store the latest snapshot for `page`.
    pub fn put(&mut self, page: PageIndex, items: Arc<Vec<T>>) {
        self.pages.insert(page, PageSlot::Loaded(items));
    }

    /// Remove one page.
    pub fn remove(&mut self, page: PageIndex) -> Option<PageSlot<T>> {
        self.pages.remove(&page)
    }

    /// Remove every page above `last`; returns how many were removed.
    pub fn truncate_after(&mut self, last: PageIndex) -> usize {
        let Some(cut) = last.checked_add(1) else {
            return 0;
        };
        self.pages.split_off(&cut).len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Slot for `page`.
    #[must_use]
    pub fn get(&self, page: PageIndex) -> Option<&PageSlot<T>> {
        self.pages.get(&page)
    }

    /// Loaded items of `page`.
    #[must_use]
    pub fn items(&self, page: PageIndex) -> Option<&[T]> {
        self.get(page).and_then(PageSlot::items)
    }

    /// Number of stored pages (pending included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no page is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Stored page indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.pages.keys().copied()
    }

    /// Stored pages in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (PageIndex, &PageSlot<T>)> + '_ {
        self.pages.iter().map(|(&k, v)| (k, v))
    }

    /// First item of the lowest page in `min..=max` holding at least one item.
    #[must_use]
    pub fn first_item_in(&self, min: PageIndex, max: PageIndex) -> Option<&T> {
        if min > max {
            return None;
        }
        self.pages
            .range(min..=max)
            .find_map(|(_, slot)| slot.items().and_then(<[T]>::first))
    }

    /// Total slot count as rendered: loaded pages contribute their length,
    /// pending pages `page_size` placeholders.
    #[must_use]
    pub fn slot_count(&self, page_size: usize) -> usize {
        self.pages
            .values()
            .map(|slot| match slot {
                PageSlot::Pending => page_size,
                PageSlot::Loaded(items) => items.len(),
            })
            .sum()
    }

    /// Invoke `render` for every slot in page-then-slot order.
    ///
    /// Pending pages yield `page_size` `None` slots.
    pub fn render<R>(&self, page_size: usize, mut render: impl FnMut(Option<&T>) -> R) -> Vec<R> {
        let mut out = Vec::with_capacity(self.slot_count(page_size));
        for slot in self.pages.values() {
            match slot {
                PageSlot::Pending => out.extend((0..page_size).map(|_| render(None))),
                PageSlot::Loaded(items) => out.extend(items.iter().map(|item| render(Some(item)))),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_watch_set_is_page_zero() {
        let w = WatchSet::initial();
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(w.bounds(), (0, 0));
    }

    #[test]
    fn visible_range_maps_to_slack_pages() {
        let w = WatchSet::for_visible(VisibleRange::new(12, 18), 5);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn first_page_has_no_lower_slack() {
        let w = WatchSet::for_visible(VisibleRange::new(0, 3), 5);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn single_page_range() {
        let w = WatchSet::for_visible(VisibleRange::new(11, 13), 5);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn tall_viewport_watches_pages_in_between() {
        let w = WatchSet::for_visible(VisibleRange::new(7, 31), 5);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn short_spans_match_the_four_page_rule() {
        for first in 0..40 {
            for last in first..first + 12 {
                let (fp, lp) = (first / 5, last / 5);
                if lp - fp > 1 {
                    continue;
                }
                let mut expected: BTreeSet<_> = [fp, lp, lp + 1].into();
                if fp > 0 {
                    expected.insert(fp - 1);
                }
                let w = WatchSet::for_visible(VisibleRange::new(first, last), 5);
                assert_eq!(w.iter().collect::<BTreeSet<_>>(), expected, "{first}..={last}");
            }
        }
    }

    #[test]
    fn truncate_keeps_set_non_empty() {
        let mut w = WatchSet::from_pages([4, 5]).unwrap();
        w.truncate_after(2);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn empty_from_pages_is_rejected() {
        assert!(WatchSet::from_pages([]).is_none());
    }

    #[test]
    fn store_truncates_after_terminal() {
        let mut s: PageStore<u32> = PageStore::new();
        for p in 0..5 {
            s.ensure(p);
        }
        assert_eq!(s.truncate_after(2), 2);
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn ensure_does_not_clobber_data() {
        let mut s = PageStore::new();
        s.put(0, Arc::new(vec![1, 2]));
        s.ensure(0);
        assert_eq!(s.items(0), Some(&[1, 2][..]));
    }

    #[test]
    fn render_synthesizes_placeholders() {
        let mut s = PageStore::new();
        s.put(0, Arc::new(vec!["a", "b", "c"]));
        s.ensure(1);
        s.put(2, Arc::new(vec!["x"]));
        let out = s.render(3, |item| item.copied());
        assert_eq!(
            out,
            vec![Some("a"), Some("b"), Some("c"), None, None, None, Some("x")]
        );
        assert_eq!(s.slot_count(3), 7);
    }

    #[test]
    fn first_item_skips_empty_and_pending_pages() {
        let mut s: PageStore<&str> = PageStore::new();
        s.ensure(1);
        s.put(2, Arc::new(vec![]));
        s.put(3, Arc::new(vec!["k", "l"]));
        s.put(4, Arc::new(vec!["z"]));
        assert_eq!(s.first_item_in(1, 4), Some(&"k"));
        assert_eq!(s.first_item_in(4, 9), Some(&"z"));
        assert_eq!(s.first_item_in(0, 2), None);
    }
}
