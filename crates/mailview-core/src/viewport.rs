#![forbid(unsafe_code)]

//! Viewport detection over rendered child extents.
//!
//! [`detect`] answers one question: which child indices are on screen right
//! now? It is a pure function of a [`ContainerGeometry`] snapshot and is
//! re-run on every scroll and resize notification, so it must stay cheap.
//!
//! # Algorithm
//!
//! Children are laid out in increasing, non-overlapping offset order, so both
//! edges are monotone and each bound is a single `partition_point`:
//!
//! - `first` is the smallest index whose bottom edge exceeds the scroll
//!   offset.
//! - `last` is the smallest index at or after `first` whose top edge exceeds
//!   `scroll_offset + visible_height`, clamped to the last child. That child
//!   sits just past the lower edge, which gives one row of overscan.
//!
//! Both searches are `O(log n)`.

use crate::geometry::{ContainerGeometry, ItemExtent};

/// Inclusive range of child indices currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibleRange {
    /// First visible child index.
    pub first: usize,
    /// Last visible child index (inclusive).
    pub last: usize,
}

impl VisibleRange {
    /// Create a range. `first` must not exceed `last`.
    #[must_use]
    pub fn new(first: usize, last: usize) -> Self {
        debug_assert!(first <= last, "inverted visible range {first}..={last}");
        Self { first, last }
    }

    /// Number of children in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Always false; a range holds at least one child.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `index` falls inside the range.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        (self.first..=self.last).contains(&index)
    }
}

/// Compute the visible child range of a container.
///
/// Returns `None` when the container has no children.
#[must_use]
pub fn detect(geometry: &ContainerGeometry) -> Option<VisibleRange> {
    detect_extents(
        geometry.scroll_offset,
        geometry.visible_height,
        &geometry.extents,
    )
}

/// [`detect`] over raw parts, for callers that keep extents elsewhere.
#[must_use]
pub fn detect_extents(
    scroll_offset: f64,
    visible_height: f64,
    extents: &[ItemExtent],
) -> Option<VisibleRange> {
    let last_index = extents.len().checked_sub(1)?;

    let first = extents
        .partition_point(|e| e.bottom <= scroll_offset)
        .min(last_index);

    let viewport_bottom = scroll_offset + visible_height;
    let past_bottom = extents[first..].partition_point(|e| e.top <= viewport_bottom);
    let last = (first + past_bottom).min(last_index);

    Some(VisibleRange::new(first, last))
}
