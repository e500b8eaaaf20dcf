#![forbid(unsafe_code)]

//! Container geometry as reported by the rendering layer.
//!
//! All coordinates are in content space: `0.0` is the top of the first
//! rendered child, and offsets grow downward. The engine never measures
//! anything itself; it only consumes these snapshots.

/// Vertical extent of one rendered child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemExtent {
    /// Top edge (inclusive).
    pub top: f64,
    /// Bottom edge (exclusive).
    pub bottom: f64,
}

impl ItemExtent {
    /// Create an extent from its edges.
    #[must_use]
    pub const fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }

    /// Height of the extent, never negative.
    #[must_use]
    pub fn height(&self) -> f64 {
        (self.bottom - self.top).max(0.0)
    }
}

/// Snapshot of a scrollable container.
///
/// `extents` must be ordered by increasing, non-overlapping offset. Children
/// are everything the list currently renders, placeholders included.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerGeometry {
    /// Current scroll offset of the container.
    pub scroll_offset: f64,
    /// Height of the visible area.
    pub visible_height: f64,
    /// Rendered children, top to bottom.
    pub extents: Vec<ItemExtent>,
}

impl ContainerGeometry {
    /// Create a geometry snapshot.
    #[must_use]
    pub fn new(scroll_offset: f64, visible_height: f64, extents: Vec<ItemExtent>) -> Self {
        Self {
            scroll_offset,
            visible_height,
            extents,
        }
    }

    /// Geometry for `count` fixed-height rows stacked from offset zero.
    #[must_use]
    pub fn uniform(count: usize, item_height: f64, scroll_offset: f64, visible_height: f64) -> Self {
        let extents = (0..count)
            .map(|i| {
                let top = i as f64 * item_height;
                ItemExtent::new(top, top + item_height)
            })
            .collect();
        Self::new(scroll_offset, visible_height, extents)
    }

    /// Same children, different scroll position.
    #[must_use]
    pub fn scrolled_to(&self, scroll_offset: f64) -> Self {
        Self {
            scroll_offset,
            ..self.clone()
        }
    }

    /// Same children, different visible height (container resize).
    #[must_use]
    pub fn resized_to(&self, visible_height: f64) -> Self {
        Self {
            visible_height,
            ..self.clone()
        }
    }

    /// Lower edge of the visible area.
    #[inline]
    #[must_use]
    pub fn viewport_bottom(&self) -> f64 {
        self.scroll_offset + self.visible_height
    }

    /// Total content height (bottom edge of the last child).
    #[must_use]
    pub fn content_height(&self) -> f64 {
        self.extents.last().map_or(0.0, |e| e.bottom)
    }

    /// Number of rendered children.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    /// Whether the container has no children.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }
}
