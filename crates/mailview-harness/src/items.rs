#![forbid(unsafe_code)]

//! Keyed test items and page builders.

use mailview_core::{ContainerGeometry, Keyed};
use serde::{Deserialize, Serialize};

/// Smallest possible list item: just an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestItem {
    pub id: String,
}

impl TestItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Keyed for TestItem {
    fn key(&self) -> &str {
        &self.id
    }
}

impl From<&str> for TestItem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Items `{prefix}{start}` .. `{prefix}{start + len - 1}`.
#[must_use]
pub fn item_page(prefix: &str, start: usize, len: usize) -> Vec<TestItem> {
    (start..start + len)
        .map(|i| TestItem::new(format!("{prefix}{i}")))
        .collect()
}

/// Newline-terminated JSON payload for a page, as the server sends it.
#[must_use]
pub fn page_json(items: &[TestItem]) -> String {
    let mut json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_owned());
    json.push('\n');
    json
}

/// Fixed-height rows with the viewport's top edge at row `first_row`.
#[must_use]
pub fn rows_geometry(count: usize, row_height: f64, first_row: usize, visible_height: f64) -> ContainerGeometry {
    ContainerGeometry::uniform(count, row_height, first_row as f64 * row_height, visible_height)
}
