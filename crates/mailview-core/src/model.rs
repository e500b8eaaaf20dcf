#![forbid(unsafe_code)]

//! Item identity and the thin business-object shells streamed by the server.
//!
//! The engine is generic over the item type; the only thing it needs from an
//! item is a stable key for anchoring. The shells below only carry the fields
//! the list views key and sort on. Everything else rides along as raw JSON.

use serde::{Deserialize, Serialize};

/// An item with a stable application-level identity.
pub trait Keyed {
    /// Identity used for anchoring. Must not change for the item's lifetime.
    fn key(&self) -> &str;
}

impl<K: Keyed + ?Sized> Keyed for &K {
    fn key(&self) -> &str {
        (**self).key()
    }
}

impl Keyed for String {
    fn key(&self) -> &str {
        self
    }
}

/// A mailbox (folder / label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, rename = "totalEmails")]
    pub total_emails: Option<u64>,
    #[serde(default, rename = "unreadEmails")]
    pub unread_emails: Option<u64>,
}

impl Keyed for Mailbox {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A single message summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    #[serde(default, rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default, rename = "receivedAt")]
    pub received_at: Option<String>,
    /// Remaining server fields, untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Keyed for Email {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A conversation thread; emails are ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub emails: Vec<Email>,
}

impl Thread {
    /// Most recent email of the thread.
    #[must_use]
    pub fn latest(&self) -> Option<&Email> {
        self.emails.last()
    }
}

impl Keyed for Thread {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Opaque token received on the incremental sync feed.
pub type SyncToken = serde_json::Value;

/// Server-side progress of an incremental sync, when the token carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum SyncState {
    NotStarted,
    InProgress,
    Error { details: String },
    UpToDate,
}

impl SyncState {
    /// Best-effort interpretation of a sync token.
    #[must_use]
    pub fn from_token(token: &SyncToken) -> Option<Self> {
        serde_json::from_value(token.clone()).ok()
    }
}
