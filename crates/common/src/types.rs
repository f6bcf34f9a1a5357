//! Wire types shared by the queue, outbound, and inbound crates.
//!
//! These mirror the JSON documents exchanged with the agent on disk:
//! `requests.json`, `responses.json`, and `inbox.json`.

use std::collections::BTreeMap;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Lifecycle state of a queue entry. Only the relay moves an entry out of
/// `Pending`, and it does so exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request written by the agent into `requests.json`.
///
/// Either a unified command (`command` + `payload`) or a raw HTTP request
/// (`method`, `url`, `headers`, `body`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub status: Option<EntryStatus>,
}

impl QueueEntry {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == Some(EntryStatus::Pending)
    }
}

/// Result of executing one queue entry, stored under the entry id in
/// `responses.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteResponse {
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub received_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ConcreteResponse {
    #[must_use]
    pub fn success(status: u16, body: Option<Value>) -> Self {
        Self {
            status: Some(status),
            body,
            received_at: Utc::now(),
            error: None,
        }
    }

    /// Failure before or without a response from the remote side.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            received_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// The remote answered but the body was discarded (size ceiling).
    #[must_use]
    pub fn discarded(status: u16, error: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            body: None,
            received_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Terminal queue status implied by this response.
    #[must_use]
    pub fn entry_status(&self) -> EntryStatus {
        if self.is_ok() {
            EntryStatus::Completed
        } else {
            EntryStatus::Failed
        }
    }
}

/// A chat message pulled from the platform, tagged with its `update_id`.
///
/// All platform fields are kept verbatim so the agent sees the full message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    #[serde(default)]
    pub update_id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InboxMessage {
    #[must_use]
    pub fn new(update_id: i64, fields: Map<String, Value>) -> Self {
        Self { update_id, fields }
    }

    #[must_use]
    pub fn chat_id(&self) -> Option<i64> {
        self.fields.get("chat")?.get("id")?.as_i64()
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.fields
            .get("text")
            .or_else(|| self.fields.get("caption"))
            .and_then(Value::as_str)
    }
}

/// `inbox.json`: the most recent non-empty batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxDocument {
    #[serde(default)]
    pub messages: Vec<InboxMessage>,
}
