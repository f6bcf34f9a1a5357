//! `requests.json` / `responses.json` persistence.
//!
//! Both documents are edited at the JSON value level so fields the agent
//! added (timestamps, notes) survive the relay's rewrites. Every write is a
//! read-modify-write under one mutex, finished by an atomic rename.

use std::path::{Path, PathBuf};

use {
    opsrelay_common::{
        fs::{ensure_json_file, read_json, write_json_atomic},
        types::{ConcreteResponse, EntryStatus, QueueEntry},
    },
    serde_json::{Map, Value, json},
    tokio::sync::Mutex,
    tracing::{debug, error, warn},
};

use crate::error::{Context, Error, Result};

pub const REQUESTS_FILE: &str = "requests.json";
pub const RESPONSES_FILE: &str = "responses.json";

pub struct QueueStore {
    requests_path: PathBuf,
    responses_path: PathBuf,
    lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            requests_path: data_dir.join(REQUESTS_FILE),
            responses_path: data_dir.join(RESPONSES_FILE),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn requests_path(&self) -> &Path {
        &self.requests_path
    }

    #[must_use]
    pub fn responses_path(&self) -> &Path {
        &self.responses_path
    }

    /// Seed empty documents for any file that does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        ensure_json_file(&self.requests_path, &json!({ "requests": [] })).await?;
        ensure_json_file(&self.responses_path, &json!({ "responses": {} })).await?;
        Ok(())
    }

    /// Pending entries in file order. A missing or malformed queue reads as
    /// empty; a single malformed entry is skipped.
    pub async fn load_pending(&self) -> Vec<QueueEntry> {
        let doc = {
            let _guard = self.lock.lock().await;
            read_json::<Value>(&self.requests_path).await
        };
        let doc = match doc {
            Ok(Some(doc)) => doc,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(path = %self.requests_path.display(), error = %e, "cannot read queue file");
                return Vec::new();
            },
        };

        let Some(requests) = doc.get("requests").and_then(Value::as_array) else {
            warn!("queue file has no requests array");
            return Vec::new();
        };

        requests
            .iter()
            .filter(|r| r.get("status").and_then(Value::as_str) == Some(EntryStatus::Pending.as_str()))
            .filter_map(|r| match serde_json::from_value::<QueueEntry>(r.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping malformed queue entry");
                    None
                },
            })
            .collect()
    }

    /// Move the first entry with `id` out of `pending`. Entries that already
    /// reached a terminal state are left alone. Returns whether a change was
    /// written.
    pub async fn mark_status(&self, id: &str, status: EntryStatus) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc: Value = read_json(&self.requests_path)
            .await?
            .context("queue file disappeared")?;

        let requests = doc
            .get_mut("requests")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::malformed(REQUESTS_FILE, "missing requests array"))?;

        let Some(entry) = requests
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
        else {
            warn!(request_id = id, "entry vanished before status update");
            return Ok(false);
        };

        if entry.get("status").and_then(Value::as_str) != Some(EntryStatus::Pending.as_str()) {
            debug!(request_id = id, "entry no longer pending, status untouched");
            return Ok(false);
        }
        if let Some(obj) = entry.as_object_mut() {
            obj.insert("status".into(), Value::String(status.as_str().into()));
        }

        write_json_atomic(&self.requests_path, &doc).await?;
        debug!(request_id = id, %status, "entry status updated");
        Ok(true)
    }

    /// Record `response` under `id`, keeping every other response.
    pub async fn merge_response(&self, id: &str, response: &ConcreteResponse) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc: Value = read_json(&self.responses_path)
            .await?
            .unwrap_or_else(|| json!({ "responses": {} }));

        let root = doc
            .as_object_mut()
            .ok_or_else(|| Error::malformed(RESPONSES_FILE, "document is not an object"))?;
        let responses = root
            .entry("responses")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| Error::malformed(RESPONSES_FILE, "responses is not an object"))?;
        responses.insert(id.to_string(), serde_json::to_value(response)?);

        write_json_atomic(&self.responses_path, &doc).await?;
        Ok(())
    }

    /// All recorded responses keyed by entry id.
    pub async fn load_responses(&self) -> Result<Map<String, Value>> {
        let _guard = self.lock.lock().await;
        let doc: Option<Value> = read_json(&self.responses_path).await?;
        Ok(doc
            .and_then(|mut d| d.get_mut("responses").map(Value::take))
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn store_with(requests: Value) -> (tempfile::TempDir, QueueStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        write_json_atomic(store.requests_path(), &requests)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn initialize_seeds_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.initialize().await.unwrap();

        assert!(store.load_pending().await.is_empty());
        assert!(store.load_responses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_pending_filters_terminal_entries() {
        let (_dir, store) = store_with(json!({"requests": [
            {"id": "a", "status": "pending", "command": "send", "payload": {}},
            {"id": "b", "status": "completed"},
            {"id": "c", "status": "failed"},
            {"id": "d", "status": "pending", "method": "GET", "url": "https://x/"},
        ]}))
        .await;

        let ids: Vec<_> = store.load_pending().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["a", "d"]);
    }

    #[tokio::test]
    async fn malformed_queue_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        tokio::fs::write(store.requests_path(), "{ not json").await.unwrap();
        assert!(store.load_pending().await.is_empty());
    }

    #[tokio::test]
    async fn mark_status_updates_first_match_once() {
        let (_dir, store) = store_with(json!({"requests": [
            {"id": "a", "status": "pending", "note": "keep me"},
            {"id": "a", "status": "pending"},
        ]}))
        .await;

        assert!(store.mark_status("a", EntryStatus::Completed).await.unwrap());

        let doc: Value = read_json(store.requests_path()).await.unwrap().unwrap();
        assert_eq!(doc["requests"][0]["status"], "completed");
        assert_eq!(doc["requests"][0]["note"], "keep me");
        assert_eq!(doc["requests"][1]["status"], "pending");

        // Terminal states never revert.
        assert!(!store.mark_status("a", EntryStatus::Pending).await.unwrap());
        assert!(!store.mark_status("missing", EntryStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn completed_entry_is_not_overwritten() {
        let (_dir, store) = store_with(json!({"requests": [
            {"id": "a", "status": "completed"},
        ]}))
        .await;
        assert!(!store.mark_status("a", EntryStatus::Failed).await.unwrap());
        let doc: Value = read_json(store.requests_path()).await.unwrap().unwrap();
        assert_eq!(doc["requests"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn merge_response_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        store.initialize().await.unwrap();

        store
            .merge_response("one", &ConcreteResponse::success(200, Some(json!({"ok": true}))))
            .await
            .unwrap();
        store
            .merge_response("two", &ConcreteResponse::failure("boom"))
            .await
            .unwrap();

        let responses = store.load_responses().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses["one"]["status"], 200);
        assert_eq!(responses["two"]["error"], "boom");
        assert!(responses["two"]["status"].is_null());
        assert!(responses["two"]["received_at"].is_string());
    }

    #[tokio::test]
    async fn merge_response_refuses_to_clobber_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        tokio::fs::write(store.responses_path(), "[1, 2]").await.unwrap();

        let err = store
            .merge_response("x", &ConcreteResponse::failure("e"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        let raw = tokio::fs::read_to_string(store.responses_path()).await.unwrap();
        assert_eq!(raw, "[1, 2]");
    }
}
