//! `inbox.json`: the latest batch of inbound messages.

use std::path::{Path, PathBuf};

use {
    opsrelay_common::{
        fs::{ensure_json_file, read_json, write_json_atomic},
        types::{InboxDocument, InboxMessage},
    },
    serde_json::json,
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::{error::Result, offset::offset_from_messages};

pub const INBOX_FILE: &str = "inbox.json";

pub struct InboxStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InboxStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(INBOX_FILE),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        ensure_json_file(&self.path, &json!({ "messages": [] })).await?;
        Ok(())
    }

    /// Messages currently in the inbox. Unreadable content reads as empty.
    pub async fn load(&self) -> Vec<InboxMessage> {
        let _guard = self.lock.lock().await;
        match read_json::<InboxDocument>(&self.path).await {
            Ok(doc) => doc.map(|d| d.messages).unwrap_or_default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read inbox, starting empty");
                Vec::new()
            },
        }
    }

    /// Starting offset derived from the persisted batch.
    pub async fn load_offset(&self) -> i64 {
        offset_from_messages(&self.load().await)
    }

    /// Replace the inbox with exactly `messages`.
    pub async fn save(&self, messages: &[InboxMessage]) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_json_atomic(&self.path, &json!({ "messages": messages })).await?;
        debug!(count = messages.len(), "inbox written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::Map};

    fn message(update_id: i64, text: &str) -> InboxMessage {
        let mut fields = Map::new();
        fields.insert("text".into(), json!(text));
        fields.insert("chat".into(), json!({"id": 42}));
        InboxMessage::new(update_id, fields)
    }

    #[tokio::test]
    async fn missing_inbox_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = InboxStore::new(dir.path());
        assert_eq!(inbox.load_offset().await, 0);
        inbox.initialize().await.unwrap();
        assert_eq!(inbox.load_offset().await, 0);
    }

    #[tokio::test]
    async fn persisted_batch_restores_offset() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = InboxStore::new(dir.path());
        inbox
            .save(&[message(3, "a"), message(9, "b"), message(4, "c")])
            .await
            .unwrap();

        let reopened = InboxStore::new(dir.path());
        assert_eq!(reopened.load_offset().await, 10);
        let loaded = reopened.load().await;
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1].text(), Some("b"));
        assert_eq!(loaded[1].chat_id(), Some(42));
    }

    #[tokio::test]
    async fn save_overwrites_previous_batch() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = InboxStore::new(dir.path());
        inbox.save(&[message(1, "old")]).await.unwrap();
        inbox.save(&[message(2, "new")]).await.unwrap();

        let loaded = inbox.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].update_id, 2);
    }

    #[tokio::test]
    async fn malformed_inbox_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = InboxStore::new(dir.path());
        tokio::fs::write(inbox.path(), "garbage").await.unwrap();
        assert_eq!(inbox.load_offset().await, 0);
    }
}
