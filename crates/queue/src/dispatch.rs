//! Runs pending queue entries through translation and execution.

use std::sync::Arc;

use {
    async_trait::async_trait,
    opsrelay_common::types::{ConcreteResponse, QueueEntry},
    opsrelay_outbound::{ConcreteRequest, Executor, Translator},
    tracing::{error, info, warn},
};

use crate::{store::QueueStore, watcher::BatchHandler};

pub struct Dispatcher {
    store: Arc<QueueStore>,
    translator: Translator,
    executor: Executor,
}

impl Dispatcher {
    pub fn new(store: Arc<QueueStore>, translator: Translator, executor: Executor) -> Self {
        Self {
            store,
            translator,
            executor,
        }
    }

    /// Process one entry and persist the outcome. Returns `None` when the
    /// entry was skipped (not pending, or no id).
    pub async fn process(&self, entry: &QueueEntry) -> Option<ConcreteResponse> {
        if !entry.is_pending() {
            return None;
        }
        if entry.id.is_empty() {
            warn!("skipping queue entry without id");
            return None;
        }

        let response = match self.translator.translate(entry).await {
            Ok(Some(request)) => self.executor.execute(request).await,
            Ok(None) => {
                self.executor
                    .execute(ConcreteRequest::from_raw(entry))
                    .await
            },
            Err(e) => {
                warn!(request_id = %entry.id, error = %e, "command rejected");
                ConcreteResponse::failure(e.to_string())
            },
        };

        // An entry only turns terminal once its response is on disk; otherwise
        // it stays pending and is retried on the next pass.
        if let Err(e) = self.store.merge_response(&entry.id, &response).await {
            error!(
                request_id = %entry.id,
                error = %e,
                "failed to record response, entry left pending"
            );
            return Some(response);
        }
        let status = response.entry_status();
        match self.store.mark_status(&entry.id, status).await {
            Ok(_) => info!(request_id = %entry.id, %status, "entry processed"),
            Err(e) => error!(request_id = %entry.id, error = %e, "failed to update entry status"),
        }

        Some(response)
    }

    /// Release the outbound client.
    pub fn close(self) {
        self.executor.close();
    }
}

#[async_trait]
impl BatchHandler for Dispatcher {
    async fn handle(&self, batch: Vec<QueueEntry>) {
        for entry in &batch {
            self.process(entry).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        opsrelay_common::fs::{read_json, write_json_atomic},
        opsrelay_config::{Credentials, EndpointsConfig},
        opsrelay_outbound::{ExecutorLimits, UrlRules},
        secrecy::Secret,
        serde_json::{Value, json},
    };

    fn dispatcher(store: Arc<QueueStore>, telegram_api: String) -> Dispatcher {
        let creds = Credentials {
            bot_token: Some(Secret::new("T".into())),
            ..Default::default()
        };
        let endpoints = EndpointsConfig {
            telegram_api,
            ..Default::default()
        };
        let executor = Executor::new(
            ExecutorLimits::default(),
            UrlRules::new(&[r"https://api\.example\.com/"]),
            creds.bot_token.clone(),
        )
        .unwrap();
        Dispatcher::new(store, Translator::new(endpoints, &creds), executor)
    }

    #[tokio::test]
    async fn batch_is_processed_and_persisted() {
        let mut server = mockito::Server::new_async().await;
        let send = server
            .mock("POST", "/botT/sendMessage")
            .match_body(Matcher::Json(json!({"chat_id": "42", "text": "hi"})))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path()));
        store.initialize().await.unwrap();
        write_json_atomic(
            store.requests_path(),
            &json!({"requests": [
                {"id": "s1", "status": "pending", "command": "send",
                 "payload": {"chat_id": "42", "text": "hi"}},
                {"id": "done", "status": "completed", "command": "send",
                 "payload": {"chat_id": "42", "text": "again"}},
                {"id": "f1", "status": "pending", "command": "send",
                 "payload": {"chat_id": "42", "path": "/no/such/file.txt"}},
                {"id": "r1", "status": "pending", "method": "GET",
                 "url": "https://not-allowed.example/"},
            ]}),
        )
        .await
        .unwrap();

        let d = dispatcher(Arc::clone(&store), server.url());
        let batch = store.load_pending().await;
        assert_eq!(batch.len(), 3);
        d.handle(batch).await;
        send.assert_async().await;

        let doc: Value = read_json(store.requests_path()).await.unwrap().unwrap();
        let statuses: Vec<_> = doc["requests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, ["completed", "completed", "failed", "failed"]);

        let responses = store.load_responses().await.unwrap();
        assert_eq!(responses["s1"]["status"], 200);
        assert!(!responses.contains_key("done"));
        assert!(responses["f1"]["status"].is_null());
        assert!(
            responses["f1"]["error"]
                .as_str()
                .unwrap()
                .contains("file not found")
        );
        assert_eq!(
            responses["r1"]["error"],
            "URL does not match allowed patterns"
        );

        // A second pass finds nothing left to do.
        assert!(store.load_pending().await.is_empty());
    }

    #[tokio::test]
    async fn non_pending_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path()));
        store.initialize().await.unwrap();
        let d = dispatcher(Arc::clone(&store), "http://127.0.0.1:9".into());

        let entry: QueueEntry =
            serde_json::from_value(json!({"id": "x", "status": "failed"})).unwrap();
        assert!(d.process(&entry).await.is_none());
        assert!(store.load_responses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecorded_response_leaves_entry_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path()));
        store.initialize().await.unwrap();
        tokio::fs::write(store.responses_path(), "[1, 2]").await.unwrap();
        write_json_atomic(
            store.requests_path(),
            &json!({"requests": [
                {"id": "r1", "status": "pending", "method": "GET",
                 "url": "https://not-allowed.example/"},
            ]}),
        )
        .await
        .unwrap();

        let d = dispatcher(Arc::clone(&store), "http://127.0.0.1:9".into());
        let batch = store.load_pending().await;
        d.handle(batch).await;

        let pending = store.load_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r1");
        let raw = tokio::fs::read_to_string(store.responses_path()).await.unwrap();
        assert_eq!(raw, "[1, 2]");
    }
}
