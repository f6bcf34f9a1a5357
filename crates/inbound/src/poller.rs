//! Long-poll ingestion of chat updates.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    opsrelay_common::types::InboxMessage,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::Value,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    inbox::InboxStore,
    offset::advance,
};

/// Extra time the HTTP client waits beyond the server-side long-poll window.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Called once for every non-empty batch, after it has been persisted.
#[async_trait]
pub trait BatchListener: Send + Sync {
    async fn on_batch(&self, batch: &[InboxMessage]);
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Value>,
    description: Option<String>,
}

pub struct LongPoller {
    client: reqwest::Client,
    updates_url: String,
    poll_timeout: u64,
    offset: i64,
    inbox: Arc<InboxStore>,
    listener: Arc<dyn BatchListener>,
}

impl LongPoller {
    /// Build the poller and restore the offset from the inbox file.
    pub async fn new(
        api_base: &str,
        token: &Secret<String>,
        poll_timeout: u64,
        inbox: Arc<InboxStore>,
        listener: Arc<dyn BatchListener>,
    ) -> Result<Self> {
        let client_timeout = Duration::from_secs(poll_timeout) + CLIENT_TIMEOUT_SLACK;
        Self::with_client_timeout(api_base, token, poll_timeout, client_timeout, inbox, listener)
            .await
    }

    async fn with_client_timeout(
        api_base: &str,
        token: &Secret<String>,
        poll_timeout: u64,
        client_timeout: Duration,
        inbox: Arc<InboxStore>,
        listener: Arc<dyn BatchListener>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(client_timeout).build()?;
        let updates_url = format!(
            "{}/bot{}/getUpdates",
            api_base.trim_end_matches('/'),
            token.expose_secret()
        );
        let offset = inbox.load_offset().await;
        info!(offset, "long poller ready");

        Ok(Self {
            client,
            updates_url,
            poll_timeout,
            offset,
            inbox,
            listener,
        })
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    async fn fetch(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.updates_url)
            .query(&[
                ("timeout", self.poll_timeout.to_string()),
                ("offset", self.offset.to_string()),
            ])
            .send()
            .await?;
        let body: UpdatesResponse = response.json().await?;
        if !body.ok {
            return Err(Error::Rejected {
                description: body
                    .description
                    .unwrap_or_else(|| "no description".into()),
            });
        }
        Ok(body.result)
    }

    /// One long-poll round. Returns the new messages (possibly none); every
    /// failure is logged and reads as an empty round.
    pub async fn poll(&mut self) -> Vec<InboxMessage> {
        let updates = match self.fetch().await {
            Ok(updates) => updates,
            Err(Error::Reqwest(e)) if e.is_timeout() => {
                debug!("long poll timed out without updates");
                return Vec::new();
            },
            Err(Error::Reqwest(e)) => {
                // The request URL embeds the bot token.
                warn!(error = %e.without_url(), "getUpdates failed");
                return Vec::new();
            },
            Err(e) => {
                warn!(error = %e, "getUpdates failed");
                return Vec::new();
            },
        };

        let mut batch = Vec::new();
        for update in updates {
            let Some(update_id) = update.get("update_id").and_then(Value::as_i64) else {
                warn!("update without update_id, ignoring");
                continue;
            };
            self.offset = advance(self.offset, update_id);
            match update.get("message") {
                Some(Value::Object(message)) => {
                    batch.push(InboxMessage::new(update_id, message.clone()));
                },
                _ => debug!(update_id, "update carries no message, skipping"),
            }
        }

        if batch.is_empty() {
            return batch;
        }
        info!(count = batch.len(), offset = self.offset, "received messages");

        if let Err(e) = self.inbox.save(&batch).await {
            error!(error = %e, "failed to persist inbox");
        }
        self.listener.on_batch(&batch).await;
        batch
    }

    /// Release the inbound client.
    pub fn close(self) {
        drop(self.client);
        info!("inbound client closed");
    }
}
