//! Wake hook: tells the agent to re-read the inbox.

use std::{path::PathBuf, time::Duration};

use {
    async_trait::async_trait,
    opsrelay_common::types::InboxMessage,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::{error, info, warn},
};

use crate::{error::Result, poller::BatchListener};

/// Wake endpoint for a configured hook URL: a trailing `/agent` becomes
/// `/wake`, anything else gets `/wake` appended.
#[must_use]
pub fn wake_url(hook_url: &str) -> String {
    let trimmed = hook_url.trim_end_matches('/');
    match trimmed.strip_suffix("/agent") {
        Some(base) => format!("{base}/wake"),
        None => format!("{trimmed}/wake"),
    }
}

pub struct AgentNotifier {
    client: reqwest::Client,
    wake_url: Option<String>,
    token: Option<Secret<String>>,
    inbox_path: PathBuf,
}

impl AgentNotifier {
    pub fn new(
        hook_url: Option<&str>,
        token: Option<Secret<String>>,
        inbox_path: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            wake_url: hook_url.map(wake_url),
            token,
            inbox_path,
        })
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.wake_url.is_some() && self.token.is_some()
    }

    #[must_use]
    pub fn wake_url(&self) -> Option<&str> {
        self.wake_url.as_deref()
    }

    /// Pointer to the inbox. Never carries message content.
    fn pointer_text(&self, update_id: i64, chat_id: Option<i64>) -> String {
        let chat = chat_id.map_or_else(|| "unknown".to_string(), |id| id.to_string());
        format!(
            "New chat message (update {update_id}, chat {chat}). Read {} for the full batch.",
            self.inbox_path.display()
        )
    }

    /// Post a one-shot wake signal. Returns whether the hook accepted it.
    pub async fn notify(&self, update_id: i64, chat_id: Option<i64>) -> bool {
        let Some(url) = &self.wake_url else {
            warn!("hook URL not configured, skipping wake");
            return false;
        };
        let Some(token) = &self.token else {
            warn!("hook token not configured, skipping wake");
            return false;
        };

        let payload = json!({
            "text": self.pointer_text(update_id, chat_id),
            "mode": "now",
        });

        let result = self
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => {
                info!(update_id, status = resp.status().as_u16(), "agent woken");
                true
            },
            Err(e) if e.is_timeout() => {
                error!(update_id, error = %e, "wake hook timed out");
                false
            },
            Err(e) => {
                error!(update_id, error = %e, "wake hook failed");
                false
            },
        }
    }

    /// Release the hook client.
    pub fn close(self) {
        drop(self.client);
        info!("hook client closed");
    }
}

#[async_trait]
impl BatchListener for AgentNotifier {
    async fn on_batch(&self, batch: &[InboxMessage]) {
        if let Some(last) = batch.last() {
            self.notify(last.update_id, last.chat_id()).await;
        }
    }
}
