//! HTTP execution with body/response ceilings and uniform failure mapping.

use std::time::Duration;

use {
    opsrelay_common::types::ConcreteResponse,
    opsrelay_config::RelayConfig,
    reqwest::multipart::{Form, Part},
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    command::{Command, ConcreteRequest},
    error::{Error, Result},
    rules::UrlRules,
    sanitize,
    translate::TOKEN_PLACEHOLDER,
};

/// Limits applied to every outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    pub max_body_size: usize,
    pub max_response_size: usize,
    pub max_search_content_length: usize,
    pub request_timeout: Duration,
}

impl ExecutorLimits {
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_body_size: config.max_body_size,
            max_response_size: config.max_response_size,
            max_search_content_length: config.max_search_content_length,
            request_timeout: Duration::from_secs(config.request_timeout),
        }
    }
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// Owns the outbound HTTP client for the lifetime of the daemon.
pub struct Executor {
    client: reqwest::Client,
    limits: ExecutorLimits,
    rules: UrlRules,
    bot_token: Option<Secret<String>>,
}

impl Executor {
    pub fn new(
        limits: ExecutorLimits,
        rules: UrlRules,
        bot_token: Option<Secret<String>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(limits.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self {
            client,
            limits,
            rules,
            bot_token,
        })
    }

    #[must_use]
    pub fn limits(&self) -> &ExecutorLimits {
        &self.limits
    }

    /// Execute `request`. Never fails: every problem is reported through the
    /// response's `error` field.
    pub async fn execute(&self, request: ConcreteRequest) -> ConcreteResponse {
        let id = request.id.clone();

        if request.origin.is_none()
            && let Err(violation) = self.rules.validate(&request.url)
        {
            warn!(request_id = %id, url = %request.url, reason = %violation, "raw request rejected");
            return ConcreteResponse::failure(violation.to_string());
        }

        if let Some(body) = &request.body {
            let size = serde_json::to_vec(body).map(|b| b.len()).unwrap_or(0);
            let max = self.limits.max_body_size;
            if size > max {
                warn!(request_id = %id, size, max, "request body too large");
                return ConcreteResponse::failure(format!("Body size {size} exceeds limit {max}"));
            }
        }

        match self.send(request).await {
            Ok(response) => {
                match &response.error {
                    Some(e) => warn!(request_id = %id, status = ?response.status, error = %e, "request discarded"),
                    None => info!(request_id = %id, status = ?response.status, "request completed"),
                }
                response
            },
            // Resolved URLs may embed the bot token; keep it out of logs and responses.
            Err(Error::Reqwest(e)) if e.is_timeout() => {
                let e = e.without_url();
                warn!(request_id = %id, error = %e, "request timed out");
                ConcreteResponse::failure(format!("Timeout: {e}"))
            },
            Err(Error::Reqwest(e)) => {
                let e = e.without_url();
                warn!(request_id = %id, error = %e, "request failed");
                ConcreteResponse::failure(format!("HTTP error: {e}"))
            },
            Err(e) => {
                warn!(request_id = %id, error = %e, "request failed");
                ConcreteResponse::failure(e.to_string())
            },
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.bot_token {
            Some(token) if url.contains(TOKEN_PLACEHOLDER) => {
                url.replace(TOKEN_PLACEHOLDER, token.expose_secret())
            },
            _ => url.to_string(),
        }
    }

    async fn send(&self, request: ConcreteRequest) -> Result<ConcreteResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::message(format!("invalid method '{}': {e}", request.method)))?;
        let url = self.resolve_url(&request.url);
        debug!(request_id = %request.id, %method, "sending request");

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(attachment) = request.attachment {
            let mut form = Form::new();
            if let Some(Value::Object(fields)) = &request.body {
                for (name, value) in fields {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    form = form.text(name.clone(), text);
                }
            }
            let part = Part::bytes(attachment.bytes).file_name(attachment.file_name);
            builder = builder.multipart(form.part(attachment.field, part));
        } else if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        let max = self.limits.max_response_size;

        if let Some(len) = response.content_length()
            && len > max as u64
        {
            return Ok(ConcreteResponse::discarded(
                status,
                format!("Response size {len} exceeds limit {max}"),
            ));
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let seen = buf.len() + chunk.len();
            if seen > max {
                return Ok(ConcreteResponse::discarded(
                    status,
                    format!("Response exceeds limit {max} (read {seen} bytes)"),
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&buf);

        let limit = self.limits.max_search_content_length;
        let body = match request.origin {
            Some(Command::Search) => Some(sanitize::sanitize_search(&text, limit)),
            Some(Command::Read) => Some(sanitize::sanitize_read(&text, limit)),
            Some(Command::Send) | None if text.trim().is_empty() => None,
            Some(Command::Send) | None => Some(serde_json::from_str(&text)?),
        };

        Ok(ConcreteResponse::success(status, body))
    }

    /// Release the client. Calls still in flight keep their own handle.
    pub fn close(self) {
        drop(self.client);
        info!("outbound client closed");
    }
}
