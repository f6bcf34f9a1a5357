//! Config schema for the relay daemon.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_HOOK_URL: &str = "http://127.0.0.1:18790/hook/agent";

/// Base URLs of the remote services. Overridable so deployments can point at
/// a local Bot API server or a search proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Telegram Bot API base, without the `/bot<token>` segment.
    pub telegram_api: String,
    /// Web search endpoint; the query is appended as `?q=`.
    pub search: String,
    /// Content reader endpoint; receives `{"url": ...}`.
    pub reader: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            telegram_api: "https://api.telegram.org".into(),
            search: "https://s.jina.ai/".into(),
            reader: "https://r.jina.ai/".into(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub version: String,

    /// Name of the env var holding the chat bot token.
    pub token_env: String,

    /// Name of the env var holding the search/reader API key.
    #[serde(alias = "jina_api_key_env")]
    pub search_api_key_env: String,

    /// Agent hook endpoint (`.../agent`); notifications go to its `/wake` sibling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_url: Option<String>,

    #[serde(
        serialize_with = "serialize_optional_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub hook_token: Option<Secret<String>>,

    /// Regex allowlist for raw (non-command) requests.
    pub allowed_urls: Vec<String>,

    /// Ceiling on the serialized JSON request body, in bytes.
    pub max_body_size: usize,
    /// Ceiling on the response body, in bytes.
    pub max_response_size: usize,
    /// Truncation length for sanitized search/read content, in characters.
    pub max_search_content_length: usize,

    /// Per-call timeout for outbound requests (seconds).
    pub request_timeout: u64,
    /// Long-poll wait passed to `getUpdates` (seconds).
    pub poll_timeout: u64,
    /// Pause between poll iterations (milliseconds).
    pub poll_interval_ms: u64,
    /// Timeout for the wake hook call (seconds).
    pub hook_timeout: u64,

    pub log_level: String,

    pub endpoints: EndpointsConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            version: "1.0".into(),
            token_env: "TG_BOT_TOKEN".into(),
            search_api_key_env: "JINA_API_KEY".into(),
            hook_url: Some(DEFAULT_HOOK_URL.into()),
            hook_token: None,
            allowed_urls: Vec::new(),
            max_body_size: 1_048_576,
            max_response_size: 1_048_576,
            max_search_content_length: 8192,
            request_timeout: 30,
            poll_timeout: 30,
            poll_interval_ms: 1000,
            hook_timeout: 10,
            log_level: "info".into(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

fn serialize_optional_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_str(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
