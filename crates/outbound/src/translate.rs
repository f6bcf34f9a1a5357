//! Translate unified `{command, payload}` entries into concrete HTTP requests.

use std::path::{Path, PathBuf};

use {
    opsrelay_common::types::QueueEntry,
    opsrelay_config::{Credentials, EndpointsConfig},
    secrecy::{ExposeSecret, Secret},
    serde_json::{Map, Value, json},
    tracing::{debug, info},
};

use crate::{
    command::{Attachment, Command, ConcreteRequest, MessageFormat},
    error::TranslateError,
};

/// Placeholder replaced with the bot token by the executor.
pub const TOKEN_PLACEHOLDER: &str = "<token>";

pub struct Translator {
    endpoints: EndpointsConfig,
    has_bot_token: bool,
    search_api_key: Option<Secret<String>>,
}

impl Translator {
    #[must_use]
    pub fn new(endpoints: EndpointsConfig, credentials: &Credentials) -> Self {
        Self {
            endpoints,
            has_bot_token: credentials.bot_token.is_some(),
            search_api_key: credentials.search_api_key.clone(),
        }
    }

    /// Translate a unified command.
    ///
    /// Returns `Ok(None)` when the entry is not a unified command (no known
    /// `command`, or no map-typed `payload`); the caller then treats it as a
    /// raw request.
    pub async fn translate(
        &self,
        entry: &QueueEntry,
    ) -> Result<Option<ConcreteRequest>, TranslateError> {
        let Some((command, payload)) = unified_envelope(entry) else {
            return Ok(None);
        };
        debug!(request_id = %entry.id, %command, "translating command");

        let request = match command {
            Command::Send => self.translate_send(&entry.id, payload).await?,
            Command::Search => self.translate_search(&entry.id, payload)?,
            Command::Read => self.translate_read(&entry.id, payload)?,
        };
        Ok(Some(request))
    }

    async fn translate_send(
        &self,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<ConcreteRequest, TranslateError> {
        let chat_id = field(payload, "chat_id").ok_or(TranslateError::MissingField {
            command: Command::Send,
            field: "chat_id",
        })?;
        let text = field(payload, "text");
        let path = field(payload, "path");
        if text.is_none() && path.is_none() {
            return Err(TranslateError::MissingContent);
        }
        if !self.has_bot_token {
            return Err(TranslateError::MissingCredential {
                command: Command::Send,
                credential: "bot token",
            });
        }

        let format = match field(payload, "format") {
            Some(name) => MessageFormat::parse(&name)
                .ok_or(TranslateError::UnsupportedFormat { format: name })?,
            None => MessageFormat::default(),
        };

        let mut body = Map::new();
        body.insert("chat_id".into(), Value::String(chat_id.clone()));
        if let Some(mode) = format.parse_mode() {
            body.insert("parse_mode".into(), Value::String(mode.into()));
        }

        if let Some(path) = path {
            let path = expand_home(&path);
            let bytes = read_attachment(&path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".into());
            if let Some(caption) = text {
                body.insert("caption".into(), Value::String(caption));
            }
            info!(request_id = id, chat_id, file = %path.display(), "send document");

            return Ok(ConcreteRequest {
                id: id.to_string(),
                method: "POST".into(),
                url: self.bot_url("sendDocument"),
                headers: Vec::new(),
                body: Some(Value::Object(body)),
                attachment: Some(Attachment {
                    field: "document",
                    file_name,
                    bytes,
                }),
                origin: Some(Command::Send),
            });
        }

        if let Some(text) = text {
            body.insert("text".into(), Value::String(text));
        }
        info!(request_id = id, chat_id, "send message");

        Ok(ConcreteRequest {
            id: id.to_string(),
            method: "POST".into(),
            url: self.bot_url("sendMessage"),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(Value::Object(body)),
            attachment: None,
            origin: Some(Command::Send),
        })
    }

    fn translate_search(
        &self,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<ConcreteRequest, TranslateError> {
        let query = field(payload, "query").ok_or(TranslateError::MissingField {
            command: Command::Search,
            field: "query",
        })?;
        let key = self.search_key(Command::Search)?;

        let base = &self.endpoints.search;
        let sep = if base.contains('?') { '&' } else { '?' };
        let url = format!("{base}{sep}q={}", urlencoding::encode(&query));
        info!(request_id = id, query, "search");

        Ok(ConcreteRequest {
            id: id.to_string(),
            method: "GET".into(),
            url,
            headers: vec![
                ("Authorization".into(), format!("Bearer {}", key.expose_secret())),
                ("Accept".into(), "text/plain".into()),
            ],
            body: None,
            attachment: None,
            origin: Some(Command::Search),
        })
    }

    fn translate_read(
        &self,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Result<ConcreteRequest, TranslateError> {
        let url = field(payload, "url").ok_or(TranslateError::MissingField {
            command: Command::Read,
            field: "url",
        })?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TranslateError::UnsupportedUrl { url });
        }
        let key = self.search_key(Command::Read)?;
        info!(request_id = id, url, "read");

        Ok(ConcreteRequest {
            id: id.to_string(),
            method: "POST".into(),
            url: self.endpoints.reader.clone(),
            headers: vec![
                ("Authorization".into(), format!("Bearer {}", key.expose_secret())),
                ("Content-Type".into(), "application/json".into()),
                ("Accept".into(), "application/json".into()),
            ],
            body: Some(json!({ "url": url })),
            attachment: None,
            origin: Some(Command::Read),
        })
    }

    fn search_key(&self, command: Command) -> Result<&Secret<String>, TranslateError> {
        self.search_api_key
            .as_ref()
            .ok_or(TranslateError::MissingCredential {
                command,
                credential: "search API key",
            })
    }

    fn bot_url(&self, method: &str) -> String {
        format!(
            "{}/bot{TOKEN_PLACEHOLDER}/{method}",
            self.endpoints.telegram_api.trim_end_matches('/')
        )
    }
}

/// The `{command, payload}` pair, taken from the entry itself or, failing
/// that, from an object `body` carrying both keys.
fn unified_envelope(entry: &QueueEntry) -> Option<(Command, &Map<String, Value>)> {
    if let (Some(name), Some(Value::Object(payload))) = (&entry.command, &entry.payload) {
        return Command::parse(name).map(|c| (c, payload));
    }
    let body = entry.body.as_ref()?.as_object()?;
    let command = Command::parse(body.get("command")?.as_str()?)?;
    let payload = body.get("payload")?.as_object()?;
    Some((command, payload))
}

/// Non-empty string view of a payload field. Numbers are accepted so that
/// numeric chat ids work.
fn field(payload: &Map<String, Value>, name: &str) -> Option<String> {
    match payload.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(dirs) = directories::BaseDirs::new()
    {
        return dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

async fn read_attachment(path: &Path) -> Result<Vec<u8>, TranslateError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TranslateError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(TranslateError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    fn credentials() -> Credentials {
        Credentials {
            bot_token: Some(Secret::new("T".into())),
            search_api_key: Some(Secret::new("jina_key".into())),
            ..Default::default()
        }
    }

    fn translator() -> Translator {
        Translator::new(EndpointsConfig::default(), &credentials())
    }

    fn entry(command: &str, payload: Value) -> QueueEntry {
        QueueEntry {
            id: "e1".into(),
            command: Some(command.into()),
            payload: Some(payload),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn send_text_builds_json_message() {
        let req = translator()
            .translate(&entry("send", json!({"chat_id": 42, "text": "hi"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://api.telegram.org/bot<token>/sendMessage");
        assert_eq!(req.body, Some(json!({"chat_id": "42", "text": "hi"})));
        assert_eq!(req.origin, Some(Command::Send));
        assert!(req.attachment.is_none());
    }

    #[rstest]
    #[case("markdown", "Markdown")]
    #[case("html", "HTML")]
    #[tokio::test]
    async fn send_format_sets_parse_mode(#[case] format: &str, #[case] mode: &str) {
        let req = translator()
            .translate(&entry(
                "send",
                json!({"chat_id": "1", "text": "*b*", "format": format}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.body.unwrap()["parse_mode"], mode);
    }

    #[tokio::test]
    async fn send_with_path_builds_document_upload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.txt");
        std::fs::write(&file, b"contents").unwrap();

        let req = translator()
            .translate(&entry(
                "send",
                json!({"chat_id": "7", "text": "see attached", "path": file.to_str().unwrap()}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.url, "https://api.telegram.org/bot<token>/sendDocument");
        assert_eq!(req.body, Some(json!({"chat_id": "7", "caption": "see attached"})));
        let attachment = req.attachment.unwrap();
        assert_eq!(attachment.field, "document");
        assert_eq!(attachment.file_name, "report.txt");
        assert_eq!(attachment.bytes, b"contents");
    }

    #[tokio::test]
    async fn send_missing_file_is_rejected() {
        let err = translator()
            .translate(&entry(
                "send",
                json!({"chat_id": "7", "path": "/definitely/not/here.pdf"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::FileNotFound { .. }));
        assert!(err.to_string().contains("/definitely/not/here.pdf"));
    }

    #[rstest]
    #[case(json!({"text": "hi"}))]
    #[case(json!({"chat_id": "42"}))]
    #[case(json!({"chat_id": "", "text": "hi"}))]
    #[tokio::test]
    async fn send_without_required_fields_is_rejected(#[case] payload: Value) {
        let result = translator().translate(&entry("send", payload)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_without_token_is_rejected() {
        let creds = Credentials {
            search_api_key: Some(Secret::new("k".into())),
            ..Default::default()
        };
        let t = Translator::new(EndpointsConfig::default(), &creds);
        let err = t
            .translate(&entry("send", json!({"chat_id": "1", "text": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn unknown_format_is_rejected() {
        let err = translator()
            .translate(&entry(
                "send",
                json!({"chat_id": "1", "text": "x", "format": "rtf"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn search_encodes_query_and_sets_bearer() {
        let req = translator()
            .translate(&entry("search", json!({"query": "rust async & tokio"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "https://s.jina.ai/?q=rust%20async%20%26%20tokio");
        assert_eq!(req.header("authorization"), Some("Bearer jina_key"));
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn read_posts_url_to_reader() {
        let req = translator()
            .translate(&entry("read", json!({"url": "https://example.com/a"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.url, "https://r.jina.ai/");
        assert_eq!(req.body, Some(json!({"url": "https://example.com/a"})));
        assert_eq!(req.header("accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn read_rejects_non_http_url() {
        let err = translator()
            .translate(&entry("read", json!({"url": "file:///etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedUrl { .. }));
    }

    #[tokio::test]
    async fn search_without_key_is_rejected() {
        let creds = Credentials {
            bot_token: Some(Secret::new("T".into())),
            ..Default::default()
        };
        let t = Translator::new(EndpointsConfig::default(), &creds);
        let err = t
            .translate(&entry("search", json!({"query": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("search API key"));
    }

    #[tokio::test]
    async fn non_unified_entries_pass_through() {
        let t = translator();
        let unknown = entry("delete", json!({"id": 1}));
        assert!(t.translate(&unknown).await.unwrap().is_none());

        let scalar_payload = entry("send", json!("hi"));
        assert!(t.translate(&scalar_payload).await.unwrap().is_none());

        let raw = QueueEntry {
            id: "r".into(),
            method: Some("GET".into()),
            url: Some("https://api.example.com/".into()),
            ..Default::default()
        };
        assert!(t.translate(&raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn envelope_inside_body_is_recognized() {
        let e = QueueEntry {
            id: "b1".into(),
            body: Some(json!({"command": "send", "payload": {"chat_id": "9", "text": "yo"}})),
            ..Default::default()
        };
        let req = translator().translate(&e).await.unwrap().unwrap();
        assert_eq!(req.body, Some(json!({"chat_id": "9", "text": "yo"})));
    }
}
