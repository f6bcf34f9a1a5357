use opsrelay_common::types::QueueEntry;

/// High-level intents the agent can queue instead of raw HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Send a chat message or document.
    Send,
    /// Web search; the result is reduced to a list of titles and URLs.
    Search,
    /// Fetch a URL through the reader service as clean text.
    Read,
}

impl Command {
    /// Parse the `command` field of a queue entry. Unknown names are not
    /// commands: such entries are treated as raw requests.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "send" => Some(Self::Send),
            "search" => Some(Self::Search),
            "read" => Some(Self::Read),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Search => "search",
            Self::Read => "read",
        }
    }

    /// Whether the response body goes through the sanitizer.
    #[must_use]
    pub fn is_sanitized(self) -> bool {
        matches!(self, Self::Search | Self::Read)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text formatting requested for a `send`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageFormat {
    Markdown,
    Html,
    #[default]
    Plain,
}

impl MessageFormat {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    /// Value for the Bot API `parse_mode` field; `None` means omit the field.
    #[must_use]
    pub fn parse_mode(self) -> Option<&'static str> {
        match self {
            Self::Markdown => Some("Markdown"),
            Self::Html => Some("HTML"),
            Self::Plain => None,
        }
    }
}

/// File uploaded as a multipart part alongside the request fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub field: &'static str,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A fully resolved HTTP request, ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub attachment: Option<Attachment>,
    /// Command this request was translated from; `None` for raw requests,
    /// which must pass the URL rules before execution.
    pub origin: Option<Command>,
}

impl ConcreteRequest {
    /// Raw pass-through built from the entry's own `method`/`url`/`headers`/`body`.
    #[must_use]
    pub fn from_raw(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id.clone(),
            method: entry.method.clone().unwrap_or_else(|| "POST".into()),
            url: entry.url.clone().unwrap_or_default(),
            headers: entry
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: entry.body.clone(),
            attachment: None,
            origin: None,
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
