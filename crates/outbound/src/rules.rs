//! URL allowlist for raw (non-command) requests.
//!
//! Commands build their own URLs and skip these rules. Raw requests carry an
//! agent-chosen URL, so they must be `http(s)` and match one of the configured
//! patterns. Patterns are anchored at the start of the URL.

use {
    regex::Regex,
    tracing::{debug, error},
};

/// Reason a URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Missing URL scheme")]
    MissingScheme,
    #[error("Invalid scheme: {0}")]
    InvalidScheme(String),
    #[error("URL does not match allowed patterns")]
    NotAllowed,
}

pub struct UrlRules {
    patterns: Vec<Regex>,
}

impl UrlRules {
    /// Compile `patterns`. Invalid ones are logged and skipped.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                let p = p.as_ref();
                match Regex::new(&format!("^(?:{p})")) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        error!(pattern = p, error = %e, "invalid url pattern, skipping");
                        None
                    },
                }
            })
            .collect();
        Self { patterns }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn validate(&self, url: &str) -> Result<(), RuleViolation> {
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(url::ParseError::RelativeUrlWithoutBase) => return Err(RuleViolation::MissingScheme),
            Err(e) => return Err(RuleViolation::InvalidUrl(e.to_string())),
        };

        match parsed.scheme() {
            "http" | "https" => {},
            other => return Err(RuleViolation::InvalidScheme(other.to_string())),
        }

        if self.patterns.iter().any(|re| re.is_match(url)) {
            debug!(url, "url allowed");
            Ok(())
        } else {
            Err(RuleViolation::NotAllowed)
        }
    }
}
