//! Configuration validation.
//!
//! Reports problems that would make the daemon misbehave at runtime: bad
//! allowlist patterns, zero limits, unusable hook addresses.

use crate::schema::RelayConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "allowed_urls[2]"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a loaded config.
#[must_use]
pub fn validate(config: &RelayConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (i, pattern) in config.allowed_urls.iter().enumerate() {
        if let Err(e) = regex::Regex::new(pattern) {
            result.push(
                Severity::Error,
                format!("allowed_urls[{i}]"),
                format!("invalid regex: {e}"),
            );
        }
    }

    let sizes = [
        ("max_body_size", config.max_body_size),
        ("max_response_size", config.max_response_size),
        ("max_search_content_length", config.max_search_content_length),
    ];
    for (name, value) in sizes {
        if value == 0 {
            result.push(Severity::Error, name, "must be greater than zero");
        }
    }

    let timeouts = [
        ("request_timeout", config.request_timeout),
        ("poll_timeout", config.poll_timeout),
        ("hook_timeout", config.hook_timeout),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            result.push(Severity::Error, name, "must be greater than zero");
        }
    }

    if let Some(hook) = &config.hook_url {
        match url::Url::parse(hook) {
            Ok(u) if !matches!(u.scheme(), "http" | "https") => {
                result.push(
                    Severity::Error,
                    "hook_url",
                    format!("unsupported scheme: {}", u.scheme()),
                );
            },
            Ok(u) if !u.path().trim_end_matches('/').ends_with("/agent") => {
                result.push(
                    Severity::Warning,
                    "hook_url",
                    "does not end in /agent; /wake will be appended",
                );
            },
            Ok(_) => {},
            Err(e) => result.push(Severity::Error, "hook_url", format!("invalid URL: {e}")),
        }
    }

    let endpoints = [
        ("endpoints.telegram_api", &config.endpoints.telegram_api),
        ("endpoints.search", &config.endpoints.search),
        ("endpoints.reader", &config.endpoints.reader),
    ];
    for (name, value) in endpoints {
        if let Err(e) = url::Url::parse(value) {
            result.push(Severity::Error, name, format!("invalid URL: {e}"));
        }
    }

    if config.log_level.parse::<tracing::Level>().is_err() {
        result.push(
            Severity::Warning,
            "log_level",
            format!("unknown level '{}', falling back to info", config.log_level),
        );
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_clean() {
        let result = validate(&RelayConfig::default());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let cfg = RelayConfig {
            allowed_urls: vec!["^https://ok\\.com".into(), "(unclosed".into()],
            ..Default::default()
        };
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.diagnostics[0].path, "allowed_urls[1]");
    }

    #[test]
    fn zero_limits_are_errors() {
        let cfg = RelayConfig {
            max_body_size: 0,
            request_timeout: 0,
            ..Default::default()
        };
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn hook_without_agent_suffix_warns() {
        let cfg = RelayConfig {
            hook_url: Some("http://127.0.0.1:18790/hook".into()),
            ..Default::default()
        };
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 0);
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn bad_log_level_warns() {
        let cfg = RelayConfig {
            log_level: "loud".into(),
            ..Default::default()
        };
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Warning), 1);
        assert!(result.diagnostics[0].to_string().starts_with("warning: log_level"));
    }
}
