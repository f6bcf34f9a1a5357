//! Reduce search and reader responses to a bounded, agent-safe summary.
//!
//! Search results are cut down to numbered title/URL pairs so the agent only
//! sees where to look; it then uses `read` on the URLs it cares about.

use std::sync::LazyLock;

use {
    regex::Regex,
    serde_json::{Value, json},
};

#[allow(clippy::expect_used)]
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:##?\s*)?\[?(\d+)\]?\.?\s*Title:\s*(.+?)(?:\s*\[|$)").expect("valid regex")
});

#[allow(clippy::expect_used)]
static URL_SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"URL Source:\s*(https?://[^\s\)]+)").expect("valid regex"));

const READ_MARKER: &str = "\n\n[content truncated]";
const SEARCH_MARKER: &str = "\n\n[truncated]";

/// Truncate to `max` characters, appending `marker` when anything was cut.
fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{marker}", &text[..idx]),
        None => text.to_string(),
    }
}

fn prefix_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Sanitize a reader response: `data.content` when the body is the usual JSON
/// envelope, the raw text otherwise.
#[must_use]
pub fn sanitize_read(raw: &str, max: usize) -> Value {
    let content = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| {
            v.get("data")
                .and_then(|d| d.get("content"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| raw.to_string());

    json!({
        "ok": true,
        "result": {
            "content": truncate_chars(&content, max, READ_MARKER),
            "type": "read",
        }
    })
}

/// Title/URL pairs in first-seen URL order. A URL seen again keeps its slot
/// and takes the newer title.
fn extract_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut current_title: Option<String> = None;

    for line in raw.lines() {
        if let Some(caps) = TITLE_RE.captures(line) {
            current_title = Some(caps[2].trim().to_string());
        }
        if let Some(caps) = URL_SOURCE_RE.captures(line) {
            let Some(title) = current_title.take().filter(|t| !t.is_empty()) else {
                continue;
            };
            let url = caps[1].to_string();
            match pairs.iter_mut().find(|(u, _)| *u == url) {
                Some(existing) => existing.1 = title,
                None => pairs.push((url, title)),
            }
        }
    }
    pairs
}

/// Sanitize a search response into a numbered list of titles and URLs.
#[must_use]
pub fn sanitize_search(raw: &str, max: usize) -> Value {
    let pairs = extract_pairs(raw);

    let content = if pairs.is_empty() {
        prefix_chars(raw, max).to_string()
    } else {
        pairs
            .iter()
            .enumerate()
            .flat_map(|(i, (url, title))| {
                [format!("{}. {title}", i + 1), format!("   {url}"), String::new()]
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let urls: Vec<&str> = pairs.iter().map(|(u, _)| u.as_str()).collect();

    json!({
        "ok": true,
        "result": {
            "content": truncate_chars(&content, max, SEARCH_MARKER),
            "type": "search",
            "urls": urls,
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SEARCH_BODY: &str = "[1] Title: Quantum Computing [IBM]\n\
[1] URL Source: https://www.ibm.com/quantum\n\
[1] Description: lots of text\n\
\n\
## [2] Title: Quantum Wiki\n\
[2] URL Source: https://en.wikipedia.org/wiki/Quantum)\n";

    #[test]
    fn search_extracts_title_url_pairs() {
        let out = sanitize_search(SEARCH_BODY, 8192);
        assert_eq!(out["ok"], true);
        assert_eq!(out["result"]["type"], "search");
        assert_eq!(
            out["result"]["content"],
            "1. Quantum Computing\n   https://www.ibm.com/quantum\n\n\
2. Quantum Wiki\n   https://en.wikipedia.org/wiki/Quantum\n"
        );
        assert_eq!(
            out["result"]["urls"],
            json!(["https://www.ibm.com/quantum", "https://en.wikipedia.org/wiki/Quantum"])
        );
    }

    #[test]
    fn url_without_title_is_ignored() {
        let raw = "## 1. Quantum Computing\n[1] URL Source: https://www.ibm.com/quantum\n";
        let out = sanitize_search(raw, 8192);
        assert_eq!(out["result"]["content"], raw);
        assert_eq!(out["result"]["urls"], json!([]));
    }

    #[test]
    fn search_fallback_is_bounded() {
        let raw = "x".repeat(100);
        let out = sanitize_search(&raw, 10);
        assert_eq!(out["result"]["content"], "x".repeat(10));
    }

    #[test]
    fn search_pairs_are_truncated_with_marker() {
        let out = sanitize_search(SEARCH_BODY, 12);
        assert_eq!(out["result"]["content"], "1. Quantum C\n\n[truncated]");
    }

    #[test]
    fn sanitizing_twice_falls_back_to_raw_text() {
        let first = sanitize_search(SEARCH_BODY, 8192);
        let content = first["result"]["content"].as_str().unwrap();
        let second = sanitize_search(content, 20);
        let text = second["result"]["content"].as_str().unwrap();
        assert!(text.chars().count() <= 20);
        assert_eq!(second["result"]["urls"], json!([]));
    }

    #[test]
    fn read_extracts_data_content() {
        let raw = r##"{"code":200,"data":{"title":"Doc","content":"# Hello\n\nbody"}}"##;
        let out = sanitize_read(raw, 8192);
        assert_eq!(out["result"]["content"], "# Hello\n\nbody");
        assert_eq!(out["result"]["type"], "read");
        assert!(out["result"].get("urls").is_none());
    }

    #[test]
    fn read_falls_back_to_raw_and_truncates() {
        let out = sanitize_read("plain text body", 5);
        assert_eq!(out["result"]["content"], "plain\n\n[content truncated]");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let out = sanitize_read("ééééé", 2);
        assert_eq!(out["result"]["content"], "éé\n\n[content truncated]");
    }
}
