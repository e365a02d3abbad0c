//! Privacy scrubbing.
//!
//! Strips content wrapped in `<private>...</private>` markers before it is
//! ever persisted or sent to a provider. If nothing but whitespace remains,
//! the caller should treat the request as `{skipped: true, reason: "private"}`
//! and enqueue no downstream work.

use regex::Regex;
use std::sync::LazyLock;

static PRIVATE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<private>.*?</private>").expect("static regex"));

/// Remove all `<private>...</private>` spans, collapsing the surrounding
/// whitespace that removal leaves behind.
pub fn scrub(text: &str) -> String {
    let stripped = PRIVATE_TAG.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `text` becomes empty once private spans are removed — the
/// "entirely private" case.
pub fn is_entirely_private(text: &str) -> bool {
    scrub(text).is_empty()
}

/// Recursively scrub every string value inside a JSON document — tool
/// inputs/outputs carry free-form strings at arbitrary depth, unlike a user
/// prompt's single top-level string.
pub fn scrub_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(scrub(s)),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(scrub_json).collect()),
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), scrub_json(v))).collect())
        }
        other => other.clone(),
    }
}

/// True when every string value in `value` becomes empty once private spans
/// are removed.
pub fn is_json_entirely_private(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(s) => is_entirely_private(s),
        serde_json::Value::Array(items) => items.iter().all(is_json_entirely_private),
        serde_json::Value::Object(map) => map.values().all(is_json_entirely_private),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_removes_private_span_and_keeps_public_text() {
        assert_eq!(scrub("public <private>secret</private>"), "public");
    }

    #[test]
    fn scrub_handles_private_span_spanning_newlines() {
        assert_eq!(scrub("a <private>line1\nline2</private> b"), "a b");
    }

    #[test]
    fn scrub_leaves_text_without_markers_untouched() {
        assert_eq!(scrub("nothing private here"), "nothing private here");
    }

    #[test]
    fn is_entirely_private_true_when_only_private_content() {
        assert!(is_entirely_private("<private>only</private>"));
        assert!(is_entirely_private("  <private>only</private>  "));
    }

    #[test]
    fn is_entirely_private_false_when_public_remainder_exists() {
        assert!(!is_entirely_private("public <private>secret</private>"));
    }

    #[test]
    fn scrub_handles_multiple_spans() {
        assert_eq!(
            scrub("<private>a</private> keep <private>b</private>"),
            "keep"
        );
    }

    #[test]
    fn scrub_json_strips_nested_string_values() {
        let value = serde_json::json!({
            "file_path": "a.md",
            "content": "public <private>secret</private>",
            "nested": {"list": ["<private>x</private>", "keep"]},
        });
        let scrubbed = scrub_json(&value);
        assert_eq!(scrubbed["content"], "public");
        assert_eq!(scrubbed["nested"]["list"][0], "");
        assert_eq!(scrubbed["nested"]["list"][1], "keep");
    }

    #[test]
    fn is_json_entirely_private_true_when_every_string_is_private() {
        let value = serde_json::json!({"a": "<private>x</private>", "b": ["<private>y</private>"]});
        assert!(is_json_entirely_private(&value));
    }

    #[test]
    fn is_json_entirely_private_false_with_any_public_remainder() {
        let value = serde_json::json!({"a": "<private>x</private>", "b": "public"});
        assert!(!is_json_entirely_private(&value));
    }
}
