//! URL normalization for provider/embedding-server base URLs.
//!
//! Config values may arrive with or without a trailing slash, scheme, or
//! stray whitespace; every HTTP client in this repo normalizes through here
//! first so `join("v1/chat")`-style path composition behaves consistently.

/// Trim whitespace, strip a trailing `/`, and default to `http://` when no
/// scheme is present (local embedding server base URLs are usually given as
/// bare `host:port`).
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Join a normalized base URL with a path segment, inserting exactly one `/`.
pub fn join(base: &str, path: &str) -> String {
    let base = normalize_base_url(base);
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize_base_url("http://localhost:8787/"), "http://localhost:8787");
    }

    #[test]
    fn normalize_adds_default_scheme() {
        assert_eq!(normalize_base_url("localhost:8787"), "http://localhost:8787");
    }

    #[test]
    fn normalize_trims_whitespace() {
        assert_eq!(normalize_base_url("  http://x:1  "), "http://x:1");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_base_url("localhost:8787/");
        let twice = normalize_base_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn join_inserts_single_slash() {
        assert_eq!(join("http://localhost:8787/", "/health"), "http://localhost:8787/health");
        assert_eq!(join("http://localhost:8787", "health"), "http://localhost:8787/health");
    }
}
