//! URL normalization and classification helpers.
//!
//! Every cache in the agent is keyed by the normalized form so that
//! `HTTPS://Example.com/a#frag` and `https://example.com/a` land on the same
//! entry.

use url::Url;

/// The neutral page a tab is parked on while an unsafe navigation awaits
/// user consent.
pub const PLACEHOLDER_PAGE: &str = "about:blank#warden-hold";

/// Schemes the scan service can meaningfully scan.
const SCANNABLE_SCHEMES: &[&str] = &["http", "https"];

/// Browser-internal schemes that are never intercepted.
const INTERNAL_SCHEMES: &[&str] = &[
    "about",
    "chrome",
    "chrome-extension",
    "edge",
    "moz-extension",
    "devtools",
    "view-source",
];

/// Normalizes a URL for use as a cache key.
///
/// Lowercases the scheme and host, strips the fragment and any default port.
/// Returns None for input that does not parse as an absolute URL.
pub fn normalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Returns true if the URL has a scheme the remote scanner accepts.
///
/// Opaque sources (blob:, data:, filesystem:) and anything unparsable are
/// not scannable; the interceptor resolves those with a direct prompt.
pub fn is_scannable(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => SCANNABLE_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

/// Returns true for browser-internal URLs and the agent's own placeholder.
pub fn is_internal(raw: &str) -> bool {
    let raw = raw.trim();
    if is_placeholder(raw) {
        return true;
    }
    match Url::parse(raw) {
        Ok(url) => INTERNAL_SCHEMES.contains(&url.scheme()),
        // Unparsable committed URLs are not something we can act on.
        Err(_) => true,
    }
}

/// Returns true if the URL is the placeholder page (fragment included).
pub fn is_placeholder(raw: &str) -> bool {
    raw.trim() == PLACEHOLDER_PAGE
}

/// Returns true if both URLs share scheme, host and port.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a.trim()), Url::parse(b.trim())) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_strips_fragment() {
        assert_eq!(
            normalize("HTTPS://Example.COM/Path?q=1#section"),
            Some("https://example.com/Path?q=1".to_string())
        );
    }

    #[test]
    fn normalize_strips_default_port() {
        assert_eq!(
            normalize("https://example.com:443/a"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(
            normalize("http://example.com:8080/a"),
            Some("http://example.com:8080/a".to_string())
        );
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize("not a url"), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn normalized_forms_collide_as_keys() {
        assert_eq!(
            normalize("https://example.com/file.exe#a"),
            normalize("HTTPS://EXAMPLE.com/file.exe")
        );
    }

    #[test]
    fn scannable_is_http_only() {
        assert!(is_scannable("https://example.com/f.exe"));
        assert!(is_scannable("http://example.com/f.exe"));
        assert!(!is_scannable("blob:https://example.com/550e8400"));
        assert!(!is_scannable("data:text/plain,hello"));
        assert!(!is_scannable("ftp://example.com/f.exe"));
        assert!(!is_scannable("garbage"));
    }

    #[test]
    fn internal_urls() {
        assert!(is_internal("about:blank"));
        assert!(is_internal("chrome://settings"));
        assert!(is_internal("chrome-extension://abcdef/popup.html"));
        assert!(is_internal(PLACEHOLDER_PAGE));
        assert!(!is_internal("https://example.com"));
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(PLACEHOLDER_PAGE));
        assert!(!is_placeholder("about:blank"));
    }

    #[test]
    fn origin_comparison() {
        assert!(same_origin(
            "https://scan.example.com/a",
            "https://scan.example.com/b?x=1"
        ));
        assert!(same_origin(
            "https://scan.example.com",
            "https://scan.example.com:443/health"
        ));
        assert!(!same_origin(
            "https://scan.example.com",
            "https://other.example.com"
        ));
        assert!(!same_origin("https://a.com", "http://a.com"));
        assert!(!same_origin("garbage", "https://a.com"));
    }
}
