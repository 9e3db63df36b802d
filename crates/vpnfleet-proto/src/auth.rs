//! Shared-key authentication helpers used by both HTTP surfaces.

pub const X_API_KEY: &str = "x-api-key";
pub const AUTHORIZATION: &str = "authorization";

/// Pick the presented key: `X-API-Key` first, else `Authorization: Bearer`.
pub fn extract_api_key<'a>(
    x_api_key: Option<&'a str>,
    authorization: Option<&'a str>,
) -> Option<&'a str> {
    if let Some(key) = x_api_key.filter(|k| !k.is_empty()) {
        return Some(key);
    }
    authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|k| !k.is_empty())
}

/// Compare a presented key against the configured one.
///
/// An empty configured key disables the check. The comparison is a plain
/// length + equality check, not constant-time.
pub fn key_matches(configured: &str, presented: Option<&str>) -> bool {
    if configured.is_empty() {
        return true;
    }
    match presented {
        Some(key) => key.len() == configured.len() && key == configured,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_x_api_key() {
        assert_eq!(
            extract_api_key(Some("k1"), Some("Bearer k2")),
            Some("k1")
        );
        assert_eq!(extract_api_key(None, Some("Bearer k2")), Some("k2"));
        assert_eq!(extract_api_key(Some(""), Some("Bearer k2")), Some("k2"));
    }

    #[test]
    fn test_extract_rejects_other_schemes() {
        assert_eq!(extract_api_key(None, Some("Basic abc")), None);
        assert_eq!(extract_api_key(None, Some("Bearer ")), None);
        assert_eq!(extract_api_key(None, None), None);
    }

    #[test]
    fn test_key_matches() {
        assert!(key_matches("", None));
        assert!(key_matches("", Some("anything")));
        assert!(key_matches("secret", Some("secret")));
        assert!(!key_matches("secret", Some("secret2")));
        assert!(!key_matches("secret", None));
    }
}
