use axum::http::{HeaderMap, header::AUTHORIZATION};
use subtle::ConstantTimeEq;

/// Compare a configured shared secret with a presented one in constant time.
///
/// An empty expected secret never matches, so an unset secret cannot be
/// satisfied by an empty header.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.as_bytes();

    if expected_bytes.is_empty() || expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_secret() {
        assert!(secrets_match("cron-secret", "cron-secret"));
    }

    #[test]
    fn test_mismatched_secret() {
        assert!(!secrets_match("cron-secret", "cron-secreT"));
        assert!(!secrets_match("cron-secret", "cron"));
    }

    #[test]
    fn test_empty_expected_secret_rejects_everything() {
        assert!(!secrets_match("", ""));
        assert!(!secrets_match("", "anything"));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
