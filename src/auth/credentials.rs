//! Credential encoding for the authorization header
//!
//! A (session id, session key) pair travels as `Basic <base64(id ":" key)>`.
//! Pure transforms; session id/key generation uses a colon-free alphabet so
//! the framing always round-trips.

use super::AuthError;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Case-sensitive scheme token; no other schemes are accepted
const BASIC_SCHEME: &str = "Basic ";

/// Encode a session credential into an authorization header value
pub fn encode_basic(session_id: &str, session_key: &str) -> String {
    let combo = format!("{}:{}", session_id, session_key);
    format!("{}{}", BASIC_SCHEME, STANDARD.encode(combo))
}

/// Decode an authorization header value back into a session credential.
///
/// Splits on the first colon after base64-decoding. Fails when the `Basic `
/// prefix is missing, the payload is not valid base64 or UTF-8, or there is
/// no colon separator.
pub fn decode_basic(header_value: &str) -> Result<(String, String), AuthError> {
    let payload = header_value
        .strip_prefix(BASIC_SCHEME)
        .ok_or(AuthError::MalformedCredential)?;

    let decoded = STANDARD
        .decode(payload)
        .map_err(|_| AuthError::MalformedCredential)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredential)?;

    let (id, key) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedCredential)?;

    Ok((id.to_string(), key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let header = encode_basic("abc123", "s3cr3t-key");
        let (id, key) = decode_basic(&header).unwrap();
        assert_eq!(id, "abc123");
        assert_eq!(key, "s3cr3t-key");
    }

    #[test]
    fn test_key_may_contain_colons() {
        // Split is on the first colon, so only the id is colon-constrained
        let header = encode_basic("session-id", "key:with:colons");
        let (id, key) = decode_basic(&header).unwrap();
        assert_eq!(id, "session-id");
        assert_eq!(key, "key:with:colons");
    }

    #[test]
    fn test_rejects_missing_scheme() {
        let payload = STANDARD.encode("id:key");
        assert!(decode_basic(&payload).is_err());
    }

    #[test]
    fn test_scheme_is_case_sensitive() {
        let payload = STANDARD.encode("id:key");
        assert!(decode_basic(&format!("basic {}", payload)).is_err());
        assert!(decode_basic(&format!("Bearer {}", payload)).is_err());
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(decode_basic("Basic not-base64!!!").is_err());
    }

    #[test]
    fn test_rejects_missing_separator() {
        let payload = STANDARD.encode("no-colon-here");
        assert!(decode_basic(&format!("Basic {}", payload)).is_err());
    }
}
