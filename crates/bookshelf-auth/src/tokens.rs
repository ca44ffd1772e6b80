//! Random keys for API tokens and sessions.
//!
//! API token keys are 40 hex characters and are stored as issued, so a
//! user's existing token can be handed back on every login. Session keys
//! are URL-safe base64 and only their keyed digest ([`session_digest`]) is
//! persisted.

use std::fmt::Write as _;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Random bytes in an API token key.
const TOKEN_BYTES: usize = 20;

/// Random bytes in a session key.
const SESSION_KEY_BYTES: usize = 32;

/// Prefix of the `Authorization` header value for token authentication.
pub const TOKEN_KEYWORD: &str = "Token";

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Generates a new API token key.
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Generates a new session key.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// HMAC-SHA256 of a session key under the site secret, hex encoded.
pub fn session_digest(secret: &str, session_key: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(b"bookshelf.session:");
    mac.update(session_key.as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}

/// Extracts the key from an `Authorization: Token <key>` header value.
///
/// Returns `None` for other schemes and for malformed values (missing key,
/// embedded spaces).
///
/// # Examples
///
/// ```
/// use bookshelf_auth::tokens::parse_token_header;
///
/// assert_eq!(parse_token_header("Token abc123"), Some("abc123"));
/// assert_eq!(parse_token_header("token abc123"), Some("abc123"));
/// assert_eq!(parse_token_header("Bearer abc123"), None);
/// assert_eq!(parse_token_header("Token"), None);
/// ```
pub fn parse_token_header(value: &str) -> Option<&str> {
    let mut parts = value.split_whitespace();
    let keyword = parts.next()?;
    if !keyword.eq_ignore_ascii_case(TOKEN_KEYWORD) {
        return None;
    }
    let key = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(key)
}

/// Compares two byte strings without short-circuiting on the first
/// difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_key_shape() {
        let key = generate_token_key();
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_token_key());
    }

    #[test]
    fn test_session_key_shape() {
        let key = generate_session_key();
        assert_eq!(key.len(), 43);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_session_digest_is_keyed() {
        let a = session_digest("secret-one", "key");
        assert_eq!(a.len(), 64);
        assert_eq!(a, session_digest("secret-one", "key"));
        assert_ne!(a, session_digest("secret-two", "key"));
        assert_ne!(a, session_digest("secret-one", "other"));
    }

    #[test]
    fn test_parse_token_header_rejects_extra_parts() {
        assert_eq!(parse_token_header("Token a b"), None);
        assert_eq!(parse_token_header(""), None);
        assert_eq!(parse_token_header("  Token   k  "), Some("k"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}
