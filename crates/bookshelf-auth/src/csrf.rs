//! CSRF secrets and the masked tokens handed to forms.
//!
//! The cookie holds a 64-hex-character secret. Pages embed a masked form of
//! it: a fresh random pad followed by `secret XOR pad`, so the token text
//! changes on every render while still unmasking to the same secret.

use rand::RngCore;

use crate::tokens::{constant_time_eq, hex_encode};

/// Bytes in a CSRF secret.
const SECRET_BYTES: usize = 32;

/// Hex length of a CSRF secret.
pub const SECRET_LENGTH: usize = SECRET_BYTES * 2;

/// Form field carrying the token.
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Generates a new cookie secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Returns `true` if `value` has the shape of a cookie secret.
pub fn is_valid_secret(value: &str) -> bool {
    value.len() == SECRET_LENGTH && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Masks `secret` with a fresh random pad. Returns an empty string if
/// `secret` is not hex.
pub fn mask_secret(secret: &str) -> String {
    let Some(secret_bytes) = hex_decode(secret) else {
        return String::new();
    };
    let mut pad = vec![0u8; secret_bytes.len()];
    rand::thread_rng().fill_bytes(&mut pad);
    let cipher: Vec<u8> = secret_bytes.iter().zip(&pad).map(|(s, p)| s ^ p).collect();
    pad.extend(cipher);
    hex_encode(&pad)
}

/// Recovers the secret from a masked token.
pub fn unmask_token(token: &str) -> Option<String> {
    let bytes = hex_decode(token)?;
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }
    let (pad, cipher) = bytes.split_at(bytes.len() / 2);
    let secret: Vec<u8> = cipher.iter().zip(pad).map(|(c, p)| c ^ p).collect();
    Some(hex_encode(&secret))
}

/// Checks a submitted token (masked or bare) against the cookie secret in
/// constant time. Hex case is ignored on both sides.
pub fn tokens_match(submitted: &str, secret: &str) -> bool {
    if !is_valid_secret(secret) {
        return false;
    }
    let candidate = match submitted.len() {
        n if n == SECRET_LENGTH * 2 => match unmask_token(submitted) {
            Some(s) => s,
            None => return false,
        },
        n if n == SECRET_LENGTH => submitted.to_ascii_lowercase(),
        _ => return false,
    };
    let secret = secret.to_ascii_lowercase();
    constant_time_eq(candidate.as_bytes(), secret.as_bytes())
}
