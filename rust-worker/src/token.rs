//! Unsubscribe token encoding.
//!
//! The token is a reversible encoding of the recipient's address, not a
//! capability: anyone holding a valid-looking token can unsubscribe that
//! address. When `UNSUBSCRIBE_SIGNING_KEY` is configured the token also
//! carries an HMAC-SHA256 tag and the handler rejects tokens whose tag
//! does not verify; without a key, plain tokens are accepted unchanged.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Encode an unsubscribe token for `email`.
///
/// Unsigned form: `base64url(email)`. Signed form:
/// `base64url(email).hex(hmac_sha256(key, email))`.
pub fn encode_token(email: &str, signing_key: Option<&str>) -> String {
    let body = URL_SAFE_NO_PAD.encode(email.as_bytes());
    match signing_key {
        Some(key) if !key.trim().is_empty() => {
            format!("{}.{}", body, sign(key, email))
        }
        _ => body,
    }
}

/// Decode a token back to the email address it names.
///
/// With a signing key configured, tokens must carry a verifying tag.
/// Without one, the tag segment is ignored if present, so tokens issued
/// before a key rotation out still resolve.
///
/// Tokens in already-delivered mail were encoded with the standard
/// alphabet and `=` padding, so that form is accepted alongside the
/// url-safe one.
pub fn decode_token(token: &str, signing_key: Option<&str>) -> Option<String> {
    let (body, tag) = match token.split_once('.') {
        Some((body, tag)) => (body, Some(tag)),
        None => (token, None),
    };

    let bytes = match URL_SAFE_NO_PAD
        .decode(body)
        .or_else(|_| STANDARD.decode(body))
    {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(token_length = token.len(), "unsubscribe_token_undecodable");
            return None;
        }
    };
    let email = match String::from_utf8(bytes) {
        Ok(email) => email,
        Err(_) => {
            warn!("unsubscribe_token_not_utf8");
            return None;
        }
    };

    if let Some(key) = signing_key.filter(|k| !k.trim().is_empty()) {
        let tag = match tag {
            Some(tag) => tag,
            None => {
                warn!("unsubscribe_token_unsigned");
                return None;
            }
        };
        if !constant_time_compare(&sign(key, &email), tag) {
            warn!("unsubscribe_token_tag_mismatch");
            return None;
        }
    }

    Some(email)
}

fn sign(key: &str, email: &str) -> String {
    // Key length is unrestricted for HMAC, so this cannot fail with a
    // non-empty key.
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"-").expect("hmac accepts any key length"));
    mac.update(email.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
