//! Webhook signature verification
//!
//! Signatures are `sha256=<hex hmac>` over `timestamp || body`, keyed with
//! the shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(body);
    Some(mac)
}

/// Compute the signature header value for a delivery
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let digest = mac_for(secret, timestamp, body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{SIGNATURE_PREFIX}{digest}")
}

/// Check a signature header in constant time
///
/// The `sha256=` prefix is optional. Missing or malformed values fail.
pub fn verify(secret: &str, timestamp: &str, body: &[u8], signature: &str) -> bool {
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }
    let hex_digest = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Some(mac) = mac_for(secret, timestamp, body) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"page.content_updated"}"#;

    #[test]
    fn test_sign_then_verify() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert!(verify(SECRET, "1700000000", BODY, &sig));
    }

    #[test]
    fn test_prefix_is_optional() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(verify(SECRET, "1700000000", BODY, &sig["sha256=".len()..]));
    }

    #[test]
    fn test_flipped_signature_byte_fails() {
        let sig = sign(SECRET, "1700000000", BODY);
        let mut bytes = sig.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(bytes).unwrap();

        assert!(!verify(SECRET, "1700000000", BODY, &flipped));
    }

    #[test]
    fn test_timestamp_is_covered() {
        let sig = sign(SECRET, "1700000000", BODY);
        assert!(!verify(SECRET, "1700000001", BODY, &sig));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sig = sign("other", "1700000000", BODY);
        assert!(!verify(SECRET, "1700000000", BODY, &sig));
    }

    #[test]
    fn test_malformed_values_fail() {
        assert!(!verify(SECRET, "1700000000", BODY, ""));
        assert!(!verify(SECRET, "", BODY, "sha256=00"));
        assert!(!verify(SECRET, "1700000000", BODY, "sha256=not-hex"));
    }
}
