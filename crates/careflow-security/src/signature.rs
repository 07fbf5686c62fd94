// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature verification over raw request bytes.
//!
//! Verification runs before any payload parsing. Comparison is constant-time
//! via the `hmac` crate's `verify_slice`.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Verify an HMAC-SHA256 hex signature over `raw_body`.
///
/// `signature` may carry a `sha256=` prefix (Meta's `X-Hub-Signature-256`
/// convention); it is stripped before decoding.
pub fn verify_hmac_sha256(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let hex_sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// Compute the HMAC-SHA256 hex digest of `raw_body` (test fixtures, outbound
/// signing).
pub fn sign_hmac_sha256(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// SHA-256 hex digest of a payload. Used as the stable event-id fallback
/// when a platform supplies no id of its own.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"entry":[]}"#;
        let sig = sign_hmac_sha256("app-secret", body);
        assert!(verify_hmac_sha256("app-secret", body, &sig));
    }

    #[test]
    fn sha256_prefix_is_accepted() {
        let body = b"payload";
        let sig = format!("sha256={}", sign_hmac_sha256("s", body));
        assert!(verify_hmac_sha256("s", body, &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let sig = sign_hmac_sha256("secret-a", body);
        assert!(!verify_hmac_sha256("secret-b", body, &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign_hmac_sha256("secret", b"original");
        assert!(!verify_hmac_sha256("secret", b"tampered", &sig));
    }

    #[test]
    fn garbage_signature_fails_without_panic() {
        assert!(!verify_hmac_sha256("secret", b"body", "not-hex-at-all"));
        assert!(!verify_hmac_sha256("secret", b"body", ""));
    }

    #[test]
    fn sha256_hex_is_stable() {
        let a = sha256_hex(b"same bytes");
        let b = sha256_hex(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha256_hex(b"different bytes"));
    }
}
