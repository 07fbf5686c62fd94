// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security primitives for the Careflow pipeline: PHI redaction, dead-letter
//! payload encryption, and webhook signature verification.

pub mod crypto;
pub mod redact;
pub mod signature;

pub use crypto::{key_from_hex, open, seal};
pub use redact::{Redacted, redact};
pub use signature::{sha256_hex, sign_hmac_sha256, verify_hmac_sha256};
