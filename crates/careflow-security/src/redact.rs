// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PHI redaction applied before any text leaves the process.
//!
//! Every message forwarded to the AI classifier, and any user text that
//! could reach log output, passes through [`redact`] first. Patterns cover
//! email addresses and phone-like digit runs.

use std::sync::LazyLock;

use regex::Regex;

/// Known PHI patterns to redact from outbound text.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Email addresses.
        Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap(),
        // Phone-like digit sequences: 7+ digits with optional separators
        // and country prefix.
        Regex::new(r"\+?\d[\d\s().\-]{5,}\d").unwrap(),
    ]
});

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Outcome of redacting a string: the scrubbed text plus whether anything
/// was actually replaced (recorded in the classifier audit trail).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redacted {
    pub text: String,
    pub applied: bool,
}

/// Redact personally identifying substrings from `input`.
pub fn redact(input: &str) -> Redacted {
    let mut result = input.to_string();
    let mut applied = false;

    for pattern in REDACTION_PATTERNS.iter() {
        let replaced = pattern.replace_all(&result, REDACTED);
        if replaced != result {
            applied = true;
        }
        result = replaced.to_string();
    }

    Redacted {
        text: result,
        applied,
    }
}
