// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./careflow.toml` > `~/.config/careflow/careflow.toml`
//! > `/etc/careflow/careflow.toml` with environment variable overrides via the
//! `CAREFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CareflowConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/careflow/careflow.toml` (system-wide)
/// 3. `~/.config/careflow/careflow.toml` (user XDG config)
/// 4. `./careflow.toml` (local directory)
/// 5. `CAREFLOW_*` environment variables
pub fn load_config() -> Result<CareflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CareflowConfig::default()))
        .merge(Toml::file("/etc/careflow/careflow.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("careflow/careflow.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("careflow.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CareflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CareflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CareflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CareflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CAREFLOW_RAZORPAY_KEY_SECRET` must map
/// to `razorpay.key_secret`, not `razorpay.key.secret`.
fn env_provider() -> Env {
    Env::prefixed("CAREFLOW_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("classifier_", "classifier.", 1)
            .replacen("booking_", "booking.", 1)
            .replacen("instagram_", "instagram.", 1)
            .replacen("razorpay_", "razorpay.", 1)
            .replacen("paypal_", "paypal.", 1)
            .replacen("email_", "email.", 1)
            .replacen("security_", "security.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_from_empty_string() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "careflow");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [queue]
            max_attempts = 5
            workers = 2

            [booking]
            slot_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.booking.slot_minutes, 15);
        // Untouched sections keep defaults.
        assert_eq!(config.queue.backoff_base_secs, 60);
    }

    #[test]
    fn rejects_unknown_section_keys() {
        let result = load_config_from_str(
            r#"
            [queue]
            max_atempts = 5
            "#,
        );
        assert!(result.is_err(), "typo'd key should be rejected");
    }

    #[test]
    fn secrets_default_to_none() {
        let config = load_config_from_str("").unwrap();
        assert!(config.classifier.api_key.is_none());
        assert!(config.instagram.app_secret.is_none());
        assert!(config.security.dead_letter_key.is_none());
    }
}
