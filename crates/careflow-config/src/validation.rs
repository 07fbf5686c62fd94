// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup validation of loaded configuration.
//!
//! Collects every problem found into a single list so the operator sees all
//! actionable errors at once instead of fixing them one restart at a time.

use crate::model::CareflowConfig;

/// Validate semantic constraints that serde cannot express.
///
/// Returns an empty vec when the config is runnable.
pub fn validate(config: &CareflowConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.queue.max_attempts == 0 {
        errors.push("queue.max_attempts must be at least 1".to_string());
    }
    if config.queue.workers == 0 {
        errors.push("queue.workers must be at least 1".to_string());
    }
    if config.queue.backoff_cap_secs < config.queue.backoff_base_secs {
        errors.push(format!(
            "queue.backoff_cap_secs ({}) must be >= queue.backoff_base_secs ({})",
            config.queue.backoff_cap_secs, config.queue.backoff_base_secs
        ));
    }

    if config.booking.slot_minutes == 0 || config.booking.slot_minutes > 240 {
        errors.push("booking.slot_minutes must be between 1 and 240".to_string());
    }

    match &config.security.dead_letter_key {
        None => {
            errors.push(
                "security.dead_letter_key is required (64 hex chars, 32 bytes)".to_string(),
            );
        }
        Some(key) => match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            _ => errors.push(
                "security.dead_letter_key must be exactly 64 hex characters".to_string(),
            ),
        },
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.agent.log_level.as_str()) {
        errors.push(format!(
            "agent.log_level '{}' is not one of {:?}",
            config.agent.log_level, valid_levels
        ));
    }

    errors
}

/// Load from the XDG hierarchy and validate in one step.
///
/// Figment extraction errors are folded into the same error list as
/// semantic validation failures.
pub fn load_and_validate() -> Result<CareflowConfig, Vec<String>> {
    let config = crate::loader::load_config().map_err(|e| vec![e.to_string()])?;
    let errors = validate(&config);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(errors)
    }
}

/// Print validation errors to stderr, one per line.
pub fn render_errors(errors: &[String]) {
    eprintln!("careflow: configuration invalid:");
    for error in errors {
        eprintln!("  - {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    fn valid_config() -> CareflowConfig {
        let mut config = load_config_from_str("").unwrap();
        config.security.dead_letter_key = Some("ab".repeat(32));
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&valid_config()).is_empty());
    }

    #[test]
    fn missing_dead_letter_key_is_reported() {
        let config = load_config_from_str("").unwrap();
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.contains("dead_letter_key")));
    }

    #[test]
    fn short_dead_letter_key_is_reported() {
        let mut config = valid_config();
        config.security.dead_letter_key = Some("abcd".to_string());
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.contains("64 hex characters")));
    }

    #[test]
    fn zero_workers_is_reported() {
        let mut config = valid_config();
        config.queue.workers = 0;
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.contains("queue.workers")));
    }

    #[test]
    fn inverted_backoff_bounds_are_reported() {
        let mut config = valid_config();
        config.queue.backoff_base_secs = 300;
        config.queue.backoff_cap_secs = 60;
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.contains("backoff_cap_secs")));
    }

    #[test]
    fn bad_log_level_is_reported() {
        let mut config = valid_config();
        config.agent.log_level = "verbose".to_string();
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.contains("log_level")));
    }
}
