// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Careflow booking pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Careflow configuration.
///
/// Loaded from TOML files, with environment variable overrides via the
/// `CAREFLOW_` prefix. All sections are optional and default to sensible
/// values; secrets default to `None` and are validated at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CareflowConfig {
    /// Process identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ingestion gateway HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Job queue and retry policy settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// AI intent classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Availability and booking settings.
    #[serde(default)]
    pub booking: BookingConfig,

    /// Instagram platform settings.
    #[serde(default)]
    pub instagram: InstagramConfig,

    /// Razorpay gateway settings (domestic).
    #[serde(default)]
    pub razorpay: RazorpayConfig,

    /// PayPal gateway settings (international).
    #[serde(default)]
    pub paypal: PaypalConfig,

    /// Transactional email settings.
    #[serde(default)]
    pub email: EmailConfig,

    /// Encryption and retention settings.
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name for logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "careflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Ingestion gateway HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("careflow").join("careflow.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "careflow.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Job queue and retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum delivery attempts per job before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff in seconds; doubles per attempt.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Upper bound on retry backoff in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Number of concurrent worker consumers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            workers: default_workers(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    60
}

fn default_backoff_cap_secs() -> u64 {
    240
}

fn default_workers() -> usize {
    4
}

/// AI intent classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// API key for the classification capability. `None` requires env override.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Fixed model identifier sent with every classification call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Token bound for classification responses.
    #[serde(default = "default_classifier_max_tokens")]
    pub max_tokens: u32,

    /// Maximum cached classifications held in process.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Cache entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_classifier_max_tokens(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_classifier_max_tokens() -> u32 {
    64
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl_secs() -> u64 {
    600
}

/// Availability and booking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BookingConfig {
    /// Fixed slot duration in minutes.
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,

    /// How many upcoming slots to offer per turn.
    #[serde(default = "default_offer_limit")]
    pub offer_limit: usize,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            offer_limit: default_offer_limit(),
        }
    }
}

fn default_slot_minutes() -> u32 {
    30
}

fn default_offer_limit() -> usize {
    5
}

/// Instagram platform configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstagramConfig {
    /// App secret used to verify `X-Hub-Signature-256` on inbound webhooks.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Page access token for the Graph API send endpoint.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Razorpay gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RazorpayConfig {
    #[serde(default)]
    pub key_id: Option<String>,

    #[serde(default)]
    pub key_secret: Option<String>,

    /// Secret for verifying `X-Razorpay-Signature` on inbound webhooks.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// PayPal gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PaypalConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Secret for verifying inbound webhook signatures.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// Transactional email configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "bookings@careflow.local".to_string()
}

/// Encryption and retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// 32-byte hex-encoded AES-256-GCM key for dead-letter payload
    /// encryption. Managed externally; required to run the gateway.
    #[serde(default)]
    pub dead_letter_key: Option<String>,

    /// Dead-letter retention window in days.
    #[serde(default = "default_retention_days")]
    pub dead_letter_retention_days: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            dead_letter_key: None,
            dead_letter_retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}
