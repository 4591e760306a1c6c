// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley bot backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use parley_core::Tier;
use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Bot identity and prompt settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// LLM gateway endpoint settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Retry policy for outbound gateway calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Keyed store backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Conversation memory bounds.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Ledger, quota and pricing settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Aged-entry sweep schedule.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Bot identity and prompt configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name of the bot.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inline system prompt string. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a markdown file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,

    /// Text sent alongside a voice message when the user supplied no caption.
    #[serde(default = "default_audio_prompt")]
    pub default_audio_prompt: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
            system_prompt: None,
            system_prompt_file: None,
            default_audio_prompt: default_audio_prompt(),
        }
    }
}

fn default_bot_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audio_prompt() -> String {
    "Listen to this voice message and reply to it.".to_string()
}

/// LLM gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// API key. Falls back to `PARLEY_GATEWAY_API_KEY`, then `OPENROUTER_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat-completion endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when the caller does not choose one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used for image generation.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on image URLs downloaded from one response.
    #[serde(default = "default_max_image_downloads")]
    pub max_image_downloads: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            image_model: default_image_model(),
            timeout_secs: default_timeout_secs(),
            max_image_downloads: default_max_image_downloads(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_image_model() -> String {
    "google/gemini-2.5-flash-image-preview".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_image_downloads() -> usize {
    4
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

/// Which keyed store implementation backs per-user state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map. State is lost on restart.
    #[default]
    Memory,
    Redis,
}

/// Keyed store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL, required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    "parley".to_string()
}

/// Conversation memory bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Maximum number of entries kept per user.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum aggregate content characters kept per user. Also the per-entry cap.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Idle lifetime of history and the last-image slot.
    #[serde(default = "default_conversation_ttl_secs")]
    pub conversation_ttl_secs: u64,

    /// Lifetime of an unconsumed uploaded file record.
    #[serde(default = "default_pending_file_ttl_secs")]
    pub pending_file_ttl_secs: u64,

    /// Entries older than this are dropped by the sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_chars: default_max_chars(),
            conversation_ttl_secs: default_conversation_ttl_secs(),
            pending_file_ttl_secs: default_pending_file_ttl_secs(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_max_entries() -> usize {
    20
}

fn default_max_chars() -> usize {
    30_000
}

fn default_conversation_ttl_secs() -> u64 {
    50 * 24 * 60 * 60
}

fn default_pending_file_ttl_secs() -> u64 {
    3600
}

fn default_retention_days() -> u32 {
    50
}

/// Ledger, quota and pricing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Path to the SQLite ledger database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Free BASE-tier messages per user per local day.
    #[serde(default = "default_daily_base_limit")]
    pub daily_base_limit: u32,

    /// Subscription price in SP.
    #[serde(default = "default_subscription_price")]
    pub subscription_price: f64,

    /// Subscription period length.
    #[serde(default = "default_subscription_days")]
    pub subscription_days: u32,

    /// Per-model pricing entries, keyed by model id. Adds to or overrides the built-in table.
    #[serde(default)]
    pub models: HashMap<String, ModelPricingConfig>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            daily_base_limit: default_daily_base_limit(),
            subscription_price: default_subscription_price(),
            subscription_days: default_subscription_days(),
            models: HashMap::new(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("parley").join("ledger.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("ledger.db"))
        .display()
        .to_string()
}

fn default_daily_base_limit() -> u32 {
    30
}

fn default_subscription_price() -> f64 {
    300.0
}

fn default_subscription_days() -> u32 {
    30
}

/// One `[billing.models."<id>"]` entry.
///
/// Prices left unset fall back to the tier defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPricingConfig {
    pub tier: Tier,

    #[serde(default)]
    pub price_without_sub: Option<f64>,

    #[serde(default)]
    pub price_with_sub: Option<f64>,

    #[serde(default)]
    pub files: bool,

    #[serde(default)]
    pub photos: bool,

    #[serde(default)]
    pub audio: bool,

    #[serde(default)]
    pub image_gen: bool,
}

/// Aged-entry sweep schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = ParleyConfig::default();
        assert_eq!(config.memory.max_entries, 20);
        assert_eq!(config.memory.max_chars, 30_000);
        assert_eq!(config.memory.retention_days, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_delay_ms, 5000);
        assert_eq!(config.billing.daily_base_limit, 30);
        assert_eq!(config.gateway.max_image_downloads, 4);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn model_override_parses_tier() {
        let toml_str = r#"
[billing.models."acme/large"]
tier = "top"
price_with_sub = 8.0
photos = true
"#;
        let config: ParleyConfig = toml::from_str(toml_str).unwrap();
        let entry = &config.billing.models["acme/large"];
        assert_eq!(entry.tier, Tier::Top);
        assert_eq!(entry.price_with_sub, Some(8.0));
        assert_eq!(entry.price_without_sub, None);
        assert!(entry.photos);
        assert!(!entry.audio);
    }

    #[test]
    fn store_backend_parses_lowercase() {
        let config: ParleyConfig =
            toml::from_str("[store]\nbackend = \"redis\"\nredis_url = \"redis://localhost\"\n")
                .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }
}
