// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as delay ordering, non-zero bounds and price consistency.

use crate::diagnostic::ConfigError;
use crate::model::{ParleyConfig, StoreBackend};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.retry.max_attempts == 0 {
        errors.push(invalid("retry.max_attempts must be at least 1"));
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(invalid(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        )));
    }

    if config.memory.max_entries == 0 {
        errors.push(invalid("memory.max_entries must be at least 1"));
    }

    if config.memory.max_chars == 0 {
        errors.push(invalid("memory.max_chars must be at least 1"));
    }

    if config.memory.conversation_ttl_secs == 0 {
        errors.push(invalid("memory.conversation_ttl_secs must be at least 1"));
    }

    if config.gateway.timeout_secs == 0 {
        errors.push(invalid("gateway.timeout_secs must be at least 1"));
    }

    if config.gateway.base_url.trim().is_empty() {
        errors.push(invalid("gateway.base_url must not be empty"));
    }

    if config.bot.default_audio_prompt.trim().is_empty() {
        errors.push(invalid("bot.default_audio_prompt must not be empty"));
    }

    if config.billing.database_path.trim().is_empty() {
        errors.push(invalid("billing.database_path must not be empty"));
    }

    if config.billing.subscription_price < 0.0 {
        errors.push(invalid(format!(
            "billing.subscription_price must be non-negative, got {}",
            config.billing.subscription_price
        )));
    }

    if config.store.backend == StoreBackend::Redis
        && config
            .store
            .redis_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
    {
        errors.push(ConfigError::MissingRedisUrl);
    }

    if config.sweep.enabled && config.sweep.interval_secs == 0 {
        errors.push(invalid(
            "sweep.interval_secs must be at least 1 when the sweep is enabled",
        ));
    }

    let mut models: Vec<_> = config.billing.models.iter().collect();
    models.sort_by(|a, b| a.0.cmp(b.0));
    for (model, entry) in models {
        for price in [entry.price_with_sub, entry.price_without_sub].into_iter().flatten() {
            if price < 0.0 {
                errors.push(invalid(format!(
                    "billing.models.\"{model}\" prices must be non-negative, got {price}"
                )));
            }
        }
        if let (Some(with_sub), Some(without_sub)) = (entry.price_with_sub, entry.price_without_sub)
            && with_sub > without_sub
        {
            errors.push(ConfigError::PriceOrdering {
                model: model.clone(),
                with_sub,
                without_sub,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
