// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing table in SP.
//!
//! Every model belongs to a tier. A model's price pair is its own override
//! when one is set, otherwise the tier default:
//!
//! | Tier | Without subscription | With subscription |
//! |------|----------------------|-------------------|
//! | BASE | 1                    | 0.5               |
//! | MID  | 5                    | 3                 |
//! | TOP  | 15                   | 10                |

use std::collections::HashMap;

use parley_config::ModelPricingConfig;
use parley_core::{ParleyError, Tier};
use serde::Serialize;
use strum::Display;
use tracing::warn;

/// A turn kind a model may or may not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Files,
    Photos,
    Audio,
    ImageGen,
}

/// Which turn kinds a model supports. Plain text is always supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub files: bool,
    pub photos: bool,
    pub audio: bool,
    pub image_gen: bool,
}

impl Capabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Files => self.files,
            Capability::Photos => self.photos,
            Capability::Audio => self.audio,
            Capability::ImageGen => self.image_gen,
        }
    }
}

/// A (without subscription, with subscription) price pair in SP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePair {
    pub without_sub: f64,
    pub with_sub: f64,
}

impl PricePair {
    /// Builds a pair, capping the subscriber price at the list price.
    pub fn new(without_sub: f64, with_sub: f64) -> Self {
        Self {
            without_sub,
            with_sub: with_sub.min(without_sub),
        }
    }

    pub fn for_subscription(&self, has_sub: bool) -> f64 {
        if has_sub {
            self.with_sub
        } else {
            self.without_sub
        }
    }
}

/// Default prices of a tier.
pub fn tier_default(tier: Tier) -> PricePair {
    match tier {
        Tier::Base => PricePair::new(1.0, 0.5),
        Tier::Mid => PricePair::new(5.0, 3.0),
        Tier::Top => PricePair::new(15.0, 10.0),
    }
}

/// Pricing of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingEntry {
    pub tier: Tier,
    /// Model-specific prices, preferred over the tier default.
    pub price_override: Option<PricePair>,
    pub capabilities: Capabilities,
}

impl PricingEntry {
    pub fn prices(&self) -> PricePair {
        self.price_override.unwrap_or_else(|| tier_default(self.tier))
    }
}

const fn caps(files: bool, photos: bool, audio: bool, image_gen: bool) -> Capabilities {
    Capabilities {
        files,
        photos,
        audio,
        image_gen,
    }
}

/// Models known without any configuration.
const BUILTIN: &[(&str, Tier, Option<(f64, f64)>, Capabilities)] = &[
    ("openai/gpt-4o-mini", Tier::Base, None, caps(true, true, false, false)),
    ("google/gemini-2.5-flash", Tier::Base, None, caps(true, true, true, false)),
    ("deepseek/deepseek-chat", Tier::Base, None, caps(true, false, false, false)),
    ("openai/gpt-4o", Tier::Mid, None, caps(true, true, false, false)),
    ("openai/gpt-4o-audio-preview", Tier::Mid, Some((6.0, 4.0)), caps(false, false, true, false)),
    ("anthropic/claude-sonnet-4", Tier::Mid, None, caps(true, true, false, false)),
    ("google/gemini-2.5-flash-image-preview", Tier::Mid, Some((8.0, 6.0)), caps(false, true, false, true)),
    ("google/gemini-2.5-pro", Tier::Top, None, caps(true, true, true, false)),
    ("anthropic/claude-opus-4", Tier::Top, None, caps(true, true, false, false)),
    ("openai/o3", Tier::Top, Some((20.0, 14.0)), caps(true, true, false, false)),
];

/// Immutable model-to-pricing lookup.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, PricingEntry>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingTable {
    /// The built-in model table.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(model, tier, prices, capabilities)| {
                (
                    (*model).to_string(),
                    PricingEntry {
                        tier: *tier,
                        price_override: prices.map(|(without, with)| PricePair::new(without, with)),
                        capabilities: *capabilities,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// The built-in table with `[billing.models]` entries added or replaced.
    pub fn with_overrides(overrides: &HashMap<String, ModelPricingConfig>) -> Self {
        let mut table = Self::builtin();
        for (model, cfg) in overrides {
            let defaults = tier_default(cfg.tier);
            let price_override = match (cfg.price_without_sub, cfg.price_with_sub) {
                (None, None) => None,
                (without, with) => {
                    let without = without.unwrap_or(defaults.without_sub);
                    let with = with.unwrap_or(defaults.with_sub);
                    if with > without {
                        warn!(model = %model, with, without, "subscriber price above list price, capping");
                    }
                    Some(PricePair::new(without, with))
                }
            };
            table.insert(
                model.clone(),
                PricingEntry {
                    tier: cfg.tier,
                    price_override,
                    capabilities: caps(cfg.files, cfg.photos, cfg.audio, cfg.image_gen),
                },
            );
        }
        table
    }

    pub fn insert(&mut self, model: impl Into<String>, entry: PricingEntry) {
        self.entries.insert(model.into(), entry);
    }

    pub fn entry(&self, model: &str) -> Result<&PricingEntry, ParleyError> {
        self.entries
            .get(model)
            .ok_or_else(|| ParleyError::UnknownModel(model.to_string()))
    }

    pub fn tier(&self, model: &str) -> Result<Tier, ParleyError> {
        Ok(self.entry(model)?.tier)
    }

    pub fn capabilities(&self, model: &str) -> Result<Capabilities, ParleyError> {
        Ok(self.entry(model)?.capabilities)
    }

    /// Price of one call to `model`, before any multiplier.
    pub fn effective_price(&self, model: &str, has_sub: bool) -> Result<f64, ParleyError> {
        Ok(self.entry(model)?.prices().for_subscription(has_sub))
    }

    /// Model ids, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_defaults_apply_without_override() {
        let table = PricingTable::builtin();
        assert_eq!(table.effective_price("openai/gpt-4o-mini", false).unwrap(), 1.0);
        assert_eq!(table.effective_price("openai/gpt-4o-mini", true).unwrap(), 0.5);
        assert_eq!(table.effective_price("openai/gpt-4o", false).unwrap(), 5.0);
        assert_eq!(table.effective_price("anthropic/claude-opus-4", true).unwrap(), 10.0);
    }

    #[test]
    fn model_override_beats_tier_default() {
        let table = PricingTable::builtin();
        assert_eq!(table.effective_price("openai/o3", false).unwrap(), 20.0);
        assert_eq!(table.effective_price("openai/o3", true).unwrap(), 14.0);
    }

    #[test]
    fn subscriber_price_never_exceeds_list_price() {
        let table = PricingTable::builtin();
        for model in table.models() {
            let with = table.effective_price(model, true).unwrap();
            let without = table.effective_price(model, false).unwrap();
            assert!(with <= without, "{model}: {with} > {without}");
        }
    }

    #[test]
    fn unknown_model_is_an_error() {
        let table = PricingTable::builtin();
        assert!(matches!(
            table.effective_price("nope/model", false),
            Err(ParleyError::UnknownModel(m)) if m == "nope/model"
        ));
    }

    #[test]
    fn config_overrides_add_and_cap() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "acme/new".to_string(),
            ModelPricingConfig {
                tier: Tier::Mid,
                price_without_sub: None,
                price_with_sub: Some(9.0),
                files: false,
                photos: true,
                audio: false,
                image_gen: false,
            },
        );
        let table = PricingTable::with_overrides(&overrides);
        // A subscriber price of 9 over the MID list price of 5 is capped.
        assert_eq!(table.effective_price("acme/new", true).unwrap(), 5.0);
        assert!(table.capabilities("acme/new").unwrap().photos);
        assert!(table.entry("openai/gpt-4o").is_ok());
    }

    #[test]
    fn capability_lookup() {
        let caps = PricingTable::builtin()
            .capabilities("google/gemini-2.5-flash-image-preview")
            .unwrap();
        assert!(caps.supports(Capability::ImageGen));
        assert!(!caps.supports(Capability::Audio));
        assert_eq!(Capability::ImageGen.to_string(), "image_gen");
    }
}
