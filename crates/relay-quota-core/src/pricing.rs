//! Pricing configuration for relay quota metering.
//!
//! This module defines per-model price descriptors, caller group ratios and the
//! read-only lookup seams the quota engine consults on every request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{QuotaError, Result};

/// Display-currency rate: one ratio unit is $0.002 per 1k tokens.
pub const DOLLAR_RATE: f64 = 0.002;

/// Group ratio applied when a caller's group is not configured.
pub const DEFAULT_GROUP_RATIO: f64 = 1.0;

/// How a model is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    /// Billed per prompt and completion token.
    Tokens,
    /// Billed a flat amount per call, regardless of tokens.
    Times,
}

/// Price descriptor for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    /// Model name (e.g., "gpt-4o").
    pub model: String,

    /// Billing kind.
    #[serde(rename = "type")]
    pub price_type: PriceType,

    /// Upstream channel type the price was configured for.
    #[serde(default)]
    pub channel_type: i32,

    /// Input (prompt) ratio.
    pub input: f64,

    /// Output (completion) ratio.
    pub output: f64,
}

impl Price {
    /// Create a per-token price.
    #[must_use]
    pub fn tokens(model: impl Into<String>, input: f64, output: f64) -> Self {
        Self {
            model: model.into(),
            price_type: PriceType::Tokens,
            channel_type: 0,
            input,
            output,
        }
    }

    /// Create a per-call price.
    #[must_use]
    pub fn times(model: impl Into<String>, input: f64) -> Self {
        Self {
            model: model.into(),
            price_type: PriceType::Times,
            channel_type: 0,
            input,
            output: input,
        }
    }

    /// Input ratio, with negative configured rates treated as free.
    #[must_use]
    pub fn input_ratio(&self) -> f64 {
        self.input.max(0.0)
    }

    /// Output ratio, with negative configured rates treated as free.
    #[must_use]
    pub fn output_ratio(&self) -> f64 {
        self.output.max(0.0)
    }

    /// Input price expressed in a display currency.
    #[must_use]
    pub fn input_currency_price(&self, rate: f64) -> String {
        format_currency(self.input_ratio() * rate)
    }

    /// Output price expressed in a display currency.
    #[must_use]
    pub fn output_currency_price(&self, rate: f64) -> String {
        format_currency(self.output_ratio() * rate)
    }

    /// Whether the model bills anything at all.
    #[must_use]
    pub fn is_billable(&self) -> bool {
        self.input != 0.0 || self.output != 0.0
    }
}

/// Render a display price without trailing zeros.
fn format_currency(value: f64) -> String {
    let rendered = format!("{value:.6}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Read-only model price lookup.
pub trait PriceLookup: Send + Sync {
    /// Price descriptor for a model, if one is configured.
    fn price(&self, model: &str) -> Option<Price>;
}

/// Read-only caller group ratio lookup.
pub trait GroupRatioLookup: Send + Sync {
    /// Discount or markup multiplier for a group. Unknown groups yield [`DEFAULT_GROUP_RATIO`].
    fn group_ratio(&self, group: &str) -> f64;
}

/// Pricing configuration: model prices plus caller group ratios.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Model name -> price descriptor.
    pub prices: HashMap<String, Price>,

    /// Price applied to unmapped models. `None` rejects them.
    pub default_price: Option<Price>,

    /// Group name -> ratio.
    pub group_ratios: HashMap<String, f64>,
}

/// On-disk pricing file structure.
#[derive(Debug, Deserialize)]
struct PricingFile {
    #[serde(default)]
    prices: Vec<Price>,
    #[serde(default)]
    default_price: Option<Price>,
    #[serde(default = "default_group_ratios")]
    group_ratios: HashMap<String, f64>,
}

fn default_group_ratios() -> HashMap<String, f64> {
    ["default", "vip", "svip"]
        .into_iter()
        .map(|group| (group.to_string(), DEFAULT_GROUP_RATIO))
        .collect()
}

impl Default for PricingConfig {
    fn default() -> Self {
        let prices = [
            Price::tokens("gpt-3.5-turbo", 0.25, 0.75),
            Price::tokens("gpt-4", 15.0, 30.0),
            Price::tokens("gpt-4o", 1.25, 5.0),
            Price::tokens("gpt-4o-mini", 0.075, 0.3),
            Price::tokens("text-embedding-3-small", 0.01, 0.01),
            Price::tokens("claude-3-5-sonnet", 1.5, 7.5),
            Price::times("dall-e-3", 20.0),
            Price::times("@cf/stabilityai/stable-diffusion-xl-base-1.0", 0.5),
        ];

        Self {
            prices: prices
                .into_iter()
                .map(|price| (price.model.clone(), price))
                .collect(),
            default_price: None,
            group_ratios: default_group_ratios(),
        }
    }
}

impl PricingConfig {
    /// Create an empty configuration with the default groups.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
            default_price: None,
            group_ratios: default_group_ratios(),
        }
    }

    /// Add or replace a model price.
    #[must_use]
    pub fn with_price(mut self, price: Price) -> Self {
        self.prices.insert(price.model.clone(), price);
        self
    }

    /// Add or replace a group ratio.
    #[must_use]
    pub fn with_group_ratio(mut self, group: impl Into<String>, ratio: f64) -> Self {
        self.group_ratios.insert(group.into(), ratio);
        self
    }

    /// Price unmapped models with a fallback descriptor.
    #[must_use]
    pub fn with_default_price(mut self, price: Price) -> Self {
        self.default_price = Some(price);
        self
    }

    /// Load pricing from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Configuration` if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QuotaError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Parse pricing from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Configuration` if the document is malformed.
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: PricingFile = serde_json::from_str(contents)
            .map_err(|e| QuotaError::Configuration(format!("invalid pricing file: {e}")))?;

        Ok(Self {
            prices: file
                .prices
                .into_iter()
                .map(|price| (price.model.clone(), price))
                .collect(),
            default_price: file.default_price,
            group_ratios: file.group_ratios,
        })
    }
}

impl PriceLookup for PricingConfig {
    fn price(&self, model: &str) -> Option<Price> {
        self.prices.get(model).cloned().or_else(|| {
            self.default_price.as_ref().map(|fallback| Price {
                model: model.to_string(),
                ..fallback.clone()
            })
        })
    }
}

impl GroupRatioLookup for PricingConfig {
    fn group_ratio(&self, group: &str) -> f64 {
        if let Some(ratio) = self.group_ratios.get(group) {
            return *ratio;
        }
        tracing::warn!(group = %group, "Group ratio not configured, using default");
        DEFAULT_GROUP_RATIO
    }
}
