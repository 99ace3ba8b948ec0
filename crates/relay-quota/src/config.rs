//! Quota engine configuration.

use std::path::PathBuf;

use relay_quota_core::{PricingConfig, Result, DOLLAR_RATE};

/// Quota engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Flat quota added to every per-token estimate to cover completion output (default: 500).
    pub pre_consumed_quota: i64,

    /// Callers whose cached balance exceeds `trust_multiplier * estimate` skip the
    /// ledger pre-consume (default: 100).
    pub trust_multiplier: i64,

    /// Display-currency rate used in consume-log rate descriptions (default: 0.002).
    pub dollar_rate: f64,

    /// Whether settlements append consume-log records (default: true).
    pub log_consume_enabled: bool,

    /// Refresh the cached balance when a reservation is undone (default: false).
    ///
    /// Closes the window in which a trusted caller's provisional cache deduction
    /// survives a failed request until that caller's next settlement.
    pub refresh_cache_on_undo: bool,

    /// JSON pricing file; `None` uses the built-in price list.
    pub pricing_file: Option<PathBuf>,
}

impl QuotaConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            pre_consumed_quota: env_parse("PRE_CONSUMED_QUOTA")
                .unwrap_or(defaults.pre_consumed_quota),
            trust_multiplier: env_parse("QUOTA_TRUST_MULTIPLIER")
                .unwrap_or(defaults.trust_multiplier),
            dollar_rate: env_parse("QUOTA_DOLLAR_RATE").unwrap_or(defaults.dollar_rate),
            log_consume_enabled: env_flag("LOG_CONSUME_ENABLED")
                .unwrap_or(defaults.log_consume_enabled),
            refresh_cache_on_undo: env_flag("QUOTA_REFRESH_CACHE_ON_UNDO")
                .unwrap_or(defaults.refresh_cache_on_undo),
            pricing_file: std::env::var("PRICING_FILE").ok().map(PathBuf::from),
        }
    }

    /// Load the pricing tables this configuration points at.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Configuration` if the pricing file cannot be read or parsed.
    pub fn load_pricing(&self) -> Result<PricingConfig> {
        match &self.pricing_file {
            Some(path) => {
                let pricing = PricingConfig::load(path)?;
                tracing::info!(
                    path = %path.display(),
                    models = pricing.prices.len(),
                    "Loaded pricing from file"
                );
                Ok(pricing)
            }
            None => {
                tracing::debug!("Pricing file not configured, using built-in prices");
                Ok(PricingConfig::default())
            }
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            pre_consumed_quota: 500,
            trust_multiplier: 100,
            dollar_rate: DOLLAR_RATE,
            log_consume_enabled: true,
            refresh_cache_on_undo: false,
            pricing_file: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|s| parse_flag(&s))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
