//! Rate model: turns a price descriptor and a caller group into effective ratios.
//!
//! Everything here is a pure function of its inputs. The quota engine uses
//! [`Rates::estimate`] before the upstream call and [`Rates::cost`] once the
//! provider has reported usage.

use crate::error::{QuotaError, Result};
use crate::pricing::{GroupRatioLookup, Price, PriceLookup, PriceType};
use crate::usage::Usage;

/// Quota units charged per call for per-call models, before ratios apply.
pub const PER_CALL_UNITS: f64 = 1000.0;

/// Effective ratios for one model and one caller group.
#[derive(Debug, Clone, PartialEq)]
pub struct Rates {
    price: Price,
    group_ratio: f64,
    input_ratio: f64,
    output_ratio: f64,
}

impl Rates {
    /// Combine a price descriptor with a group ratio.
    #[must_use]
    pub fn new(price: Price, group_ratio: f64) -> Self {
        let input_ratio = price.input_ratio() * group_ratio;
        let output_ratio = price.output_ratio() * group_ratio;
        Self {
            price,
            group_ratio,
            input_ratio,
            output_ratio,
        }
    }

    /// Resolve the rates for a model requested by a caller in `group`.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::UnknownModel` if no price is configured for the model.
    pub fn resolve(
        prices: &dyn PriceLookup,
        groups: &dyn GroupRatioLookup,
        model: &str,
        group: &str,
    ) -> Result<Self> {
        let price = prices.price(model).ok_or_else(|| QuotaError::UnknownModel {
            model: model.to_string(),
        })?;
        Ok(Self::new(price, groups.group_ratio(group)))
    }

    /// The resolved price descriptor.
    #[must_use]
    pub fn price(&self) -> &Price {
        &self.price
    }

    /// The caller's group ratio.
    #[must_use]
    pub fn group_ratio(&self) -> f64 {
        self.group_ratio
    }

    /// `price.input * group_ratio`.
    #[must_use]
    pub fn input_ratio(&self) -> f64 {
        self.input_ratio
    }

    /// `price.output * group_ratio`.
    #[must_use]
    pub fn output_ratio(&self) -> f64 {
        self.output_ratio
    }

    /// Estimated quota to reserve before the upstream call.
    ///
    /// Per-call models reserve their flat price. Per-token models reserve the prompt
    /// cost plus `pre_consumed_offset`, unless the model is free. Never negative.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn estimate(&self, prompt_tokens: u64, pre_consumed_offset: i64) -> i64 {
        let estimate = match self.price.price_type {
            PriceType::Times => (PER_CALL_UNITS * self.input_ratio) as i64,
            PriceType::Tokens if self.price.is_billable() => {
                let prompt = (prompt_tokens as f64 * self.input_ratio) as i64;
                prompt.saturating_add(pre_consumed_offset)
            }
            PriceType::Tokens => 0,
        };
        estimate.max(0)
    }

    /// True cost of a completed request.
    ///
    /// Any non-free model charges at least 1. A request that reported no tokens
    /// at all is treated as failed upstream and costs 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn cost(&self, usage: &Usage) -> i64 {
        let mut quota = match self.price.price_type {
            PriceType::Times => (PER_CALL_UNITS * self.input_ratio) as i64,
            PriceType::Tokens => (usage.prompt_tokens as f64 * self.input_ratio
                + usage.completion_tokens as f64 * self.output_ratio)
                .ceil() as i64,
        };

        if self.input_ratio != 0.0 && quota <= 0 {
            quota = 1;
        }
        if usage.total_tokens() == 0 {
            quota = 0;
        }
        quota
    }

    /// Human-readable model rate, in `dollar_rate` units.
    #[must_use]
    pub fn describe(&self, dollar_rate: f64) -> String {
        let input = self.price.input_currency_price(dollar_rate);
        match self.price.price_type {
            PriceType::Times => format!("${input}/call"),
            PriceType::Tokens if self.price.input_ratio() == self.price.output_ratio() => {
                format!("${input}/1k")
            }
            PriceType::Tokens => {
                let output = self.price.output_currency_price(dollar_rate);
                format!("${input}/1k (input) | ${output}/1k (output)")
            }
        }
    }

    /// Consume-log content line: model rate plus group ratio.
    #[must_use]
    pub fn log_content(&self, dollar_rate: f64) -> String {
        format!(
            "model rate {}, group ratio {:.2}",
            self.describe(dollar_rate),
            self.group_ratio
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{PricingConfig, DOLLAR_RATE};

    fn usage(prompt_tokens: u64, completion_tokens: u64) -> Usage {
        Usage {
            prompt_tokens,
            completion_tokens,
        }
    }

    #[test]
    fn resolve_applies_group_ratio() {
        let config = PricingConfig::empty()
            .with_price(Price::tokens("m", 2.0, 4.0))
            .with_group_ratio("half", 0.5);

        let rates = Rates::resolve(&config, &config, "m", "half").unwrap();
        assert_eq!(rates.input_ratio(), 1.0);
        assert_eq!(rates.output_ratio(), 2.0);
        assert_eq!(rates.group_ratio(), 0.5);
    }

    #[test]
    fn resolve_unknown_model_is_config_error() {
        let config = PricingConfig::empty();
        let result = Rates::resolve(&config, &config, "nope", "default");
        assert!(matches!(result, Err(QuotaError::UnknownModel { model }) if model == "nope"));
    }

    #[test]
    fn per_token_estimate_floors_and_adds_offset() {
        let rates = Rates::new(Price::tokens("m", 0.75, 1.0), 1.0);
        // 333 * 0.75 = 249.75 -> 249
        assert_eq!(rates.estimate(333, 0), 249);
        assert_eq!(rates.estimate(333, 500), 749);
    }

    #[test]
    fn huge_prompt_estimate_saturates() {
        let rates = Rates::new(Price::tokens("m", 15.0, 30.0), 1.0);
        assert_eq!(rates.estimate(u64::MAX, 500), i64::MAX);
    }

    #[test]
    fn free_model_estimates_zero() {
        let rates = Rates::new(Price::tokens("free", 0.0, 0.0), 1.0);
        assert_eq!(rates.estimate(10_000, 500), 0);
    }

    #[test]
    fn output_only_model_still_reserves_offset() {
        let rates = Rates::new(Price::tokens("m", 0.0, 2.0), 1.0);
        assert_eq!(rates.estimate(10_000, 500), 500);
    }

    #[test]
    fn per_call_estimate_ignores_tokens() {
        let rates = Rates::new(Price::times("img", 0.03), 1.0);
        assert_eq!(rates.estimate(0, 500), 30);
        assert_eq!(rates.estimate(1_000_000, 500), 30);
    }

    #[test]
    fn per_call_cost_ignores_usage() {
        let rates = Rates::new(Price::times("img", 0.03), 1.0);
        assert_eq!(rates.cost(&usage(1, 0)), 30);
        assert_eq!(rates.cost(&usage(5_000, 9_000)), 30);
    }

    #[test]
    fn per_token_cost_rounds_up() {
        let rates = Rates::new(Price::tokens("m", 0.002, 0.002), 1.0);
        // ceil(500 * 0.002 + 200 * 0.002) = ceil(1.4)
        assert_eq!(rates.cost(&usage(500, 200)), 2);
    }

    #[test]
    fn minimum_charge_is_one() {
        let rates = Rates::new(Price::tokens("m", 0.0001, 0.0), 1.0);
        assert_eq!(rates.cost(&usage(1, 0)), 1);

        // A negative group ratio drives the formula below zero; the floor still holds.
        let rates = Rates::new(Price::tokens("m", 1.0, 1.0), -1.0);
        assert_eq!(rates.cost(&usage(10, 10)), 1);
    }

    #[test]
    fn free_input_has_no_minimum_charge() {
        let rates = Rates::new(Price::tokens("m", 0.0, 0.0), 1.0);
        assert_eq!(rates.cost(&usage(100, 100)), 0);
    }

    #[test]
    fn zero_usage_costs_nothing() {
        let rates = Rates::new(Price::tokens("m", 5.0, 5.0), 1.0);
        assert_eq!(rates.cost(&usage(0, 0)), 0);

        let rates = Rates::new(Price::times("img", 20.0), 1.0);
        assert_eq!(rates.cost(&usage(0, 0)), 0);
    }

    #[test]
    fn describe_per_call() {
        let rates = Rates::new(Price::times("dall-e-3", 20.0), 1.0);
        assert_eq!(rates.describe(DOLLAR_RATE), "$0.04/call");
    }

    #[test]
    fn describe_equal_token_rates() {
        let rates = Rates::new(Price::tokens("m", 15.0, 15.0), 2.0);
        assert_eq!(rates.describe(DOLLAR_RATE), "$0.03/1k");
        assert_eq!(
            rates.log_content(DOLLAR_RATE),
            "model rate $0.03/1k, group ratio 2.00"
        );
    }

    #[test]
    fn describe_split_token_rates() {
        let rates = Rates::new(Price::tokens("gpt-4", 15.0, 30.0), 1.0);
        assert_eq!(
            rates.describe(DOLLAR_RATE),
            "$0.03/1k (input) | $0.06/1k (output)"
        );
    }
}
