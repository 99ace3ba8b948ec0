//! Core types and utilities for relay quota metering.
//!
//! This crate provides the foundational types used by the quota engine:
//!
//! - **Identifiers**: `UserId`, `TokenId`, `ChannelId`, `ConsumeLogId`
//! - **Pricing**: `Price`, `PriceType`, `PricingConfig`, `PriceLookup`, `GroupRatioLookup`
//! - **Rates**: `Rates` (effective ratios, estimation and settlement cost)
//! - **Usage**: `Usage`, `ConsumeLog`
//!
//! # Quota Unit
//!
//! Quota is an integer counter. A model ratio of `1.0` charges one quota unit per
//! token; multiplying a ratio by [`DOLLAR_RATE`] gives its display price in dollars
//! per 1k tokens.
//!
//! - Stored as `i64` to avoid floating point drift in balances
//! - Ratios are `f64` and only meet integers at estimation and settlement time

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod pricing;
pub mod rates;
pub mod usage;

pub use error::{QuotaError, Result};
pub use ids::{ChannelId, ConsumeLogId, IdError, TokenId, UserId};
pub use pricing::{
    GroupRatioLookup, Price, PriceLookup, PriceType, PricingConfig, DEFAULT_GROUP_RATIO,
    DOLLAR_RATE,
};
pub use rates::{Rates, PER_CALL_UNITS};
pub use usage::{ConsumeLog, Usage};
