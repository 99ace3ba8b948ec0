//! Quota reservation and settlement for a multi-provider AI API relay.
//!
//! This crate decides, per request, whether a caller may proceed and what it
//! finally pays:
//!
//! - **Reserve** (`QuotaEngine::reserve`): estimate the cost, check the cached
//!   balance, provisionally deduct it, and pre-consume against the ledger unless
//!   the caller is trusted (balance far above the estimate).
//! - **Consume** (`Quota::consume`): once usage is known, compute the true cost and
//!   apply `cost - reserved` to the ledger in a detached task, then refresh the
//!   cached balance and record the consume log.
//! - **Undo** (`Quota::undo`): if the request failed, refund exactly what was
//!   pre-consumed, again in a detached task.
//!
//! `consume` and `undo` take the `Quota` by value, so a reservation settles or
//! rolls back at most once.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> relay_quota_core::Result<()> {
//! use std::sync::Arc;
//! use relay_quota::{QuotaConfig, QuotaEngine, RelayContext};
//! use relay_quota_core::{ChannelId, PricingConfig, TokenId, Usage, UserId};
//! use relay_quota_store::{MemoryCache, MemoryLedger};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let cache = Arc::new(MemoryCache::new(ledger.clone()));
//! let engine = QuotaEngine::with_pricing(
//!     PricingConfig::default(),
//!     cache,
//!     ledger,
//!     QuotaConfig::from_env(),
//! );
//!
//! let ctx = RelayContext::new(UserId::new(1), TokenId::new(7), ChannelId::new(3));
//! let quota = engine.reserve(&ctx, "gpt-4o", 1200).await?;
//!
//! // ... call the upstream provider ...
//!
//! quota.consume(&engine, Usage::new(1200, 350));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod engine;
pub mod quota;

pub use config::QuotaConfig;
pub use context::RelayContext;
pub use engine::{QuotaEngine, Settlement};
pub use quota::Quota;
