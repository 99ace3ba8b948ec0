//! Per-request quota reservation.

use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

use relay_quota_core::{ChannelId, Rates, TokenId, Usage, UserId};

use crate::engine::QuotaEngine;

/// A quota reservation for one in-flight request.
///
/// Created by [`QuotaEngine::reserve`]. Finish it with exactly one of
/// [`Quota::consume`] (the request succeeded) or [`Quota::undo`] (it failed).
#[derive(Debug)]
#[must_use = "a reservation must be consumed or undone"]
pub struct Quota {
    pub(crate) model_name: String,
    pub(crate) prompt_tokens: u64,
    pub(crate) rates: Rates,
    pub(crate) pre_consumed_quota: i64,
    pub(crate) user_id: UserId,
    pub(crate) channel_id: ChannelId,
    pub(crate) token_id: TokenId,
    pub(crate) token_name: String,
    pub(crate) started_at: Instant,
    pub(crate) reserved: bool,
    pub(crate) span: Span,
}

impl Quota {
    /// Requested model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Prompt tokens counted before the upstream call.
    #[must_use]
    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    /// Resolved rates.
    #[must_use]
    pub fn rates(&self) -> &Rates {
        &self.rates
    }

    /// Effective input ratio (`price.input * group_ratio`).
    #[must_use]
    pub fn input_ratio(&self) -> f64 {
        self.rates.input_ratio()
    }

    /// Caller group ratio.
    #[must_use]
    pub fn group_ratio(&self) -> f64 {
        self.rates.group_ratio()
    }

    /// Amount settlement will net against. Zero for trusted callers.
    #[must_use]
    pub fn pre_consumed_quota(&self) -> i64 {
        self.pre_consumed_quota
    }

    /// Whether the ledger holds a pre-consumed amount for this request.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    /// The charged user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The token the ledger reservation was made against.
    #[must_use]
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// The serving channel.
    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Settle the request in a detached task.
    ///
    /// The caller does not need to await the handle; settlement failures are
    /// logged, never returned.
    pub fn consume(self, engine: &QuotaEngine, usage: Usage) -> JoinHandle<()> {
        let engine = engine.clone();
        let span = self.span.clone();

        tokio::spawn(
            async move {
                if let Err(e) = engine.settle(&self, usage).await {
                    tracing::error!(error = %e, code = e.code(), "Failed to settle quota");
                }
            }
            .instrument(span),
        )
    }

    /// Release the reservation in a detached task.
    ///
    /// Returns `None` when there is nothing to release.
    pub fn undo(self, engine: &QuotaEngine) -> Option<JoinHandle<()>> {
        if !self.reserved && !engine.config().refresh_cache_on_undo {
            return None;
        }

        let engine = engine.clone();
        let span = self.span.clone();

        Some(tokio::spawn(
            async move {
                if let Err(e) = engine.rollback(&self).await {
                    tracing::error!(
                        amount = self.pre_consumed_quota,
                        error = %e,
                        "Failed to return pre-consumed quota"
                    );
                }
            }
            .instrument(span),
        ))
    }
}
