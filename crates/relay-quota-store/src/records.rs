//! Ledger record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_quota_core::{ChannelId, TokenId, UserId};

/// Authoritative quota and usage aggregates of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuota {
    /// The user ID.
    pub user_id: UserId,

    /// Remaining quota.
    pub quota: i64,

    /// Lifetime quota charged.
    pub used_quota: i64,

    /// Lifetime settled requests.
    pub request_count: i64,
}

impl UserQuota {
    /// Create a user with a starting quota and no usage.
    #[must_use]
    pub const fn new(user_id: UserId, quota: i64) -> Self {
        Self {
            user_id,
            quota,
            used_quota: 0,
            request_count: 0,
        }
    }
}

/// Quota counters of an API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenQuota {
    /// The token ID.
    pub token_id: TokenId,

    /// Owner of the token.
    pub user_id: UserId,

    /// Token label shown in consume logs.
    pub name: String,

    /// Remaining quota (ignored when `unlimited_quota`).
    pub remain_quota: i64,

    /// Lifetime quota charged through this token.
    pub used_quota: i64,

    /// Unlimited tokens only debit their owner.
    pub unlimited_quota: bool,

    /// Last time the token was charged.
    pub accessed_at: Option<DateTime<Utc>>,
}

impl TokenQuota {
    /// Create a token with a fixed remaining quota.
    #[must_use]
    pub fn limited(
        token_id: TokenId,
        user_id: UserId,
        name: impl Into<String>,
        remain_quota: i64,
    ) -> Self {
        Self {
            token_id,
            user_id,
            name: name.into(),
            remain_quota,
            used_quota: 0,
            unlimited_quota: false,
            accessed_at: None,
        }
    }

    /// Create a token bounded only by its owner's quota.
    #[must_use]
    pub fn unlimited(token_id: TokenId, user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            unlimited_quota: true,
            ..Self::limited(token_id, user_id, name, 0)
        }
    }

    /// Apply a signed charge to the token's counters.
    ///
    /// Unlimited tokens keep `remain_quota` untouched.
    pub fn charge(&mut self, delta: i64) {
        if !self.unlimited_quota {
            self.remain_quota -= delta;
        }
        self.used_quota += delta;
        self.accessed_at = Some(Utc::now());
    }
}

/// Usage aggregate of an upstream channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUsage {
    /// The channel ID.
    pub channel_id: ChannelId,

    /// Lifetime quota charged through this channel.
    pub used_quota: i64,
}
