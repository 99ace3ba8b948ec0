//! Per-request context supplied by the relay's auth and routing layer.

use std::time::Instant;

use relay_quota_core::{ChannelId, TokenId, UserId};

/// Already-authenticated request context.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// The calling user.
    pub user_id: UserId,

    /// The API token the request came in with.
    pub token_id: TokenId,

    /// Label of that token, recorded in the consume log.
    pub token_name: String,

    /// The upstream channel selected for the request.
    pub channel_id: ChannelId,

    /// The caller's pricing group.
    pub group: String,

    /// When the relay received the request.
    pub started_at: Instant,
}

impl RelayContext {
    /// Create a context in the `default` group, started now.
    #[must_use]
    pub fn new(user_id: UserId, token_id: TokenId, channel_id: ChannelId) -> Self {
        Self {
            user_id,
            token_id,
            token_name: String::new(),
            channel_id,
            group: "default".to_string(),
            started_at: Instant::now(),
        }
    }

    /// Set the caller's pricing group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the token label.
    #[must_use]
    pub fn with_token_name(mut self, token_name: impl Into<String>) -> Self {
        self.token_name = token_name.into();
        self
    }

    /// Set the request start time.
    #[must_use]
    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }
}
