//! Usage types for relay quota metering.
//!
//! This module defines the token usage an upstream provider reports and the
//! consume-log record appended for every settled request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChannelId, ConsumeLogId, UserId};

/// Token usage reported by the upstream provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt (input) tokens.
    pub prompt_tokens: u64,

    /// Completion (output) tokens.
    pub completion_tokens: u64,
}

impl Usage {
    /// Create a usage record.
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Prompt plus completion tokens.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A consume-log record, appended once per settled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeLog {
    /// Unique log ID (ULID for time-ordering).
    pub id: ConsumeLogId,

    /// The user that was charged.
    pub user_id: UserId,

    /// The upstream channel that served the request.
    pub channel_id: ChannelId,

    /// Prompt tokens billed.
    pub prompt_tokens: u64,

    /// Completion tokens billed.
    pub completion_tokens: u64,

    /// Model name as requested.
    pub model_name: String,

    /// Label of the API token used.
    pub token_name: String,

    /// Quota charged.
    pub quota: i64,

    /// Human-readable rate description.
    pub content: String,

    /// Milliseconds between request start and settlement.
    pub elapsed_ms: u64,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}
