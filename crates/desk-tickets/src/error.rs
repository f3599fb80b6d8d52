//! Error taxonomy for ticket operations.

use thiserror::Error;

use crate::{
    ids::{CategoryId, ChannelId},
    record::TicketState,
};

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for platform collaborator calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors raised while reading or writing the ticket record log.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket record for channel {0} already exists")]
    DuplicateChannel(ChannelId),
    #[error("failed to persist ticket records: {0:#}")]
    Persist(anyhow::Error),
    #[error("record store worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reported by the chat platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("platform resource not found: {0}")]
    NotFound(String),
    #[error("platform refused the request: {0}")]
    Forbidden(String),
    #[error("platform request failed: {0}")]
    Request(String),
}

/// Errors returned by lifecycle, archival and recovery operations.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("identity is rate limited for another {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("open ticket quota exceeded ({open} open, cap {cap})")]
    QuotaExceeded { open: usize, cap: usize },
    #[error("category {0} does not exist")]
    CategoryMissing(CategoryId),
    #[error("not permitted to {action}")]
    Forbidden { action: &'static str },
    #[error("ticket {0} is already closed")]
    AlreadyClosed(ChannelId),
    #[error("could not find {0}")]
    NotFound(String),
    #[error("invalid ticket transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TicketState, to: TicketState },
    #[error("ticket storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl TicketError {
    /// True for rejections that are reported back to the triggering identity
    /// rather than logged as infrastructure failures.
    pub fn is_caller_facing(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::QuotaExceeded { .. }
                | Self::CategoryMissing(_)
                | Self::Forbidden { .. }
                | Self::AlreadyClosed(_)
                | Self::NotFound(_)
        )
    }

    /// Short human-readable rejection shown to the triggering identity.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { .. } => {
                "⏰ You're doing that too frequently. Please wait a moment.".to_string()
            }
            Self::QuotaExceeded { open, .. } => format!(
                "❌ You already have {open} open ticket(s)! Please close your existing ticket(s) before creating a new one."
            ),
            Self::CategoryMissing(_) => {
                "❌ Ticket category not found. Please contact an administrator.".to_string()
            }
            Self::Forbidden { action } => format!("❌ You don't have permission to {action}."),
            Self::AlreadyClosed(_) => "❌ This ticket is already closed.".to_string(),
            Self::NotFound(what) => format!("❌ Could not find {what}."),
            Self::Platform(PlatformError::Forbidden(_)) => {
                "❌ I don't have permission to do that in this server.".to_string()
            }
            Self::InvalidTransition { .. }
            | Self::StorageUnavailable(_)
            | Self::DeliveryFailed(_)
            | Self::Platform(_) => {
                "❌ An error occurred while processing your request. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_facing_classification_matches_taxonomy() {
        assert!(TicketError::RateLimited { retry_after_secs: 3 }.is_caller_facing());
        assert!(TicketError::QuotaExceeded { open: 1, cap: 1 }.is_caller_facing());
        assert!(TicketError::AlreadyClosed(ChannelId::new(1)).is_caller_facing());
        assert!(!TicketError::DeliveryFailed("dm refused".into()).is_caller_facing());
        assert!(!TicketError::StorageUnavailable(StoreError::Worker("x".into())).is_caller_facing());
    }

    #[test]
    fn quota_message_reports_open_count() {
        let message = TicketError::QuotaExceeded { open: 2, cap: 2 }.user_message();
        assert!(message.contains("You already have 2 open ticket(s)!"));
    }
}
