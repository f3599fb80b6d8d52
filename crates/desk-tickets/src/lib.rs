//! Ticket lifecycle and session recovery for Desk.
//!
//! Owns the durable ticket record log, the interaction rate guard, the
//! open/closing/closed state machine, transcript archival and startup
//! reconciliation. The chat platform is reached only through
//! [`TicketPlatform`].

pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake_platform;
pub mod ids;
pub mod keyed_locks;
pub mod lifecycle;
pub mod platform;
pub mod rate_guard;
pub mod record;
pub mod record_store;
pub mod recovery;
pub mod reporting;
pub mod transcript;

pub use config::TicketConfig;
pub use error::{PlatformError, PlatformResult, StoreError, StoreResult, TicketError};
pub use ids::{CategoryId, ChannelId, MessageId, RoleId, UserId};
pub use lifecycle::{
    ticket_channel_name, ClosedTicket, CreatedTicket, TicketLifecycle, TransferredTicket,
};
pub use platform::{
    Actor, ControlSet, HistoryMessage, Notice, NoticeMarker, TicketPlatform,
};
pub use rate_guard::RateGuard;
pub use record::{TicketRecord, TicketState, TicketStatus, TicketType};
pub use record_store::{
    parse_record_log, InMemoryRecordStore, JsonFileRecordStore, RecordStore, DEFAULT_RECORD_FILE,
};
pub use recovery::{RecoveryReconciler, RecoveryReport};
pub use reporting::TicketStats;
pub use transcript::{TranscriptArchiver, TranscriptSummary};
