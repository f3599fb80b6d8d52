//! Boundary with the chat platform.
//!
//! The core never talks to a concrete chat API. It asks a [`TicketPlatform`]
//! to resolve identities, manage channels and deliver [`Notice`] values; the
//! runtime crate decides how a notice looks on screen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::PlatformResult,
    ids::{CategoryId, ChannelId, MessageId, RoleId, UserId},
    record::TicketType,
    reporting::TicketStats,
    transcript::TranscriptSummary,
};

/// Identity claims of whoever triggered an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

impl Actor {
    pub fn new(user_id: UserId, display_name: impl Into<String>, roles: Vec<RoleId>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantTarget {
    Everyone,
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelAccess {
    View,
    Send,
    ReadHistory,
}

/// A single permission overwrite on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub target: GrantTarget,
    pub allow: Vec<ChannelAccess>,
    pub deny: Vec<ChannelAccess>,
}

impl AccessGrant {
    pub fn allow(target: GrantTarget, allow: &[ChannelAccess]) -> Self {
        Self {
            target,
            allow: allow.to_vec(),
            deny: Vec::new(),
        }
    }

    pub fn deny(target: GrantTarget, deny: &[ChannelAccess]) -> Self {
        Self {
            target,
            allow: Vec::new(),
            deny: deny.to_vec(),
        }
    }
}

const PARTICIPANT_ACCESS: [ChannelAccess; 3] = [
    ChannelAccess::View,
    ChannelAccess::Send,
    ChannelAccess::ReadHistory,
];

/// Overwrite set of an open ticket: hidden from everyone except the requester
/// and the staff role.
pub fn canonical_ticket_grants(requester: UserId, staff_role: RoleId) -> Vec<AccessGrant> {
    vec![
        AccessGrant::deny(GrantTarget::Everyone, &[ChannelAccess::View]),
        AccessGrant::allow(GrantTarget::Member(requester), &PARTICIPANT_ACCESS),
        AccessGrant::allow(GrantTarget::Role(staff_role), &PARTICIPANT_ACCESS),
    ]
}

/// Overwrite added when staff invite another member into a ticket.
pub fn participant_grant(user_id: UserId) -> AccessGrant {
    AccessGrant::allow(
        GrantTarget::Member(user_id),
        &[ChannelAccess::View, ChannelAccess::Send],
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicketChannel {
    pub name: String,
    /// Carries the requester id so staff can see who opened the ticket.
    pub topic: String,
    pub category_id: CategoryId,
    pub grants: Vec<AccessGrant>,
}

/// Stable tag carried by self-authored messages that hold interactive controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeMarker {
    TicketControls,
    IntakePanel,
}

impl NoticeMarker {
    pub const ALL: [NoticeMarker; 2] = [NoticeMarker::TicketControls, NoticeMarker::IntakePanel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketControls => "desk:ticket-controls",
            Self::IntakePanel => "desk:intake-panel",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|marker| marker.as_str() == raw.trim())
    }

    /// Controls that belong on a message carrying this marker.
    pub fn controls(self) -> ControlSet {
        match self {
            Self::TicketControls => ControlSet::TicketActions,
            Self::IntakePanel => ControlSet::TicketTypeSelect,
        }
    }
}

/// Interactive affordances the presentation layer attaches to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSet {
    /// Close and close-with-reason buttons.
    TicketActions,
    /// Ticket-type selection menu.
    TicketTypeSelect,
}

/// One message of a channel history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_name: String,
    /// Authored by this bot.
    pub from_self: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub has_embeds: bool,
    pub attachments: Vec<String>,
    pub marker: Option<NoticeMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketOpenedNotice {
    pub channel_id: ChannelId,
    pub requester: UserId,
    pub ticket_type: TicketType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureNotice {
    pub channel_id: ChannelId,
    /// `None` when the requester could no longer be resolved.
    pub opened_by: Option<UserId>,
    pub closed_by: UserId,
    pub created_at: DateTime<Utc>,
    pub category_name: Option<String>,
    pub reason: String,
}

/// Content the core asks the platform to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TicketOpened(TicketOpenedNotice),
    TicketClosed(ClosureNotice),
    Transcript(TranscriptSummary),
    Transferred {
        from_category: Option<String>,
        to_category: String,
    },
    ParticipantAdded {
        user_id: UserId,
    },
    IntakePanel,
    Stats(TicketStats),
}

impl Notice {
    pub fn marker(&self) -> Option<NoticeMarker> {
        match self {
            Self::TicketOpened(_) => Some(NoticeMarker::TicketControls),
            Self::IntakePanel => Some(NoticeMarker::IntakePanel),
            _ => None,
        }
    }
}

/// Text artifact uploaded alongside a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFile {
    pub file_name: String,
    pub content: String,
}

/// Chat platform operations the ticket core depends on.
#[async_trait]
pub trait TicketPlatform: Send + Sync {
    async fn resolve_category(&self, category_id: CategoryId)
        -> PlatformResult<Option<CategoryInfo>>;
    async fn resolve_channel(&self, channel_id: ChannelId) -> PlatformResult<Option<ChannelInfo>>;
    async fn resolve_member(&self, user_id: UserId) -> PlatformResult<Option<MemberInfo>>;

    async fn create_ticket_channel(&self, request: NewTicketChannel) -> PlatformResult<ChannelInfo>;
    /// Replaces the channel's whole overwrite set with `grants`.
    async fn replace_channel_grants(
        &self,
        channel_id: ChannelId,
        grants: &[AccessGrant],
    ) -> PlatformResult<()>;
    /// Adds or replaces a single overwrite, leaving the others untouched.
    async fn upsert_channel_grant(
        &self,
        channel_id: ChannelId,
        grant: AccessGrant,
    ) -> PlatformResult<()>;
    async fn move_channel(&self, channel_id: ChannelId, category_id: CategoryId)
        -> PlatformResult<()>;
    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> PlatformResult<()>;

    async fn send_notice(&self, channel_id: ChannelId, notice: &Notice) -> PlatformResult<MessageId>;
    async fn send_notice_with_file(
        &self,
        channel_id: ChannelId,
        notice: &Notice,
        file: TranscriptFile,
    ) -> PlatformResult<MessageId>;
    /// Direct delivery to a user. Users may refuse direct messages.
    async fn send_direct_notice(&self, user_id: UserId, notice: &Notice) -> PlatformResult<()>;
    /// Re-registers interactive controls on an existing message.
    async fn attach_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        controls: ControlSet,
    ) -> PlatformResult<()>;

    /// Every message of the channel, oldest first.
    async fn fetch_all_history(&self, channel_id: ChannelId)
        -> PlatformResult<Vec<HistoryMessage>>;
    /// The `limit` most recent messages of the channel, oldest first.
    async fn fetch_recent_history(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>>;
}
