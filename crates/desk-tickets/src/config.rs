//! Validated settings consumed by the ticket core.

use std::time::Duration;

use crate::{
    ids::{CategoryId, ChannelId, RoleId},
    platform::Actor,
    record::TicketType,
};

pub const DEFAULT_RATE_LIMIT_SECONDS: u64 = 10;
pub const DEFAULT_MAX_TICKETS_PER_USER: usize = 1;
pub const DEFAULT_CLOSE_GRACE_DELAY_MS: u64 = 5_000;
pub const DEFAULT_RECOVERY_HISTORY_WINDOW: usize = 50;
pub const DEFAULT_CLOSE_REASON: &str = "No reason specified";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Role, channel and category identities plus the tunables of the ticket core.
pub struct TicketConfig {
    pub staff_role_id: RoleId,
    pub unlimited_tickets_role_id: Option<RoleId>,
    /// Channel hosting the intake panel (ticket-type selection).
    pub intake_channel_id: ChannelId,
    /// Destination for transcripts of closed tickets.
    pub archive_channel_id: ChannelId,
    pub support_category_id: CategoryId,
    pub partnership_category_id: CategoryId,
    pub transfer_category_id: CategoryId,
    pub cooldown: Duration,
    pub max_tickets_per_user: usize,
    /// Cosmetic pause between closing a ticket and deleting its channel.
    pub close_grace_delay: Duration,
    pub recovery_history_window: usize,
}

impl TicketConfig {
    pub fn category_for(&self, ticket_type: TicketType) -> CategoryId {
        match ticket_type {
            TicketType::Support => self.support_category_id,
            TicketType::Partnership => self.partnership_category_id,
        }
    }

    pub fn is_staff(&self, actor: &Actor) -> bool {
        actor.has_role(self.staff_role_id)
    }

    pub fn is_exempt_from_quota(&self, actor: &Actor) -> bool {
        self.unlimited_tickets_role_id
            .is_some_and(|role| actor.has_role(role))
    }

    pub fn validate(&self) -> Result<(), String> {
        let ids = [
            ("staff_role_id", self.staff_role_id.get()),
            ("ticket_channel_id", self.intake_channel_id.get()),
            ("transcripts_channel_id", self.archive_channel_id.get()),
            ("categories.support", self.support_category_id.get()),
            ("categories.partnership", self.partnership_category_id.get()),
            ("categories.transfer", self.transfer_category_id.get()),
        ];
        if let Some((name, _)) = ids.iter().find(|(_, id)| *id == 0) {
            return Err(format!("{name} must be a non-zero id"));
        }
        if self.unlimited_tickets_role_id.is_some_and(|role| role.get() == 0) {
            return Err("unlimited_tickets_role_id must be a non-zero id".to_string());
        }
        if self.max_tickets_per_user == 0 {
            return Err("max_tickets_per_user must be greater than 0".to_string());
        }
        if self.recovery_history_window == 0 {
            return Err("recovery_history_window must be greater than 0".to_string());
        }
        if self.intake_channel_id == self.archive_channel_id {
            return Err("ticket channel and transcripts channel must differ".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> TicketConfig {
    TicketConfig {
        staff_role_id: RoleId::new(500),
        unlimited_tickets_role_id: Some(RoleId::new(501)),
        intake_channel_id: ChannelId::new(600),
        archive_channel_id: ChannelId::new(601),
        support_category_id: CategoryId::new(700),
        partnership_category_id: CategoryId::new(701),
        transfer_category_id: CategoryId::new(702),
        cooldown: Duration::ZERO,
        max_tickets_per_user: DEFAULT_MAX_TICKETS_PER_USER,
        close_grace_delay: Duration::ZERO,
        recovery_history_window: DEFAULT_RECOVERY_HISTORY_WINDOW,
    }
}
