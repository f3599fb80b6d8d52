//! Ticket lifecycle: create, transfer, add participants and close.
//!
//! A ticket moves `Open -> Closing -> Closed`. `Closing` lives only in memory
//! and is held under a per-channel lock for the whole close, so a duplicate
//! confirmation waits and then observes `AlreadyClosed`. Creation holds a
//! per-requester lock across the quota count and the append, which keeps the
//! open-ticket cap exact under concurrent requests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{
    config::{TicketConfig, DEFAULT_CLOSE_REASON},
    error::TicketError,
    ids::{CategoryId, ChannelId, MessageId, UserId},
    keyed_locks::KeyedLocks,
    platform::{
        canonical_ticket_grants, participant_grant, Actor, ChannelInfo, ClosureNotice,
        NewTicketChannel, Notice, TicketOpenedNotice, TicketPlatform,
    },
    rate_guard::RateGuard,
    record::{TicketRecord, TicketState, TicketType},
    record_store::RecordStore,
    reporting::TicketStats,
    transcript::{TranscriptArchiver, TranscriptSummary},
};

const MAX_CHANNEL_NAME_CHARS: usize = 100;

/// Outcome of a successful [`TicketLifecycle::create`].
#[derive(Debug, Clone)]
pub struct CreatedTicket {
    pub record: TicketRecord,
    pub channel: ChannelInfo,
    /// Message carrying the close controls, when it could be posted.
    pub controls_message: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct TransferredTicket {
    pub record: TicketRecord,
    pub from_category: Option<String>,
    pub to_category: String,
}

/// Outcome of a successful [`TicketLifecycle::close`].
#[derive(Debug)]
pub struct ClosedTicket {
    pub record: TicketRecord,
    pub notice: ClosureNotice,
    pub transcript: Option<TranscriptSummary>,
    pub requester_notified: bool,
    /// Deletes the channel once the grace delay has passed.
    pub deletion: Option<JoinHandle<()>>,
}

fn lock_closing(closing: &Mutex<HashSet<ChannelId>>) -> MutexGuard<'_, HashSet<ChannelId>> {
    closing.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A close in flight. The channel stays in the closing set for as long as
/// this lives and leaves it on drop, whether the close finished, failed or
/// was cancelled.
struct ClosingTicket<'a> {
    closing: &'a Mutex<HashSet<ChannelId>>,
    channel_id: ChannelId,
    state: TicketState,
}

impl<'a> ClosingTicket<'a> {
    fn begin(
        closing: &'a Mutex<HashSet<ChannelId>>,
        channel_id: ChannelId,
        current: TicketState,
    ) -> Result<Self, TicketError> {
        current.ensure_transition(TicketState::Closing, channel_id)?;
        lock_closing(closing).insert(channel_id);
        Ok(Self {
            closing,
            channel_id,
            state: TicketState::Closing,
        })
    }

    fn advance(&mut self, next: TicketState) -> Result<(), TicketError> {
        self.state.ensure_transition(next, self.channel_id)?;
        self.state = next;
        Ok(())
    }
}

impl Drop for ClosingTicket<'_> {
    fn drop(&mut self) {
        lock_closing(self.closing).remove(&self.channel_id);
    }
}

/// Builds `ticket-<type>-<name>` using only characters valid in channel names.
pub fn ticket_channel_name(ticket_type: TicketType, display_name: &str, user_id: UserId) -> String {
    let mut slug = String::new();
    for ch in display_name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if (ch == '-' || ch.is_whitespace()) && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() {
        user_id.to_string()
    } else {
        slug.to_string()
    };
    format!("ticket-{}-{slug}", ticket_type.as_str())
        .chars()
        .take(MAX_CHANNEL_NAME_CHARS)
        .collect()
}

pub struct TicketLifecycle {
    config: Arc<TicketConfig>,
    store: Arc<dyn RecordStore>,
    platform: Arc<dyn TicketPlatform>,
    rate_guard: RateGuard,
    archiver: TranscriptArchiver,
    channel_locks: KeyedLocks<ChannelId>,
    requester_locks: KeyedLocks<UserId>,
    closing: Mutex<HashSet<ChannelId>>,
}

impl TicketLifecycle {
    pub fn new(
        config: Arc<TicketConfig>,
        store: Arc<dyn RecordStore>,
        platform: Arc<dyn TicketPlatform>,
    ) -> Self {
        let archiver = TranscriptArchiver::new(Arc::clone(&platform), config.archive_channel_id);
        Self {
            rate_guard: RateGuard::new(config.cooldown),
            config,
            store,
            platform,
            archiver,
            channel_locks: KeyedLocks::new(),
            requester_locks: KeyedLocks::new(),
            closing: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &TicketConfig {
        &self.config
    }

    pub fn rate_guard(&self) -> &RateGuard {
        &self.rate_guard
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn platform(&self) -> &Arc<dyn TicketPlatform> {
        &self.platform
    }

    pub async fn find_record(&self, channel_id: ChannelId) -> Option<TicketRecord> {
        self.store.find(channel_id).await
    }

    pub async fn open_ticket_count(&self, user_id: UserId) -> usize {
        self.store
            .load()
            .await
            .iter()
            .filter(|record| record.user_id == user_id && record.is_open())
            .count()
    }

    /// Live state of a ticket, or `None` when no record exists.
    pub async fn ticket_state(&self, channel_id: ChannelId) -> Option<TicketState> {
        let record = self.find_record(channel_id).await?;
        Some(self.state_of(&record))
    }

    pub async fn stats(&self) -> TicketStats {
        TicketStats::from_records(&self.store.load().await)
    }

    fn state_of(&self, record: &TicketRecord) -> TicketState {
        if lock_closing(&self.closing).contains(&record.channel_id) {
            TicketState::Closing
        } else {
            record.status.into()
        }
    }

    fn rate_check(&self, user_id: UserId) -> Result<(), TicketError> {
        match self.rate_guard.remaining(user_id) {
            Some(remaining) => Err(TicketError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            }),
            None => Ok(()),
        }
    }

    async fn require_record(&self, channel_id: ChannelId) -> Result<TicketRecord, TicketError> {
        self.find_record(channel_id)
            .await
            .ok_or_else(|| TicketError::NotFound(format!("a ticket for channel {channel_id}")))
    }

    async fn require_open_record(&self, channel_id: ChannelId) -> Result<TicketRecord, TicketError> {
        let record = self.require_record(channel_id).await?;
        if self.state_of(&record) != TicketState::Open {
            return Err(TicketError::AlreadyClosed(channel_id));
        }
        Ok(record)
    }

    async fn require_category(&self, category_id: CategoryId) -> Result<String, TicketError> {
        self.platform
            .resolve_category(category_id)
            .await?
            .map(|category| category.name)
            .ok_or(TicketError::CategoryMissing(category_id))
    }

    /// Opens a new ticket of `ticket_type` for `actor`.
    pub async fn create(&self, actor: &Actor, ticket_type: TicketType) -> Result<CreatedTicket, TicketError> {
        if let Err(remaining) = self.rate_guard.try_acquire(actor.user_id) {
            return Err(TicketError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        let _requester_lock = self.requester_locks.acquire(actor.user_id).await;
        if !self.config.is_exempt_from_quota(actor) {
            let open = self.open_ticket_count(actor.user_id).await;
            let cap = self.config.max_tickets_per_user;
            if open >= cap {
                return Err(TicketError::QuotaExceeded { open, cap });
            }
        }

        let category_id = self.config.category_for(ticket_type);
        self.require_category(category_id).await?;

        let channel = self
            .platform
            .create_ticket_channel(NewTicketChannel {
                name: ticket_channel_name(ticket_type, &actor.display_name, actor.user_id),
                topic: actor.user_id.to_string(),
                category_id,
                grants: canonical_ticket_grants(actor.user_id, self.config.staff_role_id),
            })
            .await?;

        let record = TicketRecord::open(channel.id, actor.user_id, category_id, ticket_type, Utc::now());
        if let Err(error) = self.store.append(record.clone()).await {
            tracing::error!(
                channel_id = %channel.id,
                user_id = %actor.user_id,
                %error,
                "failed to save ticket; removing its channel"
            );
            if let Err(cleanup) = self
                .platform
                .delete_channel(channel.id, "Ticket could not be saved")
                .await
            {
                tracing::warn!(channel_id = %channel.id, error = %cleanup, "failed to remove unsaved ticket channel");
            }
            return Err(TicketError::StorageUnavailable(error));
        }

        let opened = Notice::TicketOpened(TicketOpenedNotice {
            channel_id: channel.id,
            requester: actor.user_id,
            ticket_type,
            created_at: record.created_at,
        });
        let controls_message = match self.platform.send_notice(channel.id, &opened).await {
            Ok(message_id) => Some(message_id),
            Err(error) => {
                tracing::warn!(channel_id = %channel.id, %error, "failed to post ticket controls");
                None
            }
        };

        tracing::info!(
            channel_id = %channel.id,
            user_id = %actor.user_id,
            user = %actor.display_name,
            %ticket_type,
            "created ticket"
        );
        Ok(CreatedTicket {
            record,
            channel,
            controls_message,
        })
    }

    /// Checks whether `actor` may start closing the ticket, without changing
    /// anything. Used before showing the confirmation or reason form.
    pub async fn authorize_close(&self, channel_id: ChannelId, actor: &Actor) -> Result<TicketRecord, TicketError> {
        let record = self.require_record(channel_id).await?;
        self.ensure_can_close(&record, actor)?;
        self.rate_check(actor.user_id)?;
        if self.state_of(&record) != TicketState::Open {
            return Err(TicketError::AlreadyClosed(channel_id));
        }
        Ok(record)
    }

    fn ensure_can_close(&self, record: &TicketRecord, actor: &Actor) -> Result<(), TicketError> {
        if record.user_id == actor.user_id || self.config.is_staff(actor) {
            Ok(())
        } else {
            Err(TicketError::Forbidden {
                action: "close this ticket",
            })
        }
    }

    /// Moves an open ticket to `target_category`.
    pub async fn transfer(&self, channel_id: ChannelId, target_category: CategoryId) -> Result<TransferredTicket, TicketError> {
        let _channel_lock = self.channel_locks.acquire(channel_id).await;
        let record = self.require_open_record(channel_id).await?;
        let to_category = self.require_category(target_category).await?;
        let from_category = self
            .platform
            .resolve_category(record.category_id)
            .await
            .ok()
            .flatten()
            .map(|category| category.name);

        self.platform.move_channel(channel_id, target_category).await?;
        self.store
            .update(
                channel_id,
                Box::new(move |record| record.category_id = target_category),
            )
            .await?;

        let notice = Notice::Transferred {
            from_category: from_category.clone(),
            to_category: to_category.clone(),
        };
        if let Err(error) = self.platform.send_notice(channel_id, &notice).await {
            tracing::warn!(%channel_id, %error, "failed to announce ticket transfer");
        }
        tracing::info!(%channel_id, category_id = %target_category, "transferred ticket");

        let mut record = record;
        record.category_id = target_category;
        Ok(TransferredTicket {
            record,
            from_category,
            to_category,
        })
    }

    /// Grants another member access to an open ticket.
    pub async fn add_participant(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), TicketError> {
        let _channel_lock = self.channel_locks.acquire(channel_id).await;
        self.require_open_record(channel_id).await?;
        if self.platform.resolve_member(user_id).await?.is_none() {
            return Err(TicketError::NotFound(format!("member {user_id}")));
        }
        self.platform
            .upsert_channel_grant(channel_id, participant_grant(user_id))
            .await?;
        if let Err(error) = self
            .platform
            .send_notice(channel_id, &Notice::ParticipantAdded { user_id })
            .await
        {
            tracing::warn!(%channel_id, %error, "failed to announce added participant");
        }
        tracing::info!(%channel_id, %user_id, "added participant to ticket");
        Ok(())
    }

    /// Closes a ticket: archive, notify the requester, persist, then delete
    /// the channel after the grace delay.
    pub async fn close(
        &self,
        channel_id: ChannelId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ClosedTicket, TicketError> {
        let record = self.require_record(channel_id).await?;
        self.ensure_can_close(&record, actor)?;
        self.rate_check(actor.user_id)?;

        let _channel_lock = self.channel_locks.acquire(channel_id).await;
        // Re-read under the lock: a concurrent close may have finished.
        let record = self.require_record(channel_id).await?;
        let mut ticket = ClosingTicket::begin(&self.closing, channel_id, self.state_of(&record))?;

        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_CLOSE_REASON)
            .to_string();
        self.finish_close(&mut ticket, record, actor, reason).await
    }

    async fn finish_close(
        &self,
        ticket: &mut ClosingTicket<'_>,
        record: TicketRecord,
        actor: &Actor,
        reason: String,
    ) -> Result<ClosedTicket, TicketError> {
        let channel_id = record.channel_id;
        // A failed lookup aborts the close so it can be retried; only a
        // channel that is really gone is closed without deletion.
        let channel = match self.platform.resolve_channel(channel_id).await {
            Ok(channel) => channel,
            Err(error) => {
                tracing::warn!(%channel_id, %error, "could not resolve ticket channel; close aborted");
                ticket.advance(TicketState::Open)?;
                return Err(error.into());
            }
        };

        let transcript = match &channel {
            Some(channel) => match self.archiver.archive(channel).await {
                Ok(summary) => Some(summary),
                Err(error) => {
                    tracing::error!(%channel_id, %error, "error generating transcript");
                    None
                }
            },
            None => {
                tracing::warn!(%channel_id, "ticket channel is gone; skipping transcript");
                None
            }
        };

        let category_name = self
            .platform
            .resolve_category(
                channel
                    .as_ref()
                    .and_then(|channel| channel.category_id)
                    .unwrap_or(record.category_id),
            )
            .await
            .ok()
            .flatten()
            .map(|category| category.name);

        let requester = match self.platform.resolve_member(record.user_id).await {
            Ok(member) => member,
            Err(error) => {
                tracing::warn!(user_id = %record.user_id, %error, "could not resolve ticket requester");
                None
            }
        };

        let notice = ClosureNotice {
            channel_id,
            opened_by: requester.as_ref().map(|member| member.user_id),
            closed_by: actor.user_id,
            created_at: channel
                .as_ref()
                .map(|channel| channel.created_at)
                .unwrap_or(record.created_at),
            category_name,
            reason,
        };

        let requester_notified = match &requester {
            Some(member) => match self
                .platform
                .send_direct_notice(member.user_id, &Notice::TicketClosed(notice.clone()))
                .await
            {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(user_id = %member.user_id, %error, "could not send closure notice");
                    false
                }
            },
            None => false,
        };

        let closed_at = Utc::now();
        match self
            .store
            .update(channel_id, Box::new(move |record| record.mark_closed(closed_at)))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%channel_id, "ticket record disappeared while closing");
            }
            Err(error) => {
                ticket.advance(TicketState::Open)?;
                tracing::error!(%channel_id, %error, "failed to mark ticket closed; keeping channel");
                return Err(TicketError::StorageUnavailable(error));
            }
        }
        ticket.advance(TicketState::Closed)?;

        let deletion = channel.map(|channel| {
            let platform = Arc::clone(&self.platform);
            let delay = self.config.close_grace_delay;
            let audit_reason = format!("Ticket closed by {}", actor.display_name);
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Err(error) = platform.delete_channel(channel.id, &audit_reason).await {
                    tracing::warn!(channel_id = %channel.id, %error, "failed to delete closed ticket channel");
                }
            })
        });

        tracing::info!(%channel_id, closed_by = %actor.user_id, "closed ticket");
        let mut record = record;
        record.mark_closed(closed_at);
        Ok(ClosedTicket {
            record,
            notice,
            transcript,
            requester_notified,
            deletion,
        })
    }
}
