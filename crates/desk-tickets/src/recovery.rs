//! Startup reconciliation of open tickets against the live platform.
//!
//! Runs once before the gateway connects. Every open record whose channel,
//! requester and category still resolve gets its canonical grants rewritten
//! and its close controls re-attached to the existing marker message. Stale
//! records are skipped and left open.

use std::sync::Arc;

use crate::{
    config::TicketConfig,
    error::TicketError,
    ids::{ChannelId, MessageId},
    platform::{canonical_ticket_grants, NoticeMarker, TicketPlatform},
    record::TicketRecord,
    record_store::RecordStore,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Open records examined.
    pub examined: usize,
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub controls_reattached: usize,
    pub intake_restored: bool,
}

enum TicketOutcome {
    Restored { controls_reattached: bool },
    Skipped,
}

pub struct RecoveryReconciler {
    config: Arc<TicketConfig>,
    store: Arc<dyn RecordStore>,
    platform: Arc<dyn TicketPlatform>,
}

impl RecoveryReconciler {
    pub fn new(
        config: Arc<TicketConfig>,
        store: Arc<dyn RecordStore>,
        platform: Arc<dyn TicketPlatform>,
    ) -> Self {
        Self {
            config,
            store,
            platform,
        }
    }

    pub async fn run(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let open_records = self
            .store
            .load()
            .await
            .into_iter()
            .filter(TicketRecord::is_open)
            .collect::<Vec<_>>();

        for record in &open_records {
            report.examined += 1;
            match self.restore_ticket(record).await {
                Ok(TicketOutcome::Restored {
                    controls_reattached,
                }) => {
                    report.restored += 1;
                    if controls_reattached {
                        report.controls_reattached += 1;
                    }
                }
                Ok(TicketOutcome::Skipped) => report.skipped += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::error!(channel_id = %record.channel_id, %error, "failed to restore ticket");
                }
            }
        }

        report.intake_restored = match self.restore_intake_panel().await {
            Ok(restored) => restored,
            Err(error) => {
                tracing::warn!(channel_id = %self.config.intake_channel_id, %error, "failed to restore intake panel");
                false
            }
        };

        tracing::info!(
            examined = report.examined,
            restored = report.restored,
            skipped = report.skipped,
            failed = report.failed,
            controls = report.controls_reattached,
            intake = report.intake_restored,
            "restored ticket interactions"
        );
        report
    }

    async fn restore_ticket(&self, record: &TicketRecord) -> Result<TicketOutcome, TicketError> {
        let channel_id = record.channel_id;
        let Some(channel) = self.platform.resolve_channel(channel_id).await? else {
            tracing::warn!(%channel_id, "ticket channel no longer exists; skipping");
            return Ok(TicketOutcome::Skipped);
        };
        let category_id = record.category_id;
        if self.platform.resolve_category(category_id).await?.is_none() {
            tracing::warn!(%channel_id, %category_id, "ticket category no longer exists; skipping");
            return Ok(TicketOutcome::Skipped);
        }
        if self.platform.resolve_member(record.user_id).await?.is_none() {
            tracing::warn!(%channel_id, user_id = %record.user_id, "ticket requester left; skipping");
            return Ok(TicketOutcome::Skipped);
        }

        let grants = canonical_ticket_grants(record.user_id, self.config.staff_role_id);
        self.platform.replace_channel_grants(channel_id, &grants).await?;

        let controls_reattached = match self
            .find_marker_message(channel_id, NoticeMarker::TicketControls)
            .await?
        {
            Some(message_id) => {
                self.platform
                    .attach_controls(channel_id, message_id, NoticeMarker::TicketControls.controls())
                    .await?;
                true
            }
            None => {
                tracing::warn!(%channel_id, "no ticket control message in recent history");
                false
            }
        };

        tracing::debug!(%channel_id, channel = %channel.name, "restored ticket");
        Ok(TicketOutcome::Restored {
            controls_reattached,
        })
    }

    async fn restore_intake_panel(&self) -> Result<bool, TicketError> {
        let channel_id = self.config.intake_channel_id;
        if self.platform.resolve_channel(channel_id).await?.is_none() {
            tracing::warn!(%channel_id, "intake channel not found");
            return Ok(false);
        }
        let Some(message_id) = self
            .find_marker_message(channel_id, NoticeMarker::IntakePanel)
            .await?
        else {
            return Ok(false);
        };
        self.platform
            .attach_controls(channel_id, message_id, NoticeMarker::IntakePanel.controls())
            .await?;
        Ok(true)
    }

    /// Most recent self-authored message in the window carrying `marker`.
    async fn find_marker_message(
        &self,
        channel_id: ChannelId,
        marker: NoticeMarker,
    ) -> Result<Option<MessageId>, TicketError> {
        let history = self
            .platform
            .fetch_recent_history(channel_id, self.config.recovery_history_window)
            .await?;
        Ok(history
            .iter()
            .rev()
            .find(|message| message.from_self && message.marker == Some(marker))
            .map(|message| message.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        config::test_config,
        fake_platform::InMemoryPlatform,
        ids::{CategoryId, UserId},
        platform::{
            AccessGrant, ChannelAccess, ControlSet, GrantTarget, HistoryMessage, Notice,
            TicketOpenedNotice,
        },
        record::TicketType,
        record_store::InMemoryRecordStore,
    };

    fn ticket(platform: &InMemoryPlatform, channel: u64, user: u64) -> TicketRecord {
        let channel_id = ChannelId::new(channel);
        platform.add_channel(channel_id, &format!("ticket-support-{user}"), Some(CategoryId::new(700)));
        platform.add_member(UserId::new(user), "requester", Vec::new());
        TicketRecord::open(channel_id, UserId::new(user), CategoryId::new(700), TicketType::Support, Utc::now())
    }

    async fn post_controls(platform: &InMemoryPlatform, record: &TicketRecord) -> MessageId {
        let notice = Notice::TicketOpened(TicketOpenedNotice {
            channel_id: record.channel_id,
            requester: record.user_id,
            ticket_type: record.ticket_type,
            created_at: record.created_at,
        });
        let message_id = platform.send_notice(record.channel_id, &notice).await.expect("post");
        platform.forget_controls(record.channel_id);
        message_id
    }

    fn chatter(platform: &InMemoryPlatform, channel_id: ChannelId, count: u64) {
        for n in 0..count {
            platform.push_message(
                channel_id,
                HistoryMessage {
                    id: MessageId::new(90_000 + n),
                    author_name: "alice".to_string(),
                    from_self: false,
                    content: format!("message {n}"),
                    created_at: Utc::now(),
                    has_embeds: false,
                    attachments: Vec::new(),
                    marker: None,
                },
            );
        }
    }

    fn setup() -> (Arc<InMemoryPlatform>, Arc<TicketConfig>) {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_category(CategoryId::new(700), "Support");
        platform.add_channel(ChannelId::new(600), "open-a-ticket", None);
        (platform, Arc::new(test_config()))
    }

    #[tokio::test]
    async fn restores_grants_and_controls_idempotently() {
        let (platform, config) = setup();
        let record = ticket(&platform, 900, 42);
        let message_id = post_controls(&platform, &record).await;
        platform.set_grants(
            record.channel_id,
            vec![AccessGrant::allow(GrantTarget::Member(UserId::new(13)), &[ChannelAccess::View])],
        );
        let store = Arc::new(InMemoryRecordStore::with_records(vec![record.clone()]));
        let reconciler = RecoveryReconciler::new(config.clone(), store, platform.clone());

        let first = reconciler.run().await;
        assert_eq!(first.restored, 1);
        assert_eq!(first.controls_reattached, 1);
        let grants_after_first = platform.channel_grants(record.channel_id);
        assert_eq!(
            grants_after_first,
            canonical_ticket_grants(UserId::new(42), config.staff_role_id)
        );
        let messages_after_first = platform.channel_messages(record.channel_id).len();

        let second = reconciler.run().await;
        assert_eq!(second, first);
        assert_eq!(platform.channel_grants(record.channel_id), grants_after_first);
        assert_eq!(platform.channel_messages(record.channel_id).len(), messages_after_first);
        let controls = platform.channel_controls(record.channel_id);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.get(&message_id), Some(&ControlSet::TicketActions));
    }

    #[tokio::test]
    async fn stale_records_are_skipped_and_left_open() {
        let (platform, config) = setup();
        let gone_channel = TicketRecord::open(
            ChannelId::new(901),
            UserId::new(1),
            CategoryId::new(700),
            TicketType::Support,
            Utc::now(),
        );
        let departed = ticket(&platform, 902, 2);
        platform.remove_member(UserId::new(2));
        let mut closed = ticket(&platform, 903, 3);
        closed.mark_closed(Utc::now());

        let store = Arc::new(InMemoryRecordStore::with_records(vec![
            gone_channel.clone(),
            departed,
            closed,
        ]));
        let report = RecoveryReconciler::new(config, store.clone(), platform.clone())
            .run()
            .await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.restored, 0);
        assert!(store.find(gone_channel.channel_id).await.expect("kept").is_open());
        assert!(platform.control_attachments().is_empty());
    }

    #[tokio::test]
    async fn stored_category_decides_whether_a_ticket_is_restored() {
        let (platform, config) = setup();
        let mut record = ticket(&platform, 904, 4);
        // The channel still sits in a live category but the recorded one is gone.
        record.category_id = CategoryId::new(799);
        post_controls(&platform, &record).await;

        let store = Arc::new(InMemoryRecordStore::with_records(vec![record.clone()]));
        let report = RecoveryReconciler::new(config, store, platform.clone())
            .run()
            .await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.restored, 0);
        assert!(platform.control_attachments().is_empty());
    }

    #[tokio::test]
    async fn marker_outside_window_is_not_reattached() {
        let (platform, config) = setup();
        let record = ticket(&platform, 900, 42);
        post_controls(&platform, &record).await;
        chatter(&platform, record.channel_id, config.recovery_history_window as u64);
        let store = Arc::new(InMemoryRecordStore::with_records(vec![record]));

        let report = RecoveryReconciler::new(config, store, platform.clone()).run().await;
        assert_eq!(report.restored, 1);
        assert_eq!(report.controls_reattached, 0);
    }

    #[tokio::test]
    async fn one_failing_ticket_does_not_stop_the_pass() {
        let (platform, config) = setup();
        let broken = ticket(&platform, 900, 1);
        let healthy = ticket(&platform, 901, 2);
        post_controls(&platform, &healthy).await;
        platform.fail_grants_for(broken.channel_id);
        let store = Arc::new(InMemoryRecordStore::with_records(vec![broken, healthy]));

        let report = RecoveryReconciler::new(config, store, platform).run().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.restored, 1);
        assert_eq!(report.controls_reattached, 1);
    }

    #[tokio::test]
    async fn restores_intake_panel_selection() {
        let (platform, config) = setup();
        let panel = platform
            .send_notice(config.intake_channel_id, &Notice::IntakePanel)
            .await
            .expect("panel");
        platform.forget_controls(config.intake_channel_id);
        let store = Arc::new(InMemoryRecordStore::new());

        let report = RecoveryReconciler::new(config.clone(), store, platform.clone())
            .run()
            .await;
        assert!(report.intake_restored);
        assert_eq!(
            platform.channel_controls(config.intake_channel_id).get(&panel),
            Some(&ControlSet::TicketTypeSelect)
        );
    }
}
