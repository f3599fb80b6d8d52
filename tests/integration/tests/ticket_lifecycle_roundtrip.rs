use std::{path::Path, sync::Arc, time::Duration};

use desk_tickets::{
    fake_platform::InMemoryPlatform,
    platform::canonical_ticket_grants,
    Actor, CategoryId, ChannelId, ControlSet, JsonFileRecordStore, Notice, RecordStore,
    RecoveryReconciler, RoleId, TicketConfig, TicketError, TicketLifecycle, TicketPlatform,
    TicketState, TicketStatus, TicketType, UserId,
};
use serde_json::Value;
use tempfile::tempdir;

const STAFF_ROLE: u64 = 500;

fn config() -> Arc<TicketConfig> {
    Arc::new(TicketConfig {
        staff_role_id: RoleId::new(STAFF_ROLE),
        unlimited_tickets_role_id: Some(RoleId::new(501)),
        intake_channel_id: ChannelId::new(600),
        archive_channel_id: ChannelId::new(601),
        support_category_id: CategoryId::new(700),
        partnership_category_id: CategoryId::new(701),
        transfer_category_id: CategoryId::new(702),
        cooldown: Duration::ZERO,
        max_tickets_per_user: 1,
        close_grace_delay: Duration::ZERO,
        recovery_history_window: 50,
    })
}

fn guild() -> Arc<InMemoryPlatform> {
    let platform = Arc::new(InMemoryPlatform::new());
    platform.add_category(CategoryId::new(700), "Support");
    platform.add_category(CategoryId::new(701), "Partnership");
    platform.add_category(CategoryId::new(702), "Escalations");
    platform.add_channel(ChannelId::new(600), "open-a-ticket", None);
    platform.add_channel(ChannelId::new(601), "transcripts", None);
    platform.add_member(UserId::new(42), "alice", Vec::new());
    platform.add_member(UserId::new(77), "bob", Vec::new());
    platform
}

/// Simulates a process start: a fresh store handle over the same file and a
/// fresh lifecycle with empty in-memory state.
fn boot(path: &Path, platform: &Arc<InMemoryPlatform>) -> (Arc<dyn RecordStore>, TicketLifecycle) {
    let store: Arc<dyn RecordStore> = Arc::new(JsonFileRecordStore::new(path));
    let lifecycle = TicketLifecycle::new(config(), Arc::clone(&store), platform.clone());
    (store, lifecycle)
}

fn alice() -> Actor {
    Actor::new(UserId::new(42), "alice", Vec::new())
}

fn staff() -> Actor {
    Actor::new(UserId::new(7), "mod", vec![RoleId::new(STAFF_ROLE)])
}

#[tokio::test]
async fn integration_ticket_survives_restart_and_closes_with_transcript() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("data").join("tickets.json");
    let platform = guild();

    let (_, lifecycle) = boot(&path, &platform);
    let created = lifecycle
        .create(&alice(), TicketType::Support)
        .await
        .expect("create");
    let channel_id = created.channel.id;
    lifecycle
        .transfer(channel_id, CategoryId::new(702))
        .await
        .expect("transfer");
    lifecycle
        .add_participant(channel_id, UserId::new(77))
        .await
        .expect("add participant");
    drop(lifecycle);

    // Restart: controls are gone and someone edited the overwrites by hand.
    platform.forget_controls(channel_id);
    platform.set_grants(channel_id, Vec::new());
    let (store, lifecycle) = boot(&path, &platform);
    let report = RecoveryReconciler::new(config(), Arc::clone(&store), platform.clone())
        .run()
        .await;
    assert_eq!(report.restored, 1);
    assert_eq!(report.controls_reattached, 1);
    assert_eq!(
        platform.channel_grants(channel_id),
        canonical_ticket_grants(UserId::new(42), RoleId::new(STAFF_ROLE))
    );
    assert_eq!(
        platform.channel_controls(channel_id).values().copied().collect::<Vec<_>>(),
        vec![ControlSet::TicketActions]
    );

    // Quota is derived from the persisted log, so it holds across restarts.
    let error = lifecycle
        .create(&alice(), TicketType::Partnership)
        .await
        .expect_err("over cap");
    assert!(matches!(error, TicketError::QuotaExceeded { open: 1, cap: 1 }));

    let closed = lifecycle
        .close(channel_id, &staff(), Some("fixed in 1.2"))
        .await
        .expect("close");
    closed.deletion.expect("deletion").await.expect("join");
    assert_eq!(closed.notice.category_name.as_deref(), Some("Escalations"));
    assert!(closed.requester_notified);
    let transcript = closed.transcript.expect("transcript");
    assert_eq!(transcript.category_name.as_deref(), Some("Escalations"));

    let deliveries = platform.file_deliveries();
    assert_eq!(deliveries.len(), 1);
    let (destination, _, file) = &deliveries[0];
    assert_eq!(*destination, ChannelId::new(601));
    assert_eq!(file.content.lines().count(), transcript.message_count);
    assert!(file.content.contains("[Contains embeds]"));

    assert!(platform.channel(channel_id).is_none());
    assert_eq!(lifecycle.ticket_state(channel_id).await, Some(TicketState::Closed));

    let raw = std::fs::read_to_string(&path).expect("record file");
    let records: Value = serde_json::from_str(&raw).expect("json");
    let record = &records[0];
    assert_eq!(record["channel_id"], Value::from(channel_id.get()));
    assert_eq!(record["user_id"], Value::from(42u64));
    assert_eq!(record["category_id"], Value::from(702u64));
    assert_eq!(record["ticket_type"], "support");
    assert_eq!(record["status"], "closed");
    assert!(record["closed_at"].is_string());

    // A later restart leaves closed tickets alone.
    let (store, _) = boot(&path, &platform);
    let report = RecoveryReconciler::new(config(), store, platform.clone())
        .run()
        .await;
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn integration_closed_ticket_frees_quota_for_new_request() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tickets.json");
    let platform = guild();
    let (store, lifecycle) = boot(&path, &platform);

    let first = lifecycle
        .create(&alice(), TicketType::Support)
        .await
        .expect("first");
    lifecycle
        .close(first.channel.id, &alice(), None)
        .await
        .expect("close");
    let second = lifecycle
        .create(&alice(), TicketType::Partnership)
        .await
        .expect("second after close");

    let records = store.load().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, TicketStatus::Closed);
    assert_eq!(records[1].channel_id, second.channel.id);
    assert_eq!(records[1].category_id, CategoryId::new(701));

    let stats = lifecycle.stats().await;
    assert_eq!((stats.total, stats.open, stats.closed), (2, 1, 1));
}

#[tokio::test]
async fn integration_intake_panel_restored_after_restart() {
    let dir = tempdir().expect("tempdir");
    let platform = guild();
    let panel = platform
        .send_notice(ChannelId::new(600), &Notice::IntakePanel)
        .await
        .expect("panel");
    platform.forget_controls(ChannelId::new(600));

    let (store, _) = boot(&dir.path().join("tickets.json"), &platform);
    let report = RecoveryReconciler::new(config(), store, platform.clone())
        .run()
        .await;
    assert!(report.intake_restored);
    assert_eq!(
        platform.channel_controls(ChannelId::new(600)).get(&panel),
        Some(&ControlSet::TicketTypeSelect)
    );
    assert_eq!(report.examined, 0);
}
