//! Durable ticket record log.
//!
//! The log is one JSON array of [`TicketRecord`]s. Every mutation re-reads
//! the document, applies the change and replaces the file atomically.
//! Mutations are serialized through an async mutex so two tickets changing
//! at the same time never drop each other's writes.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use desk_core::{copy_aside, write_text_atomic};
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::{StoreError, StoreResult},
    ids::ChannelId,
    record::TicketRecord,
};

pub const DEFAULT_RECORD_FILE: &str = "data/tickets.json";

/// In-place change applied to one record by [`RecordStore::update`].
pub type RecordMutator = Box<dyn FnOnce(&mut TicketRecord) + Send>;

/// Storage contract for ticket records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record. An unreadable log yields an empty sequence.
    async fn load(&self) -> Vec<TicketRecord>;

    /// Appends a new record. Rejects a duplicate `channel_id`.
    async fn append(&self, record: TicketRecord) -> StoreResult<()>;

    /// Applies `mutator` to the record for `channel_id`. Returns `false`
    /// without writing when no such record exists.
    async fn update(&self, channel_id: ChannelId, mutator: RecordMutator) -> StoreResult<bool>;

    async fn find(&self, channel_id: ChannelId) -> Option<TicketRecord> {
        self.load()
            .await
            .into_iter()
            .find(|record| record.channel_id == channel_id)
    }
}

enum LogContents {
    Missing,
    Loaded(Vec<TicketRecord>),
    Corrupt(String),
}

/// Parses the contents of a record log. Blank input is an empty log.
pub fn parse_record_log(raw: &str) -> serde_json::Result<Vec<TicketRecord>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

fn read_log(path: &Path) -> LogContents {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return LogContents::Missing,
        Err(error) => return LogContents::Corrupt(error.to_string()),
    };
    match parse_record_log(&raw) {
        Ok(records) => LogContents::Loaded(records),
        Err(error) => LogContents::Corrupt(error.to_string()),
    }
}

/// Reads the log for a read-modify-write cycle. A corrupt log is copied aside
/// first so the write that follows does not silently destroy it; when no copy
/// can be made the mutation is refused and the file is left as it is.
fn read_for_mutation(path: &Path) -> StoreResult<Vec<TicketRecord>> {
    match read_log(path) {
        LogContents::Missing => Ok(Vec::new()),
        LogContents::Loaded(records) => Ok(records),
        LogContents::Corrupt(reason) => match copy_aside(path, "corrupt") {
            Ok(backup) => {
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    %reason,
                    "ticket record log unreadable; preserved a copy and starting fresh"
                );
                Ok(Vec::new())
            }
            Err(error) => {
                tracing::error!(
                    path = %path.display(),
                    %reason,
                    error = %format!("{error:#}"),
                    "ticket record log unreadable and could not be preserved; refusing to overwrite"
                );
                Err(StoreError::Persist(
                    error.context("could not preserve unreadable ticket record log"),
                ))
            }
        },
    }
}

fn write_log(path: &Path, records: &[TicketRecord]) -> StoreResult<()> {
    let mut payload = serde_json::to_string_pretty(records)?;
    payload.push('\n');
    write_text_atomic(path, &payload).map_err(StoreError::Persist)
}

/// Record store backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn mutate<F>(&self, apply: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut Vec<TicketRecord>) -> StoreResult<bool> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = read_for_mutation(&path)?;
            let changed = apply(&mut records)?;
            if changed {
                write_log(&path, &records)?;
            }
            Ok(changed)
        })
        .await
        .map_err(|error| StoreError::Worker(error.to_string()))?
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn load(&self) -> Vec<TicketRecord> {
        let path = self.path.clone();
        let contents = match tokio::task::spawn_blocking(move || read_log(&path)).await {
            Ok(contents) => contents,
            Err(error) => {
                tracing::warn!(%error, "ticket record load task failed");
                return Vec::new();
            }
        };
        match contents {
            LogContents::Missing => Vec::new(),
            LogContents::Loaded(records) => records,
            LogContents::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "could not load ticket data, starting fresh"
                );
                Vec::new()
            }
        }
    }

    async fn append(&self, record: TicketRecord) -> StoreResult<()> {
        self.mutate(move |records| {
            if records
                .iter()
                .any(|existing| existing.channel_id == record.channel_id)
            {
                return Err(StoreError::DuplicateChannel(record.channel_id));
            }
            records.push(record);
            Ok(true)
        })
        .await
        .map(|_| ())
    }

    async fn update(&self, channel_id: ChannelId, mutator: RecordMutator) -> StoreResult<bool> {
        self.mutate(move |records| {
            let Some(record) = records
                .iter_mut()
                .find(|record| record.channel_id == channel_id)
            else {
                return Ok(false);
            };
            mutator(record);
            Ok(true)
        })
        .await
    }
}

/// Volatile record store for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<TicketRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TicketRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every following write fail as if the log were unwritable.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "record store is read-only",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load(&self) -> Vec<TicketRecord> {
        self.records.read().await.clone()
    }

    async fn append(&self, record: TicketRecord) -> StoreResult<()> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|existing| existing.channel_id == record.channel_id)
        {
            return Err(StoreError::DuplicateChannel(record.channel_id));
        }
        records.push(record);
        Ok(())
    }

    async fn update(&self, channel_id: ChannelId, mutator: RecordMutator) -> StoreResult<bool> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let Some(record) = records
            .iter_mut()
            .find(|record| record.channel_id == channel_id)
        else {
            return Ok(false);
        };
        mutator(record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        ids::{CategoryId, UserId},
        record::{TicketStatus, TicketType},
    };

    fn record(channel: u64, user: u64) -> TicketRecord {
        TicketRecord::open(
            ChannelId::new(channel),
            UserId::new(user),
            CategoryId::new(10),
            TicketType::Support,
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 30).unwrap(),
        )
    }

    #[tokio::test]
    async fn appended_record_reloads_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("tickets.json");
        let store = JsonFileRecordStore::new(&path);
        let mut original = record(900, 42);
        original.ticket_type = TicketType::Partnership;
        store.append(original.clone()).await.expect("append");

        let reloaded = JsonFileRecordStore::new(&path).load().await;
        assert_eq!(reloaded, vec![original]);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path().join("tickets.json"));
        assert!(store.load().await.is_empty());
        assert_eq!(store.find(ChannelId::new(1)).await, None);
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty_and_is_preserved_before_next_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tickets.json");
        std::fs::write(&path, "[{\"channel_id\": ").expect("seed");
        let store = JsonFileRecordStore::new(&path);

        assert!(store.load().await.is_empty());
        store.append(record(1, 2)).await.expect("append after corrupt");

        assert_eq!(store.load().await.len(), 1);
        let backups = std::fs::read_dir(dir.path())
            .expect("list")
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("tickets.json.corrupt-")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn corrupt_file_without_backup_is_not_overwritten() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().expect("tempdir");
        // A non UTF-8 file name cannot be given a backup name.
        let path = dir.path().join(OsStr::from_bytes(b"tickets-\xff.json"));
        std::fs::write(&path, "[{\"channel_id\": ").expect("seed");
        let store = JsonFileRecordStore::new(&path);

        let error = store.append(record(1, 2)).await.expect_err("no backup");
        assert!(matches!(error, StoreError::Persist(_)));
        assert!(error.to_string().contains("could not preserve"));
        assert_eq!(
            std::fs::read_to_string(&path).expect("original"),
            "[{\"channel_id\": "
        );
    }

    #[tokio::test]
    async fn duplicate_channel_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path().join("tickets.json"));
        store.append(record(5, 1)).await.expect("first");
        let error = store.append(record(5, 2)).await.expect_err("duplicate");
        assert!(matches!(error, StoreError::DuplicateChannel(id) if id == ChannelId::new(5)));
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_channel_is_a_silent_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tickets.json");
        let store = JsonFileRecordStore::new(&path);
        store.append(record(5, 1)).await.expect("append");
        let before = std::fs::read_to_string(&path).expect("read");

        let found = store
            .update(
                ChannelId::new(6),
                Box::new(|record| record.category_id = CategoryId::new(99)),
            )
            .await
            .expect("update");
        assert!(!found);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    }

    #[tokio::test]
    async fn closing_keeps_record_in_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path().join("tickets.json"));
        store.append(record(5, 1)).await.expect("append");
        let closed_at = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        assert!(store
            .update(ChannelId::new(5), Box::new(move |r| r.mark_closed(closed_at)))
            .await
            .expect("update"));

        let records = store.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TicketStatus::Closed);
        assert_eq!(records[0].closed_at, Some(closed_at));
    }

    #[tokio::test]
    async fn concurrent_appends_for_different_channels_all_land() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(JsonFileRecordStore::new(dir.path().join("tickets.json")));
        let tasks = (1..=12u64)
            .map(|channel| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append(record(channel, channel)).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.expect("join").expect("append");
        }
        assert_eq!(store.load().await.len(), 12);
    }

    #[tokio::test]
    async fn in_memory_store_reports_unwritable_state() {
        let store = InMemoryRecordStore::new();
        store.set_fail_writes(true);
        assert!(store.append(record(1, 1)).await.is_err());
        store.set_fail_writes(false);
        store.append(record(1, 1)).await.expect("append");
        assert_eq!(store.find(ChannelId::new(1)).await, Some(record(1, 1)));
    }
}
