use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    models::{SessionOutcome, SessionRecord},
    storage::KeyValueStore,
    timer::SessionSink,
};

use super::grouping::{group_by_day, DayGroup};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

enum SaveCommand {
    Persist(String),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct HistoryList {
    records: Vec<SessionRecord>,
    last_id: i64,
}

struct HistoryInner {
    list: RwLock<HistoryList>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    save_tx: mpsc::UnboundedSender<SaveCommand>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

/// Newest-first list of finished sessions, mirrored to a key-value store.
///
/// Every mutation enqueues a full re-save on a background writer that runs
/// saves one at a time in the order they were requested. Callers never wait
/// on the write; use [`HistoryStore::flush`] when they must.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<HistoryInner>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (save_tx, save_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(save_worker(store.clone(), key.clone(), save_rx));

        Self {
            inner: Arc::new(HistoryInner {
                list: RwLock::new(HistoryList::default()),
                store,
                key,
                save_tx,
                writer: Mutex::new(Some(writer)),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Replaces the in-memory list with whatever the store holds under the
    /// history key. A missing key or unreadable payload leaves the list empty.
    pub async fn load(&self) -> usize {
        let loaded = match self.fetch().await {
            Ok(Some(records)) => records,
            Ok(None) => {
                log_info!("no saved history under '{}'", self.inner.key);
                Vec::new()
            }
            Err(err) => {
                log_error!("failed to load session history: {err:#}");
                Vec::new()
            }
        };

        let count = loaded.len();
        let mut list = self.write_list();
        list.last_id = loaded.iter().map(|r| r.id).max().unwrap_or(0);
        list.records = loaded;
        log_info!("loaded {count} history records");
        count
    }

    /// Prepends `record` and enqueues a save.
    pub fn append(&self, record: SessionRecord) {
        let mut list = self.write_list();
        list.last_id = list.last_id.max(record.id);
        list.records.insert(0, record);
        self.enqueue_save(&list.records);
    }

    /// Turns a timer outcome into a record stamped with the current time.
    pub fn record_outcome(&self, outcome: SessionOutcome) -> SessionRecord {
        self.record_outcome_at(outcome, Utc::now())
    }

    pub fn record_outcome_at(&self, outcome: SessionOutcome, at: DateTime<Utc>) -> SessionRecord {
        let mut list = self.write_list();
        let id = at.timestamp_millis().max(list.last_id + 1);
        let record = SessionRecord::from_outcome(id, at, outcome);

        log_info!(
            "recording {} minute session ({})",
            record.requested_duration,
            if record.completed { "completed" } else { "stopped early" }
        );

        list.last_id = id;
        list.records.insert(0, record.clone());
        self.enqueue_save(&list.records);
        record
    }

    /// Enqueues a save of the current list.
    pub fn save(&self) {
        let list = self.read_list();
        self.enqueue_save(&list.records);
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.read_list().records.clone()
    }

    pub fn len(&self) -> usize {
        self.read_list().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn grouped_by_day<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DayGroup> {
        group_by_day(&self.read_list().records, now)
    }

    /// Waits until every save enqueued so far has been attempted.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .save_tx
            .send(SaveCommand::Flush(reply_tx))
            .map_err(|_| anyhow!("history writer is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("history writer stopped before flushing"))
    }

    /// Drains pending saves and stops the writer.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = match self.inner.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(handle) = handle else {
            return Ok(());
        };

        if self.inner.save_tx.send(SaveCommand::Shutdown).is_err() {
            log_warn!("history writer already gone at shutdown");
        }
        handle.await.context("history writer task failed to join")
    }

    async fn fetch(&self) -> Result<Option<Vec<SessionRecord>>> {
        let raw = self
            .inner
            .store
            .get(&self.inner.key)
            .await
            .context("failed to read history from store")?;

        let Some(payload) = raw else {
            return Ok(None);
        };

        let entries: Vec<serde_json::Value> = serde_json::from_str(&payload)
            .context("stored history is not a valid session list")?;
        Ok(Some(decode_records(entries)))
    }

    fn enqueue_save(&self, records: &[SessionRecord]) {
        let payload = match serde_json::to_string(records) {
            Ok(payload) => payload,
            Err(err) => {
                log_error!("failed to serialize session history: {err}");
                return;
            }
        };

        if self.inner.save_tx.send(SaveCommand::Persist(payload)).is_err() {
            log_error!("history writer is not running; change kept in memory only");
        }
    }

    fn read_list(&self) -> RwLockReadGuard<'_, HistoryList> {
        match self.inner.list.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_list(&self) -> RwLockWriteGuard<'_, HistoryList> {
        match self.inner.list.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionSink for HistoryStore {
    fn record(&self, outcome: SessionOutcome) {
        self.record_outcome(outcome);
    }
}

/// Keeps every entry that decodes; a damaged one is dropped on its own.
fn decode_records(entries: Vec<serde_json::Value>) -> Vec<SessionRecord> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(err) => {
                log_warn!("skipping unreadable history entry #{index}: {err}");
                None
            }
        })
        .collect()
}

async fn save_worker(
    store: Arc<dyn KeyValueStore>,
    key: String,
    mut save_rx: mpsc::UnboundedReceiver<SaveCommand>,
) {
    while let Some(command) = save_rx.recv().await {
        match command {
            SaveCommand::Persist(payload) => {
                if let Err(err) = store.set(&key, payload).await {
                    log_error!("failed to save session history: {err:#}");
                }
            }
            SaveCommand::Flush(reply) => {
                let _ = reply.send(());
            }
            SaveCommand::Shutdown => break,
        }
    }

    log_info!("history writer shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    const KEY: &str = "pomodoroHistory";

    fn record(id: i64) -> SessionRecord {
        SessionRecord {
            id,
            requested_duration: 25,
            started_at: Utc.timestamp_millis_opt(id).unwrap(),
            completed: id % 2 == 0,
            note: (id % 2 != 0).then(|| "4 minutes worked".to_string()),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    #[tokio::test]
    async fn append_inserts_at_front() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()), KEY);
        history.append(record(1_000));
        history.append(record(2_000));

        let ids: Vec<i64> = history.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2_000, 1_000]);
    }

    #[tokio::test]
    async fn every_append_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let history = HistoryStore::new(store.clone(), KEY);
        history.append(record(1_000));
        history.append(record(2_001));
        history.flush().await.unwrap();

        let saved = store.get(KEY).await.unwrap().unwrap();
        let saved: Vec<SessionRecord> = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved, history.records());
    }

    #[tokio::test]
    async fn load_round_trips_saved_history() {
        let store = Arc::new(MemoryStore::new());
        let first = HistoryStore::new(store.clone(), KEY);
        first.append(record(1_000));
        first.append(record(2_001));
        first.shutdown().await.unwrap();

        let second = HistoryStore::new(store, KEY);
        assert_eq!(second.load().await, 2);
        assert_eq!(second.records(), first.records());
    }

    #[tokio::test]
    async fn load_with_missing_key_leaves_list_empty() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()), KEY);
        assert_eq!(history.load().await, 0);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_loads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "{not json".to_string()).await.unwrap();

        let history = HistoryStore::new(store, KEY);
        assert_eq!(history.load().await, 0);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn damaged_entries_are_skipped_on_load() {
        let store = Arc::new(MemoryStore::new());
        let payload = r#"[
            {"id":3,"duration":null,"date":"2024-10-18T10:00:00.000Z","completed":false,"note":"0 minutes worked"},
            {"id":2,"duration":-5,"date":"2024-10-18T09:00:00.000Z","completed":false},
            {"id":1,"duration":25,"date":"2024-10-18T08:00:00.000Z","completed":true}
        ]"#;
        store.set(KEY, payload.to_string()).await.unwrap();

        let history = HistoryStore::new(store.clone(), KEY);
        assert_eq!(history.load().await, 1);
        assert_eq!(history.records()[0].id, 1);
        assert_eq!(history.records()[0].requested_duration, 25);

        let next = history.record_outcome(SessionOutcome::completed(25));
        history.flush().await.unwrap();
        let saved: Vec<SessionRecord> =
            serde_json::from_str(&store.get(KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].id, next.id);
        assert_eq!(saved[1].id, 1);
    }

    #[tokio::test]
    async fn store_failures_keep_in_memory_history() {
        let history = HistoryStore::new(Arc::new(FailingStore), KEY);
        assert_eq!(history.load().await, 0);

        history.record_outcome(SessionOutcome::completed(25));
        history.flush().await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn record_ids_increase_even_within_one_millisecond() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()), KEY);
        let at = Utc.with_ymd_and_hms(2024, 10, 18, 9, 0, 0).unwrap();

        let first = history.record_outcome_at(SessionOutcome::completed(25), at);
        let second = history.record_outcome_at(SessionOutcome::stopped(25, 600), at);

        assert_eq!(first.id, at.timestamp_millis());
        assert_eq!(second.id, first.id + 1);
        assert_eq!(second.note.as_deref(), Some("15 minutes worked"));
        assert_eq!(history.records()[0].id, second.id);
    }

    #[tokio::test]
    async fn ids_continue_after_loaded_records() {
        let store = Arc::new(MemoryStore::new());
        let future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        let seeded = vec![record(future.timestamp_millis())];
        store
            .set(KEY, serde_json::to_string(&seeded).unwrap())
            .await
            .unwrap();

        let history = HistoryStore::new(store, KEY);
        history.load().await;
        let next = history.record_outcome(SessionOutcome::completed(5));
        assert_eq!(next.id, future.timestamp_millis() + 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()), KEY);
        history.shutdown().await.unwrap();
        history.shutdown().await.unwrap();
        assert!(history.flush().await.is_err());
    }
}
