use crate::application::slot_editor::{SeedOutcome, SlotEditor};
use crate::domain::models::{EditorZone, SlotSet};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_mapper::{encode_for_save, WireSlotRecord};
use crate::infrastructure::slot_store::{SaveAck, SlotStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(SeedOutcome),
    Empty(SeedOutcome),
    Recovered { reason: String },
}

pub struct ScheduleService<S>
where
    S: SlotStore + ?Sized,
{
    store: Arc<S>,
    zone: EditorZone,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
}

impl<S> ScheduleService<S>
where
    S: SlotStore + ?Sized,
{
    pub fn new(store: Arc<S>, zone: EditorZone) -> Self {
        Self {
            store,
            zone,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn zone(&self) -> EditorZone {
        self.zone
    }

    pub async fn open(
        &self,
        owner_id: &str,
        editor: &mut SlotEditor,
    ) -> Result<LoadOutcome, InfraError> {
        let records = self.load(owner_id).await?;
        Ok(self.seed_loaded(owner_id, editor, records))
    }

    pub async fn load(&self, owner_id: &str) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
        self.store.load_slots(owner_id).await
    }

    /// Seeds `editor` from the result of [`Self::load`]. An unreadable payload resets the
    /// editor to an empty schedule and reports `Recovered`.
    pub fn seed_loaded(
        &self,
        owner_id: &str,
        editor: &mut SlotEditor,
        records: Option<Vec<WireSlotRecord>>,
    ) -> LoadOutcome {
        let Some(records) = records else {
            return LoadOutcome::Empty(editor.seed_set(SlotSet::empty()));
        };

        match editor.seed(&records) {
            Ok(outcome) => LoadOutcome::Loaded(outcome),
            Err(error) => {
                let reason = match error {
                    InfraError::InvalidRecord { index, reason } => format!("record {index}: {reason}"),
                    other => other.to_string(),
                };
                log::warn!("stored schedule for {owner_id} is unreadable ({reason}); starting empty");
                editor.seed_set(SlotSet::empty());
                LoadOutcome::Recovered { reason }
            }
        }
    }

    pub async fn save(&self, owner_id: &str, set: &SlotSet) -> Result<SaveAck, InfraError> {
        let today = self.zone.today((self.now_provider)());
        let records = encode_for_save(set, self.zone, today);
        self.save_with_retry(owner_id, &records).await
    }

    async fn save_with_retry(
        &self,
        owner_id: &str,
        records: &[WireSlotRecord],
    ) -> Result<SaveAck, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.store.save_slots(owner_id, records).await {
                Ok(ack) => return Ok(ack),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    log::warn!("save for {owner_id} failed ({error}); retrying in {delay}ms");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::Http(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("connection reset")
                || is_server_error(&message)
        }
        _ => false,
    }
}

fn is_server_error(message: &str) -> bool {
    message
        .strip_prefix("http ")
        .and_then(|rest| rest.get(..3))
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (500..600).contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DayKey, TimeLabel};
    use crate::infrastructure::slot_mapper::WireDate;
    use crate::infrastructure::slot_store::InMemorySlotStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum FakeSave {
        Ok,
        Fail(String),
    }

    #[derive(Debug)]
    struct FakeSlotStore {
        load_response: Mutex<Option<Result<Option<Vec<WireSlotRecord>>, InfraError>>>,
        save_responses: Mutex<VecDeque<FakeSave>>,
        saved: Mutex<Vec<Vec<WireSlotRecord>>>,
        save_calls: AtomicUsize,
    }

    impl FakeSlotStore {
        fn new(load: Result<Option<Vec<WireSlotRecord>>, InfraError>, saves: Vec<FakeSave>) -> Self {
            Self {
                load_response: Mutex::new(Some(load)),
                save_responses: Mutex::new(saves.into()),
                saved: Mutex::new(Vec::new()),
                save_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SlotStore for FakeSlotStore {
        async fn load_slots(
            &self,
            _owner_id: &str,
        ) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
            self.load_response
                .lock()
                .expect("lock load response")
                .take()
                .unwrap_or(Ok(None))
        }

        async fn save_slots(
            &self,
            owner_id: &str,
            records: &[WireSlotRecord],
        ) -> Result<SaveAck, InfraError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .save_responses
                .lock()
                .expect("lock save responses")
                .pop_front()
                .unwrap_or(FakeSave::Ok);
            match response {
                FakeSave::Ok => {
                    self.saved.lock().expect("lock saved").push(records.to_vec());
                    Ok(SaveAck {
                        owner_id: owner_id.to_string(),
                        record_count: records.len(),
                        saved_at: fixed_time(),
                    })
                }
                FakeSave::Fail(message) => Err(InfraError::Http(message)),
            }
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0)
            .single()
            .expect("fixed time")
    }

    fn utc() -> EditorZone {
        EditorZone::Named(Tz::UTC)
    }

    fn day(value: &str) -> DayKey {
        DayKey::parse(value).expect("valid day key")
    }

    fn record(date: &str, times: &[&str]) -> WireSlotRecord {
        WireSlotRecord {
            date: WireDate::from(date),
            times: times.iter().map(|time| TimeLabel::from(*time)).collect(),
        }
    }

    fn fast_retry(max_attempts: u8) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
        }
    }

    fn service(store: Arc<FakeSlotStore>) -> ScheduleService<FakeSlotStore> {
        ScheduleService::new(store, utc())
            .with_retry_policy(fast_retry(3))
            .with_now_provider(Arc::new(fixed_time))
    }

    #[tokio::test]
    async fn open_seeds_editor_from_store() {
        let store = Arc::new(FakeSlotStore::new(
            Ok(Some(vec![record("2024-06-10", &["9:00 AM"])])),
            vec![],
        ));
        let mut editor = SlotEditor::new(utc());

        let outcome = service(store).open("doc-1", &mut editor).await.expect("open");

        assert_eq!(outcome, LoadOutcome::Loaded(SeedOutcome::Seeded));
        assert_eq!(
            editor.current().expect("editing").get(day("2024-06-10")),
            &[TimeLabel::from("9:00 AM")]
        );
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn open_without_stored_schedule_starts_empty() {
        let store = Arc::new(FakeSlotStore::new(Ok(None), vec![]));
        let mut editor = SlotEditor::new(utc());

        let outcome = service(store).open("doc-1", &mut editor).await.expect("open");

        assert_eq!(outcome, LoadOutcome::Empty(SeedOutcome::Seeded));
        assert!(editor.current().expect("editing").is_empty());
    }

    #[tokio::test]
    async fn open_recovers_from_undecodable_payload() {
        let store = Arc::new(FakeSlotStore::new(
            Ok(Some(vec![record("2024-06-10", &["9:00 AM"]), record("later", &["1:00 PM"])])),
            vec![],
        ));
        let mut editor = SlotEditor::new(utc());

        let outcome = service(store).open("doc-1", &mut editor).await.expect("open");

        match outcome {
            LoadOutcome::Recovered { reason } => assert!(reason.starts_with("record 1")),
            other => panic!("expected recovery, got {other:?}"),
        }
        assert!(editor.current().expect("editing").is_empty());
    }

    #[tokio::test]
    async fn open_propagates_store_errors_without_touching_editor() {
        let store = Arc::new(FakeSlotStore::new(
            Err(InfraError::Http("http 401".to_string())),
            vec![],
        ));
        let mut editor = SlotEditor::new(utc());

        let result = service(store).open("doc-1", &mut editor).await;

        assert!(matches!(result, Err(InfraError::Http(_))));
        assert!(!editor.is_editing());
    }

    #[tokio::test]
    async fn reopening_same_schedule_keeps_in_progress_edits() {
        let store = Arc::new(InMemorySlotStore::default());
        store
            .save_slots("doc-1", &[record("2024-06-10", &["9:00 AM"])])
            .await
            .expect("seed store");
        let service = ScheduleService::new(Arc::clone(&store), utc());
        let mut editor = SlotEditor::new(utc());
        service.open("doc-1", &mut editor).await.expect("first open");
        editor
            .add_time(day("2024-06-11"), TimeLabel::from("2:00 PM"))
            .expect("edit");

        let outcome = service.open("doc-1", &mut editor).await.expect("reopen");

        assert_eq!(outcome, LoadOutcome::Loaded(SeedOutcome::Unchanged));
        assert!(editor.is_dirty());
        assert_eq!(editor.current().expect("editing").day_count(), 2);
    }

    #[tokio::test]
    async fn save_sends_placeholder_for_empty_schedule() {
        let store = Arc::new(FakeSlotStore::new(Ok(None), vec![]));
        let ack = service(Arc::clone(&store))
            .save("doc-1", &SlotSet::empty())
            .await
            .expect("save");

        assert_eq!(ack.record_count, 1);
        let saved = store.saved.lock().expect("lock saved");
        assert_eq!(saved[0], vec![record("2024-06-10T00:00:00+00:00", &[])]);
    }

    #[tokio::test]
    async fn save_retries_transient_failures() {
        let store = Arc::new(FakeSlotStore::new(
            Ok(None),
            vec![
                FakeSave::Fail("network error while saving slots: connection refused".to_string()),
                FakeSave::Fail("http 503; body=maintenance".to_string()),
                FakeSave::Ok,
            ],
        ));
        let set = SlotSet::empty()
            .with_time_added(day("2024-06-11"), TimeLabel::from("9:00 AM"))
            .expect("add");

        let ack = service(Arc::clone(&store)).save("doc-1", &set).await.expect("save");

        assert_eq!(ack.record_count, 1);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn save_gives_up_after_max_attempts() {
        let store = Arc::new(FakeSlotStore::new(
            Ok(None),
            vec![
                FakeSave::Fail("http 502".to_string()),
                FakeSave::Fail("http 502".to_string()),
            ],
        ));
        let service = ScheduleService::new(Arc::clone(&store), utc())
            .with_retry_policy(fast_retry(2))
            .with_now_provider(Arc::new(fixed_time));

        let result = service.save("doc-1", &SlotSet::empty()).await;

        assert!(matches!(result, Err(InfraError::Http(_))));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn save_does_not_retry_client_errors() {
        let store = Arc::new(FakeSlotStore::new(
            Ok(None),
            vec![FakeSave::Fail("http 400; body=empty schedule".to_string())],
        ));

        let result = service(Arc::clone(&store)).save("doc-1", &SlotSet::empty()).await;

        assert!(result.is_err());
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_classification() {
        assert!(should_retry(&InfraError::Http("http 500".to_string())));
        assert!(should_retry(&InfraError::Http("request timed out".to_string())));
        assert!(!should_retry(&InfraError::Http("http 404".to_string())));
        assert!(!should_retry(&InfraError::InvalidConfig("network error".to_string())));
    }

    proptest! {
        #[test]
        fn saved_schedule_reopens_identically(
            entries in prop::collection::vec((0i64..30, prop::collection::vec("[0-9]{1,2}:[0-5][0-9] (AM|PM)", 1..=2)), 0..8)
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let base = day("2024-06-01").date();
                let mut set = SlotSet::empty();
                for (offset, times) in entries {
                    let key = DayKey::new(base + chrono::Duration::days(offset));
                    set = set.with_day_cleared(key);
                    for time in times {
                        set = set.with_time_added(key, TimeLabel::new(time)).expect("within capacity");
                    }
                }

                let store = Arc::new(InMemorySlotStore::default());
                let service = ScheduleService::new(Arc::clone(&store), utc())
                    .with_now_provider(Arc::new(fixed_time));
                service.save("doc-1", &set).await.expect("save");

                let mut editor = SlotEditor::new(utc());
                service.open("doc-1", &mut editor).await.expect("open");
                assert_eq!(editor.current(), Some(&set));
            });
        }
    }
}
