use crate::application::bootstrap::bootstrap_workspace;
use crate::application::schedule_service::{LoadOutcome, NowProvider, RetryPolicy, ScheduleService};
use crate::application::slot_editor::{EditOutcome, ScheduleView, SeedOutcome, SlotEditor};
use crate::domain::date_window::{DateWindow, WindowMode, DEFAULT_WINDOW_DAYS};
use crate::domain::models::{DayKey, EditorZone, SlotError, TimeLabel};
use crate::domain::time_labels::default_time_labels;
use crate::infrastructure::config::{
    read_editor_zone, read_persistence_settings_with_lookup, read_window_mode,
    save_schedule_settings, PersistenceBackend, PersistenceSettings,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_api_client::ReqwestSlotApiClient;
use crate::infrastructure::slot_mapper::WireSlotRecord;
use crate::infrastructure::slot_store::{normalized_owner_id, SlotStore, SqliteSlotStore};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    store: Arc<dyn SlotStore>,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
    sessions: Mutex<HashMap<String, SlotEditor>>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::new_with_lookup(workspace_root, |key| std::env::var(key).ok())
    }

    pub fn new_with_lookup<F>(workspace_root: PathBuf, lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let settings = read_persistence_settings_with_lookup(&bootstrap.config_dir, lookup)?;
        let store = build_store(&bootstrap.database_path, &settings)?;

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            store,
            retry_policy: RetryPolicy {
                max_attempts: settings.retry_max_attempts,
                base_delay_ms: settings.retry_base_delay_ms,
            },
            now_provider: Arc::new(Utc::now),
            sessions: Mutex::new(HashMap::new()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SlotStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn schedule_service(&self, zone: EditorZone) -> ScheduleService<dyn SlotStore> {
        ScheduleService::new(Arc::clone(&self.store), zone)
            .with_retry_policy(self.retry_policy.clone())
            .with_now_provider(Arc::clone(&self.now_provider))
    }
}

fn build_store(
    database_path: &Path,
    settings: &PersistenceSettings,
) -> Result<Arc<dyn SlotStore>, InfraError> {
    match settings.backend {
        PersistenceBackend::Sqlite => Ok(Arc::new(SqliteSlotStore::new(database_path))),
        PersistenceBackend::Http => {
            let base_url = settings.base_url.as_deref().ok_or_else(|| {
                InfraError::InvalidConfig("http backend requires a base url".to_string())
            })?;
            let client = ReqwestSlotApiClient::new(base_url, settings.api_token.clone())?;
            Ok(Arc::new(client))
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleResponse {
    pub owner_id: String,
    pub timezone: String,
    pub window_mode: String,
    #[serde(flatten)]
    pub view: ScheduleView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_payload: Option<Vec<WireSlotRecord>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpenScheduleResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_reason: Option<String>,
    pub schedule: ScheduleResponse,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaveScheduleResponse {
    pub owner_id: String,
    pub record_count: usize,
    pub saved_at: String,
    pub dirty: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WindowDayResponse {
    pub day: String,
    pub weekday: String,
    pub short_weekday: String,
    pub day_of_month: u32,
    pub is_reference_day: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduleSettingsResponse {
    pub timezone: String,
    pub window_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_days: Option<usize>,
}

pub async fn open_schedule_impl(
    state: &AppState,
    owner_id: String,
) -> Result<OpenScheduleResponse, InfraError> {
    let owner_id = normalized_owner_id(&owner_id)?.to_string();
    let zone = read_editor_zone(state.config_dir())?;
    let service = state.schedule_service(zone);
    let records = service.load(&owner_id).await?;

    let mut sessions = lock_sessions(state)?;
    let editor = sessions
        .entry(owner_id.clone())
        .or_insert_with(|| SlotEditor::new(zone));
    if editor.zone() != zone {
        *editor = SlotEditor::new(zone);
    }

    let (status, recovery_reason) = match service.seed_loaded(&owner_id, editor, records) {
        LoadOutcome::Loaded(SeedOutcome::Seeded) => ("loaded", None),
        LoadOutcome::Loaded(SeedOutcome::Unchanged) | LoadOutcome::Empty(SeedOutcome::Unchanged) => {
            ("unchanged", None)
        }
        LoadOutcome::Empty(SeedOutcome::Seeded) => ("empty", None),
        LoadOutcome::Recovered { reason } => ("recovered", Some(reason)),
    };
    if let Some(reason) = recovery_reason.as_deref() {
        state.log_error(
            "open_schedule",
            &format!("{owner_id}: stored schedule unreadable, started empty: {reason}"),
        );
    }

    let window = current_window(state, zone, None)?;
    let schedule = schedule_response(state, &owner_id, editor, &window, None)?;
    drop(sessions);
    state.log_info("open_schedule", &format!("{owner_id}: {status}"));

    Ok(OpenScheduleResponse {
        status: status.to_string(),
        recovery_reason,
        schedule,
    })
}

pub fn get_schedule_impl(
    state: &AppState,
    owner_id: String,
    reference_date: Option<String>,
) -> Result<ScheduleResponse, InfraError> {
    let owner_id = normalized_owner_id(&owner_id)?.to_string();
    let sessions = lock_sessions(state)?;
    let editor = sessions.get(&owner_id).ok_or(SlotError::NotEditing)?;
    let window = current_window(state, editor.zone(), reference_date.as_deref())?;
    schedule_response(state, &owner_id, editor, &window, None)
}

pub fn add_time_impl(
    state: &AppState,
    owner_id: String,
    day: String,
    time: String,
) -> Result<ScheduleResponse, InfraError> {
    let day = DayKey::parse(&day)?;
    let time = required_time(time)?;
    edit_session(state, "add_time", &owner_id, |editor, _| {
        editor.add_time(day, time)
    })
}

pub fn remove_time_impl(
    state: &AppState,
    owner_id: String,
    day: String,
    index: usize,
) -> Result<ScheduleResponse, InfraError> {
    let day = DayKey::parse(&day)?;
    edit_session(state, "remove_time", &owner_id, |editor, _| {
        editor.remove_time(day, index)
    })
}

pub fn update_time_impl(
    state: &AppState,
    owner_id: String,
    day: String,
    index: usize,
    time: String,
) -> Result<ScheduleResponse, InfraError> {
    let day = DayKey::parse(&day)?;
    let time = required_time(time)?;
    edit_session(state, "update_time", &owner_id, |editor, _| {
        editor.update_time(day, index, time)
    })
}

pub fn clear_day_impl(
    state: &AppState,
    owner_id: String,
    day: String,
) -> Result<ScheduleResponse, InfraError> {
    let day = DayKey::parse(&day)?;
    edit_session(state, "clear_day", &owner_id, |editor, _| editor.clear_day(day))
}

pub fn apply_template_impl(
    state: &AppState,
    owner_id: String,
) -> Result<ScheduleResponse, InfraError> {
    edit_session(state, "apply_template", &owner_id, |editor, window| {
        editor.apply_template_to_all_days(&window.keys())
    })
}

pub fn revert_schedule_impl(
    state: &AppState,
    owner_id: String,
) -> Result<ScheduleResponse, InfraError> {
    edit_session(state, "revert_schedule", &owner_id, |editor, _| editor.revert())
}

pub fn discard_schedule_impl(state: &AppState, owner_id: String) -> Result<bool, InfraError> {
    let owner_id = normalized_owner_id(&owner_id)?.to_string();
    let discarded = lock_sessions(state)?
        .remove(&owner_id)
        .is_some_and(|mut editor| editor.discard());
    if discarded {
        state.log_info("discard_schedule", &format!("{owner_id}: session discarded"));
    }
    Ok(discarded)
}

pub async fn save_schedule_impl(
    state: &AppState,
    owner_id: String,
) -> Result<SaveScheduleResponse, InfraError> {
    let owner_id = normalized_owner_id(&owner_id)?.to_string();
    let (snapshot, zone) = {
        let sessions = lock_sessions(state)?;
        let editor = sessions.get(&owner_id).ok_or(SlotError::NotEditing)?;
        let snapshot = editor.current().cloned().ok_or(SlotError::NotEditing)?;
        (snapshot, editor.zone())
    };

    let ack = state.schedule_service(zone).save(&owner_id, &snapshot).await?;

    let dirty = {
        let mut sessions = lock_sessions(state)?;
        match sessions.get_mut(&owner_id) {
            Some(editor) => {
                editor.mark_saved(&snapshot);
                editor.is_dirty()
            }
            None => false,
        }
    };
    state.log_info(
        "save_schedule",
        &format!(
            "{owner_id}: saved {} records ({} slots)",
            ack.record_count,
            snapshot.total_slot_count()
        ),
    );

    Ok(SaveScheduleResponse {
        owner_id: ack.owner_id,
        record_count: ack.record_count,
        saved_at: ack.saved_at.to_rfc3339(),
        dirty,
    })
}

pub fn list_window_days_impl(
    state: &AppState,
    reference_date: Option<String>,
) -> Result<Vec<WindowDayResponse>, InfraError> {
    let zone = read_editor_zone(state.config_dir())?;
    let window = current_window(state, zone, reference_date.as_deref())?;
    Ok(window
        .days()
        .iter()
        .map(|day| WindowDayResponse {
            day: day.key.to_string(),
            weekday: day.weekday_name().to_string(),
            short_weekday: day.short_weekday_name().to_string(),
            day_of_month: day.day_of_month,
            is_reference_day: day.is_reference_day,
        })
        .collect())
}

pub fn time_label_options_impl() -> Vec<String> {
    default_time_labels()
        .into_iter()
        .map(|label| label.as_str().to_string())
        .collect()
}

pub fn update_schedule_settings_impl(
    state: &AppState,
    timezone: Option<String>,
    window_mode: Option<String>,
    window_days: Option<usize>,
) -> Result<ScheduleSettingsResponse, InfraError> {
    let window = match (window_mode.as_deref().map(str::trim), window_days) {
        (None, None) => None,
        (None, Some(days)) => Some(WindowMode::Rolling { days }),
        (Some(mode), days) => Some(parse_window_mode_input(mode, days)?),
    };
    save_schedule_settings(state.config_dir(), timezone.as_deref(), window)?;

    let zone = read_editor_zone(state.config_dir())?;
    let mode = read_window_mode(state.config_dir())?;
    state.log_info(
        "update_schedule_settings",
        &format!("timezone={} window={}", zone.name(), mode.as_str()),
    );
    Ok(settings_response(zone, mode))
}

fn parse_window_mode_input(mode: &str, days: Option<usize>) -> Result<WindowMode, InfraError> {
    match mode.to_ascii_lowercase().as_str() {
        "rolling" => Ok(WindowMode::Rolling {
            days: days.unwrap_or(DEFAULT_WINDOW_DAYS),
        }),
        "week" => Ok(WindowMode::CalendarWeek),
        other => Err(InfraError::InvalidConfig(format!(
            "window mode must be 'rolling' or 'week', got '{other}'"
        ))),
    }
}

fn settings_response(zone: EditorZone, mode: WindowMode) -> ScheduleSettingsResponse {
    ScheduleSettingsResponse {
        timezone: zone.name(),
        window_mode: mode.as_str().to_string(),
        window_days: match mode {
            WindowMode::Rolling { days } => Some(days),
            WindowMode::CalendarWeek => None,
        },
    }
}

fn edit_session<F>(
    state: &AppState,
    command: &str,
    owner_id: &str,
    mutate: F,
) -> Result<ScheduleResponse, InfraError>
where
    F: FnOnce(&mut SlotEditor, &DateWindow) -> Result<EditOutcome, SlotError>,
{
    let owner_id = normalized_owner_id(owner_id)?;
    let mut sessions = lock_sessions(state)?;
    let editor = sessions.get_mut(owner_id).ok_or(SlotError::NotEditing)?;
    let window = current_window(state, editor.zone(), None)?;

    let outcome = mutate(editor, &window)?;
    if let (true, Some(current)) = (outcome.changed(), editor.current()) {
        state.log_info(
            command,
            &format!(
                "{owner_id}: {} days, {} slots",
                current.day_count(),
                current.total_slot_count()
            ),
        );
    }
    schedule_response(state, owner_id, editor, &window, outcome.payload())
}

fn schedule_response(
    state: &AppState,
    owner_id: &str,
    editor: &SlotEditor,
    window: &DateWindow,
    changed_payload: Option<&[WireSlotRecord]>,
) -> Result<ScheduleResponse, InfraError> {
    let mode = read_window_mode(state.config_dir())?;
    Ok(ScheduleResponse {
        owner_id: owner_id.to_string(),
        timezone: editor.zone().name(),
        window_mode: mode.as_str().to_string(),
        view: editor.view(window)?,
        changed_payload: changed_payload.map(<[WireSlotRecord]>::to_vec),
    })
}

fn current_window(
    state: &AppState,
    zone: EditorZone,
    reference_date: Option<&str>,
) -> Result<DateWindow, InfraError> {
    let reference = match reference_date.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => DayKey::parse(value)?,
        None => zone.today((state.now_provider)()),
    };
    let mode = read_window_mode(state.config_dir())?;
    Ok(DateWindow::for_mode(mode, reference))
}

fn required_time(time: String) -> Result<TimeLabel, InfraError> {
    let trimmed = time.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig("time must not be empty".to_string()));
    }
    Ok(TimeLabel::new(trimmed))
}

fn lock_sessions(state: &AppState) -> Result<MutexGuard<'_, HashMap<String, SlotEditor>>, InfraError> {
    state
        .sessions
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("session lock poisoned: {error}")))
}
