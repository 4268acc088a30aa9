pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    add_time_impl, apply_template_impl, clear_day_impl, discard_schedule_impl, get_schedule_impl,
    list_window_days_impl, open_schedule_impl, remove_time_impl, revert_schedule_impl,
    save_schedule_impl, time_label_options_impl, update_schedule_settings_impl, update_time_impl,
};
use serde::Serialize;
use std::path::PathBuf;

pub use application::commands::{
    AppState, OpenScheduleResponse, SaveScheduleResponse, ScheduleResponse,
    ScheduleSettingsResponse, WindowDayResponse,
};
pub use application::slot_editor::{DayRow, ScheduleView};
pub use infrastructure::error::InfraError;

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub workspace_root: String,
    pub database_path: String,
}

fn workspace_root(root: Option<String>) -> Result<PathBuf, String> {
    match root {
        Some(path) => Ok(PathBuf::from(path)),
        None => std::env::current_dir().map_err(|error| error.to_string()),
    }
}

pub fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let result = bootstrap_workspace(&workspace_root(root)?).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

pub fn init_app_state(root: Option<String>) -> Result<AppState, String> {
    AppState::new(workspace_root(root)?).map_err(|error| error.to_string())
}

pub fn ping() -> &'static str {
    "pong"
}

pub async fn open_schedule(
    state: &AppState,
    owner_id: String,
) -> Result<OpenScheduleResponse, String> {
    open_schedule_impl(state, owner_id)
        .await
        .map_err(|error| state.command_error("open_schedule", &error))
}

pub fn get_schedule(
    state: &AppState,
    owner_id: String,
    reference_date: Option<String>,
) -> Result<ScheduleResponse, String> {
    get_schedule_impl(state, owner_id, reference_date)
        .map_err(|error| state.command_error("get_schedule", &error))
}

pub fn add_time(
    state: &AppState,
    owner_id: String,
    day: String,
    time: String,
) -> Result<ScheduleResponse, String> {
    add_time_impl(state, owner_id, day, time)
        .map_err(|error| state.command_error("add_time", &error))
}

pub fn remove_time(
    state: &AppState,
    owner_id: String,
    day: String,
    index: usize,
) -> Result<ScheduleResponse, String> {
    remove_time_impl(state, owner_id, day, index)
        .map_err(|error| state.command_error("remove_time", &error))
}

pub fn update_time(
    state: &AppState,
    owner_id: String,
    day: String,
    index: usize,
    time: String,
) -> Result<ScheduleResponse, String> {
    update_time_impl(state, owner_id, day, index, time)
        .map_err(|error| state.command_error("update_time", &error))
}

pub fn clear_day(
    state: &AppState,
    owner_id: String,
    day: String,
) -> Result<ScheduleResponse, String> {
    clear_day_impl(state, owner_id, day).map_err(|error| state.command_error("clear_day", &error))
}

pub fn apply_template(state: &AppState, owner_id: String) -> Result<ScheduleResponse, String> {
    apply_template_impl(state, owner_id)
        .map_err(|error| state.command_error("apply_template", &error))
}

pub fn revert_schedule(state: &AppState, owner_id: String) -> Result<ScheduleResponse, String> {
    revert_schedule_impl(state, owner_id)
        .map_err(|error| state.command_error("revert_schedule", &error))
}

pub fn discard_schedule(state: &AppState, owner_id: String) -> Result<bool, String> {
    discard_schedule_impl(state, owner_id)
        .map_err(|error| state.command_error("discard_schedule", &error))
}

pub async fn save_schedule(
    state: &AppState,
    owner_id: String,
) -> Result<SaveScheduleResponse, String> {
    save_schedule_impl(state, owner_id)
        .await
        .map_err(|error| state.command_error("save_schedule", &error))
}

pub fn list_window_days(
    state: &AppState,
    reference_date: Option<String>,
) -> Result<Vec<WindowDayResponse>, String> {
    list_window_days_impl(state, reference_date)
        .map_err(|error| state.command_error("list_window_days", &error))
}

pub fn time_label_options() -> Vec<String> {
    time_label_options_impl()
}

pub fn update_schedule_settings(
    state: &AppState,
    timezone: Option<String>,
    window_mode: Option<String>,
    window_days: Option<usize>,
) -> Result<ScheduleSettingsResponse, String> {
    update_schedule_settings_impl(state, timezone, window_mode, window_days)
        .map_err(|error| state.command_error("update_schedule_settings", &error))
}
