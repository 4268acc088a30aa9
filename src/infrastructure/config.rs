use crate::domain::date_window::{WindowMode, DEFAULT_WINDOW_DAYS};
use crate::domain::models::EditorZone;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const PERSISTENCE_JSON: &str = "persistence.json";
const MAX_ROLLING_WINDOW_DAYS: u64 = 31;
const DEFAULT_RETRY_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

const API_BASE_URL_KEYS: [&str; 2] = ["SLOTBOOK_API_BASE_URL", "SLOTS_API_BASE_URL"];
const API_TOKEN_KEYS: [&str; 2] = ["SLOTBOOK_API_TOKEN", "SLOTS_API_TOKEN"];
const BACKEND_KEYS: [&str; 1] = ["SLOTBOOK_STORE_BACKEND"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub persistence: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    Sqlite,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    pub backend: PersistenceBackend,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub retry_max_attempts: u8,
    pub retry_base_delay_ms: u64,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Slotbook",
                "timezone": "local",
                "window": {
                    "mode": "rolling",
                    "days": DEFAULT_WINDOW_DAYS
                }
            }),
        ),
        (
            PERSISTENCE_JSON,
            serde_json::json!({
                "schema": 1,
                "backend": "sqlite",
                "baseUrl": null,
                "retry": {
                    "maxAttempts": DEFAULT_RETRY_MAX_ATTEMPTS,
                    "baseDelayMs": DEFAULT_RETRY_BASE_DELAY_MS
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        persistence: read_config(&config_dir.join(PERSISTENCE_JSON))?,
    })
}

pub fn read_editor_zone(config_dir: &Path) -> Result<EditorZone, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("local");
    EditorZone::parse(name).map_err(InfraError::InvalidConfig)
}

pub fn read_window_mode(config_dir: &Path) -> Result<WindowMode, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let Some(window) = app.get("window") else {
        return Ok(WindowMode::default());
    };
    parse_window_mode(window)
}

fn parse_window_mode(window: &serde_json::Value) -> Result<WindowMode, InfraError> {
    let mode = window
        .get("mode")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or("rolling");
    match mode.to_ascii_lowercase().as_str() {
        "rolling" => {
            let days = window
                .get("days")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(DEFAULT_WINDOW_DAYS as u64);
            if days == 0 || days > MAX_ROLLING_WINDOW_DAYS {
                return Err(InfraError::InvalidConfig(format!(
                    "window.days must be between 1 and {MAX_ROLLING_WINDOW_DAYS}"
                )));
            }
            Ok(WindowMode::Rolling {
                days: days as usize,
            })
        }
        "week" => Ok(WindowMode::CalendarWeek),
        other => Err(InfraError::InvalidConfig(format!(
            "window.mode must be 'rolling' or 'week', got '{other}'"
        ))),
    }
}

pub fn save_schedule_settings(
    config_dir: &Path,
    timezone: Option<&str>,
    window: Option<WindowMode>,
) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;

    if let Some(timezone) = timezone {
        let zone = EditorZone::parse(timezone).map_err(InfraError::InvalidConfig)?;
        object.insert("timezone".to_string(), serde_json::Value::String(zone.name()));
    }

    if let Some(window) = window {
        let value = match window {
            WindowMode::Rolling { days } => {
                if days == 0 || days as u64 > MAX_ROLLING_WINDOW_DAYS {
                    return Err(InfraError::InvalidConfig(format!(
                        "window.days must be between 1 and {MAX_ROLLING_WINDOW_DAYS}"
                    )));
                }
                serde_json::json!({ "mode": "rolling", "days": days })
            }
            WindowMode::CalendarWeek => serde_json::json!({ "mode": "week" }),
        };
        object.insert("window".to_string(), value);
    }

    write_config(&path, &app)
}

pub fn read_persistence_settings(config_dir: &Path) -> Result<PersistenceSettings, InfraError> {
    read_persistence_settings_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn read_persistence_settings_with_lookup<F>(
    config_dir: &Path,
    lookup: F,
) -> Result<PersistenceSettings, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let persistence = read_config(&config_dir.join(PERSISTENCE_JSON))?;

    let backend_name = optional_lookup_value(&lookup, &BACKEND_KEYS).unwrap_or_else(|| {
        persistence
            .get("backend")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("sqlite")
            .to_string()
    });
    let backend = match backend_name.trim().to_ascii_lowercase().as_str() {
        "sqlite" => PersistenceBackend::Sqlite,
        "http" => PersistenceBackend::Http,
        other => {
            return Err(InfraError::InvalidConfig(format!(
                "backend must be 'sqlite' or 'http', got '{other}'"
            )));
        }
    };

    let base_url = optional_lookup_value(&lookup, &API_BASE_URL_KEYS).or_else(|| {
        persistence
            .get("baseUrl")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    });
    if backend == PersistenceBackend::Http && base_url.is_none() {
        return Err(InfraError::InvalidConfig(format!(
            "missing slot api base url (set baseUrl in {PERSISTENCE_JSON} or one of: {})",
            API_BASE_URL_KEYS.join(", ")
        )));
    }

    let retry = persistence.get("retry");
    let retry_max_attempts = retry
        .and_then(|retry| retry.get("maxAttempts"))
        .and_then(serde_json::Value::as_u64)
        .map(|value| value.clamp(1, u8::MAX as u64) as u8)
        .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
    let retry_base_delay_ms = retry
        .and_then(|retry| retry.get("baseDelayMs"))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);

    Ok(PersistenceSettings {
        backend,
        base_url,
        api_token: optional_lookup_value(&lookup, &API_TOKEN_KEYS),
        retry_max_attempts,
        retry_base_delay_ms,
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
