use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_mapper::WireSlotRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveAck {
    pub owner_id: String,
    pub record_count: usize,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// `Ok(None)` means the owner has no schedule yet.
    async fn load_slots(&self, owner_id: &str) -> Result<Option<Vec<WireSlotRecord>>, InfraError>;

    async fn save_slots(
        &self,
        owner_id: &str,
        records: &[WireSlotRecord],
    ) -> Result<SaveAck, InfraError>;
}

pub fn normalized_owner_id(owner_id: &str) -> Result<&str, InfraError> {
    let normalized = owner_id.trim();
    if normalized.is_empty() {
        return Err(InfraError::InvalidConfig(
            "owner_id must not be empty".to_string(),
        ));
    }
    Ok(normalized)
}

#[derive(Debug, Clone)]
pub struct SqliteSlotStore {
    db_path: PathBuf,
}

impl SqliteSlotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

#[async_trait]
impl SlotStore for SqliteSlotStore {
    async fn load_slots(&self, owner_id: &str) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
        let owner_id = normalized_owner_id(owner_id)?;
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM slot_schedules WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let records = serde_json::from_str::<Vec<WireSlotRecord>>(&payload)?;
        Ok(Some(records))
    }

    async fn save_slots(
        &self,
        owner_id: &str,
        records: &[WireSlotRecord],
    ) -> Result<SaveAck, InfraError> {
        let owner_id = normalized_owner_id(owner_id)?;
        let payload = serde_json::to_string(records)?;
        let saved_at = Utc::now();
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO slot_schedules (owner_id, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            params![owner_id, payload, saved_at.to_rfc3339()],
        )?;

        Ok(SaveAck {
            owner_id: owner_id.to_string(),
            record_count: records.len(),
            saved_at,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemorySlotStore {
    schedules: Mutex<HashMap<String, Vec<WireSlotRecord>>>,
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn load_slots(&self, owner_id: &str) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
        let owner_id = normalized_owner_id(owner_id)?;
        let schedules = self
            .schedules
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("slot store lock poisoned: {error}")))?;
        Ok(schedules.get(owner_id).cloned())
    }

    async fn save_slots(
        &self,
        owner_id: &str,
        records: &[WireSlotRecord],
    ) -> Result<SaveAck, InfraError> {
        let owner_id = normalized_owner_id(owner_id)?;
        let mut schedules = self
            .schedules
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("slot store lock poisoned: {error}")))?;
        schedules.insert(owner_id.to_string(), records.to_vec());
        Ok(SaveAck {
            owner_id: owner_id.to_string(),
            record_count: records.len(),
            saved_at: Utc::now(),
        })
    }
}
