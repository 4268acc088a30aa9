use crate::domain::date_window::DateWindow;
use crate::domain::models::{DayKey, EditorZone, SlotError, SlotSet, TimeLabel, MAX_SLOTS_PER_DAY};
use crate::domain::template::apply_template_to_all_days;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_mapper::{decode_slot_records, encode_slot_set, WireSlotRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    Changed { payload: Vec<WireSlotRecord> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditOutcome {
    pub event: Option<SlotEvent>,
}

impl EditOutcome {
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }

    pub fn payload(&self) -> Option<&[WireSlotRecord]> {
        match &self.event {
            Some(SlotEvent::Changed { payload }) => Some(payload),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded,
    /// Same schedule as the last seed; in-progress edits were kept.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayRow {
    pub day: String,
    pub weekday: &'static str,
    pub day_of_month: u32,
    pub is_reference_day: bool,
    pub times: Vec<String>,
    pub can_add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    pub days: Vec<DayRow>,
    pub day_count: usize,
    pub total_slot_count: usize,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    seeded: SlotSet,
    current: SlotSet,
    dirty: bool,
}

#[derive(Debug, Clone)]
pub struct SlotEditor {
    zone: EditorZone,
    session: Option<Session>,
}

impl SlotEditor {
    pub fn new(zone: EditorZone) -> Self {
        Self {
            zone,
            session: None,
        }
    }

    pub fn zone(&self) -> EditorZone {
        self.zone
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.dirty)
    }

    pub fn current(&self) -> Option<&SlotSet> {
        self.session.as_ref().map(|session| &session.current)
    }

    pub fn seeded(&self) -> Option<&SlotSet> {
        self.session.as_ref().map(|session| &session.seeded)
    }

    pub fn seed(&mut self, payload: &[WireSlotRecord]) -> Result<SeedOutcome, InfraError> {
        let decoded = decode_slot_records(payload, self.zone)?;
        Ok(self.seed_set(decoded))
    }

    pub fn seed_set(&mut self, set: SlotSet) -> SeedOutcome {
        if let Some(session) = &self.session {
            if session.seeded == set {
                log::debug!("reseed with identical schedule ignored (dirty={})", session.dirty);
                return SeedOutcome::Unchanged;
            }
        }

        self.session = Some(Session {
            seeded: set.clone(),
            current: set,
            dirty: false,
        });
        SeedOutcome::Seeded
    }

    pub fn add_time(&mut self, day: DayKey, time: TimeLabel) -> Result<EditOutcome, SlotError> {
        let next = self.current_or_err()?.with_time_added(day, time)?;
        self.commit(next)
    }

    pub fn remove_time(&mut self, day: DayKey, index: usize) -> Result<EditOutcome, SlotError> {
        let next = self.current_or_err()?.with_time_removed_at(day, index);
        self.commit(next)
    }

    pub fn update_time(
        &mut self,
        day: DayKey,
        index: usize,
        time: TimeLabel,
    ) -> Result<EditOutcome, SlotError> {
        let next = self.current_or_err()?.with_time_updated_at(day, index, time);
        self.commit(next)
    }

    pub fn clear_day(&mut self, day: DayKey) -> Result<EditOutcome, SlotError> {
        let next = self.current_or_err()?.with_day_cleared(day);
        self.commit(next)
    }

    pub fn apply_template_to_all_days(
        &mut self,
        window: &[DayKey],
    ) -> Result<EditOutcome, SlotError> {
        let next = apply_template_to_all_days(self.current_or_err()?, window);
        self.commit(next)
    }

    pub fn revert(&mut self) -> Result<EditOutcome, SlotError> {
        let seeded = self
            .session
            .as_ref()
            .map(|session| session.seeded.clone())
            .ok_or(SlotError::NotEditing)?;
        let outcome = self.commit(seeded)?;
        if let Some(session) = self.session.as_mut() {
            session.dirty = false;
        }
        Ok(outcome)
    }

    pub fn discard(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Records that `saved` reached storage.
    ///
    /// The dirty flag only clears when nothing was edited since `saved` was taken.
    pub fn mark_saved(&mut self, saved: &SlotSet) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.seeded = saved.clone();
        if session.current == *saved {
            session.dirty = false;
            return true;
        }
        false
    }

    pub fn view(&self, window: &DateWindow) -> Result<ScheduleView, SlotError> {
        let session = self.session.as_ref().ok_or(SlotError::NotEditing)?;
        let days = window
            .days()
            .iter()
            .map(|window_day| {
                let times = session.current.get(window_day.key);
                DayRow {
                    day: window_day.key.to_string(),
                    weekday: window_day.weekday_name(),
                    day_of_month: window_day.day_of_month,
                    is_reference_day: window_day.is_reference_day,
                    times: times.iter().map(|time| time.as_str().to_string()).collect(),
                    can_add: times.len() < MAX_SLOTS_PER_DAY,
                }
            })
            .collect();

        Ok(ScheduleView {
            days,
            day_count: session.current.day_count(),
            total_slot_count: session.current.total_slot_count(),
            dirty: session.dirty,
        })
    }

    fn current_or_err(&self) -> Result<&SlotSet, SlotError> {
        self.current().ok_or(SlotError::NotEditing)
    }

    fn commit(&mut self, next: SlotSet) -> Result<EditOutcome, SlotError> {
        let zone = self.zone;
        let session = self.session.as_mut().ok_or(SlotError::NotEditing)?;
        if session.current == next {
            return Ok(EditOutcome::default());
        }

        session.current = next;
        session.dirty = true;
        let payload = encode_slot_set(&session.current, zone);
        log::debug!(
            "schedule changed: {} days, {} slots",
            session.current.day_count(),
            session.current.total_slot_count()
        );
        Ok(EditOutcome {
            event: Some(SlotEvent::Changed { payload }),
        })
    }
}
