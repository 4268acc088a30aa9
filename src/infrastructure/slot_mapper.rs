use crate::domain::models::{DayKey, DaySlots, EditorZone, SlotSet, TimeLabel, MAX_SLOTS_PER_DAY};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
const JS_DATE_STRING_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WireDate {
    Text(String),
    EpochMillis(f64),
    Other(serde_json::Value),
    #[default]
    Missing,
}

impl From<&str> for WireDate {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WireTimes {
    Labels(Vec<TimeLabel>),
    Other(serde_json::Value),
}

impl Default for WireTimes {
    fn default() -> Self {
        Self::Labels(Vec::new())
    }
}

impl From<Vec<TimeLabel>> for WireTimes {
    fn from(labels: Vec<TimeLabel>) -> Self {
        Self::Labels(labels)
    }
}

impl FromIterator<TimeLabel> for WireTimes {
    fn from_iter<I: IntoIterator<Item = TimeLabel>>(iter: I) -> Self {
        Self::Labels(iter.into_iter().collect())
    }
}

impl WireTimes {
    pub fn labels(&self) -> Option<&[TimeLabel]> {
        match self {
            Self::Labels(labels) => Some(labels),
            Self::Other(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels().is_some_and(|labels| labels.is_empty())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct WireSlotRecord {
    #[serde(default)]
    pub date: WireDate,
    #[serde(default)]
    pub times: WireTimes,
}

pub fn decode_slot_records(
    records: &[WireSlotRecord],
    zone: EditorZone,
) -> Result<SlotSet, InfraError> {
    let mut days = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let day = parse_wire_date(&record.date, zone)
            .map_err(|reason| InfraError::InvalidRecord { index, reason })?;
        let times = match &record.times {
            WireTimes::Labels(labels) => labels,
            WireTimes::Other(other) => {
                return Err(InfraError::InvalidRecord {
                    index,
                    reason: format!("times must be a list of strings, got {other}"),
                });
            }
        };
        if times.is_empty() {
            continue;
        }
        let slots = DaySlots::from_labels(times.clone()).ok_or_else(|| {
            InfraError::InvalidRecord {
                index,
                reason: format!(
                    "{} times for {day} exceed the limit of {MAX_SLOTS_PER_DAY}",
                    times.len()
                ),
            }
        })?;
        days.push((day, slots));
    }
    Ok(days.into_iter().collect())
}

pub fn encode_slot_set(set: &SlotSet, zone: EditorZone) -> Vec<WireSlotRecord> {
    set.iter()
        .map(|(day, slots)| WireSlotRecord {
            date: WireDate::Text(zone.midnight(day).to_rfc3339()),
            times: WireTimes::from(slots.as_slice().to_vec()),
        })
        .collect()
}

/// Encoding used for the outbound save call.
///
/// The schedule API rejects an empty list, so an empty set is sent as a single placeholder
/// record for `today` with no times.
pub fn encode_for_save(set: &SlotSet, zone: EditorZone, today: DayKey) -> Vec<WireSlotRecord> {
    let records = encode_slot_set(set, zone);
    if !records.is_empty() {
        return records;
    }
    vec![WireSlotRecord {
        date: WireDate::Text(zone.midnight(today).to_rfc3339()),
        times: WireTimes::default(),
    }]
}

pub fn parse_wire_date(value: &WireDate, zone: EditorZone) -> Result<DayKey, String> {
    match value {
        WireDate::Text(raw) => parse_date_text(raw, zone),
        WireDate::EpochMillis(millis) => {
            if !millis.is_finite() {
                return Err(format!("invalid epoch milliseconds {millis}"));
            }
            DateTime::<Utc>::from_timestamp_millis(millis.trunc() as i64)
                .map(|instant| zone.day_of(&instant))
                .ok_or_else(|| format!("epoch milliseconds out of range: {millis}"))
        }
        WireDate::Other(other) => Err(format!("unsupported date value {other}")),
        WireDate::Missing => Err("missing date".to_string()),
    }
}

fn parse_date_text(raw: &str, zone: EditorZone) -> Result<DayKey, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("date must not be empty".to_string());
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(zone.day_of(&instant));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(DayKey::new(date));
    }
    if let Some(naive) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Ok(DayKey::new(naive.date()));
    }
    if let Ok(instant) = DateTime::parse_from_rfc2822(value) {
        return Ok(zone.day_of(&instant));
    }

    // Date.prototype.toString(), e.g. "Mon Jun 10 2024 00:00:00 GMT+0200 (Central European Summer Time)"
    let without_zone_name = value.split(" (").next().unwrap_or(value);
    if let Ok(instant) = DateTime::parse_from_str(without_zone_name, JS_DATE_STRING_FORMAT) {
        return Ok(zone.day_of(&instant));
    }

    Err(format!("unrecognized date '{value}'"))
}
