use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_SLOTS_PER_DAY: usize = 2;

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("maximum {capacity} slots per day: {day} is already full")]
    CapacityExceeded { day: DayKey, capacity: usize },
    #[error("no schedule edit session is active")]
    NotEditing,
    #[error("day must be YYYY-MM-DD: '{0}'")]
    InvalidDayKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn parse(value: &str) -> Result<Self, SlotError> {
        NaiveDate::parse_from_str(value.trim(), DAY_KEY_FORMAT)
            .map(Self)
            .map_err(|_| SlotError::InvalidDayKey(value.to_string()))
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for DayKey {
    type Err = SlotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_KEY_FORMAT))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeLabel(String);

impl TimeLabel {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_standard(&self) -> bool {
        let Some((clock, meridiem)) = self.0.split_once(' ') else {
            return false;
        };
        if meridiem != "AM" && meridiem != "PM" {
            return false;
        }
        let Some((hour, minute)) = clock.split_once(':') else {
            return false;
        };
        if hour.is_empty() || hour.len() > 2 || hour.starts_with('0') || minute.len() != 2 {
            return false;
        }
        let (Ok(hour), Ok(minute)) = (hour.parse::<u8>(), minute.parse::<u8>()) else {
            return false;
        };
        (1..=12).contains(&hour) && minute < 60
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimeLabel {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TimeLabel {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySlots(Vec<TimeLabel>);

impl DaySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: Vec<TimeLabel>) -> Option<Self> {
        if labels.len() > MAX_SLOTS_PER_DAY {
            return None;
        }
        Some(Self(labels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.0.len() >= MAX_SLOTS_PER_DAY
    }

    pub fn get(&self, index: usize) -> Option<&TimeLabel> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeLabel> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[TimeLabel] {
        &self.0
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|label| label.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    days: BTreeMap<DayKey, DaySlots>,
}

impl SlotSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, day: DayKey) -> &[TimeLabel] {
        self.days
            .get(&day)
            .map(DaySlots::as_slice)
            .unwrap_or_default()
    }

    pub fn day(&self, day: DayKey) -> Option<&DaySlots> {
        self.days.get(&day)
    }

    pub fn contains_day(&self, day: DayKey) -> bool {
        self.days.contains_key(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = DayKey> + '_ {
        self.days.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DayKey, &DaySlots)> {
        self.days.iter().map(|(day, slots)| (*day, slots))
    }

    pub fn with_time_added(&self, day: DayKey, time: TimeLabel) -> Result<SlotSet, SlotError> {
        let mut slots = self.days.get(&day).cloned().unwrap_or_default();
        if slots.is_full() {
            return Err(SlotError::CapacityExceeded {
                day,
                capacity: MAX_SLOTS_PER_DAY,
            });
        }
        slots.0.push(time);

        let mut next = self.clone();
        next.days.insert(day, slots);
        Ok(next)
    }

    pub fn with_time_removed_at(&self, day: DayKey, index: usize) -> SlotSet {
        let Some(slots) = self.days.get(&day) else {
            return self.clone();
        };
        if index >= slots.len() {
            return self.clone();
        }

        let mut remaining = slots.clone();
        remaining.0.remove(index);
        self.with_day_replaced(day, remaining)
    }

    pub fn with_time_updated_at(&self, day: DayKey, index: usize, time: TimeLabel) -> SlotSet {
        let mut next = self.clone();
        if let Some(slot) = next
            .days
            .get_mut(&day)
            .and_then(|slots| slots.0.get_mut(index))
        {
            *slot = time;
        }
        next
    }

    pub fn with_day_cleared(&self, day: DayKey) -> SlotSet {
        let mut next = self.clone();
        next.days.remove(&day);
        next
    }

    pub fn with_day_replaced(&self, day: DayKey, slots: DaySlots) -> SlotSet {
        let mut next = self.clone();
        if slots.is_empty() {
            next.days.remove(&day);
        } else {
            next.days.insert(day, slots);
        }
        next
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn total_slot_count(&self) -> usize {
        self.days.values().map(DaySlots::len).sum()
    }
}

impl FromIterator<(DayKey, DaySlots)> for SlotSet {
    fn from_iter<I: IntoIterator<Item = (DayKey, DaySlots)>>(iter: I) -> Self {
        Self {
            days: iter
                .into_iter()
                .filter(|(_, slots)| !slots.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorZone {
    #[default]
    Local,
    Named(Tz),
}

impl EditorZone {
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        value
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|error| format!("unknown timezone '{value}': {error}"))
    }

    pub fn name(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Named(tz) => tz.name().to_string(),
        }
    }

    pub fn day_of<Z: TimeZone>(&self, instant: &DateTime<Z>) -> DayKey {
        let date = match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Named(tz) => instant.with_timezone(tz).date_naive(),
        };
        DayKey(date)
    }

    pub fn today(&self, now: DateTime<Utc>) -> DayKey {
        self.day_of(&now)
    }

    pub fn midnight(&self, day: DayKey) -> DateTime<FixedOffset> {
        match self {
            Self::Local => start_of_day(&Local, day.0),
            Self::Named(tz) => start_of_day(tz, day.0),
        }
    }
}

fn start_of_day<Z: TimeZone>(zone: &Z, date: NaiveDate) -> DateTime<FixedOffset> {
    let midnight = date.and_time(NaiveTime::MIN);
    // Zones that skip midnight on a DST switch start the day an hour later.
    zone.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| zone.from_utc_datetime(&midnight))
        .fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(value: &str) -> DayKey {
        DayKey::parse(value).expect("valid day key")
    }

    fn label(value: &str) -> TimeLabel {
        TimeLabel::from(value)
    }

    fn full_day_set() -> SlotSet {
        SlotSet::empty()
            .with_time_added(day("2024-06-10"), label("9:00 AM"))
            .expect("first slot")
            .with_time_added(day("2024-06-10"), label("10:00 AM"))
            .expect("second slot")
    }

    #[test]
    fn day_key_parses_and_displays_iso_date() {
        let key = day(" 2024-06-10 ");
        assert_eq!(key.to_string(), "2024-06-10");
        assert!(matches!(
            DayKey::parse("10/06/2024"),
            Err(SlotError::InvalidDayKey(_))
        ));
    }

    #[test]
    fn get_returns_empty_for_absent_day() {
        let set = SlotSet::empty();
        assert!(set.get(day("2024-06-10")).is_empty());
        assert!(set.day(day("2024-06-10")).is_none());
    }

    #[test]
    fn add_appends_in_insertion_order() {
        let set = SlotSet::empty()
            .with_time_added(day("2024-06-10"), label("5:00 PM"))
            .expect("add")
            .with_time_added(day("2024-06-10"), label("9:00 AM"))
            .expect("add");
        assert_eq!(set.get(day("2024-06-10")), &[label("5:00 PM"), label("9:00 AM")]);
    }

    #[test]
    fn add_rejects_third_time_and_leaves_input_untouched() {
        let set = full_day_set();
        let result = set.with_time_added(day("2024-06-10"), label("11:00 AM"));

        assert_eq!(
            result,
            Err(SlotError::CapacityExceeded {
                day: day("2024-06-10"),
                capacity: MAX_SLOTS_PER_DAY,
            })
        );
        assert_eq!(set, full_day_set());
    }

    #[test]
    fn capacity_error_message_names_the_limit() {
        let error = full_day_set()
            .with_time_added(day("2024-06-10"), label("1:00 PM"))
            .expect_err("full day");
        assert!(error.to_string().contains("maximum 2 slots per day"));
    }

    #[test]
    fn remove_prunes_day_when_last_time_goes() {
        let set = full_day_set()
            .with_time_removed_at(day("2024-06-10"), 0)
            .with_time_removed_at(day("2024-06-10"), 0);
        assert!(!set.contains_day(day("2024-06-10")));
        assert_eq!(set.day_count(), 0);
    }

    #[test]
    fn remove_with_stale_index_is_noop() {
        let set = SlotSet::empty()
            .with_time_added(day("2024-06-10"), label("9:00 AM"))
            .expect("add");
        assert_eq!(set.with_time_removed_at(day("2024-06-10"), 99), set);
        assert_eq!(set.with_time_removed_at(day("2024-06-11"), 0), set);
    }

    #[test]
    fn update_replaces_in_place_and_ignores_stale_index() {
        let set = full_day_set();
        let updated = set.with_time_updated_at(day("2024-06-10"), 1, label("4:30 PM"));
        assert_eq!(updated.get(day("2024-06-10")), &[label("9:00 AM"), label("4:30 PM")]);
        assert_eq!(set.with_time_updated_at(day("2024-06-10"), 2, label("x")), set);
        assert_eq!(set.with_time_updated_at(day("2024-06-12"), 0, label("x")), set);
    }

    #[test]
    fn clear_day_and_aggregates() {
        let set = full_day_set()
            .with_time_added(day("2024-06-11"), label("1:00 PM"))
            .expect("add");
        assert_eq!(set.day_count(), 2);
        assert_eq!(set.total_slot_count(), 3);

        let cleared = set.with_day_cleared(day("2024-06-10"));
        assert_eq!(cleared.day_count(), 1);
        assert_eq!(cleared.total_slot_count(), 1);
        assert_eq!(cleared.with_day_cleared(day("2024-06-30")), cleared);
    }

    #[test]
    fn day_slots_reject_over_capacity_lists() {
        assert!(DaySlots::from_labels(vec![label("a"), label("b")]).is_some());
        assert!(DaySlots::from_labels(vec![label("a"), label("b"), label("c")]).is_none());
    }

    #[test]
    fn from_iterator_skips_empty_days_and_keeps_last_duplicate() {
        let set: SlotSet = vec![
            (day("2024-06-10"), DaySlots::from_labels(vec![label("9:00 AM")]).expect("slots")),
            (day("2024-06-11"), DaySlots::new()),
            (day("2024-06-10"), DaySlots::from_labels(vec![label("2:00 PM")]).expect("slots")),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.day_count(), 1);
        assert_eq!(set.get(day("2024-06-10")), &[label("2:00 PM")]);
    }

    #[test]
    fn time_label_standard_shape() {
        assert!(label("9:00 AM").is_standard());
        assert!(label("12:30 PM").is_standard());
        assert!(!label("09:00 AM").is_standard());
        assert!(!label("13:00 PM").is_standard());
        assert!(!label("9:00").is_standard());
        assert!(!label("after lunch").is_standard());
    }

    #[test]
    fn editor_zone_truncates_and_materializes_midnight() {
        let zone = EditorZone::parse("Asia/Tokyo").expect("zone");
        let instant = DateTime::parse_from_rfc3339("2024-06-10T20:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        assert_eq!(zone.day_of(&instant), day("2024-06-11"));

        let midnight = zone.midnight(day("2024-06-11"));
        assert_eq!(midnight.to_rfc3339(), "2024-06-11T00:00:00+09:00");
        assert_eq!(zone.day_of(&midnight), day("2024-06-11"));
    }

    #[test]
    fn editor_zone_parses_local_and_rejects_unknown() {
        assert_eq!(EditorZone::parse("local"), Ok(EditorZone::Local));
        assert_eq!(EditorZone::parse(""), Ok(EditorZone::Local));
        assert!(EditorZone::parse("Mars/Olympus").is_err());
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Add(u8, u8),
        Remove(u8, usize),
        Update(u8, usize, u8),
    }

    fn edit_strategy() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (0u8..5, 0u8..10).prop_map(|(d, t)| Edit::Add(d, t)),
            (0u8..5, 0usize..4).prop_map(|(d, i)| Edit::Remove(d, i)),
            (0u8..5, 0usize..4, 0u8..10).prop_map(|(d, i, t)| Edit::Update(d, i, t)),
        ]
    }

    fn nth_day(offset: u8) -> DayKey {
        let base = NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date");
        DayKey::new(base + Duration::days(offset as i64))
    }

    // Capacity and pruning hold for any reachable set.
    proptest! {
        #[test]
        fn any_edit_sequence_keeps_days_within_capacity(edits in prop::collection::vec(edit_strategy(), 0..60)) {
            let mut set = SlotSet::empty();
            for edit in edits {
                set = match edit {
                    Edit::Add(d, t) => {
                        let before = set.clone();
                        match set.with_time_added(nth_day(d), TimeLabel::new(format!("{t}:00 AM"))) {
                            Ok(next) => next,
                            Err(SlotError::CapacityExceeded { .. }) => {
                                prop_assert_eq!(before.get(nth_day(d)).len(), MAX_SLOTS_PER_DAY);
                                before
                            }
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    Edit::Remove(d, i) => set.with_time_removed_at(nth_day(d), i),
                    Edit::Update(d, i, t) => {
                        set.with_time_updated_at(nth_day(d), i, TimeLabel::new(format!("{t}:30 PM")))
                    }
                };
                for (_, slots) in set.iter() {
                    prop_assert!(!slots.is_empty());
                    prop_assert!(slots.len() <= MAX_SLOTS_PER_DAY);
                }
            }
        }

        #[test]
        fn removing_until_empty_drops_the_key(count in 1usize..=2, d in 0u8..5) {
            let mut set = SlotSet::empty();
            for n in 0..count {
                set = set.with_time_added(nth_day(d), TimeLabel::new(format!("{n}:00 PM"))).expect("add");
            }
            for _ in 0..count {
                set = set.with_time_removed_at(nth_day(d), 0);
            }
            prop_assert!(!set.keys().any(|key| key == nth_day(d)));
        }
    }
}
