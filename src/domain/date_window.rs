use crate::domain::models::DayKey;
use chrono::{Datelike, Days, Weekday};

pub const DEFAULT_WINDOW_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Rolling { days: usize },
    CalendarWeek,
}

impl Default for WindowMode {
    fn default() -> Self {
        Self::Rolling {
            days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl WindowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rolling { .. } => "rolling",
            Self::CalendarWeek => "week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDay {
    pub key: DayKey,
    pub weekday: Weekday,
    pub day_of_month: u32,
    pub is_reference_day: bool,
}

impl WindowDay {
    fn new(key: DayKey, reference: DayKey) -> Self {
        let date = key.date();
        Self {
            key,
            weekday: date.weekday(),
            day_of_month: date.day(),
            is_reference_day: key == reference,
        }
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    pub fn short_weekday_name(&self) -> &'static str {
        &weekday_name(self.weekday)[..3]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    reference: DayKey,
    days: Vec<WindowDay>,
}

impl DateWindow {
    pub fn next_n_days(n: usize, reference: DayKey) -> Self {
        let days = reference
            .date()
            .iter_days()
            .take(n)
            .map(|date| WindowDay::new(DayKey::new(date), reference))
            .collect();
        Self { reference, days }
    }

    pub fn current_week(reference: DayKey) -> Self {
        let date = reference.date();
        let offset = date.weekday().num_days_from_sunday() as u64;
        let sunday = date.checked_sub_days(Days::new(offset)).unwrap_or(date);
        let days = sunday
            .iter_days()
            .take(7)
            .map(|date| WindowDay::new(DayKey::new(date), reference))
            .collect();
        Self { reference, days }
    }

    pub fn for_mode(mode: WindowMode, reference: DayKey) -> Self {
        match mode {
            WindowMode::Rolling { days } => Self::next_n_days(days, reference),
            WindowMode::CalendarWeek => Self::current_week(reference),
        }
    }

    pub fn reference(&self) -> DayKey {
        self.reference
    }

    pub fn days(&self) -> &[WindowDay] {
        &self.days
    }

    pub fn keys(&self) -> Vec<DayKey> {
        self.days.iter().map(|day| day.key).collect()
    }

    pub fn first(&self) -> Option<DayKey> {
        self.days.first().map(|day| day.key)
    }

    pub fn contains(&self, key: DayKey) -> bool {
        self.days.iter().any(|day| day.key == key)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(value: &str) -> DayKey {
        DayKey::parse(value).expect("valid day key")
    }

    fn rendered(window: &DateWindow) -> Vec<String> {
        window.keys().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn next_n_days_starts_at_reference() {
        let window = DateWindow::next_n_days(7, day("2024-06-27"));
        assert_eq!(
            rendered(&window),
            vec![
                "2024-06-27", "2024-06-28", "2024-06-29", "2024-06-30", "2024-07-01",
                "2024-07-02", "2024-07-03",
            ]
        );
        assert!(window.days()[0].is_reference_day);
        assert!(window.days()[1..].iter().all(|day| !day.is_reference_day));
    }

    #[test]
    fn next_zero_days_is_empty() {
        let window = DateWindow::next_n_days(0, day("2024-06-10"));
        assert!(window.is_empty());
        assert_eq!(window.first(), None);
    }

    #[test]
    fn current_week_runs_sunday_to_saturday() {
        // 2024-06-12 is a Wednesday.
        let window = DateWindow::current_week(day("2024-06-12"));
        assert_eq!(
            rendered(&window),
            vec![
                "2024-06-09", "2024-06-10", "2024-06-11", "2024-06-12", "2024-06-13",
                "2024-06-14", "2024-06-15",
            ]
        );
        assert_eq!(window.days()[0].weekday, Weekday::Sun);
        assert_eq!(window.days()[6].weekday_name(), "Saturday");
        assert!(window.days()[3].is_reference_day);
        assert_eq!(window.reference(), day("2024-06-12"));
    }

    #[test]
    fn current_week_on_sunday_and_saturday_edges() {
        let from_sunday = DateWindow::current_week(day("2024-06-09"));
        let from_saturday = DateWindow::current_week(day("2024-06-15"));
        assert_eq!(from_sunday.keys(), from_saturday.keys());
    }

    #[test]
    fn window_day_metadata() {
        let window = DateWindow::next_n_days(1, day("2024-06-10"));
        let first = window.days()[0];
        assert_eq!(first.day_of_month, 10);
        assert_eq!(first.weekday_name(), "Monday");
        assert_eq!(first.short_weekday_name(), "Mon");
    }

    #[test]
    fn rolling_and_week_modes_diverge_midweek() {
        let reference = day("2024-06-12");
        let rolling = DateWindow::for_mode(WindowMode::default(), reference);
        let week = DateWindow::for_mode(WindowMode::CalendarWeek, reference);
        assert_eq!(rolling.len(), week.len());
        assert_ne!(rolling.keys(), week.keys());
        assert!(rolling.contains(day("2024-06-18")));
        assert!(!week.contains(day("2024-06-18")));
    }
}
