use crate::domain::models::TimeLabel;

const DEFAULT_START_HOUR: u32 = 8;
const DEFAULT_END_HOUR: u32 = 20;
const DEFAULT_STEP_MINUTES: u32 = 30;

pub fn standard_time_labels(start_hour: u32, end_hour: u32, step_minutes: u32) -> Vec<TimeLabel> {
    let start = start_hour.min(23) * 60;
    let end = end_hour.min(23) * 60;
    if end < start {
        return Vec::new();
    }
    if step_minutes == 0 {
        return vec![minutes_to_label(start)];
    }

    (start..=end)
        .step_by(step_minutes as usize)
        .map(minutes_to_label)
        .collect()
}

pub fn default_time_labels() -> Vec<TimeLabel> {
    standard_time_labels(DEFAULT_START_HOUR, DEFAULT_END_HOUR, DEFAULT_STEP_MINUTES)
}

pub fn minutes_to_label(minutes: u32) -> TimeLabel {
    let minutes = minutes % (24 * 60);
    let hours = minutes / 60;
    let meridiem = if hours < 12 { "AM" } else { "PM" };
    let display_hour = match hours % 12 {
        0 => 12,
        hour => hour,
    };
    TimeLabel::new(format!("{display_hour}:{:02} {meridiem}", minutes % 60))
}
