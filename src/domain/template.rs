use crate::domain::models::{DayKey, SlotSet};

pub fn apply_template_to_all_days(set: &SlotSet, window: &[DayKey]) -> SlotSet {
    let Some(source_day) = window.first().copied() else {
        return set.clone();
    };
    let Some(template) = set.day(source_day).cloned() else {
        return set.clone();
    };

    window.iter().fold(set.clone(), |next, day| {
        next.with_day_replaced(*day, template.clone())
    })
}
