use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DayOfWeek;

/// A doctor's weekly availability for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub day_of_week: DayOfWeek,
    pub time_slots: Vec<String>,
}

/// Parse a time of day and render it as `HH:MM`.
///
/// Accepts `9:00`, `09:00` and `09:00:00`. Returns `None` for anything else.
pub fn normalize_slot(raw: &str) -> Option<String> {
    let raw = raw.trim();
    ["%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.format("%H:%M").to_string())
}

/// Normalize, sort and deduplicate a list of slots.
///
/// The first slot that fails to parse is returned as the error.
pub fn normalize_slots(raw: &[String]) -> Result<Vec<String>, String> {
    let mut slots = raw
        .iter()
        .map(|s| normalize_slot(s).ok_or_else(|| s.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    slots.sort();
    slots.dedup();
    Ok(slots)
}
