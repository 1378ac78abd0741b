//! In-memory view over loaded prediction days and the season schedule.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{PredictionDay, ScheduleEntry};

/// JST offset in seconds (UTC+9)
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Lookup-only snapshot of predictions keyed by `YYYY-MM-DD` and the static schedule.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    days: BTreeMap<String, PredictionDay>,
    schedule: Vec<ScheduleEntry>,
}

impl RecordStore {
    pub fn new(days: BTreeMap<String, PredictionDay>, schedule: Vec<ScheduleEntry>) -> Self {
        Self { days, schedule }
    }

    /// Prediction record for a date key, if one was produced.
    pub fn day(&self, date: &str) -> Option<&PredictionDay> {
        self.days.get(date)
    }

    /// Dates with predictions, newest first.
    pub fn dates(&self) -> Vec<&str> {
        self.days.keys().rev().map(String::as_str).collect()
    }

    pub fn predicted_dates(&self) -> BTreeSet<&str> {
        self.days.keys().map(String::as_str).collect()
    }

    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.schedule
    }

    /// Schedule entries on a date, in file order.
    pub fn schedule_for(&self, date: NaiveDate) -> Vec<&ScheduleEntry> {
        self.schedule.iter().filter(|e| e.date == date).collect()
    }
}

/// Normalize a date or timestamp string to a JST `YYYY-MM-DD` key.
///
/// Plain dates are truncated to ten characters. RFC 3339 timestamps (a trailing
/// `Z` is accepted) are shifted to JST first, so `2026-02-01T15:30:00Z` becomes
/// `2026-02-02`. Returns `None` for an empty string.
pub fn jst_date_key(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if !s.contains('T') {
        return Some(s.chars().take(10).collect());
    }
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&jst).format("%Y-%m-%d").to_string()),
        Err(_) => Some(s.chars().take(10).collect()),
    }
}
