//! Reconciliation of scheduled feature races with a date's prediction records.
//!
//! Matching is bidirectional substring containment on race names, first
//! unconsumed prediction wins. There is no similarity scoring, so two races
//! sharing a name fragment can be paired wrongly; the policy is kept as-is so
//! merges stay reproducible against historical output.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::confidence::{self, is_promising, LABEL_NONE};
use crate::config::{BettingConfig, ConfidenceConfig};
use crate::types::{Grade, RaceRecord, ScheduleEntry, Surface};

/// Lifecycle state of a merged race, derived from which fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaceStatus {
    /// 未予測: scheduled but no prediction record
    #[serde(rename = "未予測")]
    Unpredicted,
    /// 予測済み: predicted, result not yet in
    #[serde(rename = "予測済み")]
    Predicted,
    /// 結果あり: result rows attached
    #[serde(rename = "結果あり")]
    Resulted,
}

impl RaceStatus {
    pub fn of(prediction: Option<&RaceRecord>) -> Self {
        match prediction {
            None => RaceStatus::Unpredicted,
            Some(race) if race.has_result() => RaceStatus::Resulted,
            Some(_) => RaceStatus::Predicted,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RaceStatus::Unpredicted => "未予測",
            RaceStatus::Predicted => "予測済み",
            RaceStatus::Resulted => "結果あり",
        }
    }
}

/// A schedule entry, a prediction record, or both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergedRace<'a> {
    pub schedule: Option<&'a ScheduleEntry>,
    pub prediction: Option<&'a RaceRecord>,
}

impl<'a> MergedRace<'a> {
    pub fn status(&self) -> RaceStatus {
        RaceStatus::of(self.prediction)
    }

    /// Schedule value when present and non-empty, prediction value otherwise.
    fn pick<F, G>(&self, from_schedule: F, from_prediction: G) -> &'a str
    where
        F: Fn(&'a ScheduleEntry) -> &'a str,
        G: Fn(&'a RaceRecord) -> &'a str,
    {
        self.schedule
            .map(from_schedule)
            .filter(|s| !s.is_empty())
            .or_else(|| self.prediction.map(from_prediction))
            .unwrap_or("")
    }

    pub fn name(&self) -> &'a str {
        self.pick(|s| s.race_name.as_str(), |p| p.display_name())
    }

    pub fn grade(&self) -> Grade {
        self.schedule
            .map(|s| s.grade)
            .filter(Grade::is_graded)
            .or_else(|| self.prediction.map(|p| p.grade))
            .unwrap_or_default()
    }

    pub fn venue(&self) -> &'a str {
        self.pick(|s| s.venue.as_str(), |p| p.venue.as_str())
    }

    pub fn distance(&self) -> &'a str {
        self.pick(|s| s.distance.as_str(), |p| p.distance.as_str())
    }
}

fn names_overlap(schedule_name: &str, prediction_name: &str) -> bool {
    schedule_name.contains(prediction_name) || prediction_name.contains(schedule_name)
}

/// Merge a date's schedule entries with its prediction records.
///
/// Every schedule entry yields exactly one item, in input order, paired with
/// the first not-yet-consumed prediction whose name contains or is contained
/// in the entry's name. Unconsumed predictions follow as standalone items in
/// input order. The result depends only on the inputs.
pub fn reconcile<'a>(
    schedule: &[&'a ScheduleEntry],
    predictions: &'a [RaceRecord],
) -> Vec<MergedRace<'a>> {
    let mut consumed = vec![false; predictions.len()];
    let mut merged = Vec::with_capacity(schedule.len() + predictions.len());

    for entry in schedule {
        let matched = predictions
            .iter()
            .enumerate()
            .find(|(i, pred)| !consumed[*i] && names_overlap(&entry.race_name, &pred.race_name));

        let prediction = matched.map(|(i, pred)| {
            consumed[i] = true;
            pred
        });
        merged.push(MergedRace {
            schedule: Some(*entry),
            prediction,
        });
    }

    for (i, pred) in predictions.iter().enumerate() {
        if !consumed[i] {
            merged.push(MergedRace {
                schedule: None,
                prediction: Some(pred),
            });
        }
    }

    merged
}

/// Race ids of the predictions paired with a schedule entry.
pub fn consumed_race_ids<'a>(merged: &[MergedRace<'a>]) -> Vec<&'a str> {
    merged
        .iter()
        .filter(|m| m.schedule.is_some())
        .filter_map(|m| m.prediction.map(|p| p.race_id.as_str()))
        .collect()
}

/// Surface selector of the calendar view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceFilter {
    /// 全
    #[default]
    All,
    Turf,
    Dirt,
}

impl SurfaceFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "全" | "all" => Some(SurfaceFilter::All),
            "芝" | "turf" => Some(SurfaceFilter::Turf),
            "ダート" | "dirt" => Some(SurfaceFilter::Dirt),
            _ => None,
        }
    }

    pub fn matches(&self, surface: Surface) -> bool {
        match self {
            SurfaceFilter::All => true,
            SurfaceFilter::Turf => surface == Surface::Turf,
            SurfaceFilter::Dirt => surface == Surface::Dirt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub grades: Vec<Grade>,
    pub surface: SurfaceFilter,
}

impl Default for ScheduleFilter {
    fn default() -> Self {
        Self {
            grades: vec![Grade::G1, Grade::G2, Grade::G3],
            surface: SurfaceFilter::All,
        }
    }
}

impl ScheduleFilter {
    /// Build a filter from a comma-separated grade list and a surface name.
    ///
    /// Absent values keep the defaults.
    pub fn from_params(grades: Option<&str>, surface: Option<&str>) -> Result<Self, String> {
        let mut filter = Self::default();

        if let Some(list) = grades {
            filter.grades = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| match Grade::parse(s) {
                    Grade::Ungraded => Err(format!("unknown grade: {}", s)),
                    grade => Ok(grade),
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(name) = surface {
            filter.surface =
                SurfaceFilter::parse(name).ok_or_else(|| format!("unknown surface: {}", name))?;
        }

        Ok(filter)
    }

    pub fn accepts(&self, entry: &ScheduleEntry) -> bool {
        self.grades.contains(&entry.grade) && self.surface.matches(entry.surface())
    }
}

/// Reconcile after applying the calendar filter.
///
/// Grade and surface narrow the schedule entries; standalone predictions are
/// narrowed by surface only.
pub fn reconcile_filtered<'a>(
    schedule: &[&'a ScheduleEntry],
    predictions: &'a [RaceRecord],
    filter: &ScheduleFilter,
) -> Vec<MergedRace<'a>> {
    let entries: Vec<&ScheduleEntry> = schedule
        .iter()
        .copied()
        .filter(|e| filter.accepts(e))
        .collect();

    reconcile(&entries, predictions)
        .into_iter()
        .filter(|m| {
            m.schedule.is_some()
                || m.prediction.is_some_and(|p| filter.surface.matches(p.surface()))
        })
        .collect()
}

/// Table row summarizing a merged race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub grade: Grade,
    pub venue: String,
    pub distance: String,
    pub status: RaceStatus,
    pub confidence_label: String,
    pub promising: bool,
}

/// Summary row; the confidence label is the effective tier of the prediction,
/// `−` for an unpredicted entry.
pub fn summary_row(
    item: &MergedRace<'_>,
    config: &ConfidenceConfig,
    betting: &BettingConfig,
) -> SummaryRow {
    let confidence_label = item
        .prediction
        .map(|p| confidence::resolve(p, config, betting).label)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| LABEL_NONE.to_string());

    SummaryRow {
        name: item.name().to_string(),
        grade: item.grade(),
        venue: item.venue().to_string(),
        distance: item.distance().to_string(),
        status: item.status(),
        confidence_label,
        promising: item.prediction.is_some_and(is_promising),
    }
}

/// Calendar entry for a scheduled race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub title: String,
    pub grade: Grade,
}

/// Events for every schedule entry passing the filter, ordered by date.
///
/// Titles get a `● ` prefix when predictions exist for that date.
pub fn calendar_events(
    schedule: &[ScheduleEntry],
    predicted_dates: &BTreeSet<&str>,
    filter: &ScheduleFilter,
) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = schedule
        .iter()
        .filter(|e| filter.accepts(e))
        .map(|e| {
            let key = e.date.format("%Y-%m-%d").to_string();
            let marker = if predicted_dates.contains(key.as_str()) {
                "● "
            } else {
                ""
            };
            CalendarEvent {
                date: e.date,
                title: format!("{}{}", marker, e.race_name),
                grade: e.grade,
            }
        })
        .collect();
    events.sort_by_key(|e| e.date);
    events
}
