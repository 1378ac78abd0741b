//! Per-date views assembled from the store and the engine.
//!
//! Everything here is plain data for a presentation layer: the HTTP routes
//! serialize it and the CLI prints it.

use chrono::NaiveDate;
use serde::Serialize;

use crate::confidence::{self, fight_races, is_promising};
use crate::config::AppConfig;
use crate::outcome::{top_finishers, verdict, Verdict, TOP_FINISHERS};
use crate::recommendation;
use crate::schedule::{
    calendar_events, consumed_race_ids, reconcile_filtered, summary_row, CalendarEvent,
    RaceStatus, ScheduleFilter, SummaryRow,
};
use crate::store::RecordStore;
use crate::types::{ConfidenceTier, Grade, RaceRecord, Recommendation, ResultRow};

/// Minimum 勝負度 of the fight listing when none is given.
pub const DEFAULT_FIGHT_MIN_LEVEL: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceView {
    pub race_id: String,
    pub race_name: String,
    pub grade: Grade,
    pub venue: String,
    pub distance: String,
    pub track_condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_at: Option<String>,
    pub status: RaceStatus,
    pub confidence: ConfidenceTier,
    pub recommendation: Recommendation,
    pub promising: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub top_finishers: Vec<ResultRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBoard {
    pub date: String,
    pub mode: String,
    pub mode_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evening_generated_at: Option<String>,
    pub races: Vec<RaceView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarRace {
    #[serde(flatten)]
    pub summary: SummaryRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<RaceView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub predicted: bool,
    pub races: Vec<CalendarRace>,
    /// Race ids of predictions paired with a schedule entry
    pub matched_race_ids: Vec<String>,
}

/// Read-only view over a store with the configured thresholds.
#[derive(Debug, Clone, Copy)]
pub struct Board<'a> {
    store: &'a RecordStore,
    config: &'a AppConfig,
}

impl<'a> Board<'a> {
    pub fn new(store: &'a RecordStore, config: &'a AppConfig) -> Self {
        Self { store, config }
    }

    pub fn race_view(&self, race: &RaceRecord) -> RaceView {
        let rows = race.result.as_deref().unwrap_or_default();
        RaceView {
            race_id: race.race_id.clone(),
            race_name: race.display_name().to_string(),
            grade: race.grade,
            venue: race.venue.clone(),
            distance: race.distance.clone(),
            track_condition: race.track_condition.clone(),
            predicted_at: race.predicted_at.clone(),
            status: RaceStatus::of(Some(race)),
            confidence: confidence::resolve(race, &self.config.confidence, &self.config.betting),
            recommendation: recommendation::resolve(race, &self.config.betting),
            promising: is_promising(race),
            verdict: verdict(race),
            top_finishers: top_finishers(rows, TOP_FINISHERS).into_iter().cloned().collect(),
        }
    }

    /// All predicted races of a date; `None` when the date has no prediction file.
    pub fn day(&self, date: &str) -> Option<DayBoard> {
        let day = self.store.day(date)?;
        Some(DayBoard {
            date: date.to_string(),
            mode: day.mode.clone(),
            mode_label: day.mode().label(),
            generated_at: day.generated_at.clone(),
            evening_generated_at: day.evening_generated_at.clone(),
            races: day.races.iter().map(|r| self.race_view(r)).collect(),
        })
    }

    /// 勝負レース of a date, strongest first.
    pub fn fight(&self, date: &str, min_level: u8) -> Option<Vec<RaceView>> {
        let day = self.store.day(date)?;
        let fight = fight_races(
            &day.races,
            min_level,
            &self.config.confidence,
            &self.config.betting,
        );
        Some(fight.into_iter().map(|(race, _)| self.race_view(race)).collect())
    }

    /// Schedule and predictions of one calendar date, merged.
    pub fn calendar_day(&self, date: NaiveDate, filter: &ScheduleFilter) -> CalendarDay {
        let key = date.format("%Y-%m-%d").to_string();
        let predictions: &[RaceRecord] = self
            .store
            .day(&key)
            .map(|d| d.races.as_slice())
            .unwrap_or_default();
        let schedule = self.store.schedule_for(date);

        let merged = reconcile_filtered(&schedule, predictions, filter);
        let races = merged
            .iter()
            .map(|item| CalendarRace {
                summary: summary_row(item, &self.config.confidence, &self.config.betting),
                race: item.prediction.map(|p| self.race_view(p)),
            })
            .collect();

        CalendarDay {
            date,
            predicted: self.store.day(&key).is_some(),
            races,
            matched_race_ids: consumed_race_ids(&merged)
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn calendar_events(&self, filter: &ScheduleFilter) -> Vec<CalendarEvent> {
        calendar_events(self.store.schedule(), &self.store.predicted_dates(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PredictionDay, RunnerPrediction, ScheduleEntry};
    use std::collections::BTreeMap;

    fn runner(rank: u32, number: u32, p: f64, odds: f64, popularity: u32) -> RunnerPrediction {
        RunnerPrediction {
            rank: Some(rank),
            horse_number: Some(number),
            horse_name: format!("馬{}", number),
            win_probability: Some(p),
            odds: Some(odds),
            popularity: Some(popularity),
            ..Default::default()
        }
    }

    fn store() -> RecordStore {
        let strong = RaceRecord {
            race_id: "R11".to_string(),
            race_name: "第76回東京新聞杯".to_string(),
            grade: Grade::G3,
            venue: "東京".to_string(),
            distance: "芝2000".to_string(),
            predictions: vec![
                runner(1, 4, 20.0, 8.0, 2),
                runner(2, 9, 18.0, 15.0, 6),
                runner(3, 1, 12.0, 4.0, 1),
            ],
            result: Some(vec![
                ResultRow {
                    finish: Some(1),
                    horse_number: Some(4),
                    horse_name: "馬4".to_string(),
                    ..Default::default()
                },
                ResultRow {
                    finish: Some(2),
                    horse_number: Some(9),
                    horse_name: "馬9".to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let weak = RaceRecord {
            race_id: "R12".to_string(),
            race_name: "節分S".to_string(),
            distance: "芝1200".to_string(),
            predictions: vec![runner(1, 3, 50.0, 1.5, 1), runner(2, 5, 15.0, 6.0, 2)],
            ..Default::default()
        };

        let mut days = BTreeMap::new();
        days.insert(
            "2026-02-01".to_string(),
            PredictionDay {
                mode: "evening".to_string(),
                races: vec![weak, strong],
                ..Default::default()
            },
        );

        let schedule = vec![
            ScheduleEntry {
                date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                race_name: "東京新聞杯".to_string(),
                grade: Grade::G3,
                venue: "東京".to_string(),
                distance: "芝1600".to_string(),
            },
            ScheduleEntry {
                date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                race_name: "根岸S".to_string(),
                grade: Grade::G3,
                venue: "東京".to_string(),
                distance: "ダート1400".to_string(),
            },
        ];
        RecordStore::new(days, schedule)
    }

    #[test]
    fn test_day_board() {
        let store = store();
        let config = AppConfig::default();
        let board = Board::new(&store, &config);

        let day = board.day("2026-02-01").unwrap();
        assert_eq!(day.mode_label, "前日予測");
        assert_eq!(day.races.len(), 2);

        let strong = &day.races[1];
        assert_eq!(strong.status, RaceStatus::Resulted);
        assert_eq!(strong.confidence.level, 3);
        assert_eq!(strong.top_finishers.len(), 2);
        assert_eq!(strong.verdict.as_ref().map(|v| v.outcome.label()), Some("的中"));

        assert!(board.day("2026-02-02").is_none());
    }

    #[test]
    fn test_fight_listing() {
        let store = store();
        let config = AppConfig::default();
        let board = Board::new(&store, &config);

        let fight = board.fight("2026-02-01", DEFAULT_FIGHT_MIN_LEVEL).unwrap();
        assert_eq!(fight.len(), 1);
        assert_eq!(fight[0].race_id, "R11");

        assert_eq!(board.fight("2026-02-01", 0).unwrap().len(), 2);
    }

    #[test]
    fn test_calendar_day() {
        let store = store();
        let config = AppConfig::default();
        let board = Board::new(&store, &config);
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let cal = board.calendar_day(date, &ScheduleFilter::default());
        assert!(cal.predicted);
        let names: Vec<_> = cal.races.iter().map(|r| r.summary.name.as_str()).collect();
        assert_eq!(names, vec!["東京新聞杯", "根岸S", "節分S"]);
        assert_eq!(cal.races[0].summary.status, RaceStatus::Resulted);
        assert_eq!(cal.races[1].summary.status, RaceStatus::Unpredicted);
        assert!(cal.races[1].race.is_none());
        assert_eq!(cal.matched_race_ids, vec!["R11".to_string()]);

        let other = NaiveDate::from_ymd_opt(2026, 5, 5).unwrap();
        let empty = board.calendar_day(other, &ScheduleFilter::default());
        assert!(!empty.predicted);
        assert!(empty.races.is_empty());
    }

    #[test]
    fn test_calendar_summary_uses_computed_tier() {
        let store = store();
        let config = AppConfig::default();
        let board = Board::new(&store, &config);
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let cal = board.calendar_day(date, &ScheduleFilter::default());
        let matched = &cal.races[0];
        let view = matched.race.as_ref().unwrap();
        assert!(store.day("2026-02-01").unwrap().races[1].confidence.is_none());
        assert_eq!(view.confidence.level, 3);
        assert_eq!(matched.summary.confidence_label, "★★★");
        assert_eq!(matched.summary.confidence_label, view.confidence.label);
        assert_eq!(cal.races[1].summary.confidence_label, "−");
    }

    #[test]
    fn test_calendar_events_mark_predicted_dates() {
        let store = store();
        let config = AppConfig::default();
        let events = Board::new(&store, &config).calendar_events(&ScheduleFilter::default());
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.title.starts_with("● ")));
    }
}
