//! File adapters feeding the engine: prediction JSON, the schedule TSV and the
//! backtest CSVs.
//!
//! Loading degrades locally. An unreadable prediction file or a malformed
//! schedule row is logged and skipped; a missing directory or file is an empty
//! state, not an error.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::backtest::{load_conditions, load_race_rows, BacktestData};
use crate::config::DataConfig;
use crate::store::{jst_date_key, RecordStore};
use crate::types::{Grade, PredictionDay, ScheduleEntry};

pub const CONDITIONS_FILE: &str = "filter_results.csv";
pub const RACE_ROWS_FILE: &str = "race_analysis.csv";

/// Tab-separated columns: date, name, grade, venue, distance, condition, weight
const SCHEDULE_COLUMNS: usize = 7;

fn schedule_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})/(\d{2})").expect("valid regex"))
}

/// Read every `*.json` file in `dir` as one prediction day keyed by file stem.
///
/// Files are read in path order; when two stems share a date the later file wins.
pub fn load_predictions<P: AsRef<Path>>(dir: P) -> anyhow::Result<BTreeMap<String, PredictionDay>> {
    let dir = dir.as_ref();
    let mut days = BTreeMap::new();

    if !dir.is_dir() {
        tracing::info!("Predictions directory {} not found", dir.display());
        return Ok(days);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    paths.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("json"));
    paths.sort();

    for path in paths {
        let Some(key) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(jst_date_key)
        else {
            tracing::warn!("Skipping prediction file with unusable name: {}", path.display());
            continue;
        };

        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(serde_json::from_str::<PredictionDay>(&text)?));
        match parsed {
            Ok(day) => {
                tracing::debug!("Loaded {} races for {}", day.races.len(), key);
                if days.insert(key.clone(), day).is_some() {
                    tracing::warn!("{} replaces an earlier file for {}", path.display(), key);
                }
            }
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    tracing::info!("Loaded predictions for {} dates", days.len());
    Ok(days)
}

/// Parse the season schedule.
///
/// The first line is a header and blank lines are ignored. Rows with too few
/// columns or without a valid `MM/DD` date are skipped; the second element is
/// how many.
pub fn parse_schedule(text: &str, year: i32) -> (Vec<ScheduleEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;

    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < SCHEDULE_COLUMNS {
            skipped += 1;
            continue;
        }

        let date = schedule_date_re().captures(parts[0]).and_then(|caps| {
            let month = caps[1].parse().ok()?;
            let day = caps[2].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        });
        let Some(date) = date else {
            skipped += 1;
            continue;
        };

        entries.push(ScheduleEntry {
            date,
            race_name: parts[1].to_string(),
            grade: Grade::parse(parts[2]),
            venue: parts[3].to_string(),
            distance: parts[4].to_string(),
        });
    }

    (entries, skipped)
}

pub fn load_schedule<P: AsRef<Path>>(path: P, year: i32) -> anyhow::Result<Vec<ScheduleEntry>> {
    let path = path.as_ref();
    if !path.is_file() {
        tracing::warn!("Schedule file {} not found", path.display());
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)?;
    let (entries, skipped) = parse_schedule(&text, year);
    if skipped > 0 {
        tracing::warn!("Skipped {} malformed schedule rows", skipped);
    }
    tracing::info!("Loaded {} schedule entries", entries.len());
    Ok(entries)
}

/// Load the backtest tables from the strategy directory.
///
/// A table that is missing or fails to load is left as `None` so the rest of
/// the board stays available.
pub fn load_backtest<P: AsRef<Path>>(dir: P) -> BacktestData {
    let dir = dir.as_ref();
    let mut data = BacktestData::default();

    let conditions_path = dir.join(CONDITIONS_FILE);
    if conditions_path.is_file() {
        match load_conditions(&conditions_path) {
            Ok((rows, skipped)) => {
                if skipped > 0 {
                    tracing::warn!(
                        "Skipped {} condition rows without axes or race count",
                        skipped
                    );
                }
                tracing::info!("Loaded {} backtest conditions", rows.len());
                data.conditions = Some(rows);
            }
            Err(e) => tracing::warn!("Ignoring {}: {}", conditions_path.display(), e),
        }
    } else {
        tracing::info!("No backtest condition table at {}", conditions_path.display());
    }

    let races_path = dir.join(RACE_ROWS_FILE);
    if races_path.is_file() {
        match load_race_rows(&races_path) {
            Ok((rows, skipped)) => {
                if skipped > 0 {
                    tracing::warn!(
                        "Skipped {} backtest races with unparseable race_date",
                        skipped
                    );
                }
                tracing::info!("Loaded {} backtest races", rows.len());
                data.races = Some(rows);
            }
            Err(e) => tracing::warn!("Ignoring {}: {}", races_path.display(), e),
        }
    }

    data
}

pub fn load_store(config: &DataConfig) -> anyhow::Result<RecordStore> {
    let days = load_predictions(&config.predictions_dir)?;
    let schedule = load_schedule(&config.schedule_path, config.season_year)?;
    Ok(RecordStore::new(days, schedule))
}
