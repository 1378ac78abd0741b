//! Backtest ROI aggregation.
//!
//! Two inputs come from the offline strategy analysis: a condition table that
//! is already aggregated per betting condition, and one row per historical race
//! with its hit flag and payout. The condition table is only filtered here; the
//! race rows are rolled up by calendar month and into a global baseline.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::BacktestConfig;

/// Pre-aggregated statistics of one betting condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionRow {
    /// Number of feature axes combined in the condition (軸数)
    pub axes: u32,
    pub condition: String,
    pub value: String,
    pub race_count: u32,
    pub hit_rate: f64,
    pub roi: f64,
    /// 収支 in yen
    pub net: i64,
}

impl ConditionRow {
    pub fn band(&self) -> RoiBand {
        RoiBand::of(self.roi)
    }
}

/// Profitability band used to highlight the ROI column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiBand {
    Profitable,
    Marginal,
    Losing,
}

impl RoiBand {
    pub fn of(roi: f64) -> Self {
        if roi >= 100.0 {
            RoiBand::Profitable
        } else if roi >= 80.0 {
            RoiBand::Marginal
        } else {
            RoiBand::Losing
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionFilter {
    pub axes: Vec<u32>,
    pub min_races: u32,
    pub top_n: usize,
}

impl ConditionFilter {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            axes: config.axes.clone(),
            min_races: config.min_races,
            top_n: config.top_n,
        }
    }

    pub fn accepts(&self, row: &ConditionRow) -> bool {
        self.axes.contains(&row.axes) && row.race_count >= self.min_races
    }
}

/// Keep rows whose axis count is selected and race count reaches the minimum.
///
/// Source order is preserved; the table arrives ranked and is not re-sorted.
pub fn filter_conditions<'a>(
    rows: &'a [ConditionRow],
    filter: &ConditionFilter,
) -> Vec<&'a ConditionRow> {
    rows.iter().filter(|r| filter.accepts(r)).collect()
}

/// Outcome of a single historical race under the evaluated strategy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BacktestRow {
    pub race_date: NaiveDate,
    pub hit: bool,
    /// Payout in yen for a unit stake; 0 on a miss
    pub payout: i64,
    /// Remaining columns, kept verbatim
    pub features: BTreeMap<String, String>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percentage rounded to one decimal; `None` when the denominator is zero.
fn percent(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(round1(numerator / denominator * 100.0))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRoi {
    /// `YYYY-MM`
    pub month: String,
    pub race_count: u32,
    pub hit_count: u32,
    pub payout_sum: i64,
    pub investment: i64,
    pub roi: f64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Tally {
    races: u32,
    hits: u32,
    payout: i64,
}

impl Tally {
    fn add(&mut self, row: &BacktestRow) {
        self.races += 1;
        self.hits += u32::from(row.hit);
        self.payout += row.payout;
    }

    fn investment(&self, stake_unit: u32) -> i64 {
        i64::from(self.races) * i64::from(stake_unit)
    }
}

/// Group race rows by calendar month, oldest month first.
///
/// Only months with at least one row are emitted, so every ratio is defined.
pub fn monthly_rollup(rows: &[BacktestRow], stake_unit: u32) -> Vec<MonthlyRoi> {
    let mut months: BTreeMap<String, Tally> = BTreeMap::new();
    for row in rows {
        months
            .entry(row.race_date.format("%Y-%m").to_string())
            .or_default()
            .add(row);
    }

    months
        .into_iter()
        .map(|(month, tally)| {
            let investment = tally.investment(stake_unit);
            MonthlyRoi {
                month,
                race_count: tally.races,
                hit_count: tally.hits,
                payout_sum: tally.payout,
                investment,
                roi: percent(tally.payout as f64, investment as f64).unwrap_or_default(),
                hit_rate: percent(tally.hits as f64, tally.races as f64).unwrap_or_default(),
            }
        })
        .collect()
}

/// Strategy performance over every race row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub total_races: u32,
    pub hit_count: u32,
    pub payout_sum: i64,
    pub investment: i64,
    pub hit_rate: f64,
    pub roi: f64,
    /// Payout minus investment in yen
    pub net: i64,
}

impl Baseline {
    /// `None` for an empty row set.
    pub fn from_rows(rows: &[BacktestRow], stake_unit: u32) -> Option<Self> {
        let mut tally = Tally::default();
        rows.iter().for_each(|r| tally.add(r));

        let investment = tally.investment(stake_unit);
        Some(Self {
            total_races: tally.races,
            hit_count: tally.hits,
            payout_sum: tally.payout,
            investment,
            hit_rate: percent(tally.hits as f64, tally.races as f64)?,
            roi: percent(tally.payout as f64, investment as f64)?,
            net: tally.payout - investment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionEntry {
    #[serde(flatten)]
    pub row: ConditionRow,
    pub band: RoiBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub total_conditions: usize,
    /// Conditions passing the filter, before `top_n` is applied
    pub matched_conditions: usize,
    pub conditions: Vec<ConditionEntry>,
    pub baseline: Option<Baseline>,
    pub monthly: Vec<MonthlyRoi>,
}

/// Loaded backtest inputs. `None` means the file was not there.
#[derive(Debug, Clone, Default)]
pub struct BacktestData {
    pub conditions: Option<Vec<ConditionRow>>,
    pub races: Option<Vec<BacktestRow>>,
}

impl BacktestData {
    /// Summary for the selected filter; `None` when there is no condition table.
    pub fn summarize(&self, filter: &ConditionFilter, stake_unit: u32) -> Option<BacktestSummary> {
        let conditions = self.conditions.as_deref()?;
        let races = self.races.as_deref().unwrap_or_default();
        Some(aggregate(conditions, races, filter, stake_unit))
    }
}

pub fn aggregate(
    conditions: &[ConditionRow],
    races: &[BacktestRow],
    filter: &ConditionFilter,
    stake_unit: u32,
) -> BacktestSummary {
    let matched = filter_conditions(conditions, filter);

    BacktestSummary {
        total_conditions: conditions.len(),
        matched_conditions: matched.len(),
        conditions: matched
            .into_iter()
            .take(filter.top_n)
            .map(|row| ConditionEntry {
                row: row.clone(),
                band: row.band(),
            })
            .collect(),
        baseline: Baseline::from_rows(races, stake_unit),
        monthly: monthly_rollup(races, stake_unit),
    }
}

// ---------------------------------------------------------------------------
// CSV loading
// ---------------------------------------------------------------------------

const COL_AXES: &str = "軸数";
const COL_CONDITION: &str = "条件";
const COL_VALUE: &str = "値";
const COL_RACE_COUNT: &str = "レース数";
const COL_HIT_RATE: &str = "的中率";
const COL_ROI: &str = "回収率";
const COL_NET: &str = "収支";
const COL_RACE_DATE: &str = "race_date";
const COL_HIT: &str = "的中";
const COL_PAYOUT: &str = "払戻額";

fn cell<'a>(col: &'a Column, i: usize) -> AnyValue<'a> {
    col.get(i).unwrap_or(AnyValue::Null)
}

fn cell_f64(value: &AnyValue) -> Option<f64> {
    let number = match value {
        AnyValue::Float64(v) => Some(*v),
        AnyValue::Float32(v) => Some(f64::from(*v)),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::Int32(v) => Some(f64::from(*v)),
        AnyValue::UInt32(v) => Some(f64::from(*v)),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        AnyValue::StringOwned(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn cell_count(value: &AnyValue) -> Option<u32> {
    cell_f64(value)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as u32)
}

fn cell_bool(value: &AnyValue) -> Option<bool> {
    match value {
        AnyValue::Boolean(b) => Some(*b),
        AnyValue::String(s) => parse_bool(s),
        AnyValue::StringOwned(s) => parse_bool(s),
        other => cell_f64(other).map(|v| v != 0.0),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn cell_string(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        other => Some(other.to_string()),
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, and either followed by a time part.
fn parse_race_date(s: &str) -> Option<NaiveDate> {
    let head: String = s.trim().chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&head, "%Y/%m/%d"))
        .ok()
}

fn read_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Load the condition table.
///
/// Rows missing an axis count or race count are skipped; the second element
/// is the number of skipped rows.
pub fn load_conditions<P: AsRef<Path>>(path: P) -> anyhow::Result<(Vec<ConditionRow>, usize)> {
    let df = read_csv(path)?;

    let axes = df.column(COL_AXES)?;
    let conditions = df.column(COL_CONDITION)?;
    let values = df.column(COL_VALUE)?;
    let race_counts = df.column(COL_RACE_COUNT)?;
    let hit_rates = df.column(COL_HIT_RATE)?;
    let rois = df.column(COL_ROI)?;
    let nets = df.column(COL_NET)?;

    let mut rows = Vec::with_capacity(df.height());
    let mut skipped = 0;

    for i in 0..df.height() {
        let (Some(axis_count), Some(race_count)) =
            (cell_count(&cell(axes, i)), cell_count(&cell(race_counts, i)))
        else {
            skipped += 1;
            continue;
        };

        rows.push(ConditionRow {
            axes: axis_count,
            condition: cell_string(&cell(conditions, i)).unwrap_or_default(),
            value: cell_string(&cell(values, i)).unwrap_or_default(),
            race_count,
            hit_rate: cell_f64(&cell(hit_rates, i)).unwrap_or_default(),
            roi: cell_f64(&cell(rois, i)).unwrap_or_default(),
            net: cell_f64(&cell(nets, i)).unwrap_or_default().round() as i64,
        });
    }

    Ok((rows, skipped))
}

/// Load per-race outcome rows.
///
/// Rows whose `race_date` does not parse are skipped and counted, so the
/// monthly rollup and the baseline always cover the same rows. A missing hit
/// flag counts as a miss and a missing payout as 0.
pub fn load_race_rows<P: AsRef<Path>>(path: P) -> anyhow::Result<(Vec<BacktestRow>, usize)> {
    let df = read_csv(path)?;

    let dates = df.column(COL_RACE_DATE)?;
    let hits = df.column(COL_HIT)?;
    let payouts = df.column(COL_PAYOUT)?;
    let feature_cols: Vec<&Column> = df
        .get_columns()
        .iter()
        .filter(|c| ![COL_RACE_DATE, COL_HIT, COL_PAYOUT].contains(&c.name().as_str()))
        .collect();

    let mut rows = Vec::with_capacity(df.height());
    let mut skipped = 0;

    for i in 0..df.height() {
        let Some(race_date) = cell_string(&cell(dates, i)).as_deref().and_then(parse_race_date)
        else {
            skipped += 1;
            continue;
        };

        let features = feature_cols
            .iter()
            .filter_map(|col| {
                cell_string(&cell(col, i)).map(|v| (col.name().to_string(), v))
            })
            .collect();

        rows.push(BacktestRow {
            race_date,
            hit: cell_bool(&cell(hits, i)).unwrap_or(false),
            payout: cell_f64(&cell(payouts, i)).unwrap_or_default().round() as i64,
            features,
        });
    }

    Ok((rows, skipped))
}

// ---------------------------------------------------------------------------
// Table output
// ---------------------------------------------------------------------------

pub fn print_backtest_table(summary: &BacktestSummary) {
    println!("=== Backtest Results ===");
    println!();

    match &summary.baseline {
        Some(b) => {
            println!("Baseline:");
            println!("  Races:       {}", b.total_races);
            println!("  Hit Rate:    {:.1}%", b.hit_rate);
            println!("  ROI:         {:.1}%", b.roi);
            println!("  Net:         ¥{:+}", b.net);
        }
        None => println!("Baseline: no race data"),
    }
    println!();

    println!(
        "Conditions: {} of {} match, showing {}",
        summary.matched_conditions,
        summary.total_conditions,
        summary.conditions.len()
    );
    if summary.conditions.is_empty() {
        println!("  (no conditions match the filter)");
    } else {
        println!(
            "  {:>4} {:24} {:12} {:>8} {:>8} {:>8} {:>10}",
            "Axes", "Condition", "Value", "Races", "Hit%", "ROI%", "Net"
        );
        println!("  {}", "-".repeat(80));
        for entry in &summary.conditions {
            let c = &entry.row;
            let marker = match entry.band {
                RoiBand::Profitable => "+",
                RoiBand::Marginal => "~",
                RoiBand::Losing => " ",
            };
            println!(
                "  {:>4} {:24} {:12} {:>8} {:>7.1}% {:>7.1}%{} {:>+10}",
                c.axes, c.condition, c.value, c.race_count, c.hit_rate, c.roi, marker, c.net
            );
        }
    }

    if !summary.monthly.is_empty() {
        println!();
        println!("Monthly ROI:");
        println!(
            "  {:8} {:>8} {:>8} {:>8} {:>8}",
            "Month", "Races", "Hits", "Hit%", "ROI%"
        );
        println!("  {}", "-".repeat(44));
        for m in &summary.monthly {
            println!(
                "  {:8} {:>8} {:>8} {:>7.1}% {:>7.1}%",
                m.month, m.race_count, m.hit_count, m.hit_rate, m.roi
            );
        }
    }
}
