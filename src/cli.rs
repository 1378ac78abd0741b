//! CLI commands for keiba-board.
//!
//! Supports API server mode and one-shot queries over the same data the
//! server exposes.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::backtest::{print_backtest_table, ConditionFilter};
use crate::board::{Board, CalendarDay, DayBoard, RaceView, DEFAULT_FIGHT_MIN_LEVEL};
use crate::config::AppConfig;
use crate::loader::{load_backtest, load_store};
use crate::routes::parse_axes;
use crate::schedule::ScheduleFilter;
use crate::store::jst_date_key;

#[derive(Parser)]
#[command(name = "keiba-board")]
#[command(version, about = "Keiba board: race predictions, 勝負度 and backtest ROI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List dates with predictions, newest first
    Dates {
        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show every predicted race of a date
    Races {
        /// Date (YYYY-MM-DD)
        #[arg(value_name = "DATE")]
        date: String,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show 勝負レース of a date, strongest first
    Fight {
        /// Date (YYYY-MM-DD)
        #[arg(value_name = "DATE")]
        date: String,

        /// Minimum 勝負度 (0-3)
        #[arg(short, long, default_value_t = DEFAULT_FIGHT_MIN_LEVEL)]
        min_level: u8,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the schedule of a date merged with its predictions
    Calendar {
        /// Date (YYYY-MM-DD)
        #[arg(value_name = "DATE")]
        date: NaiveDate,

        /// Grades to include, comma-separated (default G1,G2,G3)
        #[arg(short, long)]
        grades: Option<String>,

        /// Surface (全, 芝, ダート)
        #[arg(short, long)]
        surface: Option<String>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show backtest condition statistics and monthly ROI
    Backtest {
        /// Axis counts to include, comma-separated (overrides config)
        #[arg(short, long)]
        axes: Option<String>,

        /// Minimum race count per condition (overrides config)
        #[arg(long)]
        min_races: Option<u32>,

        /// Number of conditions to show (overrides config)
        #[arg(long)]
        top_n: Option<usize>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

/// Print `value` as pretty JSON, or call `table` for the table format.
fn emit<T: Serialize>(value: &T, format: &str, table: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(value)?),
        "table" => table(value),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn date_key(date: &str) -> anyhow::Result<String> {
    jst_date_key(date).ok_or_else(|| anyhow::anyhow!("Empty date"))
}

pub fn run_dates(format: String) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = load_store(&config.data)?;

    let dates: Vec<serde_json::Value> = store
        .dates()
        .into_iter()
        .filter_map(|date| {
            store.day(date).map(|day| {
                serde_json::json!({
                    "date": date,
                    "mode_label": day.mode().label(),
                    "race_count": day.races.len(),
                })
            })
        })
        .collect();

    emit(&dates, &format, |dates| {
        if dates.is_empty() {
            println!("予測データはまだありません。");
        }
        for d in dates {
            println!(
                "  {}  {:8} {:>3} races",
                d["date"].as_str().unwrap_or_default(),
                d["mode_label"].as_str().unwrap_or_default(),
                d["race_count"]
            );
        }
    })
}

pub fn run_races(date: String, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = load_store(&config.data)?;
    let key = date_key(&date)?;

    let day = Board::new(&store, &config)
        .day(&key)
        .ok_or_else(|| anyhow::anyhow!("No predictions for {}", key))?;

    emit(&day, &format, print_day)
}

pub fn run_fight(date: String, min_level: u8, format: String) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = load_store(&config.data)?;
    let key = date_key(&date)?;

    let races = Board::new(&store, &config)
        .fight(&key, min_level)
        .ok_or_else(|| anyhow::anyhow!("No predictions for {}", key))?;

    emit(&races, &format, |races| {
        println!("=== 勝負レース {} (勝負度 {}+) ===", key, min_level);
        if races.is_empty() {
            println!("勝負度{}以上のレースはありません。", min_level);
        }
        for race in races {
            print_race(race);
        }
    })
}

pub fn run_calendar(
    date: NaiveDate,
    grades: Option<String>,
    surface: Option<String>,
    format: String,
) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let store = load_store(&config.data)?;
    let filter = ScheduleFilter::from_params(grades.as_deref(), surface.as_deref())
        .map_err(anyhow::Error::msg)?;

    let day = Board::new(&store, &config).calendar_day(date, &filter);
    emit(&day, &format, print_calendar_day)
}

pub fn run_backtest(
    axes: Option<String>,
    min_races: Option<u32>,
    top_n: Option<usize>,
    format: String,
) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let data = load_backtest(&config.data.strategy_dir);

    let mut filter = ConditionFilter::from_config(&config.backtest);
    if let Some(axes) = axes {
        filter.axes = parse_axes(&axes).map_err(anyhow::Error::msg)?;
    }
    if let Some(min_races) = min_races {
        filter.min_races = min_races;
    }
    if let Some(top_n) = top_n {
        filter.top_n = top_n;
    }

    match data.summarize(&filter, config.backtest.stake_unit) {
        Some(summary) => emit(&summary, &format, print_backtest_table),
        None => {
            eprintln!("バックテスト分析データはまだありません。");
            Ok(())
        }
    }
}

/// Print one day's races in table format.
fn print_day(day: &DayBoard) {
    println!("=== {} [{}] ===", day.date, day.mode_label);
    if let Some(at) = &day.generated_at {
        println!("Generated: {}", at);
    }
    if let Some(at) = &day.evening_generated_at {
        println!("Evening prediction: {}", at);
    }
    println!();

    if day.races.is_empty() {
        println!("この日の予測データにレースが含まれていません。");
    }
    for race in &day.races {
        print_race(race);
    }
}

fn print_race(race: &RaceView) {
    let mut header = race.race_name.clone();
    if race.grade.is_graded() {
        header.push_str(&format!(" ({})", race.grade.as_str()));
    }
    if !race.venue.is_empty() || !race.distance.is_empty() {
        header.push_str(&format!(" - {} {}", race.venue, race.distance));
    }
    if !race.track_condition.is_empty() {
        header.push_str(&format!(" / {}", race.track_condition));
    }
    println!("{} {}{}", race.confidence.label, header, if race.promising { " [有望]" } else { "" });

    if race.confidence.is_insufficient() {
        println!("  勝負度: データ不足");
    } else {
        println!("  勝負度: {}", race.confidence.reason);
    }

    let rec = &race.recommendation;
    if let Some(pattern) = rec.pattern {
        println!("  {}: {}", pattern.label(), rec.pattern_reason);
    }
    if rec.bets.is_empty() {
        println!("  推奨買い目なし");
    }
    for bet in &rec.bets {
        println!("  {:6} {:12} {}", bet.bet_type, bet.selection, bet.reason);
    }

    for row in rec.ev_table.iter().take(5) {
        println!(
            "    {:>2} {:>2} {:16} {:>6} {:>6} {:>5}",
            row.rank.map_or("-".to_string(), |r| r.to_string()),
            row.horse_number.map_or("-".to_string(), |n| n.to_string()),
            row.horse_name,
            row.win_probability.map_or("-".to_string(), |p| format!("{:.1}%", p)),
            row.odds.map_or("-".to_string(), |o| format!("{:.1}", o)),
            row.expected_value.map_or("-".to_string(), |ev| format!("{:.2}", ev)),
        );
    }

    if let Some(v) = &race.verdict {
        println!("  結果: {}", v.summary());
    }
    println!();
}

fn print_calendar_day(day: &CalendarDay) {
    println!("=== {} ===", day.date);
    if day.races.is_empty() {
        println!("この日の重賞レースはありません。");
    }
    for race in &day.races {
        let s = &race.summary;
        println!(
            "  {:4} {:20} {:4} {:6} {:10} {:8}{}",
            s.confidence_label,
            s.name,
            s.grade.as_str(),
            s.venue,
            s.distance,
            s.status.label(),
            if s.promising { " 有望" } else { "" }
        );
    }
}
