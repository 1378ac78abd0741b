//! Configuration for the Keiba board.

use serde::{Deserialize, Serialize};

/// Minimum EV for a wager to be recommended (strictly greater than).
pub const DEFAULT_EV_THRESHOLD: f64 = 1.0;
/// Rank-1 minus rank-2 win probability (points) at or above which a race is 本命型.
pub const DEFAULT_FAVORITE_GAP: f64 = 10.0;
/// Win odds at or above which a top-ranked runner signals 波乱型.
pub const DEFAULT_UPSET_ODDS: f64 = 10.0;
/// How many of the model's top ranks are checked for a high-odds runner.
pub const DEFAULT_UPSET_TOP_RANKS: u32 = 3;
pub const DEFAULT_MAX_BETS: usize = 3;

/// Popularity band of the model's top pick that scores a confidence point.
pub const DEFAULT_POPULARITY_MIN: u32 = 2;
pub const DEFAULT_POPULARITY_MAX: u32 = 3;
/// Rank-1 vs rank-2 win probability gap (points) below which a point is scored.
pub const DEFAULT_MAX_PROBABILITY_GAP: f64 = 5.0;
/// Mid-distance band in metres.
pub const DEFAULT_DISTANCE_MIN: u32 = 1800;
pub const DEFAULT_DISTANCE_MAX: u32 = 2200;
/// Top pick win-odds band.
pub const DEFAULT_ODDS_MIN: f64 = 3.0;
pub const DEFAULT_ODDS_MAX: f64 = 30.0;

/// Flat stake per race in yen.
pub const DEFAULT_STAKE_UNIT: u32 = 100;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Input data locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of per-date prediction files (`YYYY-MM-DD.json`)
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: String,
    /// Season schedule TSV
    #[serde(default = "default_schedule_path")]
    pub schedule_path: String,
    /// Directory holding `filter_results.csv` and `race_analysis.csv`
    #[serde(default = "default_strategy_dir")]
    pub strategy_dir: String,
    /// Year applied to the schedule's `MM/DD` dates
    #[serde(default = "default_season_year")]
    pub season_year: i32,
}

fn default_predictions_dir() -> String {
    "data/predictions".to_string()
}

fn default_schedule_path() -> String {
    "data/2026重賞レーススケジュール.txt".to_string()
}

fn default_strategy_dir() -> String {
    "data/strategy".to_string()
}

fn default_season_year() -> i32 {
    2026
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            predictions_dir: default_predictions_dir(),
            schedule_path: default_schedule_path(),
            strategy_dir: default_strategy_dir(),
            season_year: default_season_year(),
        }
    }
}

/// Betting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingConfig {
    #[serde(default = "default_ev_threshold")]
    pub ev_threshold: f64,
    #[serde(default = "default_max_bets")]
    pub max_bets: usize,
    #[serde(default = "default_favorite_gap")]
    pub favorite_gap: f64,
    #[serde(default = "default_upset_odds")]
    pub upset_odds: f64,
    #[serde(default = "default_upset_top_ranks")]
    pub upset_top_ranks: u32,
}

fn default_ev_threshold() -> f64 {
    DEFAULT_EV_THRESHOLD
}

fn default_max_bets() -> usize {
    DEFAULT_MAX_BETS
}

fn default_favorite_gap() -> f64 {
    DEFAULT_FAVORITE_GAP
}

fn default_upset_odds() -> f64 {
    DEFAULT_UPSET_ODDS
}

fn default_upset_top_ranks() -> u32 {
    DEFAULT_UPSET_TOP_RANKS
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            ev_threshold: default_ev_threshold(),
            max_bets: default_max_bets(),
            favorite_gap: default_favorite_gap(),
            upset_odds: default_upset_odds(),
            upset_top_ranks: default_upset_top_ranks(),
        }
    }
}

/// Confidence (勝負度) scoring thresholds, taken from the historical backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_popularity_min")]
    pub popularity_min: u32,
    #[serde(default = "default_popularity_max")]
    pub popularity_max: u32,
    #[serde(default = "default_max_probability_gap")]
    pub max_probability_gap: f64,
    #[serde(default = "default_distance_min")]
    pub distance_min: u32,
    #[serde(default = "default_distance_max")]
    pub distance_max: u32,
    #[serde(default = "default_odds_min")]
    pub odds_min: f64,
    #[serde(default = "default_odds_max")]
    pub odds_max: f64,
}

fn default_popularity_min() -> u32 {
    DEFAULT_POPULARITY_MIN
}

fn default_popularity_max() -> u32 {
    DEFAULT_POPULARITY_MAX
}

fn default_max_probability_gap() -> f64 {
    DEFAULT_MAX_PROBABILITY_GAP
}

fn default_distance_min() -> u32 {
    DEFAULT_DISTANCE_MIN
}

fn default_distance_max() -> u32 {
    DEFAULT_DISTANCE_MAX
}

fn default_odds_min() -> f64 {
    DEFAULT_ODDS_MIN
}

fn default_odds_max() -> f64 {
    DEFAULT_ODDS_MAX
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            popularity_min: default_popularity_min(),
            popularity_max: default_popularity_max(),
            max_probability_gap: default_max_probability_gap(),
            distance_min: default_distance_min(),
            distance_max: default_distance_max(),
            odds_min: default_odds_min(),
            odds_max: default_odds_max(),
        }
    }
}

/// Backtest table defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_stake_unit")]
    pub stake_unit: u32,
    /// Axis counts shown in the condition table
    #[serde(default = "default_axes")]
    pub axes: Vec<u32>,
    #[serde(default = "default_min_races")]
    pub min_races: u32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_stake_unit() -> u32 {
    DEFAULT_STAKE_UNIT
}

fn default_axes() -> Vec<u32> {
    vec![1, 2]
}

fn default_min_races() -> u32 {
    30
}

fn default_top_n() -> usize {
    30
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            stake_unit: default_stake_unit(),
            axes: default_axes(),
            min_races: default_min_races(),
            top_n: default_top_n(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub betting: BettingConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (KEIBA_SERVER__PORT,
            // KEIBA_DATA__PREDICTIONS_DIR, etc.)
            .add_source(
                config::Environment::with_prefix("KEIBA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
