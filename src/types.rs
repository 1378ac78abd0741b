//! Prediction, schedule and recommendation types.
//!
//! Field names follow the upstream predictor's JSON (Japanese column keys).
//! Decoding is lenient: a number may arrive as a JSON number or a numeric
//! string, and anything that cannot be coerced becomes `None` instead of
//! failing the whole record.

use chrono::NaiveDate;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::OnceLock;

/// Deserialize optional number that could be string or number
fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

/// Deserialize a non-negative whole number (rank, horse number, popularity).
fn deserialize_optional_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = deserialize_optional_number(deserializer)?;
    Ok(number
        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
        .map(|n| n as u32))
}

fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_string(deserializer)?.unwrap_or_default())
}

/// Nested object that degrades to `None` when malformed.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Array whose malformed elements are dropped individually.
fn deserialize_lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(deserialize_optional_lenient_vec(deserializer)?.unwrap_or_default())
}

fn deserialize_optional_lenient_vec<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        ),
        _ => None,
    })
}

/// Race grade. Anything other than G1-G3 is treated as ungraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Grade {
    G1,
    G2,
    G3,
    #[default]
    Ungraded,
}

impl Grade {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "G1" | "GI" => Grade::G1,
            "G2" | "GII" => Grade::G2,
            "G3" | "GIII" => Grade::G3,
            _ => Grade::Ungraded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::G1 => "G1",
            Grade::G2 => "G2",
            Grade::G3 => "G3",
            Grade::Ungraded => "",
        }
    }

    pub fn is_graded(&self) -> bool {
        !matches!(self, Grade::Ungraded)
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = deserialize_lenient_string(deserializer)?;
        Ok(Grade::parse(&s))
    }
}

/// Track surface, encoded as the prefix of the distance string ("芝2000", "ダート1800").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Turf,
    Dirt,
    Unknown,
}

impl Surface {
    pub fn from_distance(distance: &str) -> Self {
        let distance = distance.trim_start();
        if distance.starts_with("芝") {
            Surface::Turf
        } else if distance.starts_with("ダート") {
            Surface::Dirt
        } else {
            Surface::Unknown
        }
    }
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("valid regex"))
}

/// Metres encoded in a distance string, e.g. "芝2000" -> 2000.
pub fn distance_meters(distance: &str) -> Option<u32> {
    digits_re()
        .captures(distance)
        .and_then(|caps| caps[1].parse().ok())
}

/// One runner as ranked by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerPrediction {
    #[serde(
        rename = "予測順位",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub rank: Option<u32>,
    #[serde(
        rename = "馬番",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub horse_number: Option<u32>,
    #[serde(rename = "馬名", default, deserialize_with = "deserialize_lenient_string")]
    pub horse_name: String,
    /// Win probability in percent (0-100)
    #[serde(
        rename = "勝率(%)",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub win_probability: Option<f64>,
    /// Decimal win odds (単勝)
    #[serde(
        rename = "単勝",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub odds: Option<f64>,
    #[serde(
        rename = "人気",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub popularity: Option<u32>,
    #[serde(
        rename = "スコア",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<f64>,
    /// Upstream expected value; wins over recomputation when present
    #[serde(
        rename = "期待値",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_value: Option<f64>,
}

/// Finish row appended after the race has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Finish position; `None` for 取消/中止/除外 and similar
    #[serde(
        rename = "着順",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish: Option<u32>,
    #[serde(
        rename = "馬番",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub horse_number: Option<u32>,
    #[serde(rename = "馬名", default, deserialize_with = "deserialize_lenient_string")]
    pub horse_name: String,
    #[serde(
        rename = "タイム",
        default,
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<String>,
    #[serde(
        rename = "単勝",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub odds: Option<f64>,
    #[serde(
        rename = "人気",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub popularity: Option<u32>,
}

/// 勝負度: 0-3 with a display label and the conditions that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceTier {
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub reason: String,
}

/// Competitive shape of a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RacePattern {
    /// 本命型: the top pick clearly leads
    #[serde(rename = "本命型")]
    Favorite,
    /// 混戦型: top win probabilities are close
    #[serde(rename = "混戦型")]
    Congested,
    /// 波乱型: a high-odds runner sits in the model's top ranks
    #[serde(rename = "波乱型")]
    Upset,
}

impl RacePattern {
    pub fn label(&self) -> &'static str {
        match self {
            RacePattern::Favorite => "本命型",
            RacePattern::Congested => "混戦型",
            RacePattern::Upset => "波乱型",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    #[serde(rename = "馬券種", default, deserialize_with = "deserialize_lenient_string")]
    pub bet_type: String,
    #[serde(rename = "買い目", default, deserialize_with = "deserialize_lenient_string")]
    pub selection: String,
    #[serde(rename = "理由", default, deserialize_with = "deserialize_lenient_string")]
    pub reason: String,
    /// EV of the runner the wager is anchored on
    #[serde(
        rename = "期待値",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_value: Option<f64>,
}

/// Row of the per-runner expected value table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvRow {
    #[serde(
        rename = "予測順位",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub rank: Option<u32>,
    #[serde(
        rename = "馬番",
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub horse_number: Option<u32>,
    #[serde(rename = "馬名", default, deserialize_with = "deserialize_lenient_string")]
    pub horse_name: String,
    #[serde(
        rename = "勝率(%)",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub win_probability: Option<f64>,
    #[serde(
        rename = "単勝",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub odds: Option<f64>,
    #[serde(
        rename = "期待値",
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(
        rename = "パターン",
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub pattern: Option<RacePattern>,
    #[serde(rename = "パターン説明", default, deserialize_with = "deserialize_lenient_string")]
    pub pattern_reason: String,
    /// Empty means no positive-EV wager was found
    #[serde(rename = "推奨買い目", default, deserialize_with = "deserialize_lenient_vec")]
    pub bets: Vec<Bet>,
    #[serde(rename = "期待値一覧", default, deserialize_with = "deserialize_lenient_vec")]
    pub ev_table: Vec<EvRow>,
}

/// A single race as produced by the upstream predictor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub race_id: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub race_name: String,
    #[serde(default)]
    pub grade: Grade,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub venue: String,
    /// Surface prefix plus metres, e.g. "芝2000"
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub distance: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub track_condition: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub predicted_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence: Option<ConfidenceTier>,
    #[serde(default, deserialize_with = "deserialize_lenient_vec")]
    pub predictions: Vec<RunnerPrediction>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommendation: Option<Recommendation>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_lenient_vec",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Vec<ResultRow>>,
}

impl RaceRecord {
    /// Runners ordered by model rank; unranked runners keep input order at the end.
    pub fn ranked(&self) -> Vec<&RunnerPrediction> {
        let mut runners: Vec<&RunnerPrediction> = self.predictions.iter().collect();
        runners.sort_by_key(|r| r.rank.unwrap_or(u32::MAX));
        runners
    }

    /// The model's top-ranked runner.
    pub fn top_pick(&self) -> Option<&RunnerPrediction> {
        self.ranked().into_iter().next()
    }

    pub fn surface(&self) -> Surface {
        Surface::from_distance(&self.distance)
    }

    pub fn distance_meters(&self) -> Option<u32> {
        distance_meters(&self.distance)
    }

    /// True once at least one finish row has been attached.
    pub fn has_result(&self) -> bool {
        self.result.as_ref().is_some_and(|rows| !rows.is_empty())
    }

    pub fn display_name(&self) -> &str {
        if self.race_name.is_empty() {
            &self.race_id
        } else {
            &self.race_name
        }
    }
}

/// How a day's predictions were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMode {
    /// Race-day update with odds and EV
    Morning,
    /// Previous-evening ability assessment
    Evening,
    Manual,
}

impl PredictionMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "morning" => PredictionMode::Morning,
            "evening" => PredictionMode::Evening,
            _ => PredictionMode::Manual,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PredictionMode::Morning => "当日更新",
            PredictionMode::Evening => "前日予測",
            PredictionMode::Manual => "手動予測",
        }
    }
}

/// One prediction file: every race predicted for a date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionDay {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub mode: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub evening_generated_at: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_vec")]
    pub races: Vec<RaceRecord>,
}

impl PredictionDay {
    pub fn mode(&self) -> PredictionMode {
        PredictionMode::parse(&self.mode)
    }
}

/// Feature race from the season schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub race_name: String,
    #[serde(default)]
    pub grade: Grade,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub distance: String,
}

impl ScheduleEntry {
    pub fn surface(&self) -> Surface {
        Surface::from_distance(&self.distance)
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_lenient_numbers() {
        let json = r#"{"予測順位": 1, "馬番": "7", "馬名": "サンプル", "勝率(%)": 35.2, "単勝": "---", "人気": 2.0}"#;
        let runner: RunnerPrediction = serde_json::from_str(json).unwrap();
        assert_eq!(runner.rank, Some(1));
        assert_eq!(runner.horse_number, Some(7));
        assert_eq!(runner.popularity, Some(2));
        assert_eq!(runner.odds, None);
        assert!((runner.win_probability.unwrap() - 35.2).abs() < 1e-9);
    }

    #[test]
    fn test_runner_rejects_fractional_rank() {
        let json = r#"{"予測順位": 1.5, "馬名": "A"}"#;
        let runner: RunnerPrediction = serde_json::from_str(json).unwrap();
        assert_eq!(runner.rank, None);
    }

    #[test]
    fn test_malformed_nested_fields_degrade() {
        let json = r#"{
            "race_id": "R1",
            "race_name": "東京新聞杯",
            "grade": "G3",
            "confidence": "broken",
            "predictions": [{"予測順位": 1, "馬名": "A"}, "not a runner"],
            "result": {"oops": true}
        }"#;
        let race: RaceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(race.grade, Grade::G3);
        assert!(race.confidence.is_none());
        assert_eq!(race.predictions.len(), 1);
        assert!(race.result.is_none());
        assert!(!race.has_result());
    }

    #[test]
    fn test_ranked_puts_unranked_last() {
        let race = RaceRecord {
            predictions: vec![
                RunnerPrediction {
                    rank: None,
                    horse_name: "X".into(),
                    ..Default::default()
                },
                RunnerPrediction {
                    rank: Some(2),
                    horse_name: "B".into(),
                    ..Default::default()
                },
                RunnerPrediction {
                    rank: Some(1),
                    horse_name: "A".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let names: Vec<_> = race.ranked().iter().map(|r| r.horse_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "X"]);
        assert_eq!(race.top_pick().unwrap().horse_name, "A");
    }

    #[test]
    fn test_empty_result_is_not_a_result() {
        let race = RaceRecord {
            result: Some(Vec::new()),
            ..Default::default()
        };
        assert!(!race.has_result());
    }

    #[test]
    fn test_surface_and_distance() {
        assert_eq!(Surface::from_distance("芝2000"), Surface::Turf);
        assert_eq!(Surface::from_distance("ダート1800"), Surface::Dirt);
        assert_eq!(Surface::from_distance("2000"), Surface::Unknown);
        assert_eq!(distance_meters("芝2000"), Some(2000));
        assert_eq!(distance_meters("ダート"), None);
    }

    #[test]
    fn test_grade_parsing() {
        assert_eq!(Grade::parse("G1"), Grade::G1);
        assert_eq!(Grade::parse(" g2 "), Grade::G2);
        assert_eq!(Grade::parse("OP"), Grade::Ungraded);
        assert_eq!(serde_json::to_string(&Grade::G3).unwrap(), "\"G3\"");
    }

    #[test]
    fn test_recommendation_keys() {
        let json = r#"{
            "パターン": "波乱型",
            "パターン説明": "高オッズ馬が上位",
            "推奨買い目": [{"馬券種": "単勝", "買い目": "7 サンプル", "理由": "期待値1.20"}],
            "期待値一覧": [{"予測順位": 1, "馬番": 7, "馬名": "サンプル", "勝率(%)": 10.0, "単勝": 12.0, "期待値": 1.2}]
        }"#;
        let rec: Recommendation = serde_json::from_str(json).unwrap();
        assert_eq!(rec.pattern, Some(RacePattern::Upset));
        assert_eq!(rec.bets.len(), 1);
        assert_eq!(rec.bets[0].expected_value, None);
        assert_eq!(rec.ev_table[0].expected_value, Some(1.2));
    }

    #[test]
    fn test_prediction_mode() {
        let day: PredictionDay =
            serde_json::from_str(r#"{"mode": "morning", "races": []}"#).unwrap();
        assert_eq!(day.mode(), PredictionMode::Morning);
        assert_eq!(PredictionMode::parse("").label(), "手動予測");
    }
}
