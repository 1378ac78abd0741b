//! 勝負度 (confidence tier) scoring.
//!
//! Each favorable backtest condition that a race matches adds one point; the
//! level is the score capped at 3.

use std::cmp::Reverse;

use crate::config::{BettingConfig, ConfidenceConfig};
use crate::recommendation::{classify_pattern, probability_gap};
use crate::types::{ConfidenceTier, RacePattern, RaceRecord, Surface};

pub const MAX_LEVEL: u8 = 3;
/// Label for level 0, shared by "insufficient data" and "poor conditions"
pub const LABEL_NONE: &str = "−";
const REASON_NO_CONDITIONS: &str = "好条件なし";

/// Turf races at least this long can carry the 有望 signal.
pub const PROMISING_MIN_DISTANCE: u32 = 1800;
/// Model rank from which the market favourite counts as under-rated.
pub const PROMISING_MIN_RANK: u32 = 4;

pub fn level_label(level: u8) -> &'static str {
    match level {
        3 => "★★★",
        2 => "★★",
        1 => "★",
        _ => LABEL_NONE,
    }
}

impl ConfidenceTier {
    /// Tier for a race without enough data to score.
    pub fn insufficient() -> Self {
        Self {
            level: 0,
            label: LABEL_NONE.to_string(),
            reason: String::new(),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.level == 0 && self.reason.is_empty()
    }
}

/// Score a race against the favorable backtest conditions.
///
/// A race whose top pick lacks a win probability or odds gets
/// [`ConfidenceTier::insufficient`]. A scored race always has a non-empty reason.
pub fn classify(
    race: &RaceRecord,
    config: &ConfidenceConfig,
    betting: &BettingConfig,
) -> ConfidenceTier {
    let Some(top) = race.top_pick() else {
        return ConfidenceTier::insufficient();
    };
    let (Some(_), Some(top_odds)) = (top.win_probability, top.odds) else {
        return ConfidenceTier::insufficient();
    };

    let mut fired: Vec<String> = Vec::new();

    if let Some(popularity) = top.popularity {
        if (config.popularity_min..=config.popularity_max).contains(&popularity) {
            fired.push(format!("モデル1位が{}番人気", popularity));
        }
    }

    let (pattern, _) = classify_pattern(race, betting);
    if pattern == RacePattern::Upset {
        fired.push(format!("{}パターン", pattern.label()));
    }

    if let Some(gap) = probability_gap(race) {
        if gap < config.max_probability_gap {
            fired.push(format!("勝率差{:.1}%", gap));
        }
    }

    if let Some(meters) = race.distance_meters() {
        if (config.distance_min..=config.distance_max).contains(&meters) {
            fired.push(format!("中距離{}m", meters));
        }
    }

    if (config.odds_min..=config.odds_max).contains(&top_odds) {
        fired.push(format!("オッズ{:.1}倍", top_odds));
    }

    let level = fired.len().min(MAX_LEVEL as usize) as u8;
    let reason = if fired.is_empty() {
        REASON_NO_CONDITIONS.to_string()
    } else {
        fired.join(" / ")
    };

    ConfidenceTier {
        level,
        label: level_label(level).to_string(),
        reason,
    }
}

/// Upstream tier when supplied, otherwise a fresh classification.
pub fn resolve(
    race: &RaceRecord,
    config: &ConfidenceConfig,
    betting: &BettingConfig,
) -> ConfidenceTier {
    race.confidence
        .clone()
        .unwrap_or_else(|| classify(race, config, betting))
}

/// 勝負レース: races at or above `min_level`, highest level first.
///
/// Races with equal level keep their input order. An empty result is a valid
/// state the caller reports explicitly.
pub fn fight_races<'a>(
    races: &'a [RaceRecord],
    min_level: u8,
    config: &ConfidenceConfig,
    betting: &BettingConfig,
) -> Vec<(&'a RaceRecord, ConfidenceTier)> {
    let mut scored: Vec<(&RaceRecord, ConfidenceTier)> = races
        .iter()
        .map(|race| (race, resolve(race, config, betting)))
        .filter(|(_, tier)| tier.level >= min_level)
        .collect();
    scored.sort_by_key(|(_, tier)| Reverse(tier.level));
    scored
}

/// 有望: a long turf race where the model ranks the market favourite 4th or lower.
pub fn is_promising(race: &RaceRecord) -> bool {
    if race.surface() != Surface::Turf
        || race.distance_meters().unwrap_or(0) < PROMISING_MIN_DISTANCE
    {
        return false;
    }
    race.predictions
        .iter()
        .find(|r| r.popularity == Some(1))
        .is_some_and(|favourite| favourite.rank.unwrap_or(99) >= PROMISING_MIN_RANK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunnerPrediction;

    fn runner(rank: u32, p: f64, odds: Option<f64>, popularity: Option<u32>) -> RunnerPrediction {
        RunnerPrediction {
            rank: Some(rank),
            horse_number: Some(rank + 10),
            horse_name: format!("馬{}", rank),
            win_probability: Some(p),
            odds,
            popularity,
            ..Default::default()
        }
    }

    fn race(distance: &str, predictions: Vec<RunnerPrediction>) -> RaceRecord {
        RaceRecord {
            race_id: "R".to_string(),
            race_name: "テスト".to_string(),
            distance: distance.to_string(),
            predictions,
            ..Default::default()
        }
    }

    fn classify_default(r: &RaceRecord) -> ConfidenceTier {
        classify(r, &ConfidenceConfig::default(), &BettingConfig::default())
    }

    #[test]
    fn test_insufficient_without_odds() {
        let r = race("芝2000", vec![runner(1, 30.0, None, Some(2)), runner(2, 28.0, None, None)]);
        let tier = classify_default(&r);
        assert_eq!(tier, ConfidenceTier::insufficient());
        assert!(tier.is_insufficient());
        assert_eq!(tier.label, "−");
    }

    #[test]
    fn test_insufficient_without_predictions() {
        let tier = classify_default(&race("芝2000", Vec::new()));
        assert!(tier.is_insufficient());
    }

    #[test]
    fn test_poor_conditions_have_reason() {
        // Favourite, big gap, sprint, short odds
        let r = race(
            "芝1200",
            vec![runner(1, 50.0, Some(1.5), Some(1)), runner(2, 15.0, Some(6.0), Some(2))],
        );
        let tier = classify_default(&r);
        assert_eq!(tier.level, 0);
        assert_eq!(tier.label, "−");
        assert!(!tier.reason.is_empty());
        assert!(!tier.is_insufficient());
    }

    #[test]
    fn test_all_conditions_cap_at_three() {
        // 2nd favourite, upset (rank 2 at 15x), gap 2, 2000m, 8x
        let r = race(
            "芝2000",
            vec![
                runner(1, 20.0, Some(8.0), Some(2)),
                runner(2, 18.0, Some(15.0), Some(6)),
                runner(3, 12.0, Some(4.0), Some(1)),
            ],
        );
        let tier = classify_default(&r);
        assert_eq!(tier.level, 3);
        assert_eq!(tier.label, "★★★");
        assert_eq!(tier.reason.split(" / ").count(), 5);
        assert!(tier.reason.contains("波乱型パターン"));
        assert!(tier.reason.contains("中距離2000m"));
    }

    #[test]
    fn test_single_condition() {
        // Only the mid-distance band fires
        let r = race(
            "ダート1800",
            vec![runner(1, 40.0, Some(2.0), Some(1)), runner(2, 20.0, Some(5.0), Some(2))],
        );
        let tier = classify_default(&r);
        assert_eq!(tier.level, 1);
        assert_eq!(tier.label, "★");
        assert_eq!(tier.reason, "中距離1800m");
    }

    #[test]
    fn test_classify_is_idempotent() {
        let r = race(
            "芝2200",
            vec![runner(1, 25.0, Some(4.0), Some(3)), runner(2, 22.0, Some(5.0), Some(2))],
        );
        assert_eq!(classify_default(&r), classify_default(&r));
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let r = race(
            "芝1600",
            vec![runner(1, 40.0, Some(2.0), Some(1)), runner(2, 20.0, Some(5.0), Some(2))],
        );
        assert_eq!(classify_default(&r).level, 0);

        let wide = ConfidenceConfig {
            distance_min: 1400,
            ..Default::default()
        };
        assert_eq!(classify(&r, &wide, &BettingConfig::default()).level, 1);
    }

    #[test]
    fn test_resolve_prefers_supplied() {
        let mut r = race("芝2000", Vec::new());
        r.confidence = Some(ConfidenceTier {
            level: 2,
            label: "★★".to_string(),
            reason: "upstream".to_string(),
        });
        let tier = resolve(&r, &ConfidenceConfig::default(), &BettingConfig::default());
        assert_eq!(tier.level, 2);
        assert_eq!(tier.reason, "upstream");
    }

    #[test]
    fn test_fight_races_order_and_filter() {
        let tier = |level: u8, name: &str| RaceRecord {
            race_name: name.to_string(),
            confidence: Some(ConfidenceTier {
                level,
                label: level_label(level).to_string(),
                reason: "x".to_string(),
            }),
            ..Default::default()
        };
        let races = vec![tier(2, "A"), tier(1, "B"), tier(3, "C"), tier(2, "D")];

        let fight = fight_races(&races, 2, &ConfidenceConfig::default(), &BettingConfig::default());
        let names: Vec<_> = fight.iter().map(|(r, _)| r.race_name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "D"]);

        let none = fight_races(&races, 4, &ConfidenceConfig::default(), &BettingConfig::default());
        assert!(none.is_empty());
    }

    #[test]
    fn test_is_promising() {
        let favourite_ranked_fifth = vec![
            runner(1, 20.0, Some(6.0), Some(3)),
            runner(5, 8.0, Some(2.1), Some(1)),
        ];
        assert!(is_promising(&race("芝2000", favourite_ranked_fifth.clone())));
        assert!(!is_promising(&race("ダート2000", favourite_ranked_fifth.clone())));
        assert!(!is_promising(&race("芝1600", favourite_ranked_fifth)));

        let favourite_on_top = vec![runner(1, 30.0, Some(2.0), Some(1))];
        assert!(!is_promising(&race("芝2400", favourite_on_top)));

        let no_favourite = vec![runner(1, 30.0, Some(5.0), Some(2))];
        assert!(!is_promising(&race("芝2400", no_favourite)));
    }
}
