//! Expected value of win bets.

use crate::types::{EvRow, RaceRecord, RunnerPrediction};

/// Round to two decimals, the precision EV is published at.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calculate expected value.
///
/// # Arguments
/// * `win_probability` - Model win probability in percent (0-100)
/// * `odds` - Decimal win odds (e.g., 2.8 = 280 yen back per 100 yen)
///
/// # Returns
/// Expected value rounded to 2 decimals (> 1.0 indicates positive edge)
pub fn calculate_ev(win_probability: f64, odds: f64) -> f64 {
    round2(win_probability / 100.0 * odds)
}

/// Expected value when both inputs are known.
///
/// Missing, negative or non-finite odds yield `None` ("no EV available"),
/// never 0. Zero odds are valid and give 0.
pub fn derive_ev(win_probability: Option<f64>, odds: Option<f64>) -> Option<f64> {
    let p = win_probability.filter(|p| p.is_finite() && *p >= 0.0)?;
    let odds = odds.filter(|o| o.is_finite() && *o >= 0.0)?;
    Some(calculate_ev(p, odds))
}

/// Effective EV of a runner: the upstream value when supplied, otherwise derived.
pub fn runner_ev(runner: &RunnerPrediction) -> Option<f64> {
    runner
        .expected_value
        .or_else(|| derive_ev(runner.win_probability, runner.odds))
}

/// Per-runner EV table in model rank order.
pub fn ev_table(race: &RaceRecord) -> Vec<EvRow> {
    race.ranked()
        .into_iter()
        .map(|runner| EvRow {
            rank: runner.rank,
            horse_number: runner.horse_number,
            horse_name: runner.horse_name.clone(),
            win_probability: runner.win_probability,
            odds: runner.odds,
            expected_value: runner_ev(runner),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_ev() {
        // 35.2% at 2.8x = 0.9856 -> 0.99
        let ev = calculate_ev(35.2, 2.8);
        assert!((ev - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_ev_positive() {
        // 10% at 15x = 1.5
        let ev = calculate_ev(10.0, 15.0);
        assert!((ev - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_odds_is_zero_not_missing() {
        assert_eq!(derive_ev(Some(20.0), Some(0.0)), Some(0.0));
    }

    #[test]
    fn test_missing_odds_is_missing() {
        assert_eq!(derive_ev(Some(20.0), None), None);
        assert_eq!(derive_ev(None, Some(3.0)), None);
        assert_eq!(derive_ev(Some(20.0), Some(-1.0)), None);
    }

    #[test]
    fn test_supplied_ev_wins() {
        let runner = RunnerPrediction {
            win_probability: Some(35.2),
            odds: Some(2.8),
            expected_value: Some(1.15),
            ..Default::default()
        };
        assert_eq!(runner_ev(&runner), Some(1.15));

        let recomputed = RunnerPrediction {
            expected_value: None,
            ..runner
        };
        assert_eq!(runner_ev(&recomputed), Some(0.99));
    }

    #[test]
    fn test_ev_table_rank_order() {
        let race = RaceRecord {
            predictions: vec![
                RunnerPrediction {
                    rank: Some(2),
                    horse_number: Some(3),
                    horse_name: "B".into(),
                    win_probability: Some(20.0),
                    odds: Some(6.0),
                    ..Default::default()
                },
                RunnerPrediction {
                    rank: Some(1),
                    horse_number: Some(7),
                    horse_name: "A".into(),
                    win_probability: Some(30.0),
                    odds: None,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let table = ev_table(&race);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].horse_name, "A");
        assert_eq!(table[0].expected_value, None);
        assert_eq!(table[1].expected_value, Some(1.2));
    }
}
