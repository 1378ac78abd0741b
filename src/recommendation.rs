//! Race pattern classification and positive-EV wager selection.

use std::cmp::Ordering;

use crate::betting::ev_table;
use crate::config::BettingConfig;
use crate::types::{Bet, EvRow, RacePattern, RaceRecord, Recommendation};

pub const BET_WIN: &str = "単勝";
pub const BET_PLACE: &str = "複勝";
pub const BET_WIDE: &str = "ワイド";
pub const BET_EXACTA: &str = "馬単";

/// Win probability lead (points) of the rank-1 runner over rank-2.
///
/// `None` when fewer than two ranked runners carry a probability.
pub fn probability_gap(race: &RaceRecord) -> Option<f64> {
    let ranked = race.ranked();
    let first = ranked.first()?.win_probability?;
    let second = ranked.get(1)?.win_probability?;
    Some(first - second)
}

/// Classify the competitive shape of a race.
///
/// 本命型 wins when the top pick leads by `favorite_gap` or more; otherwise a
/// runner inside the top `upset_top_ranks` at `upset_odds` or longer makes it
/// 波乱型; everything else is 混戦型.
pub fn classify_pattern(race: &RaceRecord, config: &BettingConfig) -> (RacePattern, String) {
    let gap = probability_gap(race);

    if let Some(gap) = gap.filter(|g| *g >= config.favorite_gap) {
        return (
            RacePattern::Favorite,
            format!("1位の勝率が2位を{:.1}pt上回る", gap),
        );
    }

    let ranked = race.ranked();
    let longshot = ranked
        .iter()
        .enumerate()
        .take(config.upset_top_ranks as usize)
        .find(|(_, r)| r.odds.is_some_and(|o| o >= config.upset_odds));
    if let Some((position, runner)) = longshot {
        let rank = runner.rank.unwrap_or(position as u32 + 1);
        return (
            RacePattern::Upset,
            format!(
                "予測{}位 {} が単勝{:.1}倍",
                rank,
                runner.horse_name,
                runner.odds.unwrap_or_default()
            ),
        );
    }

    let reason = match gap {
        Some(gap) => format!("上位2頭の勝率差{:.1}pt", gap),
        None => "勝率データ不足".to_string(),
    };
    (RacePattern::Congested, reason)
}

fn runner_label(row: &EvRow) -> String {
    match row.horse_number {
        Some(n) => format!("{} {}", n, row.horse_name),
        None => row.horse_name.clone(),
    }
}

fn win_bet(row: &EvRow, ev: f64) -> Bet {
    let reason = match (row.win_probability, row.odds) {
        (Some(p), Some(odds)) => format!("期待値{:.2}（勝率{:.1}% × {:.1}倍）", ev, p, odds),
        _ => format!("期待値{:.2}", ev),
    };
    Bet {
        bet_type: BET_WIN.to_string(),
        selection: runner_label(row),
        reason,
        expected_value: Some(ev),
    }
}

/// Best-ranked runner other than the anchor that carries a horse number.
fn best_partner(table: &[EvRow], anchor_number: u32) -> Option<(&EvRow, u32)> {
    table.iter().find_map(|row| {
        row.horse_number
            .filter(|n| *n != anchor_number)
            .map(|n| (row, n))
    })
}

/// Pattern-specific wager anchored on a positive-EV runner.
fn pattern_bet(pattern: RacePattern, anchor: &EvRow, ev: f64, table: &[EvRow]) -> Option<Bet> {
    let anchor_number = anchor.horse_number?;

    let bet = match pattern {
        RacePattern::Favorite => Bet {
            bet_type: BET_PLACE.to_string(),
            selection: runner_label(anchor),
            reason: format!("本命型: 複勝で堅実に（期待値{:.2}）", ev),
            expected_value: Some(ev),
        },
        RacePattern::Congested => {
            let (partner, partner_number) = best_partner(table, anchor_number)?;
            let lo = anchor_number.min(partner_number);
            let hi = anchor_number.max(partner_number);
            Bet {
                bet_type: BET_WIDE.to_string(),
                selection: format!("{}-{}", lo, hi),
                reason: format!("混戦型: {}とのワイドで的中範囲を広げる", partner.horse_name),
                expected_value: Some(ev),
            }
        }
        RacePattern::Upset => {
            let (_, partner_number) = best_partner(table, anchor_number)?;
            Bet {
                bet_type: BET_EXACTA.to_string(),
                selection: format!("{}→{}", anchor_number, partner_number),
                reason: format!("波乱型: {}から高配当を狙う", anchor.horse_name),
                expected_value: Some(ev),
            }
        }
    };
    Some(bet)
}

/// Build the recommendation for a race.
///
/// Only runners whose EV strictly exceeds `ev_threshold` anchor wagers, best
/// EV first (ties keep rank order), at most `max_bets` runners. An empty bet
/// list means no candidate cleared the bar.
pub fn select(race: &RaceRecord, config: &BettingConfig) -> Recommendation {
    let (pattern, pattern_reason) = classify_pattern(race, config);
    let table = ev_table(race);

    let mut candidates: Vec<(&EvRow, f64)> = table
        .iter()
        .filter_map(|row| {
            row.expected_value
                .filter(|ev| *ev > config.ev_threshold)
                .map(|ev| (row, ev))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    candidates.truncate(config.max_bets);

    let mut bets = Vec::new();
    for (row, ev) in candidates {
        bets.push(win_bet(row, ev));
        if let Some(bet) = pattern_bet(pattern, row, ev, &table) {
            bets.push(bet);
        }
    }

    Recommendation {
        pattern: Some(pattern),
        pattern_reason,
        bets,
        ev_table: table,
    }
}

/// Upstream recommendation when supplied, otherwise a fresh selection.
pub fn resolve(race: &RaceRecord, config: &BettingConfig) -> Recommendation {
    race.recommendation
        .clone()
        .unwrap_or_else(|| select(race, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunnerPrediction;

    fn runner(rank: u32, number: u32, p: f64, odds: Option<f64>) -> RunnerPrediction {
        RunnerPrediction {
            rank: Some(rank),
            horse_number: Some(number),
            horse_name: format!("馬{}", number),
            win_probability: Some(p),
            odds,
            ..Default::default()
        }
    }

    fn race(predictions: Vec<RunnerPrediction>) -> RaceRecord {
        RaceRecord {
            race_id: "R1".to_string(),
            race_name: "テスト".to_string(),
            predictions,
            ..Default::default()
        }
    }

    #[test]
    fn test_below_breakeven_yields_no_bets() {
        // 35.2% at 2.8x -> EV 0.99
        let r = race(vec![runner(1, 5, 35.2, Some(2.8)), runner(2, 8, 30.0, Some(3.0))]);
        let rec = select(&r, &BettingConfig::default());
        assert!(rec.bets.is_empty());
        assert_eq!(rec.ev_table[0].expected_value, Some(0.99));
    }

    #[test]
    fn test_exactly_one_is_excluded() {
        // 10% at 10x -> EV 1.00
        let r = race(vec![runner(1, 1, 12.0, Some(5.0)), runner(2, 2, 10.0, Some(10.0))]);
        let rec = select(&r, &BettingConfig::default());
        assert!(rec.bets.is_empty());
    }

    #[test]
    fn test_congested_race_bets() {
        let r = race(vec![
            runner(1, 4, 30.0, Some(2.0)), // 0.60
            runner(2, 9, 25.0, Some(5.0)), // 1.25
            runner(3, 2, 20.0, Some(8.0)), // 1.60
        ]);
        let rec = select(&r, &BettingConfig::default());
        assert_eq!(rec.pattern, Some(RacePattern::Congested));
        assert_eq!(rec.bets.len(), 4);

        assert_eq!(rec.bets[0].bet_type, BET_WIN);
        assert_eq!(rec.bets[0].selection, "2 馬2");
        assert_eq!(rec.bets[1].bet_type, BET_WIDE);
        assert_eq!(rec.bets[1].selection, "2-4");
        assert_eq!(rec.bets[2].selection, "9 馬9");
        assert_eq!(rec.bets[3].selection, "4-9");

        assert!(rec
            .bets
            .iter()
            .all(|b| b.expected_value.is_some_and(|ev| ev > 1.0)));
    }

    #[test]
    fn test_favorite_pattern_adds_place_bet() {
        let r = race(vec![runner(1, 3, 45.0, Some(2.5)), runner(2, 6, 20.0, Some(4.0))]);
        let (pattern, reason) = classify_pattern(&r, &BettingConfig::default());
        assert_eq!(pattern, RacePattern::Favorite);
        assert!(reason.contains("25.0"));

        let rec = select(&r, &BettingConfig::default());
        assert_eq!(rec.bets.len(), 2);
        assert_eq!(rec.bets[1].bet_type, BET_PLACE);
        assert_eq!(rec.bets[1].selection, "3 馬3");
    }

    #[test]
    fn test_upset_pattern() {
        let r = race(vec![
            runner(1, 1, 22.0, Some(3.0)),
            runner(2, 11, 18.0, Some(15.0)), // 2.70
            runner(3, 5, 15.0, Some(4.0)),
        ]);
        let rec = select(&r, &BettingConfig::default());
        assert_eq!(rec.pattern, Some(RacePattern::Upset));
        assert!(rec.pattern_reason.contains("予測2位"));
        assert_eq!(rec.bets.len(), 2);
        assert_eq!(rec.bets[1].bet_type, BET_EXACTA);
        assert_eq!(rec.bets[1].selection, "11→1");
    }

    #[test]
    fn test_longshot_outside_top_ranks_is_not_upset() {
        let r = race(vec![
            runner(1, 1, 22.0, Some(3.0)),
            runner(2, 2, 20.0, Some(4.0)),
            runner(3, 3, 18.0, Some(5.0)),
            runner(4, 4, 10.0, Some(40.0)),
        ]);
        let (pattern, _) = classify_pattern(&r, &BettingConfig::default());
        assert_eq!(pattern, RacePattern::Congested);
    }

    #[test]
    fn test_max_bets_caps_anchors() {
        let config = BettingConfig {
            max_bets: 1,
            ..Default::default()
        };
        let r = race(vec![
            runner(1, 1, 25.0, Some(5.0)), // 1.25
            runner(2, 2, 24.0, Some(6.0)), // 1.44
        ]);
        let rec = select(&r, &config);
        let wins: Vec<_> = rec.bets.iter().filter(|b| b.bet_type == BET_WIN).collect();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].selection, "2 馬2");
    }

    #[test]
    fn test_missing_odds_never_recommended() {
        let r = race(vec![runner(1, 1, 60.0, None), runner(2, 2, 10.0, None)]);
        let rec = select(&r, &BettingConfig::default());
        assert!(rec.bets.is_empty());
        assert!(rec.ev_table.iter().all(|row| row.expected_value.is_none()));
    }

    #[test]
    fn test_resolve_prefers_supplied() {
        let mut r = race(vec![runner(1, 1, 25.0, Some(5.0))]);
        r.recommendation = Some(Recommendation {
            pattern: Some(RacePattern::Upset),
            pattern_reason: "upstream".to_string(),
            bets: Vec::new(),
            ev_table: Vec::new(),
        });
        let rec = resolve(&r, &BettingConfig::default());
        assert_eq!(rec.pattern_reason, "upstream");
    }

    #[test]
    fn test_select_is_pure() {
        let r = race(vec![runner(1, 1, 25.0, Some(5.0)), runner(2, 2, 24.0, Some(6.0))]);
        let before = r.clone();
        let a = select(&r, &BettingConfig::default());
        let b = select(&r, &BettingConfig::default());
        assert_eq!(a, b);
        assert_eq!(r, before);
    }

    #[test]
    fn test_probability_gap() {
        let r = race(vec![runner(1, 1, 30.0, None), runner(2, 2, 26.5, None)]);
        assert!((probability_gap(&r).unwrap() - 3.5).abs() < 1e-9);
        assert_eq!(probability_gap(&race(vec![runner(1, 1, 30.0, None)])), None);
    }
}
