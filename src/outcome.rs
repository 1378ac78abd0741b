//! Finish results attached to a race after it has run.

use serde::Serialize;

use crate::types::{RaceRecord, ResultRow};

/// Number of finishers shown with a result.
pub const TOP_FINISHERS: usize = 5;

/// Rows with a numeric finish position, in finish order.
///
/// Rows without one (scratched, pulled up, disqualified) are dropped; equal
/// positions keep their input order.
pub fn valid_finishers(rows: &[ResultRow]) -> Vec<&ResultRow> {
    let mut valid: Vec<&ResultRow> = rows.iter().filter(|r| r.finish.is_some()).collect();
    valid.sort_by_key(|r| r.finish);
    valid
}

pub fn top_finishers(rows: &[ResultRow], n: usize) -> Vec<&ResultRow> {
    let mut valid = valid_finishers(rows);
    valid.truncate(n);
    valid
}

/// How the model's top pick fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// 的中: the top pick won
    Hit,
    /// 不的中: the top pick finished at `finish`
    Miss { finish: u32 },
    /// 出走取消: the top pick has no valid finish row
    Scratched,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Hit => "的中",
            Outcome::Miss { .. } | Outcome::Scratched => "不的中",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub pick_number: u32,
    pub pick_name: String,
    pub winner_number: Option<u32>,
    pub winner_name: String,
    pub outcome: Outcome,
}

impl Verdict {
    /// One-line description, e.g. `不的中 予測1位 A（馬番3）→ 4着 / 1着: B（馬番7）`.
    pub fn summary(&self) -> String {
        let pick = format!("予測1位 {}（馬番{}）", self.pick_name, self.pick_number);
        let winner = match self.winner_number {
            Some(n) => format!("{}（馬番{}）", self.winner_name, n),
            None => self.winner_name.clone(),
        };
        match self.outcome {
            Outcome::Hit => format!("{} {}= 1着", self.outcome.label(), pick),
            Outcome::Miss { finish } => {
                format!("{} {} → {}着 / 1着: {}", self.outcome.label(), pick, finish, winner)
            }
            Outcome::Scratched => {
                format!("{} {} → 出走取消 / 1着: {}", self.outcome.label(), pick, winner)
            }
        }
    }
}

/// Compare the model's rank-1 runner with the winner.
///
/// `None` when there is no valid finisher, no prediction, or the top pick has
/// no horse number to match on.
pub fn verdict(race: &RaceRecord) -> Option<Verdict> {
    let rows = race.result.as_deref()?;
    let valid = valid_finishers(rows);
    let winner = valid.first()?;
    let pick = race.top_pick()?;
    let pick_number = pick.horse_number?;

    let outcome = if winner.horse_number == Some(pick_number) {
        Outcome::Hit
    } else {
        valid
            .iter()
            .find(|r| r.horse_number == Some(pick_number))
            .and_then(|r| r.finish)
            .map_or(Outcome::Scratched, |finish| Outcome::Miss { finish })
    };

    Some(Verdict {
        pick_number,
        pick_name: pick.horse_name.clone(),
        winner_number: winner.horse_number,
        winner_name: winner.horse_name.clone(),
        outcome,
    })
}
