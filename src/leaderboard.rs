//! Leaderboard computation
//!
//! Standings are derived from the roster's cumulative scores at read time
//! rather than maintained incrementally, so they can never drift from the
//! scores the ledger produced.

use serde::Serialize;

use crate::roster::{Id, Roster};

/// One ranked row of the leaderboard
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Standing {
    /// The player's id
    pub id: Id,
    /// The player's display name
    pub name: String,
    /// Cumulative score across closed questions
    pub score: u64,
    /// 1-based rank; ties broken by join order
    pub rank: usize,
}

/// Computes the full standings for a roster
///
/// Sorted by score descending; equal scores rank earlier-joined players
/// first so the ordering is stable across recomputations. Disconnected
/// players keep their place.
pub fn standings(roster: &Roster) -> Vec<Standing> {
    let mut players: Vec<_> = roster.iter().collect();
    players.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.joined_seq.cmp(&b.joined_seq))
    });
    players
        .into_iter()
        .enumerate()
        .map(|(i, p)| Standing {
            id: p.id,
            name: p.name.clone(),
            score: p.score,
            rank: i + 1,
        })
        .collect()
}
