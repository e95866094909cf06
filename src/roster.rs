//! Player roster management
//!
//! This module tracks the players of one session: their identity, display
//! name, connection status, join ordering, and cumulative score. Players
//! are never deleted on disconnect; their record and score survive until
//! the session itself is destroyed, and a reconnection token lets the same
//! player re-associate a fresh connection without identity spoofing.

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    fmt::Display,
    str::FromStr,
};

use rustrict::CensorStr;
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;
use web_time::SystemTime;

use crate::constants;

/// A unique identifier for a player within a session
///
/// Ids are opaque and random; they are safe to hand to the route layer and
/// embed in client state.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random player id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random player id (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A secret token proving ownership of a player record across reconnects
///
/// The token is issued once at join and never broadcast; reconnection is
/// authorized by the token rather than the display name so a second client
/// cannot claim someone else's identity.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ReconnectToken(Uuid);

impl ReconnectToken {
    /// Creates a new random reconnection token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReconnectToken {
    /// Creates a new random reconnection token (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ReconnectToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReconnectToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// One player's record within a session
#[derive(Debug, Clone)]
pub struct Player {
    /// The player's session-scoped id
    pub id: Id,
    /// The validated display name, unique within the session
    pub name: String,
    /// Whether the player currently has a live connection
    pub connected: bool,
    /// Position in join order, used for display order and rank tie-breaks
    pub joined_seq: u64,
    /// Wall-clock time the player joined
    pub joined_at: SystemTime,
    /// Cumulative score across all closed questions
    pub score: u64,
    /// The player's reconnection token; never included in broadcast views
    token: ReconnectToken,
}

impl Player {
    /// Returns the player's reconnection token
    ///
    /// Handed to the joining client exactly once; the roster otherwise
    /// keeps it private.
    pub fn token(&self) -> ReconnectToken {
        self.token
    }
}

/// Errors that can occur when joining or reconnecting
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The session has reached its configured player cap
    #[error("session is full")]
    SessionFull,
    /// The display name is already in use within the session
    #[error("name already in-use")]
    NameTaken,
    /// The name is empty after trimming whitespace
    #[error("name cannot be empty")]
    NameEmpty,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    NameTooLong,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    NameInappropriate,
    /// The reconnection token does not match any player
    #[error("invalid reconnection token")]
    ReconnectTokenInvalid,
}

/// The set of players in one session
///
/// The roster owns the player records and the name-uniqueness index. All
/// mutation happens under the session's serialization point, so the roster
/// itself carries no locking.
#[derive(Debug, Default)]
pub struct Roster {
    /// Primary mapping from player id to record
    players: HashMap<Id, Player>,
    /// Names currently in use, for uniqueness checks
    names: HashSet<String>,
    /// Token index for reconnection lookups
    by_token: HashMap<ReconnectToken, Id>,
    /// Next join-order sequence number
    next_seq: u64,
}

impl Roster {
    /// Validates a requested display name and returns its cleaned form
    ///
    /// # Errors
    ///
    /// * [`Error::NameTooLong`] when the name exceeds the length limit
    /// * [`Error::NameEmpty`] when the name is empty after trimming
    /// * [`Error::NameInappropriate`] when the name fails the content filter
    /// * [`Error::NameTaken`] when the name is in use by another player
    fn clean_name(&self, name: &str) -> Result<String, Error> {
        if name.len() > constants::name::MAX_LENGTH {
            return Err(Error::NameTooLong);
        }
        let name = rustrict::trim_whitespace(name);
        if name.is_empty() {
            return Err(Error::NameEmpty);
        }
        if name.is_inappropriate() {
            return Err(Error::NameInappropriate);
        }
        if self.names.contains(name) {
            return Err(Error::NameTaken);
        }
        Ok(name.to_owned())
    }

    /// Adds a new connected player with the given display name
    ///
    /// Duplicate names are rejected rather than suffixed, so the name a
    /// player typed is exactly the name everyone sees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionFull`] at the player cap, or a name
    /// validation error from [`Error`].
    pub fn join(
        &mut self,
        name: &str,
        cap: usize,
        now: SystemTime,
    ) -> Result<&Player, Error> {
        if self.players.len() >= cap {
            return Err(Error::SessionFull);
        }
        let name = self.clean_name(name)?;

        let id = Id::new();
        let token = ReconnectToken::new();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.names.insert(name.clone());
        self.by_token.insert(token, id);

        match self.players.entry(id) {
            Entry::Occupied(_) => unreachable!("fresh uuid collided with live player"),
            Entry::Vacant(v) => Ok(v.insert(Player {
                id,
                name,
                connected: true,
                joined_seq: seq,
                joined_at: now,
                score: 0,
                token,
            })),
        }
    }

    /// Marks a player's connection as gone without deleting the record
    ///
    /// Returns `false` if the player is unknown.
    pub fn disconnect(&mut self, id: Id) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.connected = false;
                true
            }
            None => false,
        }
    }

    /// Re-associates a connection with an existing player by token
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReconnectTokenInvalid`] if the token matches no
    /// player; no player record is created or mutated in that case.
    pub fn reconnect(&mut self, token: ReconnectToken) -> Result<&Player, Error> {
        let id = *self
            .by_token
            .get(&token)
            .ok_or(Error::ReconnectTokenInvalid)?;
        let player = self
            .players
            .get_mut(&id)
            .ok_or(Error::ReconnectTokenInvalid)?;
        player.connected = true;
        Ok(player)
    }

    /// Gets a player record by id
    pub fn get(&self, id: Id) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Adds points to a player's cumulative score
    pub fn add_score(&mut self, id: Id, points: u64) {
        if let Some(player) = self.players.get_mut(&id) {
            player.score += points;
        }
    }

    /// Returns the total number of players, connected or not
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Checks whether the roster has no players
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Returns the number of players with a live connection
    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    /// Iterates over all player records
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Returns the ids of all players, connected or not
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.players.keys().copied()
    }

    /// Returns the ids of players with a live connection
    pub fn connected_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.players
            .values()
            .filter(|p| p.connected)
            .map(|p| p.id)
    }

    /// Returns display names in join order, for lobby views
    pub fn names_in_join_order(&self) -> Vec<String> {
        let mut players: Vec<_> = self.players.values().collect();
        players.sort_by_key(|p| p.joined_seq);
        players.into_iter().map(|p| p.name.clone()).collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        SystemTime::now()
    }

    #[test]
    fn test_join_assigns_identity() {
        let mut roster = Roster::default();
        let player = roster.join("Alice", 50, now()).unwrap();
        assert_eq!(player.name, "Alice");
        assert!(player.connected);
        assert_eq!(player.score, 0);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_join_rejects_duplicate_name() {
        let mut roster = Roster::default();
        roster.join("Alice", 50, now()).unwrap();
        assert_eq!(roster.join("Alice", 50, now()).unwrap_err(), Error::NameTaken);
        // Trimmed form collides too
        assert_eq!(
            roster.join("  Alice ", 50, now()).unwrap_err(),
            Error::NameTaken
        );
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_join_rejects_bad_names() {
        let mut roster = Roster::default();
        assert_eq!(roster.join("   ", 50, now()).unwrap_err(), Error::NameEmpty);
        assert_eq!(
            roster
                .join(&"x".repeat(constants::name::MAX_LENGTH + 1), 50, now())
                .unwrap_err(),
            Error::NameTooLong
        );
    }

    #[test]
    fn test_join_respects_cap() {
        let mut roster = Roster::default();
        roster.join("Alice", 2, now()).unwrap();
        roster.join("Bob", 2, now()).unwrap();
        assert_eq!(
            roster.join("Carol", 2, now()).unwrap_err(),
            Error::SessionFull
        );
    }

    #[test]
    fn test_disconnect_preserves_record() {
        let mut roster = Roster::default();
        let id = roster.join("Alice", 50, now()).unwrap().id;
        roster.add_score(id, 700);

        assert!(roster.disconnect(id));
        assert_eq!(roster.connected_count(), 0);
        let player = roster.get(id).unwrap();
        assert!(!player.connected);
        assert_eq!(player.score, 700);
        assert_eq!(player.name, "Alice");
    }

    #[test]
    fn test_reconnect_by_token_restores_player() {
        let mut roster = Roster::default();
        let (id, token) = {
            let p = roster.join("Alice", 50, now()).unwrap();
            (p.id, p.token())
        };
        roster.add_score(id, 500);
        roster.disconnect(id);

        let player = roster.reconnect(token).unwrap();
        assert_eq!(player.id, id);
        assert_eq!(player.score, 500);
        assert!(player.connected);
    }

    #[test]
    fn test_reconnect_rejects_bad_token() {
        let mut roster = Roster::default();
        roster.join("Alice", 50, now()).unwrap();

        let before = roster.len();
        assert_eq!(
            roster.reconnect(ReconnectToken::new()).unwrap_err(),
            Error::ReconnectTokenInvalid
        );
        assert_eq!(roster.len(), before);
        assert_eq!(roster.connected_count(), 1);
    }

    #[test]
    fn test_names_in_join_order() {
        let mut roster = Roster::default();
        roster.join("Alice", 50, now()).unwrap();
        roster.join("Bob", 50, now()).unwrap();
        roster.join("Carol", 50, now()).unwrap();
        assert_eq!(roster.names_in_join_order(), ["Alice", "Bob", "Carol"]);
    }
}
