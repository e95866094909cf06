//! Broadcast coordination and outbound messages
//!
//! The engine never talks to sockets directly. The embedding layer hands
//! each connection to the session as a [`Sink`], and the session fans
//! state changes out through [`Subscriptions`]. Delivery failures are
//! contained: a sink that refuses a message is dropped and logged, and the
//! announcement continues to the remaining subscribers.

use std::{collections::HashSet, fmt::Display, str::FromStr, time::Duration};

use enum_map::{Enum, EnumMap};
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay, skip_serializing_none};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    leaderboard::Standing,
    ledger::Distribution,
    pin::Pin,
    roster::Id,
};

/// Error returned by a sink whose underlying connection is gone
#[derive(Debug, Error)]
#[error("subscriber connection is gone")]
pub struct SinkError;

/// An outbound channel to one connected client
///
/// Implementations wrap whatever transport the embedding layer uses, e.g.
/// a websocket write half or an in-memory channel in tests. Sends must not
/// block the caller for long; queueing is the implementation's concern.
pub trait Sink {
    /// Sends an incremental update
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the connection can no longer deliver;
    /// the subscription will be dropped.
    fn send_update(&self, message: &UpdateMessage) -> Result<(), SinkError>;

    /// Sends a full state snapshot, used on connect and reconnect
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the connection can no longer deliver.
    fn send_sync(&self, message: &SyncMessage) -> Result<(), SinkError>;

    /// Closes the underlying connection
    fn close(&self);
}

/// A unique identifier for one subscription
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a new random subscription id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    /// Creates a new random subscription id (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Who a subscription represents
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The session host's connection
    Host,
    /// A player's connection
    Player(Id),
}

impl Audience {
    /// Returns the coarse kind of this audience
    pub fn kind(self) -> AudienceKind {
        match self {
            Self::Host => AudienceKind::Host,
            Self::Player(_) => AudienceKind::Player,
        }
    }
}

/// Coarse audience categories used to index subscriptions
#[derive(Debug, Copy, Clone, PartialEq, Eq, Enum)]
pub enum AudienceKind {
    /// Host connections
    Host,
    /// Player connections
    Player,
}

/// Incremental updates pushed to connected clients as the session changes
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub enum UpdateMessage {
    /// A player joined the lobby
    PlayerJoined {
        /// The player's display name
        name: String,
        /// Total roster size after the join
        player_count: usize,
    },
    /// A player's connection dropped
    PlayerDisconnected {
        /// The player's display name
        name: String,
        /// Connected players remaining
        connected_count: usize,
    },
    /// A player reconnected
    PlayerReconnected {
        /// The player's display name
        name: String,
        /// Connected players after the reconnect
        connected_count: usize,
    },
    /// A question opened for answers
    QuestionStarted {
        /// 0-based index of the question
        index: usize,
        /// Total questions in the quiz
        count: usize,
        /// The prompt text
        prompt: String,
        /// Choices for multiple-choice questions; absent for free text
        choices: Option<Vec<String>>,
        /// Time allowed for answers
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        time_limit: Duration,
    },
    /// Progress of the current answer window, sent to the host
    AnsweredCount {
        /// Players with an accepted answer
        answered: usize,
        /// Players currently connected
        connected: usize,
    },
    /// Aggregate results of a closed question, sent to the host
    QuestionResults {
        /// 0-based index of the question
        index: usize,
        /// How submitted answers were distributed
        distribution: Distribution,
        /// Number of correct answers
        correct_count: usize,
        /// Current standings
        standings: Vec<Standing>,
    },
    /// One player's outcome for a closed question
    PlayerResult {
        /// 0-based index of the question
        index: usize,
        /// Whether this player answered correctly
        correct: bool,
        /// Points this question earned them
        points_earned: u64,
        /// Their cumulative score
        score: u64,
        /// Their current rank
        rank: usize,
    },
    /// Final summary for the host
    HostSummary {
        /// Per-question (answered, correct) counts
        stats: Vec<(usize, usize)>,
        /// Total roster size
        player_count: usize,
        /// Final standings
        standings: Vec<Standing>,
    },
    /// Final summary for one player
    PlayerSummary {
        /// Their final score
        score: u64,
        /// Their final rank
        rank: usize,
        /// Points earned per question
        points: Vec<u64>,
    },
}

/// Full state snapshots sent on connect and reconnect
///
/// A sync message carries everything a client needs to render the current
/// phase from scratch, so a reconnecting client never depends on updates
/// it missed.
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub enum SyncMessage {
    /// The session is waiting for players
    Lobby {
        /// The session PIN, for display
        pin: Pin,
        /// The quiz title
        title: String,
        /// Display names in join order
        players: Vec<String>,
        /// Total questions in the quiz
        question_count: usize,
    },
    /// A question is open for answers
    QuestionActive {
        /// 0-based index of the question
        index: usize,
        /// Total questions in the quiz
        count: usize,
        /// The prompt text
        prompt: String,
        /// Choices for multiple-choice questions; absent for free text
        choices: Option<Vec<String>>,
        /// Time remaining in the answer window
        #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
        remaining: Duration,
        /// Whether this client's player already answered; absent for hosts
        answered: Option<bool>,
    },
    /// Results of the latest closed question are showing
    QuestionResults {
        /// 0-based index of the question
        index: usize,
        /// Total questions in the quiz
        count: usize,
        /// Current standings
        standings: Vec<Standing>,
    },
    /// The session has finished
    Finished {
        /// Final standings
        standings: Vec<Standing>,
    },
}

impl UpdateMessage {
    /// Converts the message to a JSON string
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

impl SyncMessage {
    /// Converts the message to a JSON string
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// The set of live subscriptions for one session
///
/// Keeps a reverse index by audience kind so host-only announcements do
/// not scan player subscriptions and vice versa.
#[derive(Debug)]
pub struct Subscriptions<S: Sink> {
    sinks: std::collections::HashMap<SubscriptionId, (Audience, S)>,
    by_kind: EnumMap<AudienceKind, HashSet<SubscriptionId>>,
}

impl<S: Sink> Default for Subscriptions<S> {
    fn default() -> Self {
        Self {
            sinks: std::collections::HashMap::new(),
            by_kind: EnumMap::default(),
        }
    }
}

impl<S: Sink> Subscriptions<S> {
    /// Registers a sink for the given audience, returning its id
    pub fn subscribe(&mut self, audience: Audience, sink: S) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.by_kind[audience.kind()].insert(id);
        self.sinks.insert(id, (audience, sink));
        id
    }

    /// Removes a subscription, returning who it represented
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Option<Audience> {
        let (audience, _) = self.sinks.remove(&id)?;
        self.by_kind[audience.kind()].remove(&id);
        Some(audience)
    }

    /// Returns the audience behind a subscription
    pub fn audience(&self, id: SubscriptionId) -> Option<Audience> {
        self.sinks.get(&id).map(|(a, _)| *a)
    }

    /// Returns the number of live subscriptions
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Checks whether no subscriptions are live
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Drops the sinks that failed delivery
    fn prune(&mut self, failed: Vec<SubscriptionId>) {
        for id in failed {
            log::warn!("dropping unresponsive subscriber {id}");
            self.unsubscribe(id);
        }
    }

    /// Sends an update to every subscription
    pub fn announce(&mut self, message: &UpdateMessage) {
        let failed: Vec<_> = self
            .sinks
            .iter()
            .filter(|(_, (_, sink))| sink.send_update(message).is_err())
            .map(|(id, _)| *id)
            .collect();
        self.prune(failed);
    }

    /// Sends an update to every subscription of one kind
    pub fn announce_kind(&mut self, kind: AudienceKind, message: &UpdateMessage) {
        let failed: Vec<_> = self.by_kind[kind]
            .iter()
            .filter(|id| {
                self.sinks
                    .get(id)
                    .is_some_and(|(_, sink)| sink.send_update(message).is_err())
            })
            .copied()
            .collect();
        self.prune(failed);
    }

    /// Sends an update to every subscription belonging to one player
    pub fn announce_player(&mut self, player: Id, message: &UpdateMessage) {
        let failed: Vec<_> = self
            .sinks
            .iter()
            .filter(|(_, (audience, sink))| {
                *audience == Audience::Player(player) && sink.send_update(message).is_err()
            })
            .map(|(id, _)| *id)
            .collect();
        self.prune(failed);
    }

    /// Sends a state snapshot to one subscription
    pub fn send_sync(&mut self, id: SubscriptionId, message: &SyncMessage) {
        let failed = self
            .sinks
            .get(&id)
            .is_some_and(|(_, sink)| sink.send_sync(message).is_err());
        if failed {
            self.prune(vec![id]);
        }
    }

    /// Closes every sink and clears the subscription set
    pub fn close_all(&mut self) {
        for (_, sink) in self.sinks.values() {
            sink.close();
        }
        self.sinks.clear();
        self.by_kind = EnumMap::default();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug, Clone, Default)]
    struct MockSink {
        updates: Rc<RefCell<Vec<String>>>,
        closed: Rc<RefCell<bool>>,
        fail: bool,
    }

    impl Sink for MockSink {
        fn send_update(&self, message: &UpdateMessage) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError);
            }
            self.updates.borrow_mut().push(message.to_message());
            Ok(())
        }

        fn send_sync(&self, message: &SyncMessage) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError);
            }
            self.updates.borrow_mut().push(message.to_message());
            Ok(())
        }

        fn close(&self) {
            *self.closed.borrow_mut() = true;
        }
    }

    fn joined() -> UpdateMessage {
        UpdateMessage::PlayerJoined {
            name: "Alice".to_string(),
            player_count: 1,
        }
    }

    #[test]
    fn test_announce_reaches_all_audiences() {
        let mut subs = Subscriptions::default();
        let host = MockSink::default();
        let player = MockSink::default();
        subs.subscribe(Audience::Host, host.clone());
        subs.subscribe(Audience::Player(Id::new()), player.clone());

        subs.announce(&joined());
        assert_eq!(host.updates.borrow().len(), 1);
        assert_eq!(player.updates.borrow().len(), 1);
    }

    #[test]
    fn test_announce_kind_is_scoped() {
        let mut subs = Subscriptions::default();
        let host = MockSink::default();
        let player = MockSink::default();
        subs.subscribe(Audience::Host, host.clone());
        subs.subscribe(Audience::Player(Id::new()), player.clone());

        subs.announce_kind(
            AudienceKind::Host,
            &UpdateMessage::AnsweredCount {
                answered: 1,
                connected: 2,
            },
        );
        assert_eq!(host.updates.borrow().len(), 1);
        assert!(player.updates.borrow().is_empty());
    }

    #[test]
    fn test_announce_player_targets_one_player() {
        let mut subs = Subscriptions::default();
        let alice = Id::new();
        let alice_sink = MockSink::default();
        let bob_sink = MockSink::default();
        subs.subscribe(Audience::Player(alice), alice_sink.clone());
        subs.subscribe(Audience::Player(Id::new()), bob_sink.clone());

        subs.announce_player(alice, &joined());
        assert_eq!(alice_sink.updates.borrow().len(), 1);
        assert!(bob_sink.updates.borrow().is_empty());
    }

    #[test]
    fn test_failed_sink_is_dropped_and_others_still_delivered() {
        let mut subs = Subscriptions::default();
        let broken = MockSink {
            fail: true,
            ..MockSink::default()
        };
        let healthy = MockSink::default();
        subs.subscribe(Audience::Player(Id::new()), broken);
        subs.subscribe(Audience::Player(Id::new()), healthy.clone());

        subs.announce(&joined());
        assert_eq!(healthy.updates.borrow().len(), 1);
        assert_eq!(subs.len(), 1);

        // Further announcements skip the dropped sink entirely
        subs.announce(&joined());
        assert_eq!(healthy.updates.borrow().len(), 2);
    }

    #[test]
    fn test_unsubscribe_returns_audience() {
        let mut subs = Subscriptions::default();
        let id = subs.subscribe(Audience::Host, MockSink::default());
        assert_eq!(subs.unsubscribe(id), Some(Audience::Host));
        assert_eq!(subs.unsubscribe(id), None);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_close_all_closes_sinks() {
        let mut subs = Subscriptions::default();
        let sink = MockSink::default();
        subs.subscribe(Audience::Host, sink.clone());

        subs.close_all();
        assert!(*sink.closed.borrow());
        assert!(subs.is_empty());
    }
}
