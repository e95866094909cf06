//! The session state machine
//!
//! A session owns one quiz run: the roster, the answer ledger, the live
//! subscriptions, and the phase it is currently in. Phases advance only
//! through host commands and question deadlines; every transition happens
//! under the registry's per-session lock, so the methods here are written
//! as plain sequential code.

use std::{sync::Arc, time::Duration};

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    broadcast::{
        Audience, AudienceKind, Sink, SubscriptionId, Subscriptions, SyncMessage, UpdateMessage,
    },
    constants, leaderboard,
    leaderboard::Standing,
    ledger::{self, Ledger},
    pin::Pin,
    question::{AnswerValue, QuizConfig},
    roster::{self, Id, ReconnectToken, Roster},
    timer::Expiry,
};

/// The phases a session moves through
///
/// The lifecycle is linear: the lobby leads into alternating active and
/// results phases, one pair per question, and ends in the terminal
/// finished phase. No transition moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Waiting for players to join
    Lobby,
    /// A question is open for answers
    QuestionActive {
        /// 0-based index of the open question
        index: usize,
    },
    /// Results of a closed question are showing
    QuestionResults {
        /// 0-based index of the closed question
        index: usize,
    },
    /// The session is over; no further transitions occur
    Finished,
}

/// Commands only the host connection may issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCommand {
    /// Start the first question from the lobby
    StartQuestion,
    /// Close the active question early and show its results
    ForceReveal,
    /// Advance from results to the next question, or finish after the last
    NextQuestion,
    /// Abort the run from any phase and jump to the final summary
    EndGame,
}

/// Per-session behavior knobs set at creation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Options {
    /// Maximum number of players admitted
    #[garde(range(min = 1, max = constants::session::MAX_PLAYER_CAP))]
    pub player_cap: usize,
    /// Connected players required before the first question can start
    #[garde(range(min = 1))]
    pub min_players: usize,
    /// Whether players may join after the quiz has left the lobby
    #[garde(skip)]
    pub allow_late_join: bool,
    /// Whether a question closes as soon as every connected player answered
    #[garde(skip)]
    pub reveal_when_all_answered: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            player_cap: constants::session::DEFAULT_PLAYER_CAP,
            min_players: constants::session::DEFAULT_MIN_PLAYERS,
            allow_late_join: true,
            reveal_when_all_answered: true,
        }
    }
}

/// Errors produced by session operations
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The command does not apply in the current phase
    #[error("command does not apply in the current phase")]
    InvalidTransition,
    /// Too few connected players to start the quiz
    #[error("not enough players to start")]
    NotEnoughPlayers,
    /// The session has finished
    #[error("the session has ended")]
    Ended,
    /// The referenced player is not on the roster
    #[error("unknown player")]
    UnknownPlayer,
    /// The submission targets a question that is not the active one
    #[error("question is not the active one")]
    WrongQuestion,
    /// The answer ledger refused the submission
    #[error(transparent)]
    Answer(#[from] ledger::Reject),
    /// The roster refused a join or reconnect
    #[error(transparent)]
    Roster(#[from] roster::Error),
}

/// A small serializable view of the session, returned by mutating calls
/// and used by route layers for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// The session's PIN
    pub pin: Pin,
    /// Current phase
    pub phase: Phase,
    /// Total roster size, connected or not
    pub player_count: usize,
    /// Players currently connected
    pub connected_count: usize,
    /// Questions in the quiz
    pub question_count: usize,
}

/// Permanent record of one finished session
#[derive(Debug, Clone, Serialize)]
pub struct FinalSummary {
    /// The session's PIN
    pub pin: Pin,
    /// The quiz title
    pub title: String,
    /// Total roster size
    pub player_count: usize,
    /// Per-question (answered, correct) counts in question order
    pub stats: Vec<(usize, usize)>,
    /// Final standings
    pub standings: Vec<Standing>,
    /// When the session finished
    pub finished_at: SystemTime,
}

/// A collaborator that persists finished sessions
///
/// Called exactly once per session, when it reaches the finished phase.
/// Implementations decide what durable storage means.
pub trait Archive: Send + Sync {
    /// Records the final summary of a finished session
    fn record(&self, summary: &FinalSummary);
}

/// One live quiz run
pub struct Session<S: Sink> {
    pin: Pin,
    config: QuizConfig,
    options: Options,
    phase: Phase,
    roster: Roster,
    ledger: Ledger,
    subscriptions: Subscriptions<S>,
    created_at: SystemTime,
    last_activity: SystemTime,
    archive: Option<Arc<dyn Archive>>,
}

impl<S: Sink> Session<S> {
    /// Creates a session in the lobby phase
    ///
    /// # Errors
    ///
    /// Returns the validation report when the quiz or the options violate
    /// their configured bounds.
    pub fn new(
        pin: Pin,
        config: QuizConfig,
        options: Options,
        now: SystemTime,
    ) -> Result<Self, garde::Report> {
        config.validate()?;
        options.validate()?;
        Ok(Self {
            pin,
            config,
            options,
            phase: Phase::Lobby,
            roster: Roster::default(),
            ledger: Ledger::default(),
            subscriptions: Subscriptions::default(),
            created_at: now,
            last_activity: now,
            archive: None,
        })
    }

    /// Attaches an archive to be notified when the session finishes
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Returns the session's PIN
    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Returns the current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns when the session was created
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Checks whether the session reached the terminal phase
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Checks whether the session has been unused for at least `max_idle`
    /// with no live subscriptions
    pub fn is_idle(&self, now: SystemTime, max_idle: Duration) -> bool {
        self.subscriptions.is_empty()
            && now
                .duration_since(self.last_activity)
                .is_ok_and(|idle| idle >= max_idle)
    }

    /// Builds the current status view
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            pin: self.pin,
            phase: self.phase,
            player_count: self.roster.len(),
            connected_count: self.roster.connected_count(),
            question_count: self.config.len(),
        }
    }

    /// Admits a new player, returning their id and reconnection token
    ///
    /// Joins are always allowed in the lobby; after the quiz starts they
    /// depend on the late-join option. A late joiner starts at zero points
    /// and simply has no answers for questions already closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] after the session finishes,
    /// [`Error::InvalidTransition`] when late joins are disabled, or a
    /// roster error for a bad name or a full session.
    pub fn join(&mut self, name: &str, now: SystemTime) -> Result<(Id, ReconnectToken), Error> {
        match self.phase {
            Phase::Lobby => {}
            Phase::Finished => return Err(Error::Ended),
            Phase::QuestionActive { .. } | Phase::QuestionResults { .. } => {
                if !self.options.allow_late_join {
                    return Err(Error::InvalidTransition);
                }
            }
        }
        let (id, token, name, count) = {
            let player = self.roster.join(name, self.options.player_cap, now)?;
            (
                player.id,
                player.token(),
                player.name.clone(),
                self.roster.len(),
            )
        };
        self.last_activity = now;
        self.subscriptions.announce(&UpdateMessage::PlayerJoined {
            name,
            player_count: count,
        });
        Ok((id, token))
    }

    /// Restores a player's connected status from their reconnection token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] after the session finishes or the roster's
    /// token error for an unknown token.
    pub fn reconnect(&mut self, token: ReconnectToken, now: SystemTime) -> Result<Id, Error> {
        if self.is_finished() {
            return Err(Error::Ended);
        }
        let (id, name) = {
            let player = self.roster.reconnect(token)?;
            (player.id, player.name.clone())
        };
        self.last_activity = now;
        let connected_count = self.roster.connected_count();
        self.subscriptions
            .announce(&UpdateMessage::PlayerReconnected {
                name,
                connected_count,
            });
        Ok(id)
    }

    /// Registers an outbound sink and immediately syncs it
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPlayer`] for a player audience that is not
    /// on the roster.
    pub fn subscribe(
        &mut self,
        audience: Audience,
        sink: S,
        now: SystemTime,
    ) -> Result<SubscriptionId, Error> {
        if let Audience::Player(id) = audience {
            if self.roster.get(id).is_none() {
                return Err(Error::UnknownPlayer);
            }
        }
        let sync = self.sync_for(audience, now);
        let id = self.subscriptions.subscribe(audience, sink);
        self.subscriptions.send_sync(id, &sync);
        self.last_activity = now;
        Ok(id)
    }

    /// Removes a subscription after its connection dropped
    ///
    /// When the last subscription of a player goes away the player is
    /// marked disconnected on the roster; their record and score survive
    /// for a later reconnect.
    pub fn unsubscribe(&mut self, id: SubscriptionId, now: SystemTime) {
        let Some(audience) = self.subscriptions.unsubscribe(id) else {
            return;
        };
        self.last_activity = now;
        if let Audience::Player(player_id) = audience {
            let name = match self.roster.get(player_id) {
                Some(p) => p.name.clone(),
                None => return,
            };
            self.roster.disconnect(player_id);
            let connected_count = self.roster.connected_count();
            self.subscriptions
                .announce(&UpdateMessage::PlayerDisconnected {
                    name,
                    connected_count,
                });
        }
    }

    /// Applies a host command, scheduling a deadline when a question starts
    ///
    /// Commands that re-request the state the session is already in are
    /// treated as duplicate deliveries and succeed without effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for commands that do not apply
    /// in the current phase, [`Error::NotEnoughPlayers`] when starting
    /// below the configured minimum, and [`Error::Ended`] for anything but
    /// `EndGame` after the session finished.
    pub fn host_command(
        &mut self,
        command: HostCommand,
        now: SystemTime,
        mut schedule: impl FnMut(Expiry, Duration),
    ) -> Result<StateSnapshot, Error> {
        match (command, self.phase) {
            (HostCommand::EndGame, Phase::Finished) => {}
            (_, Phase::Finished) => return Err(Error::Ended),

            (HostCommand::StartQuestion, Phase::Lobby) => {
                if self.roster.connected_count() < self.options.min_players {
                    return Err(Error::NotEnoughPlayers);
                }
                self.start_question(0, now, &mut schedule);
            }
            // Duplicate delivery of the start that already happened
            (HostCommand::StartQuestion, Phase::QuestionActive { .. }) => {}
            (HostCommand::StartQuestion, Phase::QuestionResults { .. }) => {
                return Err(Error::InvalidTransition);
            }

            (HostCommand::ForceReveal, Phase::QuestionActive { index }) => {
                self.reveal(index, now);
            }
            // The question was already revealed, e.g. by its deadline
            (HostCommand::ForceReveal, Phase::QuestionResults { .. }) => {}
            (HostCommand::ForceReveal, Phase::Lobby) => {
                return Err(Error::InvalidTransition);
            }

            (HostCommand::NextQuestion, Phase::QuestionResults { index }) => {
                let next = index + 1;
                if next < self.config.len() {
                    self.start_question(next, now, &mut schedule);
                } else {
                    self.finish(now);
                }
            }
            (HostCommand::NextQuestion, Phase::Lobby | Phase::QuestionActive { .. }) => {
                return Err(Error::InvalidTransition);
            }

            (HostCommand::EndGame, _) => {
                if let Phase::QuestionActive { index } = self.phase {
                    self.reveal(index, now);
                }
                self.finish(now);
            }
        }
        self.last_activity = now;
        Ok(self.snapshot())
    }

    /// Records one player's answer to the active question
    ///
    /// The score delta is applied at acceptance, so a duplicate delivery
    /// of the same submission can never double-count.
    ///
    /// # Errors
    ///
    /// Refuses with [`Error::WrongQuestion`] when the index is not the
    /// active question, [`Error::UnknownPlayer`] for a player not on the
    /// roster, and the ledger's [`ledger::Reject`] otherwise.
    pub fn submit_answer(
        &mut self,
        player: Id,
        question_index: usize,
        value: AnswerValue,
        now: SystemTime,
    ) -> Result<(), Error> {
        if self.roster.get(player).is_none() {
            return Err(Error::UnknownPlayer);
        }
        match self.phase {
            Phase::QuestionActive { index } if index == question_index => {}
            Phase::Finished => return Err(Error::Ended),
            _ => return Err(Error::WrongQuestion),
        }
        let question = self
            .config
            .questions
            .get(question_index)
            .ok_or(Error::WrongQuestion)?;

        let points = self
            .ledger
            .submit(question_index, question, player, value, now)?
            .points;
        self.roster.add_score(player, points);
        self.last_activity = now;

        let answered = self
            .ledger
            .round(question_index)
            .map_or(0, ledger::Round::answered_count);
        let connected = self.roster.connected_count();
        self.subscriptions.announce_kind(
            AudienceKind::Host,
            &UpdateMessage::AnsweredCount {
                answered,
                connected,
            },
        );

        if self.options.reveal_when_all_answered && self.all_connected_answered(question_index) {
            self.reveal(question_index, now);
        }
        Ok(())
    }

    /// Handles a question deadline
    ///
    /// An expiry whose question is no longer the active one is stale, a
    /// leftover from a question that was force-revealed or closed early,
    /// and is ignored.
    pub fn receive_expiry(&mut self, expiry: Expiry, now: SystemTime) {
        match self.phase {
            Phase::QuestionActive { index } if index == expiry.question_index => {
                self.reveal(index, now);
                self.last_activity = now;
            }
            _ => {
                log::debug!(
                    "ignoring stale deadline for question {} of session {}",
                    expiry.question_index,
                    self.pin
                );
            }
        }
    }

    /// Closes every subscription; called when the registry destroys the
    /// session
    pub fn close(&mut self) {
        self.subscriptions.close_all();
    }

    fn all_connected_answered(&self, question_index: usize) -> bool {
        let Some(round) = self.ledger.round(question_index) else {
            return false;
        };
        self.roster.connected_count() > 0
            && self.roster.connected_ids().all(|id| round.has_answered(id))
    }

    fn start_question(
        &mut self,
        index: usize,
        now: SystemTime,
        schedule: &mut impl FnMut(Expiry, Duration),
    ) {
        let Some(question) = self.config.questions.get(index) else {
            return;
        };
        let message = UpdateMessage::QuestionStarted {
            index,
            count: self.config.len(),
            prompt: question.prompt.clone(),
            choices: question.choices().map(<[String]>::to_vec),
            time_limit: question.time_limit,
        };
        let time_limit = question.time_limit;

        self.phase = Phase::QuestionActive { index };
        self.ledger.open_round(index, now);
        self.subscriptions.announce(&message);
        schedule(
            Expiry {
                pin: self.pin,
                question_index: index,
            },
            time_limit,
        );
    }

    fn reveal(&mut self, index: usize, _now: SystemTime) {
        let Some(question) = self.config.questions.get(index) else {
            return;
        };
        let deltas = self.ledger.close_round(index, self.roster.ids());
        let Some(round) = self.ledger.round(index) else {
            return;
        };
        let distribution = round.distribution(question);
        let correct_count = round.correct_count();
        let results: Vec<(Id, u64, bool)> = deltas
            .into_iter()
            .map(|(id, points)| {
                let correct = round.answer(id).is_some_and(|a| a.correct);
                (id, points, correct)
            })
            .collect();

        self.phase = Phase::QuestionResults { index };
        let standings = leaderboard::standings(&self.roster);

        self.subscriptions.announce_kind(
            AudienceKind::Host,
            &UpdateMessage::QuestionResults {
                index,
                distribution,
                correct_count,
                standings: standings.clone(),
            },
        );
        for (id, points, correct) in results {
            let score = self.roster.get(id).map_or(0, |p| p.score);
            let rank = standings
                .iter()
                .find(|s| s.id == id)
                .map_or(0, |s| s.rank);
            self.subscriptions.announce_player(
                id,
                &UpdateMessage::PlayerResult {
                    index,
                    correct,
                    points_earned: points,
                    score,
                    rank,
                },
            );
        }
    }

    fn finish(&mut self, now: SystemTime) {
        if self.is_finished() {
            return;
        }
        self.phase = Phase::Finished;
        let standings = leaderboard::standings(&self.roster);
        let stats = self.ledger.round_stats();

        self.subscriptions.announce_kind(
            AudienceKind::Host,
            &UpdateMessage::HostSummary {
                stats: stats.clone(),
                player_count: self.roster.len(),
                standings: standings.clone(),
            },
        );
        let player_views: Vec<(Id, u64, usize)> = standings
            .iter()
            .map(|s| (s.id, s.score, s.rank))
            .collect();
        for (id, score, rank) in player_views {
            let points = self.ledger.player_points(id);
            self.subscriptions.announce_player(
                id,
                &UpdateMessage::PlayerSummary { score, rank, points },
            );
        }

        if let Some(archive) = &self.archive {
            archive.record(&FinalSummary {
                pin: self.pin,
                title: self.config.title.clone(),
                player_count: self.roster.len(),
                stats,
                standings,
                finished_at: now,
            });
        }
    }

    fn sync_for(&self, audience: Audience, now: SystemTime) -> SyncMessage {
        match self.phase {
            Phase::Lobby => SyncMessage::Lobby {
                pin: self.pin,
                title: self.config.title.clone(),
                players: self.roster.names_in_join_order(),
                question_count: self.config.len(),
            },
            Phase::QuestionActive { index } => {
                let question = &self.config.questions[index];
                let round = self.ledger.round(index);
                let remaining = round
                    .and_then(|r| now.duration_since(r.opened_at).ok())
                    .map_or(question.time_limit, |elapsed| {
                        question.time_limit.saturating_sub(elapsed)
                    });
                let answered = match audience {
                    Audience::Host => None,
                    Audience::Player(id) => {
                        Some(round.is_some_and(|r| r.has_answered(id)))
                    }
                };
                SyncMessage::QuestionActive {
                    index,
                    count: self.config.len(),
                    prompt: question.prompt.clone(),
                    choices: question.choices().map(<[String]>::to_vec),
                    remaining,
                    answered,
                }
            }
            Phase::QuestionResults { index } => SyncMessage::QuestionResults {
                index,
                count: self.config.len(),
                standings: leaderboard::standings(&self.roster),
            },
            Phase::Finished => SyncMessage::Finished {
                standings: leaderboard::standings(&self.roster),
            },
        }
    }
}
