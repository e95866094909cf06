//! Answer ledger with exactly-once scoring
//!
//! This module records every accepted answer per question round, enforces
//! the one-answer-per-player rule, and computes scores at the moment of
//! acceptance. A round is opened when its question starts and closed at
//! most once; after close the round is an immutable record used for result
//! views and the final summary.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    constants,
    question::{AnswerValue, Question, QuestionKind},
    roster::Id,
};

/// One accepted answer, scored at acceptance
#[derive(Debug, Clone)]
pub struct Answer {
    /// The submitting player
    pub player: Id,
    /// The submitted value
    pub value: AnswerValue,
    /// When the submission was accepted
    pub submitted_at: SystemTime,
    /// Whether the value matched the question's correct answer
    pub correct: bool,
    /// Points earned; zero for incorrect answers
    pub points: u64,
}

/// Reasons an answer submission is refused
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// The targeted round is not accepting answers
    #[error("answers are not being accepted for this question")]
    NotAccepting,
    /// The player already has an accepted answer for this round
    #[error("answer already recorded for this question")]
    AlreadyAnswered,
    /// The submitted value cannot apply to the question, e.g. a choice
    /// index out of range
    #[error("answer does not match the question format")]
    InvalidValue,
}

/// Per-choice or correct/incorrect answer counts for a closed round
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum Distribution {
    /// Counts per choice index, aligned with the question's choices
    Choices(Vec<usize>),
    /// Counts of correct and incorrect free-text answers
    Text {
        /// Number of answers matching an accepted answer
        correct: usize,
        /// Number of answers matching none
        incorrect: usize,
    },
}

/// The record of one question's answer window
#[derive(Debug)]
pub struct Round {
    /// Index of the question this round belongs to
    pub question_index: usize,
    /// When the round opened
    pub opened_at: SystemTime,
    /// Whether answers are currently accepted
    accepting: bool,
    /// Accepted answers keyed by player
    answers: HashMap<Id, Answer>,
}

impl Round {
    /// Returns the number of accepted answers
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Checks whether the given player has an accepted answer
    pub fn has_answered(&self, player: Id) -> bool {
        self.answers.contains_key(&player)
    }

    /// Gets a player's accepted answer, if any
    pub fn answer(&self, player: Id) -> Option<&Answer> {
        self.answers.get(&player)
    }

    /// Computes the answer distribution for result views
    pub fn distribution(&self, question: &Question) -> Distribution {
        match &question.kind {
            QuestionKind::MultipleChoice { choices, .. } => {
                let mut counts = vec![0; choices.len()];
                for answer in self.answers.values() {
                    if let AnswerValue::Choice(picked) = &answer.value {
                        if let Some(slot) = counts.get_mut(*picked) {
                            *slot += 1;
                        }
                    }
                }
                Distribution::Choices(counts)
            }
            QuestionKind::FreeText { .. } => {
                let correct = self.answers.values().filter(|a| a.correct).count();
                Distribution::Text {
                    correct,
                    incorrect: self.answers.len() - correct,
                }
            }
        }
    }

    /// Returns the number of correct answers in this round
    pub fn correct_count(&self) -> usize {
        self.answers.values().filter(|a| a.correct).count()
    }
}

/// Computes the points earned by a correct answer
///
/// Points start at the question's full value and decay linearly to half as
/// the answer window elapses, with a fixed floor so a correct answer never
/// earns nothing. An elapsed time beyond the limit clamps to the half-value
/// endpoint.
fn score_correct(base: u64, elapsed: Duration, limit: Duration) -> u64 {
    let ratio = if limit.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f64() / limit.as_secs_f64()).clamp(0.0, 1.0)
    };
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    let points = (base as f64 * (1.0 - ratio / 2.0)) as u64;
    points.max(constants::question::MIN_CORRECT_POINTS)
}

/// The per-session answer ledger
///
/// Rounds are appended in question order; at most one round is accepting
/// answers at a time because the session opens a round only when a
/// question starts and closes it before showing results.
#[derive(Debug, Default)]
pub struct Ledger {
    rounds: Vec<Round>,
}

impl Ledger {
    /// Opens the answer window for a question
    ///
    /// A round for an already-recorded question index is never reopened;
    /// the existing record stands and the call is a no-op.
    pub fn open_round(&mut self, question_index: usize, now: SystemTime) {
        if self.rounds.iter().any(|r| r.question_index == question_index) {
            return;
        }
        debug_assert!(
            self.rounds.iter().all(|r| !r.accepting),
            "opening a round while another is accepting"
        );
        self.rounds.push(Round {
            question_index,
            opened_at: now,
            accepting: true,
            answers: HashMap::new(),
        });
    }

    /// Records one player's answer for the given question
    ///
    /// The answer is validated, scored against the time elapsed since the
    /// round opened, and recorded exactly once. Returns the accepted
    /// record so the caller can apply the score delta and notify clients.
    ///
    /// # Errors
    ///
    /// Refuses with a [`Reject`] when the round is closed or missing, the
    /// player already answered, or the value does not fit the question.
    pub fn submit(
        &mut self,
        question_index: usize,
        question: &Question,
        player: Id,
        value: AnswerValue,
        now: SystemTime,
    ) -> Result<&Answer, Reject> {
        let round = self
            .rounds
            .iter_mut()
            .find(|r| r.question_index == question_index)
            .ok_or(Reject::NotAccepting)?;
        if !round.accepting {
            return Err(Reject::NotAccepting);
        }
        if round.answers.contains_key(&player) {
            return Err(Reject::AlreadyAnswered);
        }
        if !question.is_valid_submission(&value) {
            return Err(Reject::InvalidValue);
        }

        // Closing the round is the caller's transition; a straggler past
        // the deadline is only rejected
        let elapsed = now
            .duration_since(round.opened_at)
            .unwrap_or(Duration::ZERO);
        if elapsed > question.time_limit {
            return Err(Reject::NotAccepting);
        }

        let correct = question.is_correct(&value);
        let points = if correct {
            score_correct(question.points, elapsed, question.time_limit)
        } else {
            0
        };

        let answer = Answer {
            player,
            value,
            submitted_at: now,
            correct,
            points,
        };
        Ok(round.answers.entry(player).or_insert(answer))
    }

    /// Closes the answer window for a question
    ///
    /// Returns the score deltas to apply, with an explicit zero for every
    /// listed player without an accepted answer so result views can show a
    /// complete picture. Closing an already-closed or unknown round yields
    /// no deltas.
    pub fn close_round(
        &mut self,
        question_index: usize,
        players: impl Iterator<Item = Id>,
    ) -> Vec<(Id, u64)> {
        let Some(round) = self
            .rounds
            .iter_mut()
            .find(|r| r.question_index == question_index)
        else {
            return Vec::new();
        };
        if !round.accepting {
            return Vec::new();
        }
        round.accepting = false;
        players
            .map(|id| {
                let points = round.answers.get(&id).map_or(0, |a| a.points);
                (id, points)
            })
            .collect()
    }

    /// Checks whether the given question's round is accepting answers
    pub fn is_accepting(&self, question_index: usize) -> bool {
        self.rounds
            .iter()
            .any(|r| r.question_index == question_index && r.accepting)
    }

    /// Gets the round record for a question, if one was opened
    pub fn round(&self, question_index: usize) -> Option<&Round> {
        self.rounds
            .iter()
            .find(|r| r.question_index == question_index)
    }

    /// Returns per-question (answered, correct) counts in question order
    pub fn round_stats(&self) -> Vec<(usize, usize)> {
        self.rounds
            .iter()
            .map(|r| (r.answered_count(), r.correct_count()))
            .collect()
    }

    /// Returns one player's points per recorded round, in question order
    pub fn player_points(&self, player: Id) -> Vec<u64> {
        self.rounds
            .iter()
            .map(|r| r.answers.get(&player).map_or(0, |a| a.points))
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::question::QuestionKind;

    fn question() -> Question {
        Question {
            prompt: "Pick A".to_string(),
            time_limit: Duration::from_secs(30),
            points: 1000,
            kind: QuestionKind::MultipleChoice {
                choices: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                correct: 0,
            },
        }
    }

    fn at(base: SystemTime, secs: u64) -> SystemTime {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_submit_scores_immediate_answer_at_full_points() {
        let mut ledger = Ledger::default();
        let q = question();
        let player = Id::new();
        let start = SystemTime::now();

        ledger.open_round(0, start);
        let answer = ledger
            .submit(0, &q, player, AnswerValue::Choice(0), start)
            .unwrap();
        assert!(answer.correct);
        assert_eq!(answer.points, 1000);
    }

    #[test]
    fn test_submit_score_decays_to_half_at_deadline() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        let half = ledger
            .submit(0, &q, Id::new(), AnswerValue::Choice(0), at(start, 15))
            .unwrap()
            .points;
        assert_eq!(half, 750);

        let late = ledger
            .submit(0, &q, Id::new(), AnswerValue::Choice(0), at(start, 30))
            .unwrap()
            .points;
        assert_eq!(late, 500);
    }

    #[test]
    fn test_score_floor_for_correct_answers() {
        let base = 60;
        let points = score_correct(
            base,
            Duration::from_secs(30),
            Duration::from_secs(30),
        );
        assert_eq!(points, constants::question::MIN_CORRECT_POINTS);
    }

    #[test]
    fn test_incorrect_answer_earns_zero() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        let answer = ledger
            .submit(0, &q, Id::new(), AnswerValue::Choice(1), start)
            .unwrap();
        assert!(!answer.correct);
        assert_eq!(answer.points, 0);
    }

    #[test]
    fn test_duplicate_submission_rejected_first_stands() {
        let mut ledger = Ledger::default();
        let q = question();
        let player = Id::new();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        ledger
            .submit(0, &q, player, AnswerValue::Choice(0), start)
            .unwrap();
        assert!(matches!(
            ledger.submit(0, &q, player, AnswerValue::Choice(1), at(start, 1)),
            Err(Reject::AlreadyAnswered)
        ));

        let recorded = ledger.round(0).unwrap().answer(player).unwrap();
        assert_eq!(recorded.value, AnswerValue::Choice(0));
        assert!(recorded.correct);
    }

    #[test]
    fn test_submission_after_deadline_rejected() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        let result = ledger.submit(0, &q, Id::new(), AnswerValue::Choice(0), at(start, 31));
        assert!(matches!(result, Err(Reject::NotAccepting)));
    }

    #[test]
    fn test_submission_to_closed_round_rejected() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);
        ledger.close_round(0, std::iter::empty());

        let result = ledger.submit(0, &q, Id::new(), AnswerValue::Choice(0), at(start, 1));
        assert!(matches!(result, Err(Reject::NotAccepting)));
    }

    #[test]
    fn test_out_of_range_choice_rejected() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        let result = ledger.submit(0, &q, Id::new(), AnswerValue::Choice(3), start);
        assert!(matches!(result, Err(Reject::InvalidValue)));
    }

    #[test]
    fn test_late_submission_leaves_round_open_for_close() {
        let mut ledger = Ledger::default();
        let q = question();
        let on_time = Id::new();
        let straggler = Id::new();
        let start = SystemTime::now();
        ledger.open_round(0, start);
        ledger
            .submit(0, &q, on_time, AnswerValue::Choice(0), start)
            .unwrap();

        // A submission racing in past the deadline is rejected
        let result = ledger.submit(0, &q, straggler, AnswerValue::Choice(0), at(start, 31));
        assert!(matches!(result, Err(Reject::NotAccepting)));

        // The round still closes normally, with deltas for everyone
        let deltas = ledger.close_round(0, [on_time, straggler].into_iter());
        assert_eq!(deltas.len(), 2);
        let lookup: HashMap<Id, u64> = deltas.into_iter().collect();
        assert_eq!(lookup[&on_time], 1000);
        assert_eq!(lookup[&straggler], 0);
    }

    #[test]
    fn test_close_round_reports_explicit_zeros() {
        let mut ledger = Ledger::default();
        let q = question();
        let answered = Id::new();
        let silent = Id::new();
        let start = SystemTime::now();

        ledger.open_round(0, start);
        ledger
            .submit(0, &q, answered, AnswerValue::Choice(0), start)
            .unwrap();

        let deltas = ledger.close_round(0, [answered, silent].into_iter());
        assert_eq!(deltas.len(), 2);
        let lookup: HashMap<Id, u64> = deltas.into_iter().collect();
        assert_eq!(lookup[&answered], 1000);
        assert_eq!(lookup[&silent], 0);
    }

    #[test]
    fn test_close_round_is_idempotent() {
        let mut ledger = Ledger::default();
        let q = question();
        let player = Id::new();
        let start = SystemTime::now();

        ledger.open_round(0, start);
        ledger
            .submit(0, &q, player, AnswerValue::Choice(0), start)
            .unwrap();

        let first = ledger.close_round(0, std::iter::once(player));
        assert_eq!(first.len(), 1);
        let second = ledger.close_round(0, std::iter::once(player));
        assert!(second.is_empty());
    }

    #[test]
    fn test_reopen_is_a_no_op() {
        let mut ledger = Ledger::default();
        let q = question();
        let player = Id::new();
        let start = SystemTime::now();

        ledger.open_round(0, start);
        ledger
            .submit(0, &q, player, AnswerValue::Choice(0), start)
            .unwrap();
        ledger.close_round(0, std::iter::once(player));

        ledger.open_round(0, at(start, 5));
        assert!(!ledger.is_accepting(0));
        assert_eq!(ledger.round(0).unwrap().answered_count(), 1);
    }

    #[test]
    fn test_choice_distribution() {
        let mut ledger = Ledger::default();
        let q = question();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        for choice in [0, 0, 1] {
            ledger
                .submit(0, &q, Id::new(), AnswerValue::Choice(choice), start)
                .unwrap();
        }

        let dist = ledger.round(0).unwrap().distribution(&q);
        assert_eq!(dist, Distribution::Choices(vec![2, 1, 0]));
    }

    #[test]
    fn test_text_distribution() {
        let q = Question {
            prompt: "Largest planet?".to_string(),
            time_limit: Duration::from_secs(30),
            points: 1000,
            kind: QuestionKind::FreeText {
                accepted: vec!["Jupiter".to_string()],
            },
        };
        let mut ledger = Ledger::default();
        let start = SystemTime::now();
        ledger.open_round(0, start);

        ledger
            .submit(0, &q, Id::new(), AnswerValue::Text("jupiter".into()), start)
            .unwrap();
        ledger
            .submit(0, &q, Id::new(), AnswerValue::Text("saturn".into()), start)
            .unwrap();

        let dist = ledger.round(0).unwrap().distribution(&q);
        assert_eq!(
            dist,
            Distribution::Text {
                correct: 1,
                incorrect: 1
            }
        );
    }

    #[test]
    fn test_player_points_history() {
        let mut ledger = Ledger::default();
        let q = question();
        let player = Id::new();
        let start = SystemTime::now();

        ledger.open_round(0, start);
        ledger
            .submit(0, &q, player, AnswerValue::Choice(0), start)
            .unwrap();
        ledger.close_round(0, std::iter::once(player));

        ledger.open_round(1, at(start, 60));
        ledger.close_round(1, std::iter::once(player));

        assert_eq!(ledger.player_points(player), [1000, 0]);
        assert_eq!(ledger.round_stats(), [(1, 1), (0, 0)]);
    }
}
