//! Quiz configuration and question model
//!
//! This module defines the immutable question input to a session: the quiz
//! as a whole, individual questions of both supported kinds, and the
//! correctness rules used by the answer ledger. A quiz is validated once at
//! session creation and never mutated afterwards.

use std::time::Duration;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants;

type ValidationResult = garde::Result;

/// Validates that a question time limit falls within the allowed bounds
fn validate_time_limit(val: &Duration) -> ValidationResult {
    let secs = val.as_secs();
    if (constants::question::MIN_TIME_LIMIT..=constants::question::MAX_TIME_LIMIT).contains(&secs)
    {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "time_limit is outside of the bounds [{},{}]",
            constants::question::MIN_TIME_LIMIT,
            constants::question::MAX_TIME_LIMIT,
        )))
    }
}

/// A complete quiz: an ordered sequence of questions with a title
///
/// This is the question-bank input to a session. It is loaded once at
/// session creation (from whatever provider the embedding layer uses) and
/// treated as immutable for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizConfig {
    /// The title of the quiz
    #[garde(length(max = constants::quiz::MAX_TITLE_LENGTH))]
    pub title: String,

    /// The ordered questions in the quiz
    #[garde(length(min = 1, max = constants::quiz::MAX_QUESTIONS_COUNT), dive)]
    pub questions: Vec<Question>,
}

impl QuizConfig {
    /// Returns the number of questions in the quiz
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks whether the quiz contains no questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A single question with its timing and scoring parameters
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Question {
    /// The prompt text shown to players
    #[garde(length(max = constants::question::MAX_PROMPT_LENGTH))]
    pub prompt: String,

    /// Duration players have to answer once the question starts
    #[garde(custom(|v, _| validate_time_limit(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_limit: Duration,

    /// Maximum points awarded for a correct answer (decays with elapsed time)
    #[garde(skip)]
    pub points: u64,

    /// The kind-specific content of the question
    #[garde(dive)]
    pub kind: QuestionKind,
}

/// The two supported question kinds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub enum QuestionKind {
    /// A question with a fixed set of choices, exactly one of which is correct
    MultipleChoice {
        /// The ordered answer choices shown to players
        #[garde(length(min = 2, max = constants::question::MAX_CHOICE_COUNT), inner(length(max = constants::question::MAX_ANSWER_LENGTH)))]
        choices: Vec<String>,
        /// Index into `choices` of the correct answer
        #[garde(skip)]
        correct: usize,
    },
    /// A question answered with free text, matched against accepted answers
    FreeText {
        /// Accepted answers; comparison is case- and whitespace-insensitive
        #[garde(length(min = 1, max = constants::question::MAX_ACCEPTED_ANSWERS), inner(length(max = constants::question::MAX_ANSWER_LENGTH)))]
        accepted: Vec<String>,
    },
}

/// A value submitted by a player in answer to a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
pub enum AnswerValue {
    /// The index of a selected choice (multiple-choice questions)
    Choice(usize),
    /// Free text typed by the player (free-text questions)
    Text(String),
}

/// Normalizes free text for comparison: trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

impl Question {
    /// Checks whether a submitted value answers this question correctly
    ///
    /// Multiple-choice answers match by exact choice index. Free-text
    /// answers match any accepted answer after case and whitespace
    /// normalization. A value of the wrong kind is never correct.
    pub fn is_correct(&self, value: &AnswerValue) -> bool {
        match (&self.kind, value) {
            (QuestionKind::MultipleChoice { correct, .. }, AnswerValue::Choice(picked)) => {
                picked == correct
            }
            (QuestionKind::FreeText { accepted }, AnswerValue::Text(text)) => {
                let submitted = normalize(text);
                accepted.iter().any(|a| normalize(a) == submitted)
            }
            _ => false,
        }
    }

    /// Checks whether a submitted value is even expressible for this
    /// question, e.g. a choice index within range
    pub fn is_valid_submission(&self, value: &AnswerValue) -> bool {
        match (&self.kind, value) {
            (QuestionKind::MultipleChoice { choices, .. }, AnswerValue::Choice(picked)) => {
                *picked < choices.len()
            }
            (QuestionKind::FreeText { .. }, AnswerValue::Text(_)) => true,
            _ => false,
        }
    }

    /// Returns the choices shown to players, if this is a multiple-choice
    /// question
    pub fn choices(&self) -> Option<&[String]> {
        match &self.kind {
            QuestionKind::MultipleChoice { choices, .. } => Some(choices),
            QuestionKind::FreeText { .. } => None,
        }
    }
}
