//! # Quizcast
//!
//! Core engine for live multiplayer quiz sessions. A host creates a
//! session from a quiz, players join by a six-digit PIN, and the session
//! walks through the questions one at a time: the host starts and reveals
//! questions, players submit answers inside a per-question time window,
//! and an answer ledger scores every submission exactly once.
//!
//! The engine is transport-agnostic. Embeddings implement
//! [`broadcast::Sink`] over their connections, hold a
//! [`registry::Registry`] in application state, and arrange for scheduled
//! [`timer::Expiry`] values to flow back into the registry when question
//! deadlines fire.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

pub mod broadcast;
pub mod constants;
pub mod leaderboard;
pub mod ledger;
pub mod pin;
pub mod question;
pub mod registry;
pub mod roster;
pub mod session;
pub mod timer;

pub use broadcast::{Audience, Sink, SinkError, SubscriptionId, SyncMessage, UpdateMessage};
pub use pin::Pin;
pub use question::{AnswerValue, Question, QuestionKind, QuizConfig};
pub use registry::Registry;
pub use roster::{Id, ReconnectToken};
pub use session::{Archive, HostCommand, Options, Phase, Session, StateSnapshot};
pub use timer::Expiry;
