//! Configuration constants for the quiz session engine
//!
//! This module contains the limits and defaults used throughout the
//! engine to bound input sizes and provide consistent behavior across
//! components.

/// Session-wide limits and defaults
pub mod session {
    /// Default maximum number of players admitted to a session
    pub const DEFAULT_PLAYER_CAP: usize = 50;
    /// Hard upper bound on the configurable player cap
    pub const MAX_PLAYER_CAP: usize = 1000;
    /// Default number of connected players required to start the first question
    pub const DEFAULT_MIN_PLAYERS: usize = 1;
    /// Default idle period (in seconds) after which a session with zero
    /// connected participants is eligible for teardown
    pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3_600;
}

/// Quiz configuration limits
pub mod quiz {
    /// Maximum number of questions allowed in a single quiz
    pub const MAX_QUESTIONS_COUNT: usize = 100;
    /// Maximum length of a quiz title in characters
    pub const MAX_TITLE_LENGTH: usize = 200;
}

/// Per-question configuration limits
pub mod question {
    /// Maximum length of a question prompt in characters
    pub const MAX_PROMPT_LENGTH: usize = 200;
    /// Minimum time limit in seconds for answering a question
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum time limit in seconds for answering a question
    pub const MAX_TIME_LIMIT: u64 = 240;
    /// Maximum number of choices for a multiple-choice question
    pub const MAX_CHOICE_COUNT: usize = 8;
    /// Maximum length of a single choice or accepted answer in characters
    pub const MAX_ANSWER_LENGTH: usize = 200;
    /// Maximum number of accepted answers for a free-text question
    pub const MAX_ACCEPTED_ANSWERS: usize = 16;
    /// Points awarded by default for a correct answer at full speed
    pub const DEFAULT_POINTS: u64 = 1000;
    /// Minimum points any correct answer earns regardless of how late it
    /// arrived within the acceptance window
    pub const MIN_CORRECT_POINTS: u64 = 50;
}

/// Display name limits
pub mod name {
    /// Maximum length of a player display name in characters
    pub const MAX_LENGTH: usize = 30;
}

/// PIN allocation parameters
pub mod pin {
    /// Bound on fresh random draws when allocating a PIN before giving up
    pub const MAX_ALLOCATION_ATTEMPTS: usize = 1_000;
}
