//! Deadline scheduling
//!
//! Question deadlines are delivered as [`Expiry`] messages scheduled when
//! a question starts. The engine never cancels a scheduled expiry;
//! instead, each expiry names the question it was armed for, and the
//! session ignores expiries whose question is no longer the active one.
//! Forced reveals and eager closes therefore need no timer bookkeeping.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::pin::Pin;

/// A deadline notification for one question of one session
///
/// Carries enough context to be routed back through the registry and
/// checked for staleness without any shared timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    /// The session the deadline belongs to
    pub pin: Pin,
    /// The question the deadline was armed for
    pub question_index: usize,
}

/// Runs a callback once after a delay, on a detached thread
///
/// A convenience scheduler for embeddings without their own timer wheel.
/// The callback fires exactly once; staleness is the receiver's concern.
pub fn spawn_oneshot(delay: Duration, f: impl FnOnce() + Send + 'static) {
    thread::spawn(move || {
        thread::sleep(delay);
        f();
    });
}
