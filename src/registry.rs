//! The live session registry
//!
//! Maps PINs to running sessions. The registry is the concurrency
//! boundary of the engine: lookups go through a concurrent map, and each
//! session sits behind its own mutex so commands against different
//! sessions never contend with each other.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use thiserror::Error;
use web_time::SystemTime;

use crate::{
    broadcast::Sink,
    constants,
    pin::Pin,
    question::QuizConfig,
    session::{Options, Session},
    timer::Expiry,
};

/// Errors produced by registry operations
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No live session carries the given PIN
    #[error("no session with that pin")]
    SessionNotFound,
    /// Repeated random draws failed to find a free PIN
    #[error("could not allocate an unused pin")]
    PinSpaceExhausted,
    /// The quiz or options failed validation
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}

/// A shared handle to one live session
pub type SessionHandle<S> = Arc<Mutex<Session<S>>>;

/// The set of live sessions, indexed by PIN
///
/// Cloneable and cheap to share; embeddings typically hold one registry
/// in their application state.
pub struct Registry<S: Sink> {
    sessions: Arc<DashMap<Pin, SessionHandle<S>>>,
}

impl<S: Sink> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sink> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S: Sink> Registry<S> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Creates a session under a freshly allocated PIN
    ///
    /// Draws random PINs until one is free; insertion goes through the
    /// map's entry API so two concurrent creations can never claim the
    /// same PIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the quiz or options fail
    /// validation and [`Error::PinSpaceExhausted`] when the draw bound is
    /// hit, which indicates the PIN space is effectively full.
    pub fn create(
        &self,
        config: QuizConfig,
        options: Options,
        now: SystemTime,
    ) -> Result<(Pin, SessionHandle<S>), Error> {
        for _ in 0..constants::pin::MAX_ALLOCATION_ATTEMPTS {
            let pin = Pin::new();
            match self.sessions.entry(pin) {
                Entry::Occupied(_) => {}
                Entry::Vacant(vacant) => {
                    let session = Session::new(pin, config, options, now)
                        .map_err(|report| Error::InvalidConfig(report.to_string()))?;
                    let handle = Arc::new(Mutex::new(session));
                    vacant.insert(Arc::clone(&handle));
                    log::info!("created session {pin}");
                    return Ok((pin, handle));
                }
            }
        }
        Err(Error::PinSpaceExhausted)
    }

    /// Looks up a live session by PIN
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown PINs.
    pub fn get(&self, pin: Pin) -> Result<SessionHandle<S>, Error> {
        self.sessions
            .get(&pin)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::SessionNotFound)
    }

    /// Removes a session, closing all of its subscriptions
    ///
    /// Destroying an unknown PIN is a no-op. Handles obtained earlier
    /// remain usable but unreachable through the registry.
    pub fn destroy(&self, pin: Pin) {
        if let Some((_, handle)) = self.sessions.remove(&pin) {
            if let Ok(mut session) = handle.lock() {
                session.close();
            }
            log::info!("destroyed session {pin}");
        }
    }

    /// Routes a question deadline to its session
    ///
    /// An expiry for a destroyed session is silently dropped; the session
    /// itself decides whether the deadline is stale.
    pub fn handle_expiry(&self, expiry: Expiry, now: SystemTime) {
        let Ok(handle) = self.get(expiry.pin) else {
            return;
        };
        if let Ok(mut session) = handle.lock() {
            session.receive_expiry(expiry, now);
        }
    }

    /// Removes every session idle for at least `max_idle`, returning the
    /// PINs torn down
    ///
    /// Intended to be called periodically by the embedding layer.
    pub fn reap_idle(&self, now: SystemTime, max_idle: Duration) -> Vec<Pin> {
        let idle: Vec<Pin> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock()
                    .is_ok_and(|session| session.is_idle(now, max_idle))
            })
            .map(|entry| *entry.key())
            .collect();
        for pin in &idle {
            log::info!("reaping idle session {pin}");
            self.destroy(*pin);
        }
        idle
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Checks whether no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
