//! The session registry.
//!
//! # Locking
//!
//! The registry is a `RwLock<Vec<_>>` of per-session `RwLock`s. The outer lock
//! is held only to allocate an id or to clone a session handle, so work on one
//! session never waits on another session's lock. Session ids are the index
//! into the vector, which keeps them dense from zero and never reused.
//!
//! Poisoned locks are recovered: a session is only mutated after every check
//! has passed, so a panicking holder cannot leave it half-updated.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::error::VotingError;
use crate::session::{OptionSet, SessionView, VotingSession, closing_time};
use crate::types::SessionId;

pub(crate) type SessionHandle = Arc<RwLock<VotingSession>>;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every voting session and hands out ids.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<Vec<SessionHandle>>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl SessionStore {
    /// Creates an empty registry stamping sessions with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Creates a session open from now for `duration_secs` seconds.
    ///
    /// Input is validated before an id is allocated, so a rejected call
    /// leaves the registry untouched.
    pub fn create_session(
        &self,
        title: impl Into<String>,
        options: Vec<String>,
        duration_secs: i64,
    ) -> Result<SessionId, VotingError> {
        let options = OptionSet::new(options)?;
        if duration_secs <= 0 {
            return Err(VotingError::InvalidDuration {
                seconds: duration_secs,
            });
        }
        let title = title.into();

        let mut sessions = write(&self.sessions);
        // Stamp under the registry lock so creation times follow id order.
        let created_at = self.clock.now();
        let closes_at = closing_time(created_at, duration_secs)?;
        let id = SessionId::new(sessions.len() as u64);

        tracing::info!(
            session = %id,
            title = %title,
            options = options.len(),
            duration_secs,
            "created voting session"
        );
        sessions.push(Arc::new(RwLock::new(VotingSession::new(
            id,
            title,
            options,
            created_at,
            duration_secs,
            closes_at,
        ))));
        Ok(id)
    }

    /// Number of sessions created since the store was built.
    pub fn session_count(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn get_session(&self, id: SessionId) -> Result<SessionView, VotingError> {
        let handle = self.handle(id)?;
        let session = read(&handle);
        Ok(session.view())
    }

    /// Whether the session accepts votes at `now`.
    pub fn is_open(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, VotingError> {
        let handle = self.handle(id)?;
        let session = read(&handle);
        Ok(session.is_open_at(now))
    }

    /// Whether the session accepts votes at the store clock's current time.
    pub fn is_active(&self, id: SessionId) -> Result<bool, VotingError> {
        self.is_open(id, self.clock.now())
    }

    /// Snapshots of every session, in id order.
    pub fn list_sessions(&self) -> Vec<SessionView> {
        let handles: Vec<SessionHandle> = read(&self.sessions).clone();
        handles.iter().map(|handle| read(handle).view()).collect()
    }

    /// Resolves `id` to its session, releasing the registry lock before
    /// returning.
    pub(crate) fn handle(&self, id: SessionId) -> Result<SessionHandle, VotingError> {
        let sessions = read(&self.sessions);
        id.index()
            .and_then(|index| sessions.get(index))
            .cloned()
            .ok_or(VotingError::SessionNotFound(id))
    }
}
