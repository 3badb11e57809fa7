//! Vote acceptance and result queries.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use chrono::{DateTime, Utc};

use crate::error::VotingError;
use crate::events::{EventBus, VoteAccepted, VoteObserver};
use crate::session::TallyResults;
use crate::store::{SessionStore, read, write};
use crate::types::{SessionId, VoterId};

/// Applies the one-vote-per-voter rule on top of a [`SessionStore`].
#[derive(Debug)]
pub struct TallyEngine {
    store: Arc<SessionStore>,
    events: EventBus,
}

impl TallyEngine {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            events: EventBus::new(),
        }
    }

    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Receives every vote accepted after this call.
    pub fn subscribe(&self) -> Receiver<VoteAccepted> {
        self.events.subscribe()
    }

    pub fn register_observer(&self, observer: Arc<dyn VoteObserver>) {
        self.events.register(observer);
    }

    /// Casts a vote evaluated at `now`.
    ///
    /// Checks run in a fixed order and stop at the first failure: session
    /// exists, session is open, option is valid, voter has not voted. Everything
    /// after resolving the session happens under the session's write lock, so
    /// two calls for the same voter can never both pass the voter check.
    pub fn cast_vote(
        &self,
        session_id: SessionId,
        voter: &VoterId,
        option: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteAccepted, VotingError> {
        let handle = self.store.handle(session_id)?;
        let mut session = write(&handle);

        if !session.is_open_at(now) {
            tracing::debug!(session = %session_id, voter = %voter, "vote after close");
            return Err(VotingError::SessionClosed {
                session: session_id,
                closed_at: session.closes_at(),
            });
        }

        let Some(position) = session.options().position(option) else {
            tracing::debug!(session = %session_id, voter = %voter, option, "unknown option");
            return Err(VotingError::InvalidOption {
                session: session_id,
                option: option.to_string(),
            });
        };

        if session.has_voted(voter) {
            tracing::debug!(session = %session_id, voter = %voter, "duplicate vote");
            return Err(VotingError::AlreadyVoted {
                session: session_id,
                voter: voter.clone(),
            });
        }

        session.commit_vote(position, voter.clone());

        let event = VoteAccepted {
            session_id,
            voter: voter.clone(),
            option: option.to_string(),
            cast_at: now,
        };
        // Published before the lock is released so per-session event order
        // matches commit order.
        let delivered = self.events.publish(&event);
        tracing::debug!(
            session = %session_id,
            voter = %voter,
            option,
            delivered,
            "vote accepted"
        );
        Ok(event)
    }

    /// Casts a vote evaluated at the store clock's current time.
    pub fn cast_vote_now(
        &self,
        session_id: SessionId,
        voter: &VoterId,
        option: &str,
    ) -> Result<VoteAccepted, VotingError> {
        self.cast_vote(session_id, voter, option, self.store.now())
    }

    /// Counts per option, in the order the options were given at creation.
    pub fn get_results(&self, session_id: SessionId) -> Result<TallyResults, VotingError> {
        let handle = self.store.handle(session_id)?;
        let session = read(&handle);
        Ok(session.results())
    }
}
