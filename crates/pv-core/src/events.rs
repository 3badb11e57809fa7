//! Vote-cast notifications.
//!
//! Every accepted vote is published synchronously to the subscribers present
//! at the time of the call. There is no replay for late subscribers.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SessionId, VoterId};

/// Emitted once for each accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAccepted {
    pub session_id: SessionId,
    pub voter: VoterId,
    pub option: String,
    /// The `now` the vote was evaluated against.
    pub cast_at: DateTime<Utc>,
}

/// Callback-style subscriber.
///
/// Called while the session's write lock is held, so implementations should
/// return quickly and must not call back into the engine for the same session.
pub trait VoteObserver: Send + Sync {
    fn vote_accepted(&self, event: &VoteAccepted);
}

/// Fan-out to channel subscribers and registered observers.
#[derive(Default)]
pub struct EventBus {
    channels: Mutex<Vec<Sender<VoteAccepted>>>,
    observers: RwLock<Vec<Arc<dyn VoteObserver>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for every event published from now on.
    pub fn subscribe(&self) -> Receiver<VoteAccepted> {
        let (tx, rx) = mpsc::channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn register(&self, observer: Arc<dyn VoteObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Delivers `event` and returns how many subscribers received it.
    ///
    /// Channels whose receiver has been dropped are pruned.
    pub fn publish(&self, event: &VoteAccepted) -> usize {
        let mut delivered = 0;

        {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels.retain(|tx| {
                let sent = tx.send(event.clone()).is_ok();
                delivered += usize::from(sent);
                sent
            });
        }

        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer.vote_accepted(event);
        }
        delivered + observers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        channels + observers
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
