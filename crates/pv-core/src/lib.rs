//! Core voting engine.
//!
//! This crate contains:
//! - Session store: creates time-bounded voting sessions and hands out ids
//! - Tally engine: accepts at most one vote per voter per session
//! - Event bus: synchronous vote-accepted notifications
//!
//! State lives for the lifetime of the process. Callers supply voter
//! identities and the time source.

mod clock;
mod error;
mod events;
mod session;
mod store;
mod tally;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OptionSetError, VotingError};
pub use events::{EventBus, VoteAccepted, VoteObserver};
pub use session::{MIN_OPTIONS, OptionSet, SessionState, SessionView, TallyResults};
pub use store::SessionStore;
pub use tally::TallyEngine;
pub use types::{SessionId, ValidationError, VoterId};
