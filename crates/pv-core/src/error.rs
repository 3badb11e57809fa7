//! Rejections surfaced by the session store and tally engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{SessionId, VoterId};

/// Why an option list was refused at session creation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionSetError {
    /// Fewer than two options were supplied.
    #[error("at least 2 options are required, got {count}")]
    TooFew { count: usize },
    /// The same label appeared more than once.
    #[error("duplicate option label: {label:?}")]
    Duplicate { label: String },
}

/// Per-call rejection. None of these are fatal to the engine, and a call that
/// returns one has not changed any state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VotingError {
    /// The option list is too short or contains duplicates.
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionSetError),

    /// The duration is not positive, or too large to represent.
    #[error("invalid duration: {seconds} seconds")]
    InvalidDuration { seconds: i64 },

    /// No session has been allocated with this id.
    #[error("voting session {0} not found")]
    SessionNotFound(SessionId),

    /// The voting window has elapsed.
    #[error("voting session {session} closed at {closed_at}")]
    SessionClosed {
        session: SessionId,
        closed_at: DateTime<Utc>,
    },

    /// The label is not one of the session's options.
    #[error("{option:?} is not an option of voting session {session}")]
    InvalidOption { session: SessionId, option: String },

    /// The voter already has a vote recorded in this session.
    #[error("{voter} has already voted in voting session {session}")]
    AlreadyVoted { session: SessionId, voter: VoterId },
}

impl VotingError {
    /// Stable machine-readable code for logs and JSON output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidOptions(_) => "invalid_options",
            Self::InvalidDuration { .. } => "invalid_duration",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionClosed { .. } => "session_closed",
            Self::InvalidOption { .. } => "invalid_option",
            Self::AlreadyVoted { .. } => "already_voted",
        }
    }
}
