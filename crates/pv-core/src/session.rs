//! Voting sessions and the read-only views handed out to callers.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OptionSetError, VotingError};
use crate::types::{SessionId, VoterId};

/// Minimum number of options a session must offer.
pub const MIN_OPTIONS: usize = 2;

/// Whether a session still accepts votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}

/// An ordered list of distinct option labels.
///
/// Construction is the only place the option rules are checked; a session
/// built from an `OptionSet` cannot hold an invalid one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl OptionSet {
    pub fn new(labels: Vec<String>) -> Result<Self, OptionSetError> {
        if labels.len() < MIN_OPTIONS {
            return Err(OptionSetError::TooFew {
                count: labels.len(),
            });
        }

        let mut index = HashMap::with_capacity(labels.len());
        for (position, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), position).is_some() {
                return Err(OptionSetError::Duplicate {
                    label: label.clone(),
                });
            }
        }

        Ok(Self { labels, index })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Exact-match lookup; no trimming or case folding.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Validates a session duration and returns the instant the window closes.
pub(crate) fn closing_time(
    created_at: DateTime<Utc>,
    duration_secs: i64,
) -> Result<DateTime<Utc>, VotingError> {
    let invalid = || VotingError::InvalidDuration {
        seconds: duration_secs,
    };
    if duration_secs <= 0 {
        return Err(invalid());
    }
    let duration = Duration::try_seconds(duration_secs).ok_or_else(invalid)?;
    created_at.checked_add_signed(duration).ok_or_else(invalid)
}

/// A single voting contest.
#[derive(Debug)]
pub struct VotingSession {
    id: SessionId,
    title: String,
    options: OptionSet,
    counts: Vec<u64>,
    created_at: DateTime<Utc>,
    duration_secs: i64,
    closes_at: DateTime<Utc>,
    voters: HashSet<VoterId>,
}

impl VotingSession {
    pub(crate) fn new(
        id: SessionId,
        title: String,
        options: OptionSet,
        created_at: DateTime<Utc>,
        duration_secs: i64,
        closes_at: DateTime<Utc>,
    ) -> Self {
        let counts = vec![0; options.len()];
        Self {
            id,
            title,
            options,
            counts,
            created_at,
            duration_secs,
            closes_at,
            voters: HashSet::new(),
        }
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn options(&self) -> &OptionSet {
        &self.options
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    /// Last instant at which votes are still accepted.
    pub const fn closes_at(&self) -> DateTime<Utc> {
        self.closes_at
    }

    /// Open up to and including `closes_at`; closed strictly after.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if now <= self.closes_at {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == SessionState::Open
    }

    pub fn has_voted(&self, voter: &VoterId) -> bool {
        self.voters.contains(voter)
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn total_votes(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Records an accepted vote. Callers must have checked openness, option
    /// membership, and the voter set under the same write lock.
    pub(crate) fn commit_vote(&mut self, position: usize, voter: VoterId) {
        debug_assert!(!self.voters.contains(&voter));
        self.counts[position] += 1;
        self.voters.insert(voter);
    }

    pub fn results(&self) -> TallyResults {
        TallyResults {
            session: self.id,
            options: self.options.labels().to_vec(),
            counts: self.counts.clone(),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            title: self.title.clone(),
            options: self.options.labels().to_vec(),
            counts: self.counts.clone(),
            created_at: self.created_at,
            closes_at: self.closes_at,
            voter_count: self.voters.len(),
        }
    }
}

/// Snapshot of a session's public state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub title: String,
    pub options: Vec<String>,
    pub counts: Vec<u64>,
    pub created_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub voter_count: usize,
}

impl SessionView {
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if now <= self.closes_at {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }
}

/// Per-option counts in the session's original option order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResults {
    pub session: SessionId,
    pub options: Vec<String>,
    pub counts: Vec<u64>,
}

impl TallyResults {
    /// Pairs each option with its count.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.options
            .iter()
            .map(String::as_str)
            .zip(self.counts.iter().copied())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Options tied at the highest count, in option order. Empty when no vote
    /// has been cast.
    pub fn leaders(&self) -> Vec<&str> {
        let Some(max) = self.counts.iter().copied().max().filter(|&max| max > 0) else {
            return Vec::new();
        };
        self.iter()
            .filter(|&(_, count)| count == max)
            .map(|(option, _)| option)
            .collect()
    }
}
