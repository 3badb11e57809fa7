//! Append-only JSON Lines audit trail.
//!
//! Every session creation, accepted vote, and rejected operation gets one
//! line. Accepted votes arrive through the engine's observer hook, so the
//! trail sees exactly what other subscribers see. The engine never reads the
//! file back; `pvote audit` does.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pv_core::{SessionId, VoteAccepted, VoteObserver, VotingError};

use crate::Config;

/// What an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateSession,
    CreateSessionRejected,
    Vote,
    VoteRejected,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateSession => "create_session",
            Self::CreateSessionRejected => "create_session_rejected",
            Self::Vote => "vote",
            Self::VoteRejected => "vote_rejected",
        }
    }
}

/// A single line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    /// Error code for rejected operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    const fn new(timestamp: DateTime<Utc>, action: AuditAction) -> Self {
        Self {
            timestamp,
            action,
            session_id: None,
            voter: None,
            option: None,
            error: None,
            detail: None,
        }
    }

    pub fn session_created(timestamp: DateTime<Utc>, session: SessionId, title: &str) -> Self {
        Self {
            session_id: Some(session),
            detail: Some(format!("Created session: {title}")),
            ..Self::new(timestamp, AuditAction::CreateSession)
        }
    }

    pub fn creation_rejected(timestamp: DateTime<Utc>, title: &str, err: &VotingError) -> Self {
        Self {
            error: Some(err.code().to_string()),
            detail: Some(format!("{title}: {err}")),
            ..Self::new(timestamp, AuditAction::CreateSessionRejected)
        }
    }

    pub fn vote_accepted(event: &VoteAccepted) -> Self {
        Self {
            session_id: Some(event.session_id),
            voter: Some(event.voter.to_string()),
            option: Some(event.option.clone()),
            ..Self::new(event.cast_at, AuditAction::Vote)
        }
    }

    pub fn vote_rejected(
        timestamp: DateTime<Utc>,
        session: SessionId,
        voter: &str,
        option: &str,
        err: &VotingError,
    ) -> Self {
        Self {
            session_id: Some(session),
            voter: Some(voter.to_string()),
            option: Some(option.to_string()),
            error: Some(err.code().to_string()),
            detail: Some(err.to_string()),
            ..Self::new(timestamp, AuditAction::VoteRejected)
        }
    }
}

/// Audit log file handle, shareable across threads.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<LineWriter<File>>,
}

impl AuditLog {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LineWriter::new(file)),
        })
    }

    /// Opens the log named by `config`, or `None` when auditing is disabled.
    pub fn open_configured(config: &Config) -> Result<Option<Arc<Self>>> {
        let Some(path) = config.audit_path() else {
            tracing::debug!("audit log disabled");
            return Ok(None);
        };
        let log = Self::open(path)?;
        tracing::debug!(path = ?log.path, "audit log opened");
        Ok(Some(Arc::new(log)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")
            .with_context(|| format!("failed to write audit log {}", self.path.display()))
    }

    /// Reads the last `limit` records of the log at `path`, newest first.
    ///
    /// A missing file reads as an empty log.
    pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<AuditRecord>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to open audit log {}", path.display()));
            }
        };

        let mut recent = VecDeque::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(&line).with_context(|| {
                format!("{}:{}: invalid audit record", path.display(), index + 1)
            })?;
            if recent.len() == limit {
                recent.pop_front();
            }
            if limit > 0 {
                recent.push_back(record);
            }
        }
        Ok(recent.into_iter().rev().collect())
    }

    /// Appends, logging instead of failing. Auditing never blocks a vote.
    pub fn record(&self, record: &AuditRecord) {
        if let Err(err) = self.append(record) {
            tracing::warn!(path = ?self.path, error = %err, "failed to append audit record");
        }
    }
}

impl VoteObserver for AuditLog {
    fn vote_accepted(&self, event: &VoteAccepted) {
        self.record(&AuditRecord::vote_accepted(event));
    }
}
