//! Audit command: shows the most recent audit records.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Args;

use crate::Config;
use crate::audit::{AuditLog, AuditRecord};

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Number of most recent records to show.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub limit: usize,

    /// Print records as JSON Lines instead of text.
    #[arg(long)]
    pub json: bool,
}

fn format_record(record: &AuditRecord) -> String {
    let mut parts = vec![
        record.timestamp.to_rfc3339(),
        format!("{:<23}", record.action.as_str()),
    ];
    if let Some(session) = record.session_id {
        parts.push(format!("session {session}"));
    }
    if let Some(voter) = &record.voter {
        parts.push(format!("voter {voter}"));
    }
    if let Some(option) = &record.option {
        parts.push(format!("option {option:?}"));
    }
    if let Some(error) = &record.error {
        parts.push(format!("[{error}]"));
    }
    if let Some(detail) = &record.detail {
        parts.push(detail.clone());
    }
    parts.join("  ").trim_end().to_string()
}

/// Runs the audit command.
pub fn run<W: Write>(writer: &mut W, args: &AuditArgs, config: &Config) -> Result<()> {
    let Some(path) = config.audit_path() else {
        bail!("audit log is disabled");
    };
    let records = AuditLog::read_recent(path, args.limit)?;
    tracing::debug!(path = ?path, records = records.len(), "read audit log");

    if records.is_empty() && !args.json {
        writeln!(writer, "No audit records.")?;
        return Ok(());
    }
    for record in &records {
        if args.json {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        } else {
            writeln!(writer, "{}", format_record(record))?;
        }
    }
    Ok(())
}
