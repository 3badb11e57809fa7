//! Simulate command: concurrent load against a single session.
//!
//! Every generated voter votes once, then some of them try again. All
//! attempts run in parallel on a rayon pool, and the final tally is checked
//! against the accepted count and the event stream.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use clap::Args;
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use pv_core::{SessionId, SessionStore, TallyEngine, TallyResults, VoterId, VotingError};

use crate::Config;
use crate::audit::{AuditLog, AuditRecord};
use crate::commands::util::parse_duration;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Comma-separated option labels.
    #[arg(long, value_delimiter = ',', required = true)]
    pub options: Vec<String>,

    /// Number of distinct voters.
    #[arg(long, default_value_t = 1000)]
    pub voters: usize,

    /// Extra attempts replayed from voters who already voted.
    #[arg(long, default_value_t = 0)]
    pub duplicates: usize,

    /// Session title.
    #[arg(long, default_value = "Simulated session")]
    pub title: String,

    /// Session duration (e.g. 3600, 30m, 2h).
    #[arg(long, default_value = "1h")]
    pub duration: String,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// What a simulation observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub session: SessionId,
    pub attempts: usize,
    pub accepted: usize,
    pub already_voted: usize,
    pub other_rejections: usize,
    pub events: usize,
    pub results: TallyResults,
}

/// Casts `voters` first votes and `duplicates` repeats concurrently.
///
/// Voter `i` picks option `i % options.len()`; repeat `j` reuses voter
/// `j % voters` with the next option over. Rejected attempts are written to
/// `audit`; accepted ones reach it through the engine's observers.
pub fn simulate(
    engine: &TallyEngine,
    session: SessionId,
    voters: &[VoterId],
    options: &[String],
    duplicates: usize,
    audit: Option<&AuditLog>,
) -> Result<SimulationReport> {
    ensure!(!options.is_empty(), "at least one option is required");
    if duplicates > 0 {
        ensure!(!voters.is_empty(), "duplicates need at least one voter");
    }
    let events = engine.subscribe();

    let firsts = (0..voters.len()).map(|i| (i, i % options.len()));
    let repeats = (0..duplicates).map(|j| {
        let i = j % voters.len().max(1);
        (i, (i + 1) % options.len())
    });
    let attempts: Vec<(usize, usize)> = firsts.chain(repeats).collect();

    let outcomes: Vec<Result<(), VotingError>> = attempts
        .par_iter()
        .map(|&(voter, option)| {
            let (voter, option) = (&voters[voter], &options[option]);
            engine
                .cast_vote_now(session, voter, option)
                .map(|_| ())
                .inspect_err(|err| {
                    if let Some(audit) = audit {
                        audit.record(&AuditRecord::vote_rejected(
                            engine.store().now(),
                            session,
                            voter.as_str(),
                            option,
                            err,
                        ));
                    }
                })
        })
        .collect();

    let mut report = SimulationReport {
        session,
        attempts: outcomes.len(),
        accepted: 0,
        already_voted: 0,
        other_rejections: 0,
        events: events.try_iter().count(),
        results: engine.get_results(session)?,
    };
    for outcome in &outcomes {
        match outcome {
            Ok(()) => report.accepted += 1,
            Err(VotingError::AlreadyVoted { .. }) => report.already_voted += 1,
            Err(err) => {
                tracing::warn!(error = %err, "unexpected rejection");
                report.other_rejections += 1;
            }
        }
    }

    let total = usize::try_from(report.results.total()).context("tally exceeds usize")?;
    if total != report.accepted {
        bail!(
            "tally mismatch: {total} counted but {} votes accepted",
            report.accepted
        );
    }
    if report.events != report.accepted {
        bail!(
            "event mismatch: {} events for {} accepted votes",
            report.events,
            report.accepted
        );
    }
    Ok(report)
}

fn write_report<W: Write>(writer: &mut W, report: &SimulationReport) -> Result<()> {
    writeln!(writer, "Session {}", report.session)?;
    writeln!(writer, "Attempts:       {}", report.attempts)?;
    writeln!(writer, "Accepted:       {}", report.accepted)?;
    writeln!(writer, "Already voted:  {}", report.already_voted)?;
    if report.other_rejections > 0 {
        writeln!(writer, "Other rejected: {}", report.other_rejections)?;
    }
    writeln!(writer, "Events:         {}", report.events)?;
    writeln!(writer, "Results:")?;
    let width = report
        .results
        .options
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0);
    for (option, count) in report.results.iter() {
        writeln!(writer, "  {option:<width$}  {count}")?;
    }
    Ok(())
}

/// Runs the simulate command.
pub fn run<W: Write>(writer: &mut W, args: &SimulateArgs, config: &Config) -> Result<()> {
    let duration_secs = parse_duration(&args.duration)?;

    let store = Arc::new(SessionStore::default());
    let engine = TallyEngine::new(store.clone());
    let audit = AuditLog::open_configured(config)?;
    if let Some(audit) = &audit {
        engine.register_observer(audit.clone());
    }

    let session = match store.create_session(
        args.title.clone(),
        args.options.clone(),
        duration_secs,
    ) {
        Ok(session) => session,
        Err(err) => {
            if let Some(audit) = &audit {
                audit.record(&AuditRecord::creation_rejected(
                    store.now(),
                    &args.title,
                    &err,
                ));
            }
            return Err(err).context("failed to create session");
        }
    };
    if let Some(audit) = &audit {
        let created_at = store.get_session(session)?.created_at;
        audit.record(&AuditRecord::session_created(created_at, session, &args.title));
    }

    let voters: Vec<VoterId> = (0..args.voters)
        .map(|_| VoterId::new(Uuid::new_v4().to_string()))
        .collect::<Result<_, _>>()?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = config.threads {
        pool = pool.num_threads(threads);
    }
    let pool = pool.build().context("failed to build worker pool")?;

    tracing::info!(
        session = %session,
        voters = voters.len(),
        duplicates = args.duplicates,
        threads = pool.current_num_threads(),
        "starting simulation"
    );
    let report = pool.install(|| {
        simulate(
            &engine,
            session,
            &voters,
            &args.options,
            args.duplicates,
            audit.as_deref(),
        )
    })?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write_report(writer, &report)?;
    }
    Ok(())
}
