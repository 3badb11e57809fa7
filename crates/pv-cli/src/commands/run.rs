//! Run command: executes a JSON Lines script of voting operations.
//!
//! Each non-blank line that does not start with `#` is one operation, tagged
//! by its `op` field:
//!
//! ```text
//! {"op":"create","title":"Test Session","options":["Option 1","Option 2"],"duration":"1h"}
//! {"op":"vote","session":0,"voter":"0xf39F","option":"Option 1"}
//! {"op":"advance","seconds":3601}
//! {"op":"results","session":0}
//! ```
//!
//! The script runs against a fresh engine whose clock only moves on
//! `advance`. Engine rejections are reported and the script continues;
//! malformed lines stop it.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};

use pv_core::{
    Clock, ManualClock, SessionId, SessionState, SessionStore, SessionView, TallyEngine,
    TallyResults, VoteAccepted, VoterId, VotingError,
};

use crate::Config;
use crate::audit::{AuditLog, AuditRecord};
use crate::commands::util::parse_duration;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script to execute. Reads stdin when omitted or "-".
    pub script: Option<PathBuf>,

    /// Print one JSON object per operation instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Session duration as written in a script: seconds, or text like "30m".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Seconds(i64),
    Text(String),
}

impl DurationInput {
    fn seconds(&self) -> Result<i64> {
        match self {
            Self::Seconds(secs) => Ok(*secs),
            Self::Text(text) => parse_duration(text),
        }
    }
}

/// One script line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Create {
        title: String,
        options: Vec<String>,
        #[serde(default)]
        duration: Option<DurationInput>,
    },
    Vote {
        session: SessionId,
        voter: VoterId,
        option: String,
    },
    Results {
        session: SessionId,
    },
    Session {
        session: SessionId,
    },
    Active {
        session: SessionId,
    },
    Count,
    Sessions,
    Advance {
        seconds: i64,
    },
}

/// A session snapshot together with its state at the time of the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub view: SessionView,
    pub state: SessionState,
}

/// Result of executing one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Created { session: SessionId, title: String },
    Accepted(VoteAccepted),
    Rejected {
        op: &'static str,
        error: &'static str,
        message: String,
    },
    Results(TallyResults),
    Session(SessionStatus),
    Active { session: SessionId, active: bool },
    Count { count: usize },
    Sessions { sessions: Vec<SessionStatus> },
    Advanced { now: DateTime<Utc> },
}

impl Outcome {
    fn rejected(op: &'static str, err: &VotingError) -> Self {
        Self::Rejected {
            op,
            error: err.code(),
            message: err.to_string(),
        }
    }
}

const fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Open => "open",
        SessionState::Closed => "closed",
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { session, title } => write!(f, "created session {session}: {title}"),
            Self::Accepted(event) => write!(
                f,
                "vote accepted: session {}, voter {}, option {:?}",
                event.session_id, event.voter, event.option
            ),
            Self::Rejected { op, error, message } => {
                write!(f, "rejected {op} ({error}): {message}")
            }
            Self::Results(results) => {
                writeln!(f, "results for session {}:", results.session)?;
                let width = results.options.iter().map(String::len).max().unwrap_or(0);
                for (option, count) in results.iter() {
                    writeln!(f, "  {option:<width$}  {count}")?;
                }
                let leaders = results.leaders();
                if leaders.is_empty() {
                    write!(f, "  total {}, no votes yet", results.total())
                } else {
                    write!(
                        f,
                        "  total {}, leading: {}",
                        results.total(),
                        leaders.join(", ")
                    )
                }
            }
            Self::Session(status) => {
                let view = &status.view;
                writeln!(
                    f,
                    "session {}: {} [{}]",
                    view.id,
                    view.title,
                    state_label(status.state)
                )?;
                writeln!(f, "  created {}", view.created_at.to_rfc3339())?;
                writeln!(f, "  closes  {}", view.closes_at.to_rfc3339())?;
                write!(f, "  voters  {}", view.voter_count)
            }
            Self::Active { session, active } => {
                let state = if *active { "open" } else { "closed" };
                write!(f, "session {session} is {state}")
            }
            Self::Count { count } => write!(f, "sessions: {count}"),
            Self::Sessions { sessions } => {
                if sessions.is_empty() {
                    return write!(f, "no sessions");
                }
                for (i, status) in sessions.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    let view = &status.view;
                    write!(
                        f,
                        "{:>3}  {:<24} {:<6} {} votes",
                        view.id.to_string(),
                        view.title,
                        state_label(status.state),
                        view.voter_count
                    )?;
                }
                Ok(())
            }
            Self::Advanced { now } => write!(f, "clock advanced to {}", now.to_rfc3339()),
        }
    }
}

/// A fresh engine plus the clock and audit trail a script drives it with.
pub struct Interpreter {
    engine: TallyEngine,
    clock: Arc<ManualClock>,
    audit: Option<Arc<AuditLog>>,
    default_duration_secs: i64,
}

impl Interpreter {
    pub fn new(
        start: DateTime<Utc>,
        default_duration_secs: i64,
        audit: Option<Arc<AuditLog>>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(SessionStore::new(clock.clone()));
        let engine = TallyEngine::new(store);
        if let Some(audit) = &audit {
            engine.register_observer(audit.clone());
        }
        Self {
            engine,
            clock,
            audit,
            default_duration_secs,
        }
    }

    pub const fn engine(&self) -> &TallyEngine {
        &self.engine
    }

    fn audit(&self, record: &AuditRecord) {
        if let Some(audit) = &self.audit {
            audit.record(record);
        }
    }

    fn status(&self, view: SessionView) -> SessionStatus {
        let state = view.state_at(self.clock.now());
        SessionStatus { view, state }
    }

    /// Executes one operation. Engine rejections become [`Outcome::Rejected`];
    /// only unusable input (such as an unparseable duration) is an error.
    pub fn execute(&self, op: Operation) -> Result<Outcome> {
        let store = self.engine.store();
        let outcome = match op {
            Operation::Create {
                title,
                options,
                duration,
            } => {
                let duration_secs = match duration {
                    Some(input) => input.seconds()?,
                    None => self.default_duration_secs,
                };
                match store.create_session(title.clone(), options, duration_secs) {
                    Ok(session) => {
                        self.audit(&AuditRecord::session_created(
                            self.clock.now(),
                            session,
                            &title,
                        ));
                        Outcome::Created { session, title }
                    }
                    Err(err) => {
                        self.audit(&AuditRecord::creation_rejected(self.clock.now(), &title, &err));
                        Outcome::rejected("create", &err)
                    }
                }
            }
            Operation::Vote {
                session,
                voter,
                option,
            } => match self.engine.cast_vote_now(session, &voter, &option) {
                Ok(event) => Outcome::Accepted(event),
                Err(err) => {
                    self.audit(&AuditRecord::vote_rejected(
                        self.clock.now(),
                        session,
                        voter.as_str(),
                        &option,
                        &err,
                    ));
                    Outcome::rejected("vote", &err)
                }
            },
            Operation::Results { session } => match self.engine.get_results(session) {
                Ok(results) => Outcome::Results(results),
                Err(err) => Outcome::rejected("results", &err),
            },
            Operation::Session { session } => match store.get_session(session) {
                Ok(view) => Outcome::Session(self.status(view)),
                Err(err) => Outcome::rejected("session", &err),
            },
            Operation::Active { session } => match store.is_active(session) {
                Ok(active) => Outcome::Active { session, active },
                Err(err) => Outcome::rejected("active", &err),
            },
            Operation::Count => Outcome::Count {
                count: store.session_count(),
            },
            Operation::Sessions => Outcome::Sessions {
                sessions: store
                    .list_sessions()
                    .into_iter()
                    .map(|view| self.status(view))
                    .collect(),
            },
            Operation::Advance { seconds } => {
                ensure!(
                    seconds >= 0,
                    "cannot advance by {seconds} seconds: the clock only moves forward"
                );
                let now = Duration::try_seconds(seconds)
                    .and_then(|by| self.clock.advance(by))
                    .with_context(|| format!("cannot advance by {seconds} seconds"))?;
                Outcome::Advanced { now }
            }
        };
        Ok(outcome)
    }
}

/// Counts reported after a script finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub operations: usize,
    pub rejected: usize,
}

/// Reads operations from `reader`, executing each and writing its outcome.
pub fn execute_script<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    interpreter: &Interpreter,
    json: bool,
) -> Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let op: Operation = serde_json::from_str(trimmed)
            .with_context(|| format!("line {line_no}: invalid operation"))?;
        tracing::debug!(line = line_no, ?op, "executing");
        let outcome = interpreter
            .execute(op)
            .with_context(|| format!("line {line_no}"))?;

        summary.operations += 1;
        if matches!(outcome, Outcome::Rejected { .. }) {
            summary.rejected += 1;
        }

        if json {
            writeln!(writer, "{}", serde_json::to_string(&outcome)?)?;
        } else {
            writeln!(writer, "{outcome}")?;
        }
    }

    Ok(summary)
}

/// Runs the run command.
pub fn run<W: Write>(writer: &mut W, args: &RunArgs, config: &Config) -> Result<()> {
    let audit = AuditLog::open_configured(config)?;
    let interpreter = Interpreter::new(Utc::now(), config.default_duration_secs, audit);

    let summary = match args.script.as_deref() {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            execute_script(BufReader::new(file), writer, &interpreter, args.json)?
        }
        _ => execute_script(io::stdin().lock(), writer, &interpreter, args.json)?,
    };

    tracing::info!(
        operations = summary.operations,
        rejected = summary.rejected,
        sessions = interpreter.engine().store().session_count(),
        "script finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use insta::assert_snapshot;

    use crate::audit::AuditAction;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn run_script(script: &str, json: bool) -> (String, ScriptSummary) {
        let interpreter = Interpreter::new(start(), 3600, None);
        let mut output = Vec::new();
        let summary = execute_script(script.as_bytes(), &mut output, &interpreter, json).unwrap();
        (String::from_utf8(output).unwrap(), summary)
    }

    #[test]
    fn parses_each_operation_kind() {
        let op: Operation = serde_json::from_str(
            r#"{"op":"create","title":"T","options":["a","b"],"duration":"2h"}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::Create {
                title: "T".into(),
                options: vec!["a".into(), "b".into()],
                duration: Some(DurationInput::Text("2h".into())),
            }
        );

        let op: Operation =
            serde_json::from_str(r#"{"op":"create","title":"T","options":[],"duration":60}"#)
                .unwrap();
        assert!(matches!(
            op,
            Operation::Create {
                duration: Some(DurationInput::Seconds(60)),
                ..
            }
        ));

        let op: Operation =
            serde_json::from_str(r#"{"op":"vote","session":3,"voter":"v","option":"a"}"#)
                .unwrap();
        assert!(matches!(op, Operation::Vote { session, .. } if session == SessionId::new(3)));

        assert_eq!(
            serde_json::from_str::<Operation>(r#"{"op":"count"}"#).unwrap(),
            Operation::Count
        );
        assert_eq!(
            serde_json::from_str::<Operation>(r#"{"op":"advance","seconds":5}"#).unwrap(),
            Operation::Advance { seconds: 5 }
        );
    }

    #[test]
    fn empty_voter_is_a_script_error() {
        let interpreter = Interpreter::new(start(), 3600, None);
        let script = r#"{"op":"vote","session":0,"voter":"","option":"a"}"#;
        let err = execute_script(script.as_bytes(), &mut Vec::<u8>::new(), &interpreter, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "line 1: invalid operation");
    }

    #[test]
    fn bad_duration_text_names_the_line() {
        let interpreter = Interpreter::new(start(), 3600, None);
        let script = "\n# setup\n{\"op\":\"create\",\"title\":\"T\",\"options\":[\"a\",\"b\"],\"duration\":\"soon\"}\n";
        let err = execute_script(script.as_bytes(), &mut Vec::<u8>::new(), &interpreter, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "line 3");
        assert!(format!("{err:#}").contains("Invalid duration"));
    }

    #[test]
    fn contract_flow_text_output() {
        let script = r#"
# create and vote
{"op":"create","title":"Test Session","options":["Option 1","Option 2"],"duration":3600}
{"op":"count"}
{"op":"vote","session":0,"voter":"A","option":"Option 1"}
{"op":"vote","session":0,"voter":"A","option":"Option 1"}
{"op":"vote","session":0,"voter":"B","option":"Option 3"}
{"op":"results","session":0}
{"op":"create","title":"T","options":["OnlyOne"],"duration":100}
{"op":"vote","session":4,"voter":"A","option":"Option 1"}
"#;
        let (output, summary) = run_script(script, false);
        assert_eq!(
            summary,
            ScriptSummary {
                operations: 8,
                rejected: 4
            }
        );
        assert_snapshot!(output, @r#"
        created session 0: Test Session
        sessions: 1
        vote accepted: session 0, voter A, option "Option 1"
        rejected vote (already_voted): A has already voted in voting session 0
        rejected vote (invalid_option): "Option 3" is not an option of voting session 0
        results for session 0:
          Option 1  1
          Option 2  0
          total 1, leading: Option 1
        rejected create (invalid_options): invalid options: at least 2 options are required, got 1
        rejected vote (session_not_found): voting session 4 not found
        "#);
    }

    #[test]
    fn advancing_past_the_deadline_closes_the_session() {
        let script = r#"
{"op":"create","title":"Flash","options":["Yes","No"],"duration":"1s"}
{"op":"active","session":0}
{"op":"advance","seconds":2}
{"op":"active","session":0}
{"op":"vote","session":0,"voter":"late","option":"Yes"}
{"op":"sessions"}
"#;
        let (output, _) = run_script(script, false);
        assert_snapshot!(output, @r"
        created session 0: Flash
        session 0 is open
        clock advanced to 2025-05-01T12:00:02+00:00
        session 0 is closed
        rejected vote (session_closed): voting session 0 closed at 2025-05-01 12:00:01 UTC
          0  Flash                    closed 0 votes
        ");
    }

    #[test]
    fn advancing_backward_is_a_script_error() {
        let interpreter = Interpreter::new(start(), 3600, None);
        let script = r#"
{"op":"create","title":"Flash","options":["a","b"],"duration":1}
{"op":"advance","seconds":5}
{"op":"vote","session":0,"voter":"y","option":"a"}
{"op":"advance","seconds":-5}
{"op":"vote","session":0,"voter":"y","option":"a"}
"#;
        let mut output = Vec::new();
        let err = execute_script(script.as_bytes(), &mut output, &interpreter, false).unwrap_err();
        assert_eq!(err.to_string(), "line 5");
        assert!(format!("{err:#}").contains("only moves forward"));

        // The session stays closed and the clock did not move.
        let output = String::from_utf8(output).unwrap();
        assert!(!output.contains("vote accepted"));
        assert_eq!(
            interpreter.engine().store().is_active(SessionId::new(0)),
            Ok(false)
        );
        assert_eq!(interpreter.clock.now(), start() + Duration::seconds(5));
    }

    #[test]
    fn advancing_out_of_range_is_a_script_error() {
        let interpreter = Interpreter::new(start(), 3600, None);
        let script = r#"{"op":"advance","seconds":9000000000000000}"#;
        let err = execute_script(script.as_bytes(), &mut Vec::<u8>::new(), &interpreter, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "line 1");
        assert!(format!("{err:#}").contains("cannot advance by 9000000000000000 seconds"));
        assert_eq!(interpreter.clock.now(), start());
    }

    #[test]
    fn session_detail_text_output() {
        let script = r#"
{"op":"create","title":"Board","options":["Yes","No"],"duration":"30m"}
{"op":"vote","session":0,"voter":"a","option":"No"}
{"op":"session","session":0}
"#;
        let (output, _) = run_script(script, false);
        assert_snapshot!(output, @r#"
        created session 0: Board
        vote accepted: session 0, voter a, option "No"
        session 0: Board [open]
          created 2025-05-01T12:00:00+00:00
          closes  2025-05-01T12:30:00+00:00
          voters  1
        "#);
    }

    #[test]
    fn json_output_is_one_object_per_line() {
        let script = r#"
{"op":"create","title":"Test Session","options":["Option 1","Option 2"]}
{"op":"vote","session":0,"voter":"A","option":"Option 1"}
{"op":"vote","session":0,"voter":"A","option":"Option 2"}
{"op":"results","session":0}
"#;
        let (output, _) = run_script(script, true);
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(
            lines[0],
            serde_json::json!({"outcome": "created", "session": 0, "title": "Test Session"})
        );
        assert_eq!(
            lines[1],
            serde_json::json!({
                "outcome": "accepted",
                "session_id": 0,
                "voter": "A",
                "option": "Option 1",
                "cast_at": "2025-05-01T12:00:00Z"
            })
        );
        assert_eq!(lines[2]["outcome"], "rejected");
        assert_eq!(lines[2]["error"], "already_voted");
        assert_eq!(
            lines[3],
            serde_json::json!({
                "outcome": "results",
                "session": 0,
                "options": ["Option 1", "Option 2"],
                "counts": [1, 0]
            })
        );
    }

    #[test]
    fn default_duration_applies_when_omitted() {
        let interpreter = Interpreter::new(start(), 90, None);
        interpreter
            .execute(Operation::Create {
                title: "T".into(),
                options: vec!["a".into(), "b".into()],
                duration: None,
            })
            .unwrap();
        let view = interpreter
            .engine()
            .store()
            .get_session(SessionId::new(0))
            .unwrap();
        assert_eq!(view.closes_at - view.created_at, Duration::seconds(90));
    }

    #[test]
    fn audit_trail_covers_accepted_and_rejected_operations() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("audit.jsonl");
        let audit = Arc::new(AuditLog::open(&path).unwrap());
        let interpreter = Interpreter::new(start(), 3600, Some(audit));

        let script = r#"
{"op":"create","title":"Test Session","options":["Option 1","Option 2"]}
{"op":"create","title":"Bad","options":["x","x"]}
{"op":"vote","session":0,"voter":"A","option":"Option 1"}
{"op":"vote","session":0,"voter":"A","option":"Option 1"}
{"op":"results","session":0}
"#;
        execute_script(script.as_bytes(), &mut Vec::<u8>::new(), &interpreter, false).unwrap();

        let actions: Vec<(AuditAction, Option<String>)> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let record: AuditRecord = serde_json::from_str(line).unwrap();
                (record.action, record.error)
            })
            .collect();
        assert_eq!(
            actions,
            vec![
                (AuditAction::CreateSession, None),
                (
                    AuditAction::CreateSessionRejected,
                    Some("invalid_options".to_string())
                ),
                (AuditAction::Vote, None),
                (
                    AuditAction::VoteRejected,
                    Some("already_voted".to_string())
                ),
            ]
        );
    }
}
