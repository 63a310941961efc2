//! Query record correlation.
//!
//! PostgreSQL emits one query execution as several log lines: an
//! `execute` line (possibly continued over multiple lines), a
//! duration line carrying the execution plan, and a trailing
//! temporary-file line that reliably closes the record in this log
//! format. The correlator is a small state machine that assembles
//! those fragments into `LogRecord`s.
//!
//! The state is an explicit tagged union, which makes the rule that a
//! query start always closes the previous record structural: entering
//! `InQuery` consumes whatever state was open before.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use crate::patterns::PatternSet;
use crate::store::{EventStatus, LogRecord};

/// A line that begins statement execution.
const QUERY_START_MARKER: &str = "LOG:  execute";
/// A duration line carrying the explain payload.
const DURATION_MARKER: &str = "LOG:  duration:";
const PLAN_MARKER: &str = "plan:";
/// Observed to reliably follow the end of an explain payload.
const TEMP_FILE_MARKER: &str = "LOG:  temporary file:";

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})").unwrap()
    })
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"duration: ([\d.]+) ms").unwrap())
}

fn query_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{\s*"Query Text":\s*"([^"]+)""#).unwrap())
}

/// Accumulated fragments of one in-flight record.
#[derive(Debug, Default)]
struct Buffer {
    query_lines: Vec<String>,
    explain_lines: Vec<String>,
    duration_ms: Option<f64>,
}

/// Correlator state. Buffers exist only while a record is open.
#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InQuery(Buffer),
    InExplain(Buffer),
}

impl State {
    fn into_buffer(self) -> Option<Buffer> {
        match self {
            State::Idle => None,
            State::InQuery(buf) | State::InExplain(buf) => Some(buf),
        }
    }
}

/// Assembles raw log lines into complete query records.
pub struct Correlator {
    state: State,
    patterns: PatternSet,
}

impl Correlator {
    pub fn new(patterns: PatternSet) -> Self {
        Self {
            state: State::Idle,
            patterns,
        }
    }

    /// Feed one log line; returns a finished record when this line
    /// closed one. Transition rules, in priority order:
    ///
    /// 1. query start: finalize any open buffer, then open a new one
    ///    with this line as the first query line;
    /// 2. duration/plan line: append to the explain buffer and capture
    ///    `duration_ms`;
    /// 3. temporary-file line: terminator — finalize and go idle;
    /// 4. any other line while a buffer is open: continuation of the
    ///    active buffer;
    /// 5. otherwise: discard.
    pub fn push(&mut self, line: &str) -> Option<LogRecord> {
        if line.contains(QUERY_START_MARKER) {
            let prior = std::mem::replace(
                &mut self.state,
                State::InQuery(Buffer {
                    query_lines: vec![line.to_string()],
                    ..Buffer::default()
                }),
            );
            return prior.into_buffer().and_then(|buf| self.finalize(buf));
        }

        if line.contains(DURATION_MARKER) && line.contains(PLAN_MARKER) {
            let mut buf = std::mem::take(&mut self.state)
                .into_buffer()
                .unwrap_or_default();
            buf.explain_lines.push(line.to_string());
            if let Some(duration) = extract_duration(line) {
                buf.duration_ms = Some(duration);
            }
            self.state = State::InExplain(buf);
            return None;
        }

        if line.contains(TEMP_FILE_MARKER) {
            let prior = std::mem::take(&mut self.state);
            return prior.into_buffer().and_then(|buf| self.finalize(buf));
        }

        match &mut self.state {
            State::Idle => {}
            State::InQuery(buf) => buf.query_lines.push(line.to_string()),
            State::InExplain(buf) => buf.explain_lines.push(line.to_string()),
        }
        None
    }

    /// Close any open buffer at end of input (bulk mode).
    pub fn flush(&mut self) -> Option<LogRecord> {
        std::mem::take(&mut self.state)
            .into_buffer()
            .and_then(|buf| self.finalize(buf))
    }

    /// Turn a closed buffer into a record. A buffer whose first query
    /// line carries no parseable timestamp is silently dropped.
    fn finalize(&self, buf: Buffer) -> Option<LogRecord> {
        let first = buf.query_lines.first()?;
        let Some(timestamp) = parse_timestamp(first) else {
            debug!(line = %first, "dropping record without timestamp");
            return None;
        };

        let explain_text = if buf.explain_lines.is_empty() {
            None
        } else {
            Some(
                buf.explain_lines
                    .iter()
                    .map(|l| strip_log_prefix(l))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };

        // Prefer the query text embedded in the explain payload; fall
        // back to the raw query lines.
        let query_text = explain_text
            .as_deref()
            .and_then(extract_query_text)
            .or_else(|| {
                Some(
                    buf.query_lines
                        .iter()
                        .map(|l| strip_log_prefix(l))
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            });

        let pattern_name = self
            .patterns
            .classify(query_text.as_deref())
            .map(str::to_string);

        Some(LogRecord {
            id: None,
            timestamp,
            query_text,
            explain_text,
            duration_ms: buf.duration_ms,
            pattern_name,
            status: EventStatus::Pending,
        })
    }
}

/// Parse the leading `YYYY-MM-DD HH:MM:SS.mmm` prefix.
fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let captures = timestamp_re().captures(line)?;
    NaiveDateTime::parse_from_str(&captures[1], "%Y-%m-%d %H:%M:%S%.3f").ok()
}

/// Extract the duration figure from a `duration: NNN ms` phrase.
fn extract_duration(line: &str) -> Option<f64> {
    let captures = duration_re().captures(line)?;
    captures[1].parse().ok()
}

/// Pull the `"Query Text"` field out of a JSON explain payload,
/// un-escaping embedded newlines.
fn extract_query_text(explain_text: &str) -> Option<String> {
    let captures = query_text_re().captures(explain_text)?;
    Some(captures[1].replace("\\n", "\n"))
}

/// Drop the log prefix up to and including the first `": "`.
fn strip_log_prefix(line: &str) -> &str {
    line.split_once(": ").map(|(_, rest)| rest).unwrap_or(line)
}
