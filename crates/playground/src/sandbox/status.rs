//! Worker status protocol
//!
//! The launcher inside a worker reports its progress as newline-terminated
//! records on file descriptor 3:
//!
//! ```text
//! ready
//! missing <message>
//! completed
//! crashed <message>
//! ```
//!
//! Messages escape `\` as `\\`, newline as `\n` and carriage return as `\r`
//! so every record stays on one line.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// File descriptor the worker writes status records to
pub const STATUS_FD: i32 = 3;

/// Error that occurs while parsing a status record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status parse error at line {line_number}: {message} (line: {line:?})")]
pub struct StatusParseError {
    /// Line number (1-indexed) of the record in the status stream
    pub line_number: usize,
    /// The problematic record
    pub line: String,
    /// Description of the error
    pub message: String,
}

/// One record of the status protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Entry point located, guest code is about to run
    Ready,

    /// Entry class or entry method could not be resolved
    Missing(String),

    /// Entry point returned normally
    Completed,

    /// Entry point raised an uncaught throwable
    Crashed(String),
}

impl WorkerStatus {
    /// Parse a single record, returning `None` for malformed lines
    pub fn parse_line(line: &str) -> Option<Self> {
        line.parse().ok()
    }

    /// Parse a single record with strict error handling
    pub fn try_parse_line(line: &str, line_number: usize) -> Result<Self, StatusParseError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (keyword, rest) = match trimmed.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (trimmed, None),
        };

        let error = |message: &str| StatusParseError {
            line_number,
            line: line.to_string(),
            message: message.to_string(),
        };

        match (keyword, rest) {
            ("ready", None) => Ok(WorkerStatus::Ready),
            ("completed", None) => Ok(WorkerStatus::Completed),
            ("missing", rest) => Ok(WorkerStatus::Missing(unescape(rest.unwrap_or_default()))),
            ("crashed", rest) => Ok(WorkerStatus::Crashed(unescape(rest.unwrap_or_default()))),
            ("ready" | "completed", Some(_)) => Err(error("unexpected payload")),
            ("", _) => Err(error("empty record")),
            _ => Err(error("unknown record")),
        }
    }

    /// Whether this record ends the execution phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Completed | WorkerStatus::Crashed(_))
    }
}

impl FromStr for WorkerStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse_line(s, 1)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Ready => f.write_str("ready"),
            WorkerStatus::Completed => f.write_str("completed"),
            WorkerStatus::Missing(message) => write!(f, "missing {}", escape(message)),
            WorkerStatus::Crashed(message) => write!(f, "crashed {}", escape(message)),
        }
    }
}

/// Escape a message for a status record
pub fn escape(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverse [`escape`]. Unknown escapes are kept as written.
pub fn unescape(message: &str) -> String {
    let mut unescaped = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}
