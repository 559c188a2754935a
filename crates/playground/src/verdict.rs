//! Result classification
//!
//! Every submission ends in exactly one [`ExecutionOutcome`]. [`classify`]
//! maps it, together with what is known about the compile stage, onto the
//! flat [`RunResult`] record returned to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Mode;

/// Terminal state of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Rejected before execution: compiler diagnostics, a missing entry point
    /// or an invalid submission
    CompileFailed { diagnostics: String },

    /// The deadline elapsed and the worker was killed
    TimedOut { elapsed: Duration },

    /// Guest code raised an uncaught throwable or the worker died
    Crashed { message: String, elapsed: Duration },

    /// The entry point returned
    Completed { output: String, elapsed: Duration },
}

/// Ways an execution can fail after compilation succeeded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    /// Uncaught throwable, reported exactly as the runtime rendered it
    #[error("{0}")]
    RuntimeFault(String),

    #[error("execution exceeded the {}ms deadline", .0.as_millis())]
    DeadlineExceeded(Duration),

    /// The guest ended its own process
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// Host-side failure while running the worker
    #[error("worker failed: {0}")]
    Infrastructure(String),
}

impl ExecuteError {
    /// Fold the error into an outcome
    pub fn into_outcome(self, elapsed: Duration) -> ExecutionOutcome {
        match self {
            ExecuteError::DeadlineExceeded(_) => ExecutionOutcome::TimedOut { elapsed },
            other => ExecutionOutcome::Crashed {
                message: other.to_string(),
                elapsed,
            },
        }
    }
}

/// Compile-stage facts recorded alongside the outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub mode: Mode,
    /// Display name of the backend that produced the artifact, or was
    /// attempted last
    pub compiler_used: String,
    pub compile_time: Duration,
    /// Deadline that applied to the execution
    pub timeout: Duration,
}

/// Public result of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub compiled: bool,
    pub executed: bool,
    pub crashed: bool,
    pub timed_out: bool,
    /// Merged stdout and stderr, present only when the entry point returned
    pub output: String,
    pub compilation_error_message: Option<String>,
    pub execution_error_message: Option<String>,
    pub compiler_used: String,
    /// `None` when the style pass is disabled
    pub style_check_passed: Option<bool>,
    pub execution_length_ms: u64,
    pub timeout_length_ms: u64,
    pub mode: Mode,
    pub compile_length_ms: u64,
}

impl RunResult {
    /// Result for a submission that was refused before any backend ran
    pub fn rejected(message: impl Into<String>, mode: Mode, timeout: Duration) -> Self {
        classify(
            ExecutionOutcome::CompileFailed {
                diagnostics: message.into(),
            },
            &RunContext {
                mode,
                compiler_used: String::new(),
                compile_time: Duration::ZERO,
                timeout,
            },
        )
    }

    /// Whether exactly one terminal flag characterizes the result
    pub fn is_consistent(&self) -> bool {
        let flags = [
            !self.compiled,
            self.executed,
            self.crashed,
            self.timed_out,
        ];
        flags.iter().filter(|&&f| f).count() == 1
    }
}

/// Map an outcome onto the public result
pub fn classify(outcome: ExecutionOutcome, context: &RunContext) -> RunResult {
    let mut result = RunResult {
        compiled: true,
        executed: false,
        crashed: false,
        timed_out: false,
        output: String::new(),
        compilation_error_message: None,
        execution_error_message: None,
        compiler_used: context.compiler_used.clone(),
        style_check_passed: None,
        execution_length_ms: 0,
        timeout_length_ms: millis(context.timeout),
        mode: context.mode,
        compile_length_ms: millis(context.compile_time),
    };

    match outcome {
        ExecutionOutcome::CompileFailed { diagnostics } => {
            result.compiled = false;
            result.compilation_error_message = Some(diagnostics);
        }
        ExecutionOutcome::TimedOut { elapsed } => {
            result.timed_out = true;
            result.execution_length_ms = millis(elapsed);
        }
        ExecutionOutcome::Crashed { message, elapsed } => {
            result.crashed = true;
            result.execution_error_message = Some(message);
            result.execution_length_ms = millis(elapsed);
        }
        ExecutionOutcome::Completed { output, elapsed } => {
            result.executed = true;
            result.output = output;
            result.execution_length_ms = millis(elapsed);
        }
    }

    result
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
