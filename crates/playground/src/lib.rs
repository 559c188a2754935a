//! An engine for compiling and running untrusted Java submissions.
//!
//! Playground takes either a complete class or a bare statement sequence,
//! compiles it with one of two interchangeable compiler backends and runs the
//! entry point in a supervised, deadline-bound child process. Every
//! submission ends in a flat [`RunResult`] describing whether it compiled,
//! ran, crashed or timed out and what it printed.
//!
//! # Features
//!
//! - **Backend fallback**: a fast restricted compiler is tried first; known
//!   "unsupported feature" failures are retried on a full-spec compiler.
//! - **Snippet synthesis**: statement sequences are wrapped into a generated
//!   entry class, with declarations lifted to member level.
//! - **Sandboxed execution**: cleared environment, hard rlimits, its own
//!   process group and an optional network namespace per worker.
//! - **Hard deadlines**: the whole process group is killed when time runs
//!   out, measured from the moment the entry point was located.
//! - **Style advisory**: a formatting check whose verdict never gates
//!   compilation or execution.
//! - **TOML configuration**: backends are command templates.

pub use api::Request;
pub use backend::{Backend, CommandBackend, CompileError, CompiledArtifact, FallbackPolicy};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use engine::{BackendSet, Engine};
pub use sandbox::{SandboxError, WorkerPool, Workspace};
pub use style::{FormatChecker, StyleChecker, StyleViolation};
pub use submission::{Submission, SubmissionBuilder, SubmissionError};
pub use synth::{SNIPPET_CLASS, SynthesisError, synthesize};
pub use types::{BackendKind, Mode, ResourceLimits};
pub use verdict::{ExecuteError, ExecutionOutcome, RunResult, classify};

pub mod api;
pub mod backend;
pub mod config;
pub mod engine;
pub mod sandbox;
pub mod source;
pub mod style;
pub mod submission;
pub mod synth;
pub mod types;
pub mod verdict;
