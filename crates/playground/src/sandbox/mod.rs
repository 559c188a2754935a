//! Process sandbox
//!
//! Compilers and workers run as child processes with a cleared environment,
//! hard resource limits and their own process group, inside a per-submission
//! workspace. Workers see the host only through a [`Jail`]. Workers report progress over a status pipe so the supervisor
//! can tell a located entry point, a normal return, an uncaught throwable
//! and a vanished process apart.

use thiserror::Error;

pub use crate::sandbox::command::SandboxCommand;
pub use crate::sandbox::jail::{Jail, SANDBOX_ID};
pub use crate::sandbox::process::{
    CollectedOutput, Deadlines, WorkerReport, WorkerRun, run_to_completion, supervise,
};
pub use crate::sandbox::status::{STATUS_FD, StatusParseError, WorkerStatus};
pub use crate::sandbox::workspace::{WorkerPool, Workspace};

mod command;
mod jail;
mod process;
pub mod status;
mod workspace;

/// Errors that occur while preparing or running sandboxed processes
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create workspace: {0}")]
    WorkspaceCreation(#[source] std::io::Error),

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to set up status pipe: {0}")]
    StatusPipe(#[source] std::io::Error),

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
