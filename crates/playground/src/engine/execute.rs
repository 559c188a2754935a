//! Execution stage

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::backend::CompiledArtifact;
use crate::config::Config;
use crate::sandbox::{Deadlines, Jail, SandboxCommand, WorkerReport, Workspace, supervise};
use crate::verdict::{ExecuteError, ExecutionOutcome};

/// Run a compiled artifact in a worker and classify what happened
#[instrument(skip_all, fields(compiler = %artifact.compiler, workspace = %workspace.id()))]
pub async fn execute(
    artifact: &CompiledArtifact,
    workspace: &Workspace,
    config: &Config,
    timeout: Duration,
) -> ExecutionOutcome {
    let mut command = SandboxCommand::new(artifact.run_command.iter().cloned())
        .security(&config.security)
        .limits(config.worker_limits(artifact.backend))
        .working_dir(workspace.run_dir());
    if config.security.isolation {
        let jail = Jail::from_security(workspace.jail_dir(), &config.security)
            .read_only(&artifact.output_dir)
            .writable(workspace.run_dir());
        command = command.jail(jail);
    }
    let deadlines = Deadlines {
        startup: config.startup_timeout(),
        execution: timeout,
    };

    let run = match supervise(command, deadlines, config.max_output).await {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "failed to start worker");
            return ExecuteError::Infrastructure(e.to_string()).into_outcome(Duration::ZERO);
        }
    };

    debug!(report = ?run.report, elapsed = ?run.elapsed, "worker reported");

    match run.report {
        WorkerReport::Completed => ExecutionOutcome::Completed {
            output: run.output,
            elapsed: run.elapsed,
        },
        WorkerReport::EntryMissing(message) => ExecutionOutcome::CompileFailed {
            diagnostics: message,
        },
        WorkerReport::Crashed(message) => {
            ExecuteError::RuntimeFault(message).into_outcome(run.elapsed)
        }
        WorkerReport::TimedOut => ExecuteError::DeadlineExceeded(timeout).into_outcome(run.elapsed),
        WorkerReport::Vanished => {
            let reason = describe_exit(run.exit);
            warn!(%reason, "worker ended without reporting a result");
            ExecuteError::SecurityViolation(reason).into_outcome(run.elapsed)
        }
        WorkerReport::StartupFailed(message) => {
            error!(%message, output = %run.output, "worker failed to start");
            ExecuteError::Infrastructure(message).into_outcome(Duration::ZERO)
        }
    }
}

fn describe_exit(exit: Option<ExitStatus>) -> String {
    match exit {
        Some(status) => match (status.code(), status.signal()) {
            (Some(code), _) => format!("program terminated the worker with status {code}"),
            (None, Some(signal)) => format!("worker was killed by signal {signal}"),
            (None, None) => "worker ended unexpectedly".to_string(),
        },
        None => "worker ended unexpectedly".to_string(),
    }
}
