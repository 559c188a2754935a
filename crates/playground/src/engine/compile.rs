//! Compile stage with backend fallback

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::backend::{CompileError, CompiledArtifact, FallbackPolicy, SourceSet};
use crate::engine::BackendSet;
use crate::sandbox::Workspace;
use crate::types::BackendKind;

/// What the compile stage produced
#[derive(Debug)]
pub struct CompileAttempt {
    /// Display name of the backend that produced the artifact, or was
    /// attempted last
    pub compiler: String,
    /// Total time spent in compiler invocations
    pub compile_time: Duration,
    /// The artifact, or the message to report as `compilationErrorMessage`
    pub outcome: Result<CompiledArtifact, String>,
}

/// Compile the source set, retrying on the other backend when the policy
/// allows it
#[instrument(skip_all, fields(workspace = %workspace.id(), pinned = ?pinned))]
pub async fn compile_with_fallback(
    backends: &BackendSet,
    policy: &FallbackPolicy,
    workspace: &Workspace,
    sources: &SourceSet,
    pinned: Option<BackendKind>,
) -> CompileAttempt {
    let mut kind = policy.initial(pinned);
    let mut compile_time = Duration::ZERO;

    loop {
        let backend = backends.get(kind);
        let started = Instant::now();
        let result = backend.compile(workspace, sources).await;
        compile_time += started.elapsed();

        let compiler = backend.name().to_string();
        let failure = match result {
            Ok(artifact) => {
                debug!(%compiler, ?compile_time, "compiled");
                return CompileAttempt {
                    compiler,
                    compile_time,
                    outcome: Ok(artifact),
                };
            }
            Err(CompileError::Failed(diagnostics)) => {
                if let Some(next) = policy.retry_with(kind, pinned.is_some(), &diagnostics.text) {
                    info!(
                        from = %kind,
                        to = %next,
                        signature = ?policy.matched_signature(&diagnostics.text),
                        "falling back to other backend"
                    );
                    kind = next;
                    continue;
                }
                debug!(%compiler, "compilation failed");
                diagnostics.to_string()
            }
            Err(err @ CompileError::Timeout(_)) => {
                warn!(%compiler, error = %err, "compiler exceeded its time cap");
                err.to_string()
            }
            Err(err @ CompileError::Sandbox(_)) => {
                error!(%compiler, error = %err, "failed to run compiler");
                err.to_string()
            }
        };

        break CompileAttempt {
            compiler,
            compile_time,
            outcome: Err(failure),
        };
    }
}
