//! Submission execution engine
//!
//! The [`Engine`] takes a submission through synthesis, compilation with
//! backend fallback and supervised execution, and reports a [`RunResult`].
//! The style advisory pass runs on a blocking thread alongside and never
//! affects the other stages. Failures of any stage end up in the result;
//! [`Engine::run`] itself cannot fail.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, instrument, warn};

use crate::api::Request;
use crate::backend::{Backend, CommandBackend, FallbackPolicy, SourceSet};
use crate::config::{Config, ConfigError};
use crate::sandbox::WorkerPool;
use crate::style::{FormatChecker, StyleChecker};
use crate::submission::Submission;
use crate::synth::{SNIPPET_CLASS, synthesize};
use crate::types::{BackendKind, Mode};
use crate::verdict::{ExecutionOutcome, RunContext, RunResult, classify};

pub use crate::engine::compile::{CompileAttempt, compile_with_fallback};
pub use crate::engine::execute::execute;

mod compile;
mod execute;

/// The restricted and full-spec backends
#[derive(Debug, Clone)]
pub struct BackendSet {
    restricted: Arc<dyn Backend>,
    full: Arc<dyn Backend>,
}

impl BackendSet {
    pub fn new(restricted: Arc<dyn Backend>, full: Arc<dyn Backend>) -> Self {
        Self { restricted, full }
    }

    /// Command backends built from the config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(CommandBackend::new(BackendKind::Restricted, config)),
            Arc::new(CommandBackend::new(BackendKind::FullSpec, config)),
        )
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn Backend> {
        match kind {
            BackendKind::Restricted => &self.restricted,
            BackendKind::FullSpec => &self.full,
        }
    }
}

/// Runs submissions
///
/// Cloning is cheap; clones share the backends and the worker pool.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<Config>,
    backends: BackendSet,
    policy: Arc<FallbackPolicy>,
    pool: WorkerPool,
    style: Option<Arc<dyn StyleChecker>>,
}

impl Engine {
    /// Create an engine with command backends and the built-in style checker
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let policy = FallbackPolicy::from_config(&config)?;
        let backends = BackendSet::from_config(&config);
        let pool = WorkerPool::new(config.max_workers, config.scratch_root.clone());
        let style: Option<Arc<dyn StyleChecker>> = config
            .style
            .enabled
            .then(|| Arc::new(FormatChecker::new()) as Arc<dyn StyleChecker>);

        Ok(Self {
            config: Arc::new(config),
            backends,
            policy: Arc::new(policy),
            pool,
            style,
        })
    }

    /// Create an engine with the default configuration
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(Config::default())
    }

    /// Replace the compiler backends
    pub fn with_backends(mut self, restricted: Arc<dyn Backend>, full: Arc<dyn Backend>) -> Self {
        self.backends = BackendSet::new(restricted, full);
        self
    }

    /// Replace the style checker (`None` disables the pass)
    pub fn with_style_checker(mut self, checker: Option<Arc<dyn StyleChecker>>) -> Self {
        self.style = checker;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run a wire request. Invalid requests yield a `compiled=false` result.
    pub async fn run_request(&self, request: Request) -> RunResult {
        let mode = request.mode;
        let timeout = self.config.effective_timeout(request.timeout_ms);
        match request.into_submission(&self.config) {
            Ok(submission) => self.run(&submission).await,
            Err(e) => {
                debug!(error = %e, "rejected request");
                RunResult::rejected(e.to_string(), mode, timeout)
            }
        }
    }

    /// Run one submission
    #[instrument(skip_all, fields(mode = %submission.mode()))]
    pub async fn run(&self, submission: &Submission) -> RunResult {
        let indent = submission
            .indent_level()
            .unwrap_or(self.config.default_indent_level);
        let style = self.spawn_style_check(submission.units(), indent);

        let mut result = self.compile_and_execute(submission, indent).await;

        if let Some(handle) = style {
            result.style_check_passed = match handle.await {
                Ok(passed) => Some(passed),
                Err(e) => {
                    warn!(error = %e, "style check did not finish");
                    None
                }
            };
        }

        debug!(
            compiled = result.compiled,
            executed = result.executed,
            crashed = result.crashed,
            timed_out = result.timed_out,
            compiler = %result.compiler_used,
            "submission finished"
        );
        result
    }

    /// Run submissions concurrently, returning results in input order
    pub async fn run_all(&self, submissions: Vec<Submission>) -> Vec<RunResult> {
        let fallbacks: Vec<(Mode, Duration)> = submissions
            .iter()
            .map(|s| (s.mode(), self.config.effective_timeout(s.timeout_ms())))
            .collect();

        let mut tasks = JoinSet::new();
        for (idx, submission) in submissions.into_iter().enumerate() {
            let engine = self.clone();
            tasks.spawn(async move { (idx, engine.run(&submission).await) });
        }

        let mut results: Vec<Option<RunResult>> = vec![None; fallbacks.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => error!(error = %e, "submission task failed"),
            }
        }

        results
            .into_iter()
            .zip(fallbacks)
            .map(|(result, (mode, timeout))| {
                result.unwrap_or_else(|| {
                    RunResult::rejected("submission task failed", mode, timeout)
                })
            })
            .collect()
    }

    fn spawn_style_check(&self, units: &[String], indent: usize) -> Option<JoinHandle<bool>> {
        let checker = self.style.clone()?;
        let units = units.to_vec();
        Some(tokio::task::spawn_blocking(move || {
            units.iter().all(|unit| checker.check(unit, indent))
        }))
    }

    async fn compile_and_execute(&self, submission: &Submission, indent: usize) -> RunResult {
        let mode = submission.mode();
        let timeout = self.config.effective_timeout(submission.timeout_ms());

        let (units, entry_class) = match mode {
            Mode::Snippet => {
                let snippet = submission.units().first().map_or("", String::as_str);
                match synthesize(snippet, indent) {
                    Ok(program) => (vec![program], SNIPPET_CLASS.to_string()),
                    Err(e) => return RunResult::rejected(e.to_string(), mode, timeout),
                }
            }
            Mode::Class => (
                submission.units().to_vec(),
                submission
                    .entry_class()
                    .unwrap_or(&self.config.default_entry_class)
                    .to_string(),
            ),
        };

        let workspace = match self.pool.acquire().await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(error = %e, "failed to prepare workspace");
                return RunResult::rejected(e.to_string(), mode, timeout);
            }
        };

        let sources = match SourceSet::write(
            &workspace,
            &units,
            &entry_class,
            &self.config.source_extension,
        )
        .await
        {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "failed to write sources");
                return RunResult::rejected(e.to_string(), mode, timeout);
            }
        };

        let attempt = compile_with_fallback(
            &self.backends,
            &self.policy,
            &workspace,
            &sources,
            submission.backend(),
        )
        .await;

        let outcome = match &attempt.outcome {
            Ok(artifact) => execute(artifact, &workspace, &self.config, timeout).await,
            Err(diagnostics) => ExecutionOutcome::CompileFailed {
                diagnostics: diagnostics.clone(),
            },
        };

        // Errors are logged by close; the directory is gone either way
        let _ = workspace.close();

        classify(
            outcome,
            &RunContext {
                mode,
                compiler_used: attempt.compiler,
                compile_time: attempt.compile_time,
                timeout,
            },
        )
    }
}
