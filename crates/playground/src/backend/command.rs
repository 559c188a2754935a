//! Backend driven by configured compiler and worker commands

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::backend::launcher::{LAUNCHER_SOURCE, launcher_file};
use crate::backend::{Backend, CompileError, CompiledArtifact, Diagnostics, SourceSet};
use crate::config::{BackendConfig, Config, SecurityConfig};
use crate::sandbox::{SandboxCommand, Workspace, run_to_completion};
use crate::types::BackendKind;

/// A compiler invoked as an external command
#[derive(Debug, Clone)]
pub struct CommandBackend {
    kind: BackendKind,
    config: BackendConfig,
    security: SecurityConfig,
    extension: String,
    compile_timeout: Duration,
    max_output: usize,
}

impl CommandBackend {
    /// Create the backend of the given kind from the engine config
    pub fn new(kind: BackendKind, config: &Config) -> Self {
        Self {
            kind,
            config: config.backend(kind).clone(),
            security: config.security.clone(),
            extension: config.source_extension.clone(),
            compile_timeout: config.compile_timeout(),
            max_output: config.max_output,
        }
    }

    /// Backend configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for CommandBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, workspace, sources), fields(backend = %self.config.name, workspace = %workspace.id()))]
    async fn compile(
        &self,
        workspace: &Workspace,
        sources: &SourceSet,
    ) -> Result<CompiledArtifact, CompileError> {
        let output_dir = workspace.fresh_output_dir(self.kind.key()).await?;
        let output = output_dir.to_string_lossy().into_owned();

        let mut files: Vec<String> = sources
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if self.config.inject_launcher {
            let launcher = workspace
                .write_source(&launcher_file(&self.extension), LAUNCHER_SOURCE)
                .await?;
            files.push(launcher.to_string_lossy().into_owned());
        }

        let args = BackendConfig::expand_command(
            &self.config.compile,
            &files,
            &output,
            &sources.entry_class,
        );
        let command = SandboxCommand::new(args)
            .security(&self.security)
            .limits(self.security.compile_limits)
            .working_dir(workspace.source_dir());

        let collected = run_to_completion(command, self.compile_timeout, self.max_output).await?;

        if collected.timed_out {
            return Err(CompileError::Timeout(self.compile_timeout));
        }
        if !collected.success() {
            debug!(status = ?collected.status, "compiler rejected source");
            return Err(CompileError::Failed(Diagnostics {
                backend: self.kind,
                text: collected.output,
                exit_code: collected.status.and_then(|s| s.code()),
            }));
        }

        let run_command =
            BackendConfig::expand_command(&self.config.run, &[], &output, &sources.entry_class);

        debug!(elapsed = ?collected.elapsed, "compilation succeeded");

        Ok(CompiledArtifact {
            backend: self.kind,
            compiler: self.config.name.clone(),
            output_dir,
            run_command,
        })
    }
}
