//! Per-submission workspaces and the worker pool
//!
//! Every submission gets a fresh directory with three parts:
//!
//! - `src/` holds the source units handed to the compiler
//! - `out/<backend>/` holds the compiled artifact of one backend
//! - `run/` is the empty working directory of the worker
//! - `jail/` is the skeleton root of the worker, built on demand
//!
//! The directory is removed when the workspace is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::sandbox::SandboxError;

const SOURCE_DIR: &str = "src";
const OUTPUT_DIR: &str = "out";
const RUN_DIR: &str = "run";
const JAIL_DIR: &str = "jail";

/// Scratch directory owned by one submission
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: TempDir,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Create a workspace under `root` (system temp directory if `None`)
    #[instrument]
    pub fn create(root: Option<&Path>) -> Result<Self, SandboxError> {
        let id = Uuid::new_v4();
        let mut builder = tempfile::Builder::new();
        builder.prefix("playground-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(SandboxError::WorkspaceCreation)?;

        for sub in [SOURCE_DIR, OUTPUT_DIR, RUN_DIR] {
            std::fs::create_dir(dir.path().join(sub)).map_err(SandboxError::WorkspaceCreation)?;
        }

        debug!(%id, path = %dir.path().display(), "workspace created");

        Ok(Self {
            id,
            dir,
            _permit: None,
        })
    }

    fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Unique identifier, used to correlate log records
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Root of the workspace
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory of the source units
    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join(SOURCE_DIR)
    }

    /// Working directory of the worker
    pub fn run_dir(&self) -> PathBuf {
        self.dir.path().join(RUN_DIR)
    }

    /// Skeleton root directory of the worker's jail
    pub fn jail_dir(&self) -> PathBuf {
        self.dir.path().join(JAIL_DIR)
    }

    /// Get the host path of a source file
    ///
    /// Returns an error if the name would leave the source directory.
    pub fn source_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.is_empty() || name.contains("..") || name.contains('/') {
            return Err(SandboxError::InvalidPath(format!(
                "source name not allowed: {name}"
            )));
        }
        Ok(self.source_dir().join(name))
    }

    /// Write a source file, returning its host path
    #[instrument(skip(self, content), fields(workspace = %self.id))]
    pub async fn write_source(&self, name: &str, content: &str) -> Result<PathBuf, SandboxError> {
        let path = self.source_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote source file");
        Ok(path)
    }

    /// Create an empty artifact directory for one compiler attempt
    ///
    /// Any previous contents are removed, so a failed attempt cannot leak
    /// class files into the next one.
    pub async fn fresh_output_dir(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.is_empty() || name.contains("..") || name.contains('/') {
            return Err(SandboxError::InvalidPath(format!(
                "output name not allowed: {name}"
            )));
        }
        let path = self.dir.path().join(OUTPUT_DIR).join(name);
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Remove the workspace, reporting failures
    ///
    /// Dropping a workspace also removes it but ignores errors.
    #[instrument(skip(self), fields(workspace = %self.id))]
    pub fn close(self) -> Result<(), SandboxError> {
        let Self { id, dir, _permit } = self;
        dir.close().map_err(|e| {
            warn!(%id, error = %e, "failed to remove workspace");
            SandboxError::Io(e)
        })
    }
}

/// Bounded pool of workspaces
///
/// At most `capacity` submissions hold a workspace at any time; further
/// acquisitions wait for a slot.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    capacity: usize,
    scratch_root: Option<PathBuf>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a new pool
    pub fn new(capacity: usize, scratch_root: Option<PathBuf>) -> Self {
        Self {
            capacity,
            scratch_root,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot and create a workspace in it
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, SandboxError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::PoolClosed)?;

        let workspace = Workspace::create(self.scratch_root.as_deref())?;
        debug!(id = %workspace.id(), available = self.available(), "acquired workspace");

        Ok(workspace.with_permit(permit))
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
