use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hard resource limits applied to a worker process before it executes
/// guest code. Both the soft and the hard limit are set, so the guest cannot
/// raise them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU time limit in seconds (RLIMIT_CPU)
    #[serde(default)]
    pub cpu_time: Option<u64>,

    /// Address space limit in kilobytes (RLIMIT_AS)
    ///
    /// The JVM reserves far more virtual memory than it touches, so leave this
    /// unset for JVM-based backends unless the heap flags are tuned to match.
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes for the worker's user (RLIMIT_NPROC)
    #[serde(default)]
    pub max_processes: Option<u64>,

    /// Largest file the worker may create, in kilobytes (RLIMIT_FSIZE)
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Maximum open file descriptors (RLIMIT_NOFILE)
    #[serde(default)]
    pub max_open_files: Option<u64>,
}

impl ResourceLimits {
    /// Create resource limits with every limit unset
    pub fn unlimited() -> Self {
        Self {
            cpu_time: None,
            memory_limit: None,
            max_processes: None,
            max_file_size: None,
            max_open_files: None,
        }
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            cpu_time: overrides.cpu_time.or(self.cpu_time),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_file_size: overrides.max_file_size.or(self.max_file_size),
            max_open_files: overrides.max_open_files.or(self.max_open_files),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: Some(10),
            memory_limit: None,
            max_processes: None,
            max_file_size: Some(1024), // 1 MB
            max_open_files: Some(256),
        }
    }
}

/// How the submitted source is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A bare statement sequence wrapped into a synthetic entry point
    #[default]
    Snippet,

    /// One or more complete compilation units with an entry class
    Class,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Snippet => "snippet",
            Mode::Class => "class",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snippet" => Ok(Mode::Snippet),
            "class" | "classes" => Ok(Mode::Class),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// The two interchangeable compiler backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Fast compiler with a restricted feature set, tried first
    #[serde(rename = "restricted")]
    Restricted,

    /// Slower compiler implementing the complete language specification
    #[serde(rename = "full")]
    FullSpec,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Restricted, BackendKind::FullSpec];

    /// Config key for this backend (`[backends.<key>]`)
    pub fn key(self) -> &'static str {
        match self {
            BackendKind::Restricted => "restricted",
            BackendKind::FullSpec => "full",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
