use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::backend::{BackendConfig, DEFAULT_SANDBOX_PATH};
use crate::types::{BackendKind, ResourceLimits};

pub mod backend;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../playground.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid characters in source extension")]
    InvalidExtensionChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("backend '{0}' has an invalid fallback pattern: {1}")]
    Pattern(String, #[source] regex::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for the playground engine
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// File extension used when writing source units (without the dot)
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Execution deadline applied when a submission does not override it
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Upper bound on the deadline a submission may request
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Time a worker may take to locate the entry point before the
    /// deadline starts. Covers runtime start-up, not guest code.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Wall-clock cap on a single compiler invocation
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,

    /// Maximum number of submissions processed at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Indentation used for synthesis and style checking
    #[serde(default = "default_indent_level")]
    pub default_indent_level: usize,

    /// Entry class loaded in class mode when a submission names none
    #[serde(default = "default_entry_class")]
    pub default_entry_class: String,

    /// Maximum bytes of guest output kept; the rest is dropped
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    /// Directory that per-submission workspaces are created in
    /// (system temp directory if not specified)
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Privilege boundary for compiler and worker processes
    #[serde(default)]
    pub security: SecurityConfig,

    /// Style advisory pass
    #[serde(default)]
    pub style: StyleConfig,

    /// The two compiler backends
    pub backends: Backends,
}

/// Restricted and full-spec backend configurations
#[derive(Debug, Clone, Deserialize)]
pub struct Backends {
    pub restricted: BackendConfig,
    pub full: BackendConfig,
}

impl Backends {
    pub fn get(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Restricted => &self.restricted,
            BackendKind::FullSpec => &self.full,
        }
    }
}

/// Security policy applied to every child process the engine spawns
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// PATH inside the worker environment
    #[serde(default = "default_sandbox_path")]
    pub path: String,

    /// Extra environment variables (`KEY=VALUE`). Everything else is cleared.
    #[serde(default)]
    pub env: Vec<String>,

    /// Hard limits for workers running guest code
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Hard limits for compiler processes
    #[serde(default = "ResourceLimits::unlimited")]
    pub compile_limits: ResourceLimits,

    /// Run workers in a jail: fresh user, mount and PID namespaces with a
    /// private root. Requires unprivileged user namespaces on the host.
    #[serde(default = "default_true")]
    pub isolation: bool,

    /// Cut workers and compilers off the network with a fresh network
    /// namespace
    #[serde(default = "default_true")]
    pub network_namespace: bool,

    /// Host paths a jailed worker sees read-only (the runtime and its
    /// libraries). Missing paths are skipped.
    #[serde(default = "default_read_only_paths")]
    pub read_only_paths: Vec<PathBuf>,

    /// Device nodes bound into the jail
    #[serde(default = "default_devices")]
    pub devices: Vec<PathBuf>,
}

impl SecurityConfig {
    /// Environment variables as key/value pairs
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            path: default_sandbox_path(),
            env: Vec::new(),
            limits: ResourceLimits::default(),
            compile_limits: ResourceLimits::unlimited(),
            isolation: true,
            network_namespace: true,
            read_only_paths: default_read_only_paths(),
            devices: default_devices(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StyleConfig {
    /// Run the style advisory pass (`styleCheckPassed` is null when disabled)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the configuration of one backend
    pub fn backend(&self, kind: BackendKind) -> &BackendConfig {
        self.backends.get(kind)
    }

    /// Limits for workers running artifacts of one backend
    pub fn worker_limits(&self, kind: BackendKind) -> ResourceLimits {
        self.security
            .limits
            .with_overrides(&self.backend(kind).limits)
    }

    /// Resolve the execution deadline for a submission
    ///
    /// Overrides are clamped to `[1ms, max_timeout_ms]`.
    pub fn effective_timeout(&self, override_ms: Option<u64>) -> Duration {
        let ms = override_ms
            .map(|ms| ms.clamp(1, self.max_timeout_ms))
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_source_extension() -> String {
    "java".to_owned()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_max_timeout_ms() -> u64 {
    10_000
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}

fn default_max_workers() -> usize {
    32
}

fn default_indent_level() -> usize {
    4
}

fn default_entry_class() -> String {
    "Question".to_owned()
}

fn default_max_output() -> usize {
    64 * 1024
}

fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_read_only_paths() -> Vec<PathBuf> {
    [
        "/bin",
        "/sbin",
        "/lib",
        "/lib32",
        "/lib64",
        "/usr",
        "/etc/alternatives",
        "/etc/ld.so.cache",
        "/etc/java-8-openjdk",
        "/etc/java-11-openjdk",
        "/etc/java-17-openjdk",
        "/etc/java-21-openjdk",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_devices() -> Vec<PathBuf> {
    ["/dev/null", "/dev/zero", "/dev/random", "/dev/urandom"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}
