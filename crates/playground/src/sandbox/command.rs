//! Command builder for sandboxed child processes
//!
//! Every compiler and worker process is spawned through [`SandboxCommand`]:
//! a cleared environment, its own process group and hard resource limits.
//! Workers additionally run inside a [`Jail`].

use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{DEFAULT_SANDBOX_PATH, SecurityConfig};
use crate::sandbox::SandboxError;
use crate::sandbox::jail::Jail;
use crate::sandbox::status::STATUS_FD;
use crate::types::ResourceLimits;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type Resource = libc::c_int;

/// Builder for a sandboxed child process
#[derive(Debug)]
pub struct SandboxCommand {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    path: String,
    env: Vec<(String, String)>,
    limits: ResourceLimits,
    network_namespace: bool,
    jail: Option<Jail>,
    status_fd: Option<RawFd>,
}

impl SandboxCommand {
    /// Create a builder for the given argument vector
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
            path: DEFAULT_SANDBOX_PATH.to_string(),
            env: Vec::new(),
            limits: ResourceLimits::unlimited(),
            network_namespace: false,
            jail: None,
            status_fd: None,
        }
    }

    /// Apply the environment and namespace policy of a security config.
    /// Resource limits are set separately since compilers and workers use
    /// different ones.
    pub fn security(mut self, security: &SecurityConfig) -> Self {
        self.path = security.path.clone();
        self.network_namespace = security.network_namespace;
        for (key, value) in security.env_pairs() {
            self.env.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Run the child inside a jail. Its network policy replaces the one
    /// set by [`security`](Self::security).
    pub fn jail(mut self, jail: Jail) -> Self {
        self.jail = Some(jail);
        self
    }

    /// Make `fd` available to the child as [`STATUS_FD`]. The descriptor must
    /// stay open until the child has been spawned.
    pub fn status_fd(mut self, fd: RawFd) -> Self {
        self.status_fd = Some(fd);
        self
    }

    /// The argument vector
    pub fn args(&self) -> &[String] {
        &self.command
    }

    /// Program name, for diagnostics
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    /// Build the tokio command
    ///
    /// stdin is closed, stdout and stderr are piped. The child leads a new
    /// process group so the whole tree can be killed at once.
    pub fn build(self) -> Result<Command, SandboxError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(SandboxError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .env("PATH", &self.path)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        let jail = match self.jail {
            Some(ref jail) => Some(jail.prepare(self.working_dir.as_deref())?),
            None => None,
        };
        let limits = self.limits;
        let status_fd = self.status_fd;
        let network_namespace = self.network_namespace;

        // SAFETY: the closure runs between fork and exec, allocates nothing
        // and only makes async-signal-safe system calls.
        unsafe {
            command.pre_exec(move || {
                if let Some(fd) = status_fd {
                    install_status_fd(fd)?;
                }
                // Limits bind the worker, never the jail's relay process
                match &jail {
                    Some(jail) => jail.enter()?,
                    None if network_namespace => {
                        if libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) != 0 {
                            return Err(io::Error::last_os_error());
                        }
                    }
                    None => {}
                }
                apply_limits(&limits)
            });
        }

        Ok(command)
    }
}

/// Set soft and hard limits so the child cannot raise them again
fn apply_limits(limits: &ResourceLimits) -> io::Result<()> {
    const KB: u64 = 1024;

    if let Some(seconds) = limits.cpu_time {
        set_limit(libc::RLIMIT_CPU, seconds)?;
    }
    if let Some(kb) = limits.memory_limit {
        set_limit(libc::RLIMIT_AS, kb.saturating_mul(KB))?;
    }
    if let Some(count) = limits.max_processes {
        set_limit(libc::RLIMIT_NPROC, count)?;
    }
    if let Some(kb) = limits.max_file_size {
        set_limit(libc::RLIMIT_FSIZE, kb.saturating_mul(KB))?;
    }
    if let Some(count) = limits.max_open_files {
        set_limit(libc::RLIMIT_NOFILE, count)?;
    }
    set_limit(libc::RLIMIT_CORE, 0)
}

fn set_limit(resource: Resource, value: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit for the duration of the call
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Move the status pipe to its well-known descriptor without close-on-exec
fn install_status_fd(fd: RawFd) -> io::Result<()> {
    // SAFETY: plain descriptor syscalls on descriptors owned by this process
    unsafe {
        if fd == STATUS_FD {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        } else if libc::dup2(fd, STATUS_FD) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
