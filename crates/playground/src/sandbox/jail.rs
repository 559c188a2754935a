//! Private filesystem view for workers
//!
//! A worker with a [`Jail`] enters fresh user, mount and PID namespaces (and
//! a network namespace unless disabled) between fork and exec. Its root is a
//! skeleton directory inside the workspace that holds read-only binds of the
//! configured host paths, the artifact directory and the writable run
//! directory. The rest of the host, other workspaces included, is out of
//! reach.
//!
//! The worker is PID 1 of its PID namespace: when it dies the kernel kills
//! every process it left behind, even ones that moved to another session.

use std::ffi::{CStr, CString};
use std::fs::OpenOptions;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

use tracing::debug;

use crate::config::SecurityConfig;
use crate::sandbox::SandboxError;

/// User and group id of the worker inside its user namespace
pub const SANDBOX_ID: u32 = 1000;

/// Mount flags the kernel refuses to clear on a bind remount inside a user
/// namespace, as reported by statvfs and as passed to mount
const LOCKED_FLAGS: [(libc::c_ulong, libc::c_ulong); 7] = [
    (libc::ST_RDONLY, libc::MS_RDONLY),
    (libc::ST_NOSUID, libc::MS_NOSUID),
    (libc::ST_NODEV, libc::MS_NODEV),
    (libc::ST_NOEXEC, libc::MS_NOEXEC),
    (libc::ST_NOATIME, libc::MS_NOATIME),
    (libc::ST_NODIRATIME, libc::MS_NODIRATIME),
    (libc::ST_RELATIME, libc::MS_RELATIME),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    Writable,
    Device,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bind {
    source: PathBuf,
    access: Access,
}

/// Filesystem and namespace policy of one worker
#[derive(Debug, Clone)]
pub struct Jail {
    root: PathBuf,
    binds: Vec<Bind>,
    network: bool,
}

impl Jail {
    /// Create a jail whose skeleton root lives at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            binds: Vec::new(),
            network: true,
        }
    }

    /// Create a jail with the host paths and devices of a security policy
    pub fn from_security(root: impl Into<PathBuf>, security: &SecurityConfig) -> Self {
        let jail = Self::new(root).network(security.network_namespace);
        let jail = security
            .read_only_paths
            .iter()
            .fold(jail, |jail, path| jail.read_only(path));
        security
            .devices
            .iter()
            .fold(jail, |jail, path| jail.device(path))
    }

    /// Expose a host path read-only at the same location
    pub fn read_only(self, path: impl Into<PathBuf>) -> Self {
        self.bind(path.into(), Access::ReadOnly)
    }

    /// Expose a host directory read-write at the same location
    pub fn writable(self, path: impl Into<PathBuf>) -> Self {
        self.bind(path.into(), Access::Writable)
    }

    /// Expose a device node such as `/dev/null`
    pub fn device(self, path: impl Into<PathBuf>) -> Self {
        self.bind(path.into(), Access::Device)
    }

    /// Put the worker in a fresh network namespace (loopback only)
    pub fn network(mut self, isolate: bool) -> Self {
        self.network = isolate;
        self
    }

    fn bind(mut self, source: PathBuf, access: Access) -> Self {
        self.binds.push(Bind { source, access });
        self
    }

    /// Build the skeleton root and resolve everything [`PreparedJail::enter`]
    /// needs, so nothing is allocated after fork
    ///
    /// Missing host paths are skipped. Top-level symlinks such as
    /// `/bin -> usr/bin` are recreated in the skeleton instead of bound.
    pub(crate) fn prepare(&self, working_dir: Option<&Path>) -> Result<PreparedJail, SandboxError> {
        std::fs::create_dir_all(&self.root)?;
        let root = std::fs::canonicalize(&self.root)?;

        let mut mounts = Vec::with_capacity(self.binds.len());
        for bind in &self.binds {
            if !bind.source.is_absolute() {
                return Err(SandboxError::InvalidPath(format!(
                    "jail path must be absolute: {}",
                    bind.source.display()
                )));
            }
            let target = root.join(bind.source.strip_prefix("/").unwrap_or(&bind.source));

            let metadata = match std::fs::symlink_metadata(&bind.source) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %bind.source.display(), "skipping missing jail path");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            if metadata.file_type().is_symlink() && bind.access == Access::ReadOnly {
                if std::fs::symlink_metadata(&target).is_err() {
                    std::os::unix::fs::symlink(std::fs::read_link(&bind.source)?, &target)?;
                }
                continue;
            }

            if std::fs::metadata(&bind.source)?.is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                OpenOptions::new().create(true).append(true).open(&target)?;
            }
            mounts.push(PreparedMount {
                source: c_path(&bind.source)?,
                target: c_path(&target)?,
                access: bind.access,
            });
        }

        let proc_dir = root.join("proc");
        std::fs::create_dir_all(&proc_dir)?;

        // SAFETY: geteuid and getegid cannot fail
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };

        Ok(PreparedJail {
            root: c_path(&root)?,
            mounts,
            proc_dir: c_path(&proc_dir)?,
            working_dir: c_path(working_dir.unwrap_or(Path::new("/")))?,
            uid_map: format!("{SANDBOX_ID} {uid} 1\n").into_bytes(),
            gid_map: format!("{SANDBOX_ID} {gid} 1\n").into_bytes(),
            network: self.network,
        })
    }
}

#[derive(Debug)]
struct PreparedMount {
    source: CString,
    target: CString,
    access: Access,
}

/// A jail resolved to C strings, ready to enter in a forked child
#[derive(Debug)]
pub(crate) struct PreparedJail {
    root: CString,
    mounts: Vec<PreparedMount>,
    proc_dir: CString,
    working_dir: CString,
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
    network: bool,
}

impl PreparedJail {
    /// Enter the namespaces and pivot into the jail
    ///
    /// Must only be called between fork and exec. A PID namespace only
    /// applies to children, so this forks once more: the calling process
    /// stays behind, relays the exit status of the worker and never returns.
    pub(crate) fn enter(&self) -> io::Result<()> {
        let mut flags = libc::CLONE_NEWUSER | libc::CLONE_NEWNS | libc::CLONE_NEWPID;
        if self.network {
            flags |= libc::CLONE_NEWNET;
        }
        // SAFETY: unshare only affects the calling process
        check(unsafe { libc::unshare(flags) })?;
        self.map_ids()?;

        mount(None, c"/", None, libc::MS_REC | libc::MS_PRIVATE)?;
        mount(Some(&self.root), &self.root, None, libc::MS_BIND)?;
        for entry in &self.mounts {
            mount(
                Some(&entry.source),
                &entry.target,
                None,
                libc::MS_BIND | libc::MS_REC,
            )?;
            match entry.access {
                Access::ReadOnly => {
                    remount(&entry.target, libc::MS_RDONLY | libc::MS_NOSUID | libc::MS_NODEV)?
                }
                Access::Writable => remount(&entry.target, libc::MS_NOSUID | libc::MS_NODEV)?,
                Access::Device => {}
            }
        }
        remount(&self.root, libc::MS_RDONLY | libc::MS_NOSUID | libc::MS_NODEV)?;

        // SAFETY: the process is single-threaded after the first fork
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(io::Error::last_os_error());
        }
        if pid > 0 {
            relay_exit(pid);
        }

        // SAFETY: prctl with integer arguments only
        check(unsafe {
            libc::prctl(
                libc::PR_SET_PDEATHSIG,
                libc::SIGKILL as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            )
        })?;

        // Hosts that hide parts of their own /proc refuse a fresh one; the
        // worker then runs without it
        let _ = mount(
            Some(c"proc"),
            &self.proc_dir,
            Some(c"proc"),
            libc::MS_NOSUID | libc::MS_NODEV | libc::MS_NOEXEC,
        );

        // SAFETY: plain path syscalls with NUL-terminated strings
        unsafe {
            check(libc::chdir(self.root.as_ptr()))?;
            if libc::syscall(libc::SYS_pivot_root, c".".as_ptr(), c".".as_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            check(libc::umount2(c".".as_ptr(), libc::MNT_DETACH))?;
            check(libc::chdir(self.working_dir.as_ptr()))?;
            check(libc::prctl(
                libc::PR_SET_NO_NEW_PRIVS,
                1 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            ))?;
        }
        Ok(())
    }

    fn map_ids(&self) -> io::Result<()> {
        match write_proc_file(c"/proc/self/setgroups", b"deny") {
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {}
            other => other?,
        }
        write_proc_file(c"/proc/self/uid_map", &self.uid_map)?;
        write_proc_file(c"/proc/self/gid_map", &self.gid_map)
    }
}

/// Wait for the worker and exit the same way it did
fn relay_exit(child: libc::pid_t) -> ! {
    close_all_fds();
    let mut status = 0;
    // SAFETY: waitpid, signal, kill and _exit are async-signal-safe
    unsafe {
        loop {
            if libc::waitpid(child, &mut status, 0) == child {
                break;
            }
            if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
                libc::_exit(127);
            }
        }
        if libc::WIFSIGNALED(status) {
            let signal = libc::WTERMSIG(status);
            libc::signal(signal, libc::SIG_DFL);
            libc::kill(libc::getpid(), signal);
            libc::_exit(128 + signal);
        }
        libc::_exit(libc::WEXITSTATUS(status))
    }
}

/// Close every descriptor, including the pipe the spawning process watches
/// for exec, so only the worker keeps the child's pipes open
fn close_all_fds() {
    // SAFETY: closing descriptors has no memory-safety requirements
    unsafe {
        if libc::syscall(
            libc::SYS_close_range,
            0 as libc::c_uint,
            libc::c_uint::MAX,
            0 as libc::c_uint,
        ) == 0
        {
            return;
        }
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let max = if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) == 0 {
            limit.rlim_cur.min(65_536) as libc::c_int
        } else {
            1024
        };
        for fd in 0..max {
            libc::close(fd);
        }
    }
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn mount(
    source: Option<&CStr>,
    target: &CStr,
    fstype: Option<&CStr>,
    flags: libc::c_ulong,
) -> io::Result<()> {
    // SAFETY: every pointer is a NUL-terminated string or null
    check(unsafe {
        libc::mount(
            source.map_or(ptr::null(), CStr::as_ptr),
            target.as_ptr(),
            fstype.map_or(ptr::null(), CStr::as_ptr),
            flags,
            ptr::null(),
        )
    })
}

/// Remount a bind mount with extra flags, keeping the locked ones
fn remount(target: &CStr, flags: libc::c_ulong) -> io::Result<()> {
    // SAFETY: statvfs writes into a zeroed struct of the right type
    let current: libc::c_ulong = unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        check(libc::statvfs(target.as_ptr(), &mut stat))?;
        stat.f_flag
    };
    let locked = LOCKED_FLAGS
        .iter()
        .filter(|&&(st, _)| current & st != 0)
        .fold(0, |acc: libc::c_ulong, &(_, ms)| acc | ms);
    mount(
        None,
        target,
        None,
        libc::MS_BIND | libc::MS_REMOUNT | flags | locked,
    )
}

fn write_proc_file(path: &CStr, content: &[u8]) -> io::Result<()> {
    // SAFETY: plain descriptor syscalls on a descriptor opened here
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let written = libc::write(fd, content.as_ptr().cast(), content.len());
        let err = io::Error::last_os_error();
        libc::close(fd);
        if written < 0 || written as usize != content.len() {
            return Err(err);
        }
    }
    Ok(())
}

fn c_path(path: &Path) -> Result<CString, SandboxError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| SandboxError::InvalidPath(format!("path contains NUL: {}", path.display())))
}
