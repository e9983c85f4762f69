//! Per-script single-instance markers
//!
//! `<lock_dir>/<script>.lock` exists while an accepted instance of the script
//! is believed to be running. Creating it is the single-instance decision: the
//! file appears with the owner's pid already in it, or not at all. Presence is
//! advisory: a crashed owner leaves a stale lock behind, which is why callers
//! check the recorded pid and probe the script's control channel before
//! trusting it.

use crate::error::{SlotError, SlotResult};
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

/// Whether `name` is usable as a script identity (and therefore a file name).
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name) && name != "." && name != ".."
}

/// Whether a process with `pid` exists on this host.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[derive(Debug, Clone)]
pub struct LockFileManager {
    dir: PathBuf,
}

impl LockFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> SlotResult<PathBuf> {
        if !is_valid_name(name) {
            return Err(SlotError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.lock", name)))
    }

    pub fn exists(&self, name: &str) -> SlotResult<bool> {
        Ok(self.path(name)?.exists())
    }

    /// Create the lock for `name`, holding this process's pid.
    ///
    /// Returns `Ok(false)` if it already exists; the existing file is left
    /// untouched. The pid is written to a scratch file that is then hard
    /// linked into place, so readers never see an empty lock.
    pub fn create(&self, name: &str) -> SlotResult<bool> {
        let path = self.path(name)?;
        std::fs::create_dir_all(&self.dir)?;
        let scratch = self
            .dir
            .join(format!(".{}.{}.{:x}", name, std::process::id(), fastrand::u64(..)));
        std::fs::write(&scratch, format!("{}\n", std::process::id()))?;

        let linked = std::fs::hard_link(&scratch, &path);
        if let Err(e) = std::fs::remove_file(&scratch) {
            tracing::debug!("lock - Leftover {}: {}", scratch.display(), e);
        }
        match linked {
            Ok(()) => {
                tracing::debug!("lock - Created {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Pid recorded in the lock of `name`. `None` when there is no lock or it
    /// holds no readable pid.
    pub fn holder_pid(&self, name: &str) -> SlotResult<Option<u32>> {
        match std::fs::read_to_string(self.path(name)?) {
            Ok(raw) => Ok(raw.trim().parse().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a stale lock with one held by this process.
    ///
    /// Only succeeds if the lock still records `stale_pid` (or is gone), so of
    /// several processes reclaiming the same stale lock one at a time only
    /// the first wins. Callers serialize the calls.
    pub fn reclaim(&self, name: &str, stale_pid: Option<u32>) -> SlotResult<bool> {
        if self.exists(name)? {
            if self.holder_pid(name)? != stale_pid {
                return Ok(false);
            }
            self.remove(name)?;
        }
        self.create(name)
    }

    /// Remove the lock for `name`. Returns whether a file was removed.
    pub fn remove(&self, name: &str) -> SlotResult<bool> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("lock - Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
