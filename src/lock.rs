// src/lock.rs

//! Cross-process install lock
//!
//! Every command that changes installed-package state holds this lock for
//! its whole duration. Acquisition never waits: when another pallet process
//! holds the lock the caller gets `Error::LockBusy` and must abort.
//!
//! The lock is an `flock(LOCK_EX)` on `locks/pallet.lock`, taken through
//! `fs2`. The kernel drops it when the file is closed, so a crashed holder
//! never leaves a stale lock behind. A `.pid` file next to it names the
//! holder for error messages.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Held install lock; released on drop
#[derive(Debug)]
pub struct InstallLock {
    // kept open to hold the lock
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Take the lock or fail immediately with `LockBusy`
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let lock = Self { file, path };
                lock.write_pid()?;
                info!("Acquired install lock at {}", lock.path.display());
                Ok(lock)
            }
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                debug!(
                    "Install lock at {} held by pid {:?}",
                    path.display(),
                    Self::holder_pid(&path)
                );
                Err(Error::LockBusy { path })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Whether some process currently holds the lock at `path`
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded by the current holder, if any
    pub fn holder_pid<P: AsRef<Path>>(lock_path: P) -> Option<u32> {
        fs::read_to_string(lock_path.as_ref().with_extension("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn write_pid(&self) -> Result<()> {
        fs::write(self.path.with_extension("pid"), std::process::id().to_string())?;
        Ok(())
    }

    /// Release explicitly; same as dropping
    pub fn release(self) {}
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path.with_extension("pid"));
        let _ = self.file.unlock();
        info!("Released install lock at {}", self.path.display());
    }
}
