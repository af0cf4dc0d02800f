//! Lock file management for single-instance enforcement.
//!
//! Two daemons driving the same switch would fight over it, so the daemon
//! holds an exclusive `fs2` lock on `$XDG_RUNTIME_DIR/beaconlight.lock` for
//! its whole lifetime. The file records the owner's PID for error messages.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::constants::LOCK_FILE_NAME;
use crate::common::utils::{is_process_running, private_path};

/// Held lock. Released and removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `$XDG_RUNTIME_DIR/beaconlight.lock`, falling back to `/tmp`.
pub fn default_lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// Acquire an exclusive lock at `lock_path`.
///
/// Fails if another live process holds it.
pub fn acquire_lock(lock_path: &Path) -> Result<InstanceLock> {
    // Open without truncating to preserve the current owner's PID
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", private_path(lock_path)))?;

    if lock_file.try_lock_exclusive().is_err() {
        match read_lock_pid(lock_path) {
            Some(pid) if is_process_running(pid) => {
                anyhow::bail!("beaconlight is already running (PID {pid})")
            }
            Some(pid) => anyhow::bail!(
                "Lock file {} is held but PID {pid} is gone; remove it and try again",
                private_path(lock_path)
            ),
            None => anyhow::bail!("beaconlight is already running"),
        }
    }

    lock_file.set_len(0)?;
    lock_file.seek(SeekFrom::Start(0))?;
    writeln!(&lock_file, "{}", std::process::id())?;
    lock_file.flush()?;

    Ok(InstanceLock {
        file: lock_file,
        path: lock_path.to_path_buf(),
    })
}

/// PID recorded in the lock file, if readable.
pub fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_writes_pid_and_cleans_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let lock = acquire_lock(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_lock_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let _held = acquire_lock(&path).unwrap();
        let err = acquire_lock(&path).unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_read_lock_pid_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.lock");
        std::fs::write(&path, "not a pid\n").unwrap();
        assert_eq!(read_lock_pid(&path), None);
        assert_eq!(read_lock_pid(&dir.path().join("missing.lock")), None);
    }
}
