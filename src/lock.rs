//! Per-spec run lock.
//!
//! Two `parallel-full` runs against the same spec would launch the same
//! containers and race on the manifest, so the second one fails fast. The
//! lock is an advisory `flock` held for the life of the [`RunLock`] value
//! and released by the OS if the process dies.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another parallel-full run holds {}. Wait for it to finish or stop it first.", path.display())]
    Held { path: PathBuf },

    #[error("Failed to lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock on `.ralph/specs/<spec>/.parallel-full.lock`.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_error = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_error)?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LockError::Held {
                    path: path.to_path_buf(),
                });
            }
            return Err(io_error(err));
        }

        // Holder pid, for humans inspecting a stuck lock.
        file.set_len(0).map_err(io_error)?;
        writeln!(file, "{}", std::process::id()).map_err(io_error)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_refused() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("specs/auth/.parallel-full.lock");

        let lock = RunLock::acquire(&path).expect("first lock");
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));

        drop(lock);
        RunLock::acquire(&path).expect("lock after release");
    }

    #[test]
    fn test_lock_records_pid() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join(".parallel-full.lock");

        let lock = RunLock::acquire(&path).expect("lock");
        let contents = fs::read_to_string(lock.path()).expect("read");
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
