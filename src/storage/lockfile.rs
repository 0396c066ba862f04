//! Process Lock File Module
//!
//! Guards the index directory so only one process owns (builds, persists,
//! discards) the knowledge base stored there.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "another process (PID {pid}) owns the knowledge base; \
         stop it, or remove the stale lock file: rm {}",
        path.display()
    )]
    Held { pid: u32, path: PathBuf },

    #[error("lock file I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// PID lock file held for the lifetime of the value
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    pub const LOCK_FILE_NAME: &'static str = ".repo_qa.lock";

    /// Acquire the lock for `dir`, creating the directory if needed.
    ///
    /// A lock file whose PID is no longer running is removed and taken over.
    pub fn acquire<P: AsRef<Path>>(dir: P) -> Result<Self, LockError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let lock_path = dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) if is_process_running(pid) => {
                    return Err(LockError::Held {
                        pid,
                        path: lock_path,
                    });
                }
                Some(pid) => {
                    tracing::info!(pid, "Removing stale lock file from previous instance");
                    let _ = fs::remove_file(&lock_path);
                }
                None => {
                    tracing::warn!(path = %lock_path.display(), "Unreadable lock file, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let io_err = |source| LockError::Io {
            path: lock_path.clone(),
            source,
        };
        let mut file = File::create(&lock_path).map_err(io_err)?;
        writeln!(file, "{pid}").map_err(io_err)?;

        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    fn holder(lock_path: &Path) -> Option<u32> {
        fs::read_to_string(lock_path).ok()?.trim().parse().ok()
    }

    /// Release the lock (called automatically on drop)
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            } else {
                tracing::debug!(path = %self.lock_path.display(), "Released process lock");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}
