//! Exclusive run lock.
//!
//! Every mutating command takes this lock before opening the store: the
//! core's own tables assume a single writer, and two concurrent pipeline
//! runs over the same store would interleave their rebuilds. The lock is
//! a `create_new` file holding the owner's pid, removed on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::warn;

/// Held for the duration of a mutating command.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquires the lock, failing fast when another run holds it.
    ///
    /// # Errors
    /// Returns an error if the lock file already exists or cannot be
    /// created.
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!(
                    "another run holds the lock at {}; remove the file if that run is dead",
                    path.display()
                );
            }
            Err(err) => {
                return Err(err).with_context(|| format!("creating lock file {}", path.display()))
            }
        };
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crowdcast.lock");

        let lock = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(RunLock::acquire(&path).is_err());

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }
}
