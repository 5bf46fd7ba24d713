//! Single-instance enforcement via an exclusive, non-blocking `flock`.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held for the lifetime of the process; the kernel drops the lock when the fd closes.
pub struct SingletonLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl std::fmt::Debug for SingletonLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonLock")
            .field("path", &self.path)
            .finish()
    }
}

impl SingletonLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub enum Singleton {
    Held(SingletonLock),
    /// Another process holds the lock.
    Denied,
}

pub fn acquire_singleton(path: &Path) -> Result<Singleton> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(Singleton::Held(SingletonLock {
            _lock: lock,
            path: path.to_path_buf(),
        })),
        Err((_, Errno::EWOULDBLOCK)) => Ok(Singleton::Denied),
        Err((_, errno)) => {
            Err(anyhow::Error::new(errno)).with_context(|| format!("flock {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_denied_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dashstash.lock");

        let first = acquire_singleton(&path).unwrap();
        assert!(matches!(first, Singleton::Held(_)));
        assert!(matches!(
            acquire_singleton(&path).unwrap(),
            Singleton::Denied
        ));

        drop(first);
        assert!(matches!(
            acquire_singleton(&path).unwrap(),
            Singleton::Held(_)
        ));
    }
}
