//! File-based locking for single-writer safety over an index root.
//!
//! Copied almost verbatim from the teacher's `lock.rs`: the need (only one
//! process may hold a volume open for writing at a time) is identical, so
//! the same `fs2` advisory-lock API and `LOCK` filename convention apply
//! unchanged.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    fn new(file: std::fs::File, path: PathBuf, mode: LockMode) -> Self {
        Self { file, path, mode }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join("LOCK")
}

fn open_lock_file(root: &Path) -> Result<std::fs::File> {
    let path = lock_file_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create index root {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))
}

pub fn acquire_lock(root: &Path, mode: LockMode) -> Result<LockGuard> {
    let file = open_lock_file(root)?;
    match mode {
        LockMode::Shared => file
            .lock_shared()
            .with_context(|| format!("lock_shared {}", lock_file_path(root).display()))?,
        LockMode::Exclusive => file
            .lock_exclusive()
            .with_context(|| format!("lock_exclusive {}", lock_file_path(root).display()))?,
    }
    Ok(LockGuard::new(file, lock_file_path(root), mode))
}

pub fn try_acquire_lock(root: &Path, mode: LockMode) -> Result<LockGuard> {
    let file = open_lock_file(root)?;
    match mode {
        LockMode::Shared => file.try_lock_shared().with_context(|| {
            format!("try_lock_shared failed: {}", lock_file_path(root).display())
        })?,
        LockMode::Exclusive => file.try_lock_exclusive().with_context(|| {
            format!(
                "try_lock_exclusive failed: {}",
                lock_file_path(root).display()
            )
        })?,
    }
    Ok(LockGuard::new(file, lock_file_path(root), mode))
}

pub fn acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    acquire_lock(root, LockMode::Exclusive)
}

pub fn try_acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    try_acquire_lock(root, LockMode::Exclusive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_blocks_second_exclusive_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let _held = acquire_exclusive_lock(dir.path()).unwrap();
        assert!(try_acquire_exclusive_lock(dir.path()).is_err());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _held = acquire_exclusive_lock(dir.path()).unwrap();
        }
        assert!(try_acquire_exclusive_lock(dir.path()).is_ok());
    }
}
