//! RAII guards that remove capture files on every exit path.

use std::path::{Path, PathBuf};

/// Removes every file in `dir` whose name starts with `prefix` when dropped.
pub struct TempFiles {
    dir: PathBuf,
    prefix: String,
}

impl TempFiles {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Files currently matching the prefix.
    pub fn matching(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(&self.prefix))
            .map(|e| e.path())
            .collect()
    }

    /// Removes matching files; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        for path in self.matching() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "temp file cleanup failed: {}", e),
            }
        }
        if removed > 0 {
            tracing::debug!(prefix = %self.prefix, removed, "temp files removed");
        }
        removed
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        self.sweep();
    }
}

/// Removes a set of files when dropped unless disarmed.
#[derive(Default)]
pub struct RemoveOnDrop {
    paths: Vec<PathBuf>,
}

impl RemoveOnDrop {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Keeps the files and hands their paths back.
    pub fn disarm(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "cleanup failed: {}", e),
            }
        }
    }
}
