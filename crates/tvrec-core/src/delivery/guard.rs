//! Single-flight set keyed by artifact path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Paths whose delivery is currently in progress.
#[derive(Debug, Default)]
pub struct InFlight {
    paths: Mutex<HashSet<PathBuf>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`; None if a delivery for it is already running.
    pub fn try_acquire(&self, path: &Path) -> Option<InFlightGuard<'_>> {
        let mut paths = self.paths.lock().unwrap();
        if !paths.insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            set: self,
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().unwrap().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the claimed path when dropped.
pub struct InFlightGuard<'a> {
    set: &'a InFlight,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.paths.lock().unwrap().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let set = InFlight::new();
        let p = Path::new("/rec/a.mkv");
        let g = set.try_acquire(p).unwrap();
        assert!(set.try_acquire(p).is_none());
        assert!(set.try_acquire(Path::new("/rec/b.mkv")).is_some());
        assert!(set.contains(p));
        drop(g);
        assert!(!set.contains(p));
        assert!(set.is_empty());
        assert!(set.try_acquire(p).is_some());
    }
}
