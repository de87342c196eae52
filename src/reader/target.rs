//! Sticky record-file selection.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Remembers which record file a session uses.
///
/// A preference is only replaced by a strictly newer candidate, or when the
/// preferred file disappears.
#[derive(Debug, Default, Clone)]
pub struct PreferredTarget {
    preferred: Option<PathBuf>,
}

impl PreferredTarget {
    pub fn new(preferred: Option<PathBuf>) -> Self {
        Self { preferred }
    }

    pub fn preferred(&self) -> Option<&Path> {
        self.preferred.as_deref()
    }

    pub fn set(&mut self, path: &Path) {
        self.preferred = Some(path.to_path_buf());
    }

    /// Reconcile the preference with the newest scanned candidate.
    pub fn resolve(&mut self, latest: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(latest) = latest.as_ref() {
            match self.preferred.as_ref() {
                Some(preferred) if preferred.exists() => {
                    if latest != preferred && is_newer(latest, preferred) {
                        self.preferred = Some(latest.clone());
                    }
                }
                _ => self.preferred = Some(latest.clone()),
            }
        }

        match self.preferred.as_ref() {
            Some(preferred) if preferred.exists() => Some(preferred.clone()),
            _ => latest,
        }
    }
}

/// Modification time, if the file can be stat'ed.
pub(crate) fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn is_newer(candidate: &Path, current: &Path) -> bool {
    match (modified(candidate), modified(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        // The current file cannot be stat'ed: take the candidate
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

/// Newest file by modification time; ties go to the later candidate.
pub(crate) fn newest(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for path in candidates {
        let Some(mtime) = modified(&path) else {
            continue;
        };
        if best.as_ref().is_none_or(|(best_mtime, _)| mtime >= *best_mtime) {
            best = Some((mtime, path));
        }
    }
    best.map(|(_, path)| path)
}
