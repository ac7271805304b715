use crate::{ApiDiff, DiffError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Computed diffs, keyed by (old jar, new jar). A self-diff is keyed by the jar twice.
#[derive(Default)]
pub struct DiffCache {
    diffs: DashMap<(PathBuf, PathBuf), Arc<ApiDiff>>,
}

impl DiffCache {
    pub fn new() -> DiffCache {
        DiffCache::default()
    }

    pub fn get_or_compute(&self, old: &Path, new: &Path) -> Result<Arc<ApiDiff>, DiffError> {
        let key = (old.to_path_buf(), new.to_path_buf());
        if let Some(diff) = self.diffs.get(&key) {
            return Ok(Arc::clone(&diff));
        }
        debug!("computing diff of {} and {}", old.display(), new.display());
        let diff = Arc::new(if old == new {
            ApiDiff::self_diff(old)?
        } else {
            ApiDiff::compute(old, new)?
        });
        self.diffs.insert(key, Arc::clone(&diff));
        Ok(diff)
    }

    pub fn self_diff(&self, jar: &Path) -> Result<Arc<ApiDiff>, DiffError> {
        self.get_or_compute(jar, jar)
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}
