use super::SourceModel;
use crate::AnalysisError;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Source models keyed by the worker that built them and the source directory they index.
///
/// Building a model parses a whole source tree, so each worker keeps its models until it is done
/// with a project and then calls [`SourceModelCache::release`].
#[derive(Debug, Default)]
pub struct SourceModelCache {
    models: DashMap<(usize, PathBuf), Arc<SourceModel>>,
}

impl SourceModelCache {
    pub fn new() -> SourceModelCache {
        SourceModelCache::default()
    }

    pub fn get_or_build(&self, worker: usize, dir: &Path) -> Result<Arc<SourceModel>, AnalysisError> {
        let key = (worker, dir.to_path_buf());
        if let Some(model) = self.models.get(&key) {
            return Ok(Arc::clone(&model));
        }
        let model = Arc::new(SourceModel::build(dir)?);
        self.models.insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// Drops every model built by `worker`.
    pub fn release(&self, worker: usize) {
        let before = self.models.len();
        self.models.retain(|(owner, _), _| *owner != worker);
        debug!("worker {worker} released {} source models", before - self.models.len());
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_are_per_worker_and_released() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.java"), "class A { int x; }").unwrap();
        let cache = SourceModelCache::new();

        let first = cache.get_or_build(0, dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &cache.get_or_build(0, dir.path()).unwrap()));
        let other = cache.get_or_build(1, dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);

        cache.release(0);
        assert_eq!(cache.len(), 1);
        assert_eq!(other.field_type("A", "x").as_deref(), Some("int"));
    }
}
