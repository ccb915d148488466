//! Process-wide model cache.
//!
//! The model is loaded on first use and shared read-only afterwards. Switching
//! to another path replaces the cached model; `invalidate` forces a reload.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

use super::loader::{load_model, LoadedModel};
use super::LoadError;

static GLOBAL_CACHE: OnceLock<ModelCache> = OnceLock::new();

#[derive(Default)]
pub struct ModelCache {
    slot: RwLock<Option<(PathBuf, Arc<LoadedModel>)>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared cache for the whole process
    pub fn global() -> &'static ModelCache {
        GLOBAL_CACHE.get_or_init(ModelCache::new)
    }

    /// Cached model for `path`, loading it if needed
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<LoadedModel>, LoadError> {
        if let Some(model) = self.get(path) {
            return Ok(model);
        }

        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have loaded it while we waited for the lock
        if let Some((cached_path, model)) = slot.as_ref() {
            if cached_path == path {
                return Ok(Arc::clone(model));
            }
        }

        let model = Arc::new(load_model(path)?);
        debug!("Cached model from {:?}", path);
        *slot = Some((path.to_path_buf(), Arc::clone(&model)));
        Ok(model)
    }

    /// Cached model for `path` without loading
    pub fn get(&self, path: &Path) -> Option<Arc<LoadedModel>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(cached_path, _)| cached_path == path)
            .map(|(_, model)| Arc::clone(model))
    }

    /// Drop the cached model; the next request reloads from disk
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            debug!("Model cache invalidated");
        }
    }
}
