//! Model registry
//!
//! An explicit registry owned by the caller - typically one per request or
//! unit of work - instead of a process-wide singleton. It owns the shared
//! connection; models hold a weak back-reference, so dropping the registry
//! releases the whole model graph.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;

pub struct ModelRegistry {
    connection: Arc<Connection>,
    models: DashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new(connection: Arc<Connection>) -> Arc<Self> {
        Arc::new(ModelRegistry {
            connection,
            models: DashMap::new(),
        })
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub(crate) fn insert(&self, model: Arc<Model>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Resolve a registered model. Missing models are a programming error
    /// and surface eagerly.
    pub fn get(&self, name: &str) -> OrmResult<Arc<Model>> {
        self.models
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrmError::MissingModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop every registered model. Fresh registrations can then rebuild
    /// state without leaking configuration across units of work.
    pub fn clear(&self) {
        self.models.clear();
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}
