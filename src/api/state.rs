//! Application state for the control plane

use crate::engine::CbzEngine;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Shared state handed to every route handler
///
/// Cloned per request (one Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The archive job engine
    pub engine: Arc<CbzEngine>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<CbzEngine>) -> Self {
        Self { engine }
    }

    /// Run a blocking engine call on the blocking thread pool
    ///
    /// Engine calls that wait on the bridge park only the thread running
    /// them, never an async worker.
    pub async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&CbzEngine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || call(&engine))
            .await
            .map_err(|e| Error::TaskPanicked(e.to_string()))?
    }
}
