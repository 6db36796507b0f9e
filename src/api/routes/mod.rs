//! Route handlers for the control plane
//!
//! Handlers are organized by domain:
//! - [`catalog`] - search and manga page
//! - [`tasks`] - archive submission and status polling
//! - [`download`] - finished archive streaming
//! - [`system`] - health and OpenAPI

use crate::error::{Error, Result};
use crate::jobs::CbzRequest;
use serde::{Deserialize, Serialize};

mod catalog;
mod download;
mod system;
mod tasks;

pub use catalog::*;
pub use download::*;
pub use system::*;
pub use tasks::*;

// ============================================================================
// Query Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /search
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Free-text title query
    pub q: String,
    /// Maximum number of results
    pub max_results: usize,
}

/// Query parameters for GET /to_cbz
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ToCbzQuery {
    /// MangaDex manga id
    pub manga_id: String,
    /// Translation language code
    pub language: String,
    /// Volume name
    pub volume_name: String,
    /// JSON array of chapter names, e.g. `["1","2"]`
    pub chapter_names: String,
    /// Naming prefix
    pub prefix: String,
    /// Sequence part (default 0; unparsable values count as 0)
    pub part: Option<String>,
}

impl ToCbzQuery {
    /// Validate the parameters into an archive request
    ///
    /// # Errors
    /// [`Error::InvalidRequest`] when `chapter_names` is not a JSON array of strings
    pub fn into_request(self) -> Result<CbzRequest> {
        let chapter_names: Vec<String> =
            serde_json::from_str(&self.chapter_names).map_err(|e| {
                Error::InvalidRequest(format!("chapter_names is not a JSON string array: {}", e))
            })?;
        let part = self
            .part
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0);

        Ok(CbzRequest {
            manga_id: self.manga_id,
            language: self.language,
            volume_name: self.volume_name,
            chapter_names,
            prefix: self.prefix,
            part,
        })
    }
}
