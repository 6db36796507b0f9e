//! # mangadex-cbz
//!
//! Background job engine that packages MangaDex volumes into CBZ archives,
//! driven through a loopback-only HTTP control plane.
//!
//! ## How it fits together
//!
//! - A single [`BoundedFetcher`] caps outbound requests across every job.
//! - An [`AsyncBridge`] runs all async work on one dedicated worker thread;
//!   synchronous callers schedule futures onto it and wait on a handle.
//! - The [`JobOrchestrator`] turns archive requests into idempotent,
//!   pollable jobs keyed by a digest of their parameters.
//! - The [`ArchivePipeline`] resolves a manifest, fetches every page
//!   concurrently, and writes the archive atomically into the [`ArtifactStore`],
//!   which also evicts archives older than the retention window.
//! - [`CbzEngine`] owns all of the above; [`api`] serves it over HTTP.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mangadex_cbz::{CbzEngine, Config, CbzRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CbzEngine::new(Config::default())?;
//!
//! let snapshot = engine.submit(CbzRequest {
//!     manga_id: "a1c7c817-4e59-43b7-9365-09675a149a6f".into(),
//!     language: "en".into(),
//!     volume_name: "1".into(),
//!     chapter_names: vec!["1".into(), "2".into()],
//!     prefix: "One Piece".into(),
//!     part: 0,
//! });
//! println!("{} is {}", snapshot.task_id, snapshot.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Control-plane HTTP server
pub mod api;
/// Cross-thread async execution bridge
pub mod bridge;
/// MangaDex catalog: manifests, metadata, search and manga pages
pub mod catalog;
/// Configuration types
pub mod config;
/// Top-level engine
pub mod engine;
/// Error types
pub mod error;
/// Bounded HTTP fetcher
pub mod fetcher;
/// Job keys, states and orchestration
pub mod jobs;
/// Archive assembly pipeline
pub mod pipeline;
/// Artifact storage and retention
pub mod store;

// Re-export commonly used types
pub use bridge::{AsyncBridge, TaskHandle};
pub use catalog::{CatalogFrontEnd, MangaDexCatalog, MangaInfo, SearchSummary};
pub use config::{ApiConfig, CatalogConfig, Config, FetchConfig, JobConfig};
pub use engine::CbzEngine;
pub use error::{ApiError, Error, ErrorDetail, JobFailure, Result, ToHttpStatus};
pub use fetcher::{BoundedFetcher, FetchStats};
pub use jobs::{CbzRequest, JobKey, JobOrchestrator, JobSnapshot, JobState, JobStats, Progress};
pub use pipeline::{ArchivePipeline, AssetTransform, ProgressSink, VolumeSource};
pub use store::{ArtifactRecord, ArtifactStore};

use std::sync::Arc;

/// Serve the control plane until a termination signal, then stop the engine.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use mangadex_cbz::{CbzEngine, Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Arc::new(CbzEngine::new(Config::default())?);
///     run_with_shutdown(engine).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: Arc<CbzEngine>) -> Result<()> {
    let served = api::start_api_server(engine.clone(), wait_for_signal()).await;

    // Joining the bridge worker blocks
    let stopping = engine.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .map_err(|e| Error::TaskPanicked(e.to_string()))?;
    served
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
