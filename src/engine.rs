//! Top-level engine
//!
//! [`CbzEngine`] is built once at startup and owns every long-lived piece:
//! the bounded fetcher, the async bridge and its worker thread, the catalog,
//! the archive pipeline and the job orchestrator. Its methods are synchronous
//! and meant to be called from request-handling threads; anything async is
//! handed to the bridge and waited on for at most `jobs.wait_timeout`.

use crate::bridge::AsyncBridge;
use crate::catalog::{CatalogFrontEnd, MangaDexCatalog, SearchSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::{BoundedFetcher, FetchStats};
use crate::jobs::{CbzRequest, JobKey, JobOrchestrator, JobSnapshot, JobState, JobStats};
use crate::pipeline::{ArchivePipeline, AssetTransform, PortraitOrientation, VolumeSource};
use crate::store::{ArtifactRecord, ArtifactStore};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

const BRIDGE_THREAD_NAME: &str = "cbz-bridge";

/// The archive job engine
pub struct CbzEngine {
    config: Arc<Config>,
    fetcher: BoundedFetcher,
    bridge: Arc<AsyncBridge>,
    front_end: Arc<dyn CatalogFrontEnd>,
    store: ArtifactStore,
    orchestrator: JobOrchestrator,
}

impl CbzEngine {
    /// Build an engine talking to MangaDex
    ///
    /// # Errors
    /// Fails on an invalid config, when a storage directory cannot be
    /// created, or when the bridge worker cannot start
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = BoundedFetcher::new(&config.fetch)?;
        let catalog = Arc::new(MangaDexCatalog::new(
            fetcher.clone(),
            &config.fetch,
            config.catalog.clone(),
        ));

        Self::with_collaborators(
            config,
            fetcher,
            catalog.clone(),
            catalog,
            Arc::new(PortraitOrientation),
        )
    }

    /// Build an engine around caller-supplied catalog and transform
    ///
    /// # Errors
    /// Same as [`CbzEngine::new`]
    pub fn with_collaborators(
        config: Config,
        fetcher: BoundedFetcher,
        source: Arc<dyn VolumeSource>,
        front_end: Arc<dyn CatalogFrontEnd>,
        transform: Arc<dyn AssetTransform>,
    ) -> Result<Self> {
        config.validate()?;
        for dir in [&config.jobs.artifact_dir, &config.jobs.thumbnail_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::Config {
                message: format!("cannot create directory {}: {}", dir.display(), e),
                key: Some("jobs".into()),
            })?;
        }

        let bridge = Arc::new(AsyncBridge::start(BRIDGE_THREAD_NAME)?);
        let store = ArtifactStore::new(&config.jobs.artifact_dir, config.jobs.retention);
        let pipeline = Arc::new(ArchivePipeline::new(
            fetcher.clone(),
            source,
            transform,
            store.clone(),
        ));
        let orchestrator =
            JobOrchestrator::new(bridge.clone(), pipeline, config.jobs.max_concurrent_jobs);

        info!(
            artifact_dir = %config.jobs.artifact_dir.display(),
            max_concurrent_fetches = fetcher.capacity(),
            max_concurrent_jobs = config.jobs.max_concurrent_jobs,
            retention_secs = config.jobs.retention.as_secs(),
            "engine started"
        );

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            bridge,
            front_end,
            store,
            orchestrator,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Search the catalog, blocking the calling thread
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSummary>> {
        let front_end = self.front_end.clone();
        let query = query.to_string();
        self.run(async move { front_end.search(&query, max_results).await })
    }

    /// Render the manga page, blocking the calling thread
    pub fn manga_page(&self, manga_id: &str) -> Result<String> {
        let front_end = self.front_end.clone();
        let manga_id = manga_id.to_string();
        self.run(async move { front_end.manga_page(&manga_id).await })
    }

    /// Submit an archive request; returns without waiting for the build
    pub fn submit(&self, request: CbzRequest) -> JobSnapshot {
        self.orchestrator.submit(request)
    }

    /// Current snapshot of a job
    pub fn poll(&self, key: &JobKey) -> JobSnapshot {
        self.orchestrator.poll(key)
    }

    /// The finished archive for `key`
    ///
    /// Archives left over from an earlier process are found by scanning the
    /// artifact directory.
    pub fn locate(&self, key: &JobKey) -> Result<ArtifactRecord> {
        if let Some(JobState::Completed(record)) = self.orchestrator.registry().state(key) {
            if record.is_present() {
                return Ok(record);
            }
        }
        let store = self.store.clone();
        let key = key.clone();
        self.run(async move { store.locate(&key).await })
    }

    /// Job counts per state
    pub fn stats(&self) -> JobStats {
        self.orchestrator.stats()
    }

    /// Fetch pool activity
    pub fn fetch_stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    /// Whether the bridge still accepts work
    pub fn is_running(&self) -> bool {
        self.bridge.is_running()
    }

    /// Stop the bridge and join its worker
    ///
    /// Jobs still in progress are abandoned. Blocks the calling thread.
    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.bridge.shutdown();
    }

    fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.bridge
            .schedule(task)
            .await_result(self.config.jobs.wait_timeout)
    }
}
