//! Archive assembly pipeline
//!
//! One pipeline run turns a [`CbzRequest`] into a finished archive:
//! - [`VolumeSource`] resolves the ordered manifest and the metadata records
//! - the metadata records are written before any page, so even a partial
//!   archive describes itself
//! - every manifest entry is fetched and transformed concurrently and written
//!   in completion order; entry names carry the reading order
//! - the first failing entry fails the whole run and the partial file is
//!   removed
//!
//! Archives are written to `<final>.part` and renamed once complete, so a
//! finished path never holds a half-written file.

pub mod archive;
pub mod transform;

pub use archive::ArchiveWriter;
pub use transform::{AssetTransform, Passthrough, PortraitOrientation};

use crate::error::Result;
use crate::fetcher::BoundedFetcher;
use crate::jobs::{CbzRequest, JobKey};
use crate::store::{ArtifactRecord, ArtifactStore};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the structured descriptor record inside every archive
pub const DESCRIPTOR_ENTRY: &str = "ComicInfo.xml";

/// One fetchable page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetManifestEntry {
    /// URL the asset is fetched from
    pub source_locator: String,
    /// Entry name inside the archive
    pub output_name: String,
    /// Reading-order position (0-based)
    pub ordering_key: usize,
}

/// The two metadata records written at the start of an archive
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComicMetadata {
    /// `ComicInfo.xml` document
    pub descriptor: String,
    /// ComicBookInfo JSON, stored as the archive comment
    pub comment: String,
}

/// A fully resolved volume: metadata plus the ordered page manifest
#[derive(Clone, Debug, Default)]
pub struct ResolvedVolume {
    /// Archive metadata records
    pub metadata: ComicMetadata,
    /// Pages in reading order
    pub entries: Vec<AssetManifestEntry>,
}

/// Resolves a request into its metadata and manifest
#[async_trait]
pub trait VolumeSource: Send + Sync {
    /// Look up everything needed to build the archive for `request`
    async fn resolve(&self, request: &CbzRequest) -> Result<ResolvedVolume>;
}

/// Receives progress after every finished entry
pub trait ProgressSink: Send + Sync {
    /// `completed` of `total` entries are done
    fn report(&self, completed: usize, total: usize);
}

/// Fetch, transform and archive the pages of one request
pub struct ArchivePipeline {
    fetcher: BoundedFetcher,
    source: Arc<dyn VolumeSource>,
    transform: Arc<dyn AssetTransform>,
    store: ArtifactStore,
}

impl ArchivePipeline {
    /// Create a pipeline
    pub fn new(
        fetcher: BoundedFetcher,
        source: Arc<dyn VolumeSource>,
        transform: Arc<dyn AssetTransform>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            fetcher,
            source,
            transform,
            store,
        }
    }

    /// Artifact store the pipeline writes into
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Build the archive for `request` under `key`
    ///
    /// # Errors
    /// Fails when resolution fails, when any single page cannot be fetched or
    /// transformed, or when the archive cannot be written. No file is left at
    /// the final path on failure.
    pub async fn assemble(
        &self,
        key: &JobKey,
        request: &CbzRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ArtifactRecord> {
        let resolved = self.source.resolve(request).await?;
        let total = resolved.entries.len();
        debug!(task_id = %key, entries = total, "manifest resolved");

        let final_path = self.store.artifact_path(key, &request.display_name());
        let partial = ArtifactStore::partial_path(&final_path);

        let mut writer = ArchiveWriter::create(&partial).await?;
        match self.write_all(&mut writer, resolved, progress).await {
            Ok(()) => {}
            Err(e) => {
                writer.discard().await;
                return Err(e);
            }
        }

        let partial = writer.finish().await?;
        let record = match self.store.commit(&partial, &final_path).await {
            Ok(record) => record,
            Err(e) => {
                tokio::fs::remove_file(&partial).await.ok();
                return Err(e);
            }
        };

        info!(
            task_id = %key,
            pages = total,
            size_bytes = record.size_bytes,
            "archive assembled"
        );
        Ok(record)
    }

    async fn write_all(
        &self,
        writer: &mut ArchiveWriter,
        resolved: ResolvedVolume,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let ResolvedVolume { metadata, entries } = resolved;
        let total = entries.len();

        writer
            .add_entry(DESCRIPTOR_ENTRY.to_string(), metadata.descriptor.into_bytes())
            .await?;
        writer.set_comment(metadata.comment)?;
        progress.report(0, total);

        let mut pending: FuturesUnordered<_> = entries
            .into_iter()
            .map(|entry| self.fetch_entry(entry))
            .collect();

        // Failed entries count as attempted before the error propagates
        let mut completed = 0;
        while let Some(result) = pending.next().await {
            let written = match result {
                Ok((entry, bytes)) => writer.add_entry(entry.output_name, bytes).await,
                Err(e) => Err(e),
            };
            completed += 1;
            progress.report(completed, total);
            written?;
        }
        Ok(())
    }

    async fn fetch_entry(&self, entry: AssetManifestEntry) -> Result<(AssetManifestEntry, Vec<u8>)> {
        let bytes = self.fetcher.get_bytes(&entry.source_locator).await?;
        let bytes = self.transform.apply(&entry.output_name, bytes).await?;
        Ok((entry, bytes))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
