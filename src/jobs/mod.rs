//! Job orchestration
//!
//! The orchestrator owns the `JobKey → JobState` map and turns archive
//! requests into idempotent, pollable background jobs:
//! - [`key`] - request parameters and the deterministic job key
//! - [`state`] - forward-only job state machine and poll snapshots
//! - [`registry`] - the shared state map
//!
//! Submission only touches the registry and enqueues a task on the
//! [`AsyncBridge`]; polling only reads the registry. Neither waits on job
//! execution.

pub mod key;
pub mod registry;
pub mod state;

pub use key::{CbzRequest, JobKey};
pub use registry::{JobRegistry, JobStats};
pub use state::{JobSnapshot, JobState, Progress};

use crate::bridge::AsyncBridge;
use crate::error::{Error, JobFailure, Result};
use crate::pipeline::{ArchivePipeline, ProgressSink};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Schedules archive jobs on the bridge and tracks their state
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    bridge: Arc<AsyncBridge>,
    pipeline: Arc<ArchivePipeline>,
    /// Bounds archive builds running at once, across all jobs
    job_permits: Arc<Semaphore>,
}

impl JobOrchestrator {
    /// Create an orchestrator running at most `max_concurrent_jobs` builds at once
    pub fn new(
        bridge: Arc<AsyncBridge>,
        pipeline: Arc<ArchivePipeline>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            bridge,
            pipeline,
            job_permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// The shared state map
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Submit a request and return its current snapshot
    ///
    /// A scheduled or running job for the same key is left alone, as is a
    /// completed one whose archive is still on disk. Otherwise (no job yet,
    /// a failed job, or a completed job whose archive was evicted) a new
    /// attempt is scheduled.
    pub fn submit(&self, request: CbzRequest) -> JobSnapshot {
        let key = request.job_key();

        // The artifact lookup hits the filesystem, so it runs before the
        // write lock is taken and is tied to the attempt it inspected
        let evicted_attempt = match self.registry.entry(&key) {
            Some((JobState::Completed(record), attempt)) if !record.is_present() => Some(attempt),
            _ => None,
        };
        let attempt = self.registry.begin_attempt(&key, |existing| match existing {
            None | Some((JobState::Failed(_), _)) => true,
            Some((JobState::Scheduled | JobState::Running { .. }, _)) => false,
            Some((JobState::Completed(_), attempt)) => evicted_attempt == Some(attempt),
        });

        if let Some(attempt) = attempt {
            self.schedule(key.clone(), attempt, request);
        }
        self.poll(&key)
    }

    /// Latest known state of `key`, or `unknown task`
    pub fn poll(&self, key: &JobKey) -> JobSnapshot {
        JobSnapshot::new(key, self.registry.state(key).as_ref())
    }

    /// Counts per state
    pub fn stats(&self) -> JobStats {
        self.registry.stats()
    }

    fn schedule(&self, key: JobKey, attempt: u64, request: CbzRequest) {
        info!(task_id = %key, attempt, manga_id = %request.manga_id, "job scheduled");
        let run = JobRun {
            key: key.clone(),
            attempt,
            request,
            registry: self.registry.clone(),
            pipeline: self.pipeline.clone(),
            job_permits: self.job_permits.clone(),
        };

        // Outcomes are recorded in the registry; the handle is only checked
        // for an immediate rejection by a stopped bridge
        let handle = self.bridge.schedule(run.execute());
        if let Some(Err(Error::BridgeStopped)) = handle.try_result() {
            warn!(task_id = %key, "bridge stopped, job not scheduled");
            self.registry.advance(
                &key,
                attempt,
                JobState::Failed(JobFailure::from(&Error::BridgeStopped)),
            );
        }
    }
}

/// One attempt of one job, executed on the bridge worker
struct JobRun {
    key: JobKey,
    attempt: u64,
    request: CbzRequest,
    registry: Arc<JobRegistry>,
    pipeline: Arc<ArchivePipeline>,
    job_permits: Arc<Semaphore>,
}

impl JobRun {
    /// Run the attempt; a failed job comes back as [`Error::Job`]
    async fn execute(self) -> Result<()> {
        let _permit = match self.job_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return self.finish(JobState::Failed(JobFailure::new("job pool closed")));
            }
        };

        self.registry
            .advance(&self.key, self.attempt, JobState::Running { progress: None });
        info!(task_id = %self.key, "job running");

        if let Err(e) = self.pipeline.store().evict_expired().await {
            warn!(task_id = %self.key, error = %e, "retention sweep failed");
        }

        // A separate task turns a panic anywhere in the pipeline into a
        // JoinError instead of unwinding through the bridge
        let pipeline = self.pipeline.clone();
        let key = self.key.clone();
        let request = self.request.clone();
        let progress = RegistryProgress {
            registry: self.registry.clone(),
            key: self.key.clone(),
            attempt: self.attempt,
        };
        let outcome = tokio::spawn(async move {
            pipeline.assemble(&key, &request, &progress).await
        })
        .await;

        let next = match outcome {
            Ok(Ok(record)) => {
                info!(
                    task_id = %self.key,
                    file = %record.display_name,
                    size_bytes = record.size_bytes,
                    "job completed"
                );
                JobState::Completed(record)
            }
            Ok(Err(e)) => {
                error!(task_id = %self.key, error = %e, "job failed");
                JobState::Failed(JobFailure::from(&e))
            }
            Err(join_error) => {
                error!(task_id = %self.key, error = %join_error, "job task aborted");
                JobState::Failed(JobFailure::new(format!("job aborted: {}", join_error)))
            }
        };
        self.finish(next)
    }

    fn finish(&self, state: JobState) -> Result<()> {
        let outcome = match &state {
            JobState::Failed(failure) => Err(Error::Job(failure.clone())),
            _ => Ok(()),
        };
        self.registry.advance(&self.key, self.attempt, state);
        outcome
    }
}

/// Writes pipeline progress into the registry entry of one attempt
struct RegistryProgress {
    registry: Arc<JobRegistry>,
    key: JobKey,
    attempt: u64,
}

impl ProgressSink for RegistryProgress {
    fn report(&self, completed: usize, total: usize) {
        self.registry.advance(
            &self.key,
            self.attempt,
            JobState::Running {
                progress: Some(Progress { completed, total }),
            },
        );
    }
}
