//! The shared `JobKey → JobState` map

use super::{JobKey, JobState};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;
use utoipa::ToSchema;

/// Number of jobs in each state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobStats {
    /// Waiting for a job permit
    pub scheduled: usize,
    /// Pipeline executing
    pub running: usize,
    /// Archive finished
    pub completed: usize,
    /// Ended with an error
    pub failed: usize,
}

#[derive(Debug)]
struct JobEntry {
    state: JobState,
    attempt: u64,
}

/// Job states keyed by [`JobKey`]
///
/// Writers are the submission path (check-and-insert) and the single pipeline
/// task of the current attempt. Readers take a consistent clone under the
/// read lock and never wait on job execution.
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: RwLock<HashMap<JobKey, JobEntry>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt for `key` if `may_start` allows it
    ///
    /// `may_start` sees the current state and attempt (if any) under the
    /// write lock, so the check and the insert of `Scheduled` are atomic. It
    /// must not block. Returns the new attempt number, or `None` when the
    /// existing job is kept.
    pub fn begin_attempt(
        &self,
        key: &JobKey,
        may_start: impl FnOnce(Option<(&JobState, u64)>) -> bool,
    ) -> Option<u64> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let existing = entries.get(key);
        if !may_start(existing.map(|e| (&e.state, e.attempt))) {
            return None;
        }

        let attempt = existing.map_or(1, |e| e.attempt + 1);
        entries.insert(
            key.clone(),
            JobEntry {
                state: JobState::Scheduled,
                attempt,
            },
        );
        Some(attempt)
    }

    /// Move the job for `key` to `next`
    ///
    /// Rejected (and logged) when the attempt is stale or the transition
    /// would move the state backwards.
    pub fn advance(&self, key: &JobKey, attempt: u64, next: JobState) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(key) else {
            warn!(task_id = %key, "state update for unknown job");
            return false;
        };

        if entry.attempt != attempt {
            warn!(
                task_id = %key,
                attempt,
                current_attempt = entry.attempt,
                "state update from a superseded attempt"
            );
            return false;
        }
        if !entry.state.can_advance_to(&next) {
            warn!(
                task_id = %key,
                from = entry.state.label(),
                to = next.label(),
                "rejected job state regression"
            );
            return false;
        }

        entry.state = next;
        true
    }

    /// Current state of `key`
    pub fn state(&self, key: &JobKey) -> Option<JobState> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.state.clone())
    }

    /// Current state of `key` together with its attempt number
    pub fn entry(&self, key: &JobKey) -> Option<(JobState, u64)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| (e.state.clone(), e.attempt))
    }

    /// Current attempt number of `key`
    pub fn attempt(&self, key: &JobKey) -> Option<u64> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.attempt)
    }

    /// Count jobs per state
    pub fn stats(&self) -> JobStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .fold(JobStats::default(), |mut stats, entry| {
                match entry.state {
                    JobState::Scheduled => stats.scheduled += 1,
                    JobState::Running { .. } => stats.running += 1,
                    JobState::Completed(_) => stats.completed += 1,
                    JobState::Failed(_) => stats.failed += 1,
                }
                stats
            })
    }

    /// Number of known jobs
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no job was ever submitted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
