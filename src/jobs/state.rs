//! Job state machine and the snapshot returned to pollers

use super::JobKey;
use crate::error::JobFailure;
use crate::store::ArtifactRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Assets written so far out of the manifest total
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Entries finished
    pub completed: usize,
    /// Entries in the manifest
    pub total: usize,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Lifecycle of one job attempt
///
/// States only move forward: `Scheduled → Running* → Completed | Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Accepted, waiting for a job permit
    Scheduled,
    /// Pipeline executing; progress is unknown until the manifest resolves
    Running {
        /// Entries finished out of the total
        progress: Option<Progress>,
    },
    /// Archive finished
    Completed(ArtifactRecord),
    /// Job ended with an error
    Failed(JobFailure),
}

impl JobState {
    fn rank(&self) -> u8 {
        match self {
            JobState::Scheduled => 0,
            JobState::Running { .. } => 1,
            JobState::Completed(_) | JobState::Failed(_) => 2,
        }
    }

    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Scheduled or running
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` keeps the state machine forward-only
    pub fn can_advance_to(&self, next: &JobState) -> bool {
        match (self, next) {
            (JobState::Running { progress: Some(current) }, JobState::Running { progress }) => {
                progress.is_some_and(|p| p.completed >= current.completed)
            }
            (JobState::Running { .. }, JobState::Running { .. }) => true,
            (JobState::Scheduled, JobState::Completed(_)) => false,
            (current, next) => !current.is_terminal() && next.rank() >= current.rank(),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Scheduled => "scheduled",
            JobState::Running { .. } => "running",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
        }
    }
}

/// Status payload returned by `/to_cbz` and `/task/{id}/status`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobSnapshot {
    /// Job key
    pub task_id: String,
    /// `scheduled`, `running`, `completed`, `error: <detail>` or `unknown task`
    pub status: String,
    /// `completed/total` while running (empty before the manifest is known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Download path once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl JobSnapshot {
    /// Render a state (or its absence) for the polling contract
    pub fn new(key: &JobKey, state: Option<&JobState>) -> Self {
        let task_id = key.to_string();
        let (status, progress, url) = match state {
            None => ("unknown task".to_string(), None, None),
            Some(JobState::Scheduled) => ("scheduled".to_string(), None, None),
            Some(JobState::Running { progress }) => (
                "running".to_string(),
                Some(progress.map(|p| p.to_string()).unwrap_or_default()),
                None,
            ),
            Some(JobState::Completed(_)) => (
                "completed".to_string(),
                None,
                Some(format!("/download/{}", key)),
            ),
            Some(JobState::Failed(failure)) => (format!("error: {}", failure.detail), None, None),
        };

        Self {
            task_id,
            status,
            progress,
            url,
        }
    }

    /// Whether the snapshot reports a finished archive
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}
