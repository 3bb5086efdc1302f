//! Progress reporting for batch jobs.
//!
//! Long-running jobs (the role rebuild) report through this side channel so
//! that callers can poll state by an opaque id. Reporting is best-effort and
//! jobs are not cancellable through it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Observable state of one tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressState {
    /// The job is underway.
    Running {
        /// Items processed so far.
        current: u64,
        /// Total items expected.
        total: u64,
        /// Label of the item most recently processed.
        label: String,
        /// When this state was last updated.
        updated_at: DateTime<Utc>,
    },
    /// The job finished successfully.
    Done,
    /// The job failed.
    Failed {
        /// Failure description.
        message: String,
    },
}

/// Sink for job progress, keyed by an opaque id chosen by the caller.
#[async_trait::async_trait]
pub trait ProgressReporter: Send + Sync {
    /// A job started; `total` is the expected item count.
    async fn start(&self, id: Uuid, total: u64);

    /// One more item was processed.
    async fn update(&self, id: Uuid, current: u64, total: u64, label: &str);

    /// The job finished successfully.
    async fn done(&self, id: Uuid);

    /// The job failed.
    async fn error(&self, id: Uuid, message: &str);
}

/// In-process reporter whose state can be polled by id.
#[derive(Debug, Default)]
pub struct InMemoryProgressReporter {
    states: Arc<RwLock<HashMap<Uuid, ProgressState>>>,
}

impl InMemoryProgressReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll the state of a tracked job.
    pub async fn get(&self, id: Uuid) -> Option<ProgressState> {
        self.states.read().await.get(&id).cloned()
    }

    /// Drop a finished job's state.
    pub async fn remove(&self, id: Uuid) {
        self.states.write().await.remove(&id);
    }
}

#[async_trait::async_trait]
impl ProgressReporter for InMemoryProgressReporter {
    async fn start(&self, id: Uuid, total: u64) {
        self.states.write().await.insert(
            id,
            ProgressState::Running {
                current: 0,
                total,
                label: String::new(),
                updated_at: Utc::now(),
            },
        );
    }

    async fn update(&self, id: Uuid, current: u64, total: u64, label: &str) {
        self.states.write().await.insert(
            id,
            ProgressState::Running {
                current,
                total,
                label: label.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    async fn done(&self, id: Uuid) {
        self.states.write().await.insert(id, ProgressState::Done);
    }

    async fn error(&self, id: Uuid, message: &str) {
        self.states.write().await.insert(
            id,
            ProgressState::Failed {
                message: message.to_string(),
            },
        );
    }
}
