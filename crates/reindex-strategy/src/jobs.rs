//! Job requests, handles and the scheduler seam.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use reindex_types::ChangeRecord;

use crate::error::StrategyError;
use crate::rebuild::RebuildProgress;
use crate::updater::UpdateResult;

/// Work handed to a [`JobScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    /// Apply merged change records, ordered by timestamp
    IncrementalUpdate(Vec<ChangeRecord>),
    /// Rebuild the whole index
    FullRebuild {
        /// Also announce the rebuild to remote index nodes
        broadcast: bool,
    },
}

impl JobRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::IncrementalUpdate(_) => "incremental_update",
            JobRequest::FullRebuild { broadcast: true } => "full_rebuild_broadcast",
            JobRequest::FullRebuild { broadcast: false } => "full_rebuild",
        }
    }
}

/// What a finished job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Updated(UpdateResult),
    Rebuilt(RebuildProgress),
}

pub type JobResult = Result<JobOutcome, StrategyError>;

/// Awaitable completion of a submitted job.
pub struct JobHandle {
    job_id: Uuid,
    kind: &'static str,
    receiver: oneshot::Receiver<JobResult>,
    timeout: Option<Duration>,
}

impl JobHandle {
    /// Create a handle and the sender that completes it.
    pub fn channel(kind: &'static str, timeout: Option<Duration>) -> (Self, oneshot::Sender<JobResult>) {
        let (sender, receiver) = oneshot::channel();
        let handle = Self {
            job_id: Uuid::new_v4(),
            kind,
            receiver,
            timeout,
        };
        (handle, sender)
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Wait for the job to finish.
    ///
    /// Without a timeout this waits indefinitely. A timed-out wait does not
    /// cancel the job.
    pub async fn wait(self) -> JobResult {
        let job = format!("{} {}", self.kind, self.job_id);
        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.receiver)
                .await
                .map_err(|_| StrategyError::Job(format!("{} timed out after {:?}", job, limit)))?,
            None => self.receiver.await,
        };
        received.map_err(|_| StrategyError::Job(format!("{} dropped before completion", job)))?
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs indexing jobs for one index.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, StrategyError>;
}
