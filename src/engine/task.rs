// Download task value types shared by the registry, workers and callers.

use std::fmt;
use std::path::PathBuf;

use tokio::sync::watch;

use crate::error::BridgeError;

/// Caller-chosen handle scoping one download/streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One segment to fetch. Consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub instance: InstanceId,
    pub url: String,
    pub capture_name: String,
    pub segment_name: String,
}

impl DownloadRequest {
    pub fn new(
        instance: impl Into<InstanceId>,
        url: impl Into<String>,
        capture_name: impl Into<String>,
        segment_name: impl Into<String>,
    ) -> Self {
        Self {
            instance: instance.into(),
            url: url.into(),
            capture_name: capture_name.into(),
            segment_name: segment_name.into(),
        }
    }
}

/// The single, final result of a download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed(PathBuf),
    Failed(BridgeError),
    Cancelled,
}

impl TerminalOutcome {
    pub fn local_path(&self) -> Option<&std::path::Path> {
        match self {
            TerminalOutcome::Completed(path) => Some(path),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerminalOutcome::Completed(_) => "completed",
            TerminalOutcome::Failed(_) => "failed",
            TerminalOutcome::Cancelled => "cancelled",
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAck {
    /// No download was active for the instance.
    NotActive,
    /// The worker has exited; carries the outcome it committed to.
    Settled(TerminalOutcome),
    /// The worker exited without publishing an outcome.
    Aborted,
}

/// Returned by `DownloadRegistry::submit`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    instance: InstanceId,
    done: watch::Receiver<Option<TerminalOutcome>>,
}

impl TaskHandle {
    pub(crate) fn new(
        instance: InstanceId,
        done: watch::Receiver<Option<TerminalOutcome>>,
    ) -> Self {
        Self { instance, done }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Outcome if the worker already finished.
    pub fn try_outcome(&self) -> Option<TerminalOutcome> {
        self.done.borrow().clone()
    }

    /// Wait for the worker to finish. `None` if it exited without an outcome.
    pub async fn outcome(&mut self) -> Option<TerminalOutcome> {
        wait_settled(&mut self.done).await
    }
}

pub(crate) async fn wait_settled(
    done: &mut watch::Receiver<Option<TerminalOutcome>>,
) -> Option<TerminalOutcome> {
    match done.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    }
}
