// Download task registry: at most one active download per instance, with cancel-and-join.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::notifier::CompletionNotifier;
use super::store::SegmentStore;
use super::task::{wait_settled, CancelAck, DownloadRequest, InstanceId, TaskHandle, TerminalOutcome};
use super::worker::DownloadWorker;
use crate::error::{BridgeError, BridgeResult};
use crate::source::traits::SegmentSource;

struct TaskEntry {
    cancel: CancellationToken,
    done: watch::Receiver<Option<TerminalOutcome>>,
}

type TaskMap = Arc<Mutex<HashMap<InstanceId, TaskEntry>>>;

/// Removes the registry entry when the worker's task ends, including by unwinding.
struct EntryGuard {
    tasks: TaskMap,
    instance: InstanceId,
    removed: bool,
}

impl EntryGuard {
    fn remove(&mut self) {
        if !self.removed {
            self.tasks.lock().remove(&self.instance);
            self.removed = true;
        }
    }
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

pub struct DownloadRegistry {
    tasks: TaskMap,
    source: Arc<dyn SegmentSource>,
    store: Arc<SegmentStore>,
    notifier: Arc<CompletionNotifier>,
    runtime: Handle,
    chunk_size: usize,
}

impl DownloadRegistry {
    pub fn new(
        source: Arc<dyn SegmentSource>,
        store: Arc<SegmentStore>,
        notifier: Arc<CompletionNotifier>,
        runtime: Handle,
        chunk_size: usize,
    ) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            source,
            store,
            notifier,
            runtime,
            chunk_size,
        }
    }

    /// Record and start a download. Returns immediately.
    ///
    /// Fails with `BridgeError::Rejected` if `request.instance` already has an
    /// active download; that download is left untouched.
    pub fn submit(&self, request: DownloadRequest) -> BridgeResult<TaskHandle> {
        let instance = request.instance;
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);

        {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(&instance) {
                warn!("download already active for instance={}, rejecting", instance);
                return Err(BridgeError::Rejected(instance));
            }
            tasks.insert(
                instance,
                TaskEntry {
                    cancel: token.clone(),
                    done: done_rx.clone(),
                },
            );
        }

        debug!(
            "download submitted instance={} url={} segment={}",
            instance, request.url, request.segment_name
        );

        let worker = DownloadWorker::new(
            request,
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            token,
            self.chunk_size,
        );
        let notifier = Arc::clone(&self.notifier);
        let mut guard = EntryGuard {
            tasks: Arc::clone(&self.tasks),
            instance,
            removed: false,
        };

        self.runtime.spawn(async move {
            let outcome = worker.run().await;

            // Removal, then notification, then the join signal: a cancel
            // waiting on the signal always finds the instance already gone.
            guard.remove();
            notifier.notify(instance, &outcome);
            done_tx.send_replace(Some(outcome));
        });

        Ok(TaskHandle::new(instance, done_rx))
    }

    /// Request cancellation of `instance` and wait until its worker has exited.
    ///
    /// There is no timeout: a worker stuck inside a read holds this call until
    /// the read returns.
    pub async fn cancel(&self, instance: InstanceId) -> CancelAck {
        let entry = {
            let tasks = self.tasks.lock();
            tasks
                .get(&instance)
                .map(|entry| (entry.cancel.clone(), entry.done.clone()))
        };

        let Some((token, mut done)) = entry else {
            info!("no download found for instance={}", instance);
            return CancelAck::NotActive;
        };

        info!("cancelDownload instance={}", instance);
        token.cancel();

        match wait_settled(&mut done).await {
            Some(outcome) => {
                debug!("cancel instance={} settled as {}", instance, outcome.label());
                CancelAck::Settled(outcome)
            }
            None => {
                warn!("worker for instance={} exited without an outcome", instance);
                CancelAck::Aborted
            }
        }
    }

    pub fn is_active(&self, instance: InstanceId) -> bool {
        self.tasks.lock().contains_key(&instance)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel every active download and wait for all of them.
    pub async fn cancel_all(&self) {
        let instances: Vec<InstanceId> = self.tasks.lock().keys().copied().collect();
        for instance in instances {
            self.cancel(instance).await;
        }
    }
}
