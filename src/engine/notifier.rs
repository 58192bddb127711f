use std::sync::Arc;

use tracing::{debug, warn};

use super::task::{InstanceId, TerminalOutcome};
use crate::host::DownloadListener;

/// Forwards terminal outcomes to the host. Fire-and-forget: listener errors
/// are logged and swallowed.
pub struct CompletionNotifier {
    listener: Arc<dyn DownloadListener>,
}

impl CompletionNotifier {
    pub fn new(listener: Arc<dyn DownloadListener>) -> Self {
        Self { listener }
    }

    pub fn notify(&self, instance: InstanceId, outcome: &TerminalOutcome) {
        debug!("notify instance={} outcome={}", instance, outcome.label());
        if let Err(e) = self
            .listener
            .on_download_complete(outcome.local_path(), instance)
        {
            warn!(
                "download listener rejected {} notification for instance={}: {}",
                outcome.label(),
                instance,
                e
            );
        }
    }
}
