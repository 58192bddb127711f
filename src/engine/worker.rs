// Download worker: copies one segment to local storage, observing cancellation between chunks.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::SegmentStore;
use super::task::{DownloadRequest, TerminalOutcome};
use crate::error::{BridgeError, BridgeResult};
use crate::source::traits::{SegmentSource, SegmentStream};

/// How a copy loop ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyEnd {
    Exhausted { bytes: u64 },
    Cancelled { bytes: u64 },
}

/// Copy `stream` into a fresh file at `dest` through a `buffer_size` write buffer.
///
/// The token is checked after each chunk arrives and before it is written.
/// Once the stream is exhausted the token is no longer consulted.
pub(crate) async fn copy_to_file(
    stream: &mut dyn SegmentStream,
    dest: &Path,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> BridgeResult<CopyEnd> {
    let file = File::create(dest)
        .await
        .map_err(|e| BridgeError::Io(format!("create {}: {}", dest.display(), e)))?;
    let mut writer = BufWriter::with_capacity(buffer_size.max(1), file);
    let mut bytes = 0u64;

    let pumped = pump(stream, &mut writer, dest, cancel, &mut bytes).await;
    // The file is closed on every exit, before the caller publishes anything.
    let closed = writer.shutdown().await;

    match pumped? {
        Pumped::Cancelled => Ok(CopyEnd::Cancelled { bytes }),
        Pumped::Exhausted => {
            closed.map_err(|e| BridgeError::Io(format!("flush {}: {}", dest.display(), e)))?;
            Ok(CopyEnd::Exhausted { bytes })
        }
    }
}

enum Pumped {
    Exhausted,
    Cancelled,
}

async fn pump(
    stream: &mut dyn SegmentStream,
    writer: &mut BufWriter<File>,
    dest: &Path,
    cancel: &CancellationToken,
    bytes: &mut u64,
) -> BridgeResult<Pumped> {
    while let Some(chunk) = stream.next_chunk().await? {
        if cancel.is_cancelled() {
            return Ok(Pumped::Cancelled);
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| BridgeError::Io(format!("write {}: {}", dest.display(), e)))?;
        *bytes += chunk.len() as u64;
    }
    Ok(Pumped::Exhausted)
}

pub struct DownloadWorker {
    request: DownloadRequest,
    source: Arc<dyn SegmentSource>,
    store: Arc<SegmentStore>,
    cancel: CancellationToken,
    chunk_size: usize,
}

impl DownloadWorker {
    pub fn new(
        request: DownloadRequest,
        source: Arc<dyn SegmentSource>,
        store: Arc<SegmentStore>,
        cancel: CancellationToken,
        chunk_size: usize,
    ) -> Self {
        Self {
            request,
            source,
            store,
            cancel,
            chunk_size,
        }
    }

    /// Run the download to its terminal outcome. Never returns an error;
    /// every failure becomes `TerminalOutcome::Failed`.
    pub async fn run(self) -> TerminalOutcome {
        let instance = self.request.instance;

        let dest = match self.store.prepare(&self.request) {
            Ok(dest) => dest,
            Err(e) => {
                warn!("download instance={} could not prepare destination: {}", instance, e);
                return TerminalOutcome::Failed(e);
            }
        };

        match self.transfer(&dest).await {
            Ok(CopyEnd::Exhausted { bytes }) => {
                info!(
                    "{} downloaded to {} instance={} bytes={}",
                    self.request.segment_name,
                    dest.display(),
                    instance,
                    bytes
                );
                TerminalOutcome::Completed(dest)
            }
            Ok(CopyEnd::Cancelled { bytes }) => {
                info!(
                    "download cancelled instance={} url={} after {} bytes",
                    instance, self.request.url, bytes
                );
                self.store.discard(&dest);
                TerminalOutcome::Cancelled
            }
            Err(e) => {
                warn!("download failed instance={} url={}: {}", instance, self.request.url, e);
                self.store.discard(&dest);
                TerminalOutcome::Failed(e)
            }
        }
    }

    async fn transfer(&self, dest: &Path) -> BridgeResult<CopyEnd> {
        let mut stream = self.source.open(&self.request.url).await?;
        debug!(
            "download instance={} opened {} -> {}",
            self.request.instance,
            self.request.url,
            dest.display()
        );
        copy_to_file(stream.as_mut(), dest, self.chunk_size, &self.cancel).await
    }
}
