// One-off fetch: downloads a URL to a fresh scratch file without registry or cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::SegmentStore;
use super::worker::{copy_to_file, CopyEnd};
use crate::error::{BridgeError, BridgeResult};
use crate::source::traits::SegmentSource;

pub struct SegmentFetcher {
    source: Arc<dyn SegmentSource>,
    store: Arc<SegmentStore>,
    chunk_size: usize,
}

impl SegmentFetcher {
    pub fn new(source: Arc<dyn SegmentSource>, store: Arc<SegmentStore>, chunk_size: usize) -> Self {
        Self {
            source,
            store,
            chunk_size,
        }
    }

    /// Download `url` to a new scratch file and return its path.
    pub async fn fetch_once(&self, url: &str) -> BridgeResult<PathBuf> {
        info!("downloadFileFromUrlBlocking: {}", url);

        let dest = self.store.scratch_path()?;
        let result = async {
            let mut stream = self.source.open(url).await?;
            // Never cancelled.
            copy_to_file(stream.as_mut(), &dest, self.chunk_size, &CancellationToken::new()).await
        }
        .await;

        match result {
            Ok(CopyEnd::Exhausted { bytes }) => {
                info!("{} downloaded to {} ({} bytes)", url, dest.display(), bytes);
                Ok(dest)
            }
            Ok(CopyEnd::Cancelled { .. }) => {
                self.store.discard(&dest);
                Err(BridgeError::Io(format!("fetch of {} interrupted", url)))
            }
            Err(e) => {
                warn!("blocking fetch of {} failed: {}", url, e);
                self.store.discard(&dest);
                Err(e)
            }
        }
    }
}
