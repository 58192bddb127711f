// Tail-metadata reader: hands an asset's trailing block and open handle to the media extractor.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::container::{AssetContainer, AssetHandle};
use crate::config::TAIL_METADATA_BYTES;
use crate::engine::task::InstanceId;
use crate::error::BridgeResult;
use crate::host::ExtractorHost;

pub struct TailReader {
    packaged: Option<Arc<dyn AssetContainer>>,
    fallback: Arc<dyn AssetContainer>,
    host: Arc<dyn ExtractorHost>,
}

impl TailReader {
    /// Assets are opened from `packaged` when present, otherwise from `fallback`.
    pub fn new(
        packaged: Option<Arc<dyn AssetContainer>>,
        fallback: Arc<dyn AssetContainer>,
        host: Arc<dyn ExtractorHost>,
    ) -> Self {
        Self {
            packaged,
            fallback,
            host,
        }
    }

    /// Read the trailing metadata block of `asset_path` and pass it, with the
    /// open asset, to the extractor host.
    ///
    /// Failures are logged only; the host is not told about them.
    pub fn read_tail(&self, asset_path: &str, instance: InstanceId) {
        let (tail, asset) = match self.load(asset_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                info!(
                    "tail metadata read failed for {} instance={}: {}",
                    asset_path, instance, e
                );
                return;
            }
        };

        debug!(
            "tail metadata for {} instance={} len={} offset={}",
            asset_path,
            instance,
            asset.len(),
            asset.offset()
        );
        if let Err(e) = self.host.setup_media_extractor(tail, asset, instance) {
            warn!(
                "extractor host rejected {} instance={}: {}",
                asset_path, instance, e
            );
        }
    }

    /// Release a handle previously passed to the host.
    pub fn close_asset(&self, asset: AssetHandle) {
        let name = asset.name().to_string();
        if let Err(e) = self.host.close_asset_file_descriptor(asset) {
            info!("closing asset {} failed: {}", name, e);
        }
    }

    fn load(&self, asset_path: &str) -> BridgeResult<(Vec<u8>, AssetHandle)> {
        let container = self.packaged.as_ref().unwrap_or(&self.fallback);
        let mut asset = container.open(asset_path)?;
        let tail = asset.read_tail(TAIL_METADATA_BYTES)?;
        Ok((tail, asset))
    }
}
