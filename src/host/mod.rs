// Host boundary: callbacks into the native media layer that embeds the bridge.

pub mod channel;
pub mod frame;

use std::path::Path;

use anyhow::Result;

use crate::assets::container::AssetHandle;
use crate::engine::task::InstanceId;

/// Receives the terminal notification of every cancellable download.
pub trait DownloadListener: Send + Sync {
    /// `local_path` is `None` for failed and cancelled downloads.
    fn on_download_complete(&self, local_path: Option<&Path>, instance: InstanceId) -> Result<()>;
}

/// Receives tail-metadata blocks together with the asset they were read from.
pub trait ExtractorHost: Send + Sync {
    /// Ownership of `asset` moves to the host, which releases it later through
    /// `close_asset_file_descriptor` or by dropping it.
    fn setup_media_extractor(&self, tail: Vec<u8>, asset: AssetHandle, instance: InstanceId)
        -> Result<()>;

    fn close_asset_file_descriptor(&self, asset: AssetHandle) -> Result<()> {
        drop(asset);
        Ok(())
    }
}

/// Opaque identifier of the texture whose frame became available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Native consumer of frame-available signals. Not reentrant.
pub trait FrameSink: Send + Sync {
    fn on_frame_available(&self, frame: FrameId);
}
