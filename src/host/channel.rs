// Channel-backed host: queues callbacks as events for a host that polls across the FFI boundary.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{DownloadListener, ExtractorHost, FrameId, FrameSink};
use crate::assets::container::AssetHandle;
use crate::engine::task::InstanceId;

/// Callback delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    DownloadComplete {
        local_path: Option<String>,
        instance_id: u64,
    },
    MediaExtractorReady {
        tail: Vec<u8>,
        asset_handle: u64,
        asset_offset: u64,
        asset_length: u64,
        instance_id: u64,
    },
    FrameAvailable {
        frame_id: u64,
    },
}

/// Implements every host trait by pushing `HostEvent`s onto a channel.
/// Asset handles are parked in a table and referenced by id.
pub struct ChannelHost {
    events: mpsc::UnboundedSender<HostEvent>,
    assets: Mutex<HashMap<u64, AssetHandle>>,
    next_asset: AtomicU64,
}

impl ChannelHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Self {
            events: tx,
            assets: Mutex::new(HashMap::new()),
            next_asset: AtomicU64::new(1),
        };
        (host, rx)
    }

    fn push(&self, event: HostEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("host event receiver dropped"))
    }

    /// Take a parked asset back out of the table.
    pub fn take_asset(&self, asset_handle: u64) -> Option<AssetHandle> {
        let asset = self.assets.lock().remove(&asset_handle);
        if let Some(asset) = &asset {
            debug!("released asset handle={} ({})", asset_handle, asset.name());
        }
        asset
    }

    /// Release a parked asset. Returns `false` for unknown ids.
    pub fn close_asset(&self, asset_handle: u64) -> bool {
        self.take_asset(asset_handle).is_some()
    }

    pub fn open_asset_count(&self) -> usize {
        self.assets.lock().len()
    }
}

impl DownloadListener for ChannelHost {
    fn on_download_complete(&self, local_path: Option<&Path>, instance: InstanceId) -> Result<()> {
        self.push(HostEvent::DownloadComplete {
            local_path: local_path.map(|p| p.to_string_lossy().into_owned()),
            instance_id: instance.0,
        })
    }
}

impl ExtractorHost for ChannelHost {
    fn setup_media_extractor(
        &self,
        tail: Vec<u8>,
        asset: AssetHandle,
        instance: InstanceId,
    ) -> Result<()> {
        let id = self.next_asset.fetch_add(1, Ordering::Relaxed);
        let asset_offset = asset.offset();
        let asset_length = asset.len();
        self.assets.lock().insert(id, asset);

        let pushed = self.push(HostEvent::MediaExtractorReady {
            tail,
            asset_handle: id,
            asset_offset,
            asset_length,
            instance_id: instance.0,
        });
        if pushed.is_err() {
            self.assets.lock().remove(&id);
        }
        pushed
    }
}

impl FrameSink for ChannelHost {
    fn on_frame_available(&self, frame: FrameId) {
        let _ = self.push(HostEvent::FrameAvailable { frame_id: frame.0 });
    }
}
