use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{const_mutex, Mutex};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::bridge::SegmentBridge;
use crate::config::BridgeConfig;
use crate::engine::task::{CancelAck, InstanceId};
use crate::error::{BridgeError, BridgeResult};
use crate::host::channel::{ChannelHost, HostEvent};
use crate::host::FrameId;

/// Audio track parameters for the host.
#[derive(Debug, Clone)]
pub struct AudioTrackInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bytes_per_sample: u32,
    pub buffer_bytes: u32,
}

#[derive(Clone)]
struct BridgeState {
    runtime: Arc<Runtime>,
    bridge: Arc<SegmentBridge>,
    host: Arc<ChannelHost>,
    events: Arc<tokio::sync::Mutex<UnboundedReceiver<HostEvent>>>,
}

static STATE: Mutex<Option<BridgeState>> = const_mutex(None);

fn current() -> BridgeResult<BridgeState> {
    STATE.lock().clone().ok_or(BridgeError::NotInitialized)
}

/// Create the bridge. Calling it again while initialized is a no-op.
#[flutter_rust_bridge::frb(sync)]
pub fn init_bridge(temp_root: String, archive_path: Option<String>) -> Result<()> {
    let mut state = STATE.lock();
    if state.is_some() {
        warn!("init_bridge called twice, keeping existing bridge");
        return Ok(());
    }

    let runtime = Arc::new(
        Builder::new_multi_thread()
            .thread_name("segment-bridge")
            .enable_all()
            .build()
            .context("failed to build bridge runtime")?,
    );

    let config = BridgeConfig {
        archive_path,
        ..BridgeConfig::with_temp_root(temp_root)
    };
    let (host, events) = ChannelHost::new();
    let host = Arc::new(host);
    let bridge = Arc::new(SegmentBridge::new(
        config,
        runtime.handle().clone(),
        host.clone(),
        host.clone(),
    ));
    bridge.frames().set_sink(host.clone());

    *state = Some(BridgeState {
        runtime,
        bridge,
        host,
        events: Arc::new(tokio::sync::Mutex::new(events)),
    });
    info!("segment bridge initialized");
    Ok(())
}

/// Fire-and-forget: the outcome arrives later as `HostEvent::DownloadComplete`.
#[flutter_rust_bridge::frb(sync)]
pub fn download_file_from_url(capture_name: String, url: String, segment_name: String, instance_id: u64) {
    let state = match current() {
        Ok(state) => state,
        Err(e) => {
            error!("download_file_from_url instance={}: {}", instance_id, e);
            return;
        }
    };

    // A rejected duplicate gets no notification of its own; the active
    // download for the instance still reports its outcome.
    if let Err(e) = state.bridge.download_file_from_url(
        &capture_name,
        &url,
        &segment_name,
        InstanceId(instance_id),
    ) {
        warn!("download_file_from_url dropped: {}", e);
    }
}

/// Download `url` to a scratch file and return its path, or `None` on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn download_file_from_url_blocking(url: String) -> Option<String> {
    let state = current().ok()?;
    let bridge = Arc::clone(&state.bridge);
    state
        .runtime
        .block_on(async move { bridge.download_file_from_url_blocking(&url).await })
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

/// Blocks until the download for `instance_id` has fully stopped.
#[flutter_rust_bridge::frb(sync)]
pub fn cancel_download(instance_id: u64) {
    let state = match current() {
        Ok(state) => state,
        Err(e) => {
            error!("cancel_download instance={}: {}", instance_id, e);
            return;
        }
    };

    let bridge = Arc::clone(&state.bridge);
    let ack = state
        .runtime
        .block_on(async move { bridge.cancel_download(InstanceId(instance_id)).await });
    if let CancelAck::Settled(outcome) = ack {
        info!("cancel_download instance={} settled as {}", instance_id, outcome.label());
    }
}

/// Outcome arrives as `HostEvent::MediaExtractorReady`; failures are only logged.
#[flutter_rust_bridge::frb(sync)]
pub fn read_asset_tail(asset_path: String, instance_id: u64) {
    match current() {
        Ok(state) => state.bridge.read_asset_tail(&asset_path, InstanceId(instance_id)),
        Err(e) => error!("read_asset_tail {}: {}", asset_path, e),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn close_asset_file_descriptor(asset_handle: u64) {
    let state = match current() {
        Ok(state) => state,
        Err(e) => {
            error!("close_asset_file_descriptor {}: {}", asset_handle, e);
            return;
        }
    };

    match state.host.take_asset(asset_handle) {
        Some(asset) => state.bridge.close_asset_file_descriptor(asset),
        None => info!("close_asset_file_descriptor: unknown handle {}", asset_handle),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn on_frame_available(frame_id: u64) {
    if let Ok(state) = current() {
        state.bridge.frames().on_frame_available(FrameId(frame_id));
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn create_audio_track(sample_rate: u32) -> Result<AudioTrackInfo> {
    let state = current()?;
    let spec = state.bridge.create_audio_track(sample_rate)?;
    Ok(AudioTrackInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bytes_per_sample: spec.encoding.bytes_per_sample(),
        buffer_bytes: spec.buffer_bytes,
    })
}

/// Wait for the next host callback. `None` once the bridge is disposed.
pub async fn next_host_event() -> Option<HostEvent> {
    let events = current().ok()?.events;
    let mut events = events.lock().await;
    events.recv().await
}

/// Cancel all downloads, remove stored segments and tear the bridge down.
#[flutter_rust_bridge::frb(sync)]
pub fn dispose() {
    let Some(state) = STATE.lock().take() else {
        return;
    };

    let bridge = Arc::clone(&state.bridge);
    state.runtime.block_on(async move { bridge.shutdown().await });
    info!("segment bridge disposed");
}
