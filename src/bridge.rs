// Bridge facade: wires store, source, registry, fetcher, asset reader and frame relay together.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::assets::archive::StoredArchive;
use crate::assets::container::{AssetContainer, AssetHandle, FileSystemAssets};
use crate::assets::tail::TailReader;
use crate::audio::AudioTrackSpec;
use crate::config::BridgeConfig;
use crate::engine::fetch::SegmentFetcher;
use crate::engine::notifier::CompletionNotifier;
use crate::engine::registry::DownloadRegistry;
use crate::engine::store::SegmentStore;
use crate::engine::task::{CancelAck, DownloadRequest, InstanceId, TaskHandle};
use crate::error::BridgeResult;
use crate::host::frame::FrameRelay;
use crate::host::{DownloadListener, ExtractorHost};
use crate::source::http_source::HttpSource;
use crate::source::traits::SegmentSource;

pub struct SegmentBridge {
    store: Arc<SegmentStore>,
    registry: DownloadRegistry,
    fetcher: SegmentFetcher,
    tails: TailReader,
    frames: FrameRelay,
}

impl SegmentBridge {
    /// Build a bridge that fetches over HTTP.
    pub fn new(
        config: BridgeConfig,
        runtime: Handle,
        listener: Arc<dyn DownloadListener>,
        extractor: Arc<dyn ExtractorHost>,
    ) -> Self {
        Self::with_source(config, runtime, Arc::new(HttpSource::new()), listener, extractor)
    }

    pub fn with_source(
        config: BridgeConfig,
        runtime: Handle,
        source: Arc<dyn SegmentSource>,
        listener: Arc<dyn DownloadListener>,
        extractor: Arc<dyn ExtractorHost>,
    ) -> Self {
        let root = config.resolved_temp_root();
        info!("segment bridge starting, temp root {}", root.display());

        let packaged = config
            .archive_path
            .as_deref()
            .and_then(|path| match StoredArchive::open(path) {
                Ok(archive) => Some(Arc::new(archive) as Arc<dyn AssetContainer>),
                Err(e) => {
                    warn!("failed to open asset archive {}: {}", path, e);
                    None
                }
            });

        Self::with_assets(config, runtime, source, packaged, listener, extractor)
    }

    /// Full constructor: the packaged container, when given, is consulted
    /// instead of the filesystem for tail-metadata reads.
    pub fn with_assets(
        config: BridgeConfig,
        runtime: Handle,
        source: Arc<dyn SegmentSource>,
        packaged: Option<Arc<dyn AssetContainer>>,
        listener: Arc<dyn DownloadListener>,
        extractor: Arc<dyn ExtractorHost>,
    ) -> Self {
        let store = Arc::new(SegmentStore::new(config.resolved_temp_root()));
        let notifier = Arc::new(CompletionNotifier::new(listener));
        let registry = DownloadRegistry::new(
            Arc::clone(&source),
            Arc::clone(&store),
            notifier,
            runtime,
            config.chunk_size,
        );
        let fetcher = SegmentFetcher::new(source, Arc::clone(&store), config.blocking_chunk_size);
        let tails = TailReader::new(packaged, Arc::new(FileSystemAssets::new()), extractor);

        Self {
            store,
            registry,
            fetcher,
            tails,
            frames: FrameRelay::new(),
        }
    }

    /// Start downloading `url` into `<root>/<instance>/<capture_name>/<segment_name>`.
    pub fn download_file_from_url(
        &self,
        capture_name: &str,
        url: &str,
        segment_name: &str,
        instance: InstanceId,
    ) -> BridgeResult<TaskHandle> {
        self.registry.submit(DownloadRequest::new(
            instance,
            url,
            capture_name,
            segment_name,
        ))
    }

    pub async fn download_file_from_url_blocking(&self, url: &str) -> BridgeResult<PathBuf> {
        self.fetcher.fetch_once(url).await
    }

    pub async fn cancel_download(&self, instance: InstanceId) -> CancelAck {
        self.registry.cancel(instance).await
    }

    pub fn read_asset_tail(&self, asset_path: &str, instance: InstanceId) {
        self.tails.read_tail(asset_path, instance);
    }

    pub fn close_asset_file_descriptor(&self, asset: AssetHandle) {
        self.tails.close_asset(asset);
    }

    pub fn create_audio_track(&self, sample_rate: u32) -> BridgeResult<AudioTrackSpec> {
        AudioTrackSpec::stereo_pcm16(sample_rate)
    }

    pub fn frames(&self) -> &FrameRelay {
        &self.frames
    }

    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Cancel and wait for every active download.
    pub async fn shutdown(&self) {
        self.registry.cancel_all().await;
        self.frames.clear_sink();
    }
}
