use std::path::PathBuf;

use serde::Deserialize;

/// Copy buffer used by cancellable segment downloads (256 KB).
pub const DOWNLOAD_CHUNK_BYTES: usize = 256 * 1024;

/// Copy buffer used by the one-off blocking fetch (4 KB).
pub const BLOCKING_FETCH_CHUNK_BYTES: usize = 4 * 1024;

/// Size of the trailing metadata block handed to the media extractor.
pub const TAIL_METADATA_BYTES: u64 = 1024;

/// Entries of a packaged archive live under this prefix.
pub const ARCHIVE_ASSET_PREFIX: &str = "assets/";

/// Directory name prefix used under the system temp dir when no root is
/// configured. The process id is appended.
pub const DEFAULT_TEMP_DIR_NAME: &str = "ma-segment-bridge";

/// Audio output buffers hold at least this much audio.
pub const AUDIO_MIN_BUFFER_MILLIS: u32 = 20;

/// Environment variable read for the tracing filter before `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "MA_SEGMENT_BRIDGE_LOG";

/// Tracing filter used when no environment override is set.
pub const DEFAULT_LOG_FILTER: &str =
    "warn,ma_segment_bridge=info,ma_segment_bridge::engine::registry=debug,hyper_util=warn,reqwest=warn";

/// Supported audio sample rates, inclusive.
pub const AUDIO_MIN_SAMPLE_RATE: u32 = 4_000;
pub const AUDIO_MAX_SAMPLE_RATE: u32 = 192_000;

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root for downloaded segments. Empty means the system temp dir.
    pub temp_root: String,
    /// Copy buffer size for cancellable downloads.
    pub chunk_size: usize,
    /// Copy buffer size for the blocking fetch.
    pub blocking_chunk_size: usize,
    /// Optional packaged asset archive (stored zip) consulted before the filesystem.
    pub archive_path: Option<String>,
}

impl BridgeConfig {
    pub fn with_temp_root(temp_root: impl Into<String>) -> Self {
        Self {
            temp_root: temp_root.into(),
            ..Self::default()
        }
    }

    /// Resolve the temp root. The default is private to this process.
    pub fn resolved_temp_root(&self) -> PathBuf {
        if self.temp_root.trim().is_empty() {
            std::env::temp_dir().join(format!("{}-{}", DEFAULT_TEMP_DIR_NAME, std::process::id()))
        } else {
            PathBuf::from(&self.temp_root)
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            temp_root: String::new(),
            chunk_size: DOWNLOAD_CHUNK_BYTES,
            blocking_chunk_size: BLOCKING_FETCH_CHUNK_BYTES,
            archive_path: None,
        }
    }
}
