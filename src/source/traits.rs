use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BridgeResult;

/// An open byte stream for one segment.
#[async_trait]
pub trait SegmentStream: Send {
    /// Next chunk of the body, `None` once the stream is exhausted.
    async fn next_chunk(&mut self) -> BridgeResult<Option<Bytes>>;
}

#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Open `url` for reading. Fails with `BridgeError::Open` when the
    /// connection cannot be established.
    async fn open(&self, url: &str) -> BridgeResult<Box<dyn SegmentStream>>;
}
