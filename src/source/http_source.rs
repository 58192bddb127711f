use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use super::traits::{SegmentSource, SegmentStream};
use crate::error::{BridgeError, BridgeResult};

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

struct HttpStream {
    response: Response,
    received: u64,
}

#[async_trait]
impl SegmentStream for HttpStream {
    async fn next_chunk(&mut self) -> BridgeResult<Option<Bytes>> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => {
                self.received += chunk.len() as u64;
                Ok(Some(chunk))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BridgeError::Io(format!(
                "stream read failed after {} bytes: {}",
                self.received, e
            ))),
        }
    }
}

#[async_trait]
impl SegmentSource for HttpSource {
    async fn open(&self, url: &str) -> BridgeResult<Box<dyn SegmentStream>> {
        let parsed =
            Url::parse(url).map_err(|e| BridgeError::Open(format!("invalid url {}: {}", url, e)))?;

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| BridgeError::Open(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status();
        debug!("http open status={} url={}", status.as_u16(), url);
        if !status.is_success() {
            warn!("http open failed status={} url={}", status.as_u16(), url);
            return Err(BridgeError::Open(format!("HTTP {} for {}", status.as_u16(), url)));
        }

        Ok(Box::new(HttpStream {
            response: resp,
            received: 0,
        }))
    }
}
