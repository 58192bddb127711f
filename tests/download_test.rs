// Integration tests for cancellable segment downloads against local upstream servers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use ma_segment_bridge::assets::container::AssetHandle;
use ma_segment_bridge::bridge::SegmentBridge;
use ma_segment_bridge::config::BridgeConfig;
use ma_segment_bridge::engine::task::{CancelAck, InstanceId, TerminalOutcome};
use ma_segment_bridge::error::BridgeError;
use ma_segment_bridge::host::{DownloadListener, ExtractorHost};

const SEGMENT_SIZE: usize = 1024 * 1024; // 1 MB
const LARGE_SEGMENT_SIZE: usize = 10 * 1024 * 1024; // 10 MB

/// Generate deterministic test content.
fn generate_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
struct Recorder {
    completions: Mutex<Vec<(Option<PathBuf>, InstanceId)>>,
}

impl Recorder {
    fn count_for(&self, instance: InstanceId) -> usize {
        self.completions
            .lock()
            .iter()
            .filter(|(_, i)| *i == instance)
            .count()
    }
}

impl DownloadListener for Recorder {
    fn on_download_complete(
        &self,
        local_path: Option<&Path>,
        instance: InstanceId,
    ) -> anyhow::Result<()> {
        self.completions
            .lock()
            .push((local_path.map(Path::to_path_buf), instance));
        Ok(())
    }
}

impl ExtractorHost for Recorder {
    fn setup_media_extractor(
        &self,
        _tail: Vec<u8>,
        _asset: AssetHandle,
        _instance: InstanceId,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn segment_handler() -> impl IntoResponse {
    let body = generate_content(SEGMENT_SIZE);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "video/mp4".to_string())],
        body,
    )
}

async fn start_upstream() -> SocketAddr {
    let app = Router::new().route("/segment", get(segment_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

/// Serves a single response of `total` bytes: `head` bytes immediately, then
/// the rest in small slow pieces. Signals once the head has been written.
async fn start_drip_server(total: usize, head: usize) -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let content = generate_content(total);
        let headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            total
        );
        if socket.write_all(headers.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&content[..head]).await.is_err() {
            return;
        }
        let _ = head_tx.send(());

        for piece in content[head..].chunks(64 * 1024) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if socket.write_all(piece).await.is_err() {
                // Client hung up after cancelling.
                return;
            }
        }
    });

    (addr, head_rx)
}

/// An address nothing listens on.
async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn new_bridge(root: &Path, recorder: &Arc<Recorder>) -> SegmentBridge {
    SegmentBridge::new(
        BridgeConfig::with_temp_root(root.to_str().unwrap()),
        Handle::current(),
        recorder.clone(),
        recorder.clone(),
    )
}

#[tokio::test]
async fn test_download_completes_and_notifies_once() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    let url = format!("http://{}/segment", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg_000.mp4", InstanceId(1))
        .unwrap();

    let outcome = handle.outcome().await.unwrap();
    let expected_path = tmp_dir.path().join("1").join("capture").join("seg_000.mp4");
    assert_eq!(outcome, TerminalOutcome::Completed(expected_path.clone()));
    assert_eq!(std::fs::read(&expected_path).unwrap(), generate_content(SEGMENT_SIZE));

    assert!(!bridge.registry().is_active(InstanceId(1)));
    assert_eq!(recorder.count_for(InstanceId(1)), 1);
    assert_eq!(
        recorder.completions.lock()[0],
        (Some(expected_path), InstanceId(1))
    );
}

#[tokio::test]
async fn test_stale_destination_is_replaced() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    let stale = bridge.store().path_for(InstanceId(3), "capture", "seg.mp4");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, vec![0xFFu8; 3 * SEGMENT_SIZE]).unwrap();

    let url = format!("http://{}/segment", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", InstanceId(3))
        .unwrap();
    assert!(matches!(
        handle.outcome().await,
        Some(TerminalOutcome::Completed(_))
    ));
    assert_eq!(std::fs::metadata(&stale).unwrap().len(), SEGMENT_SIZE as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_transfer_then_resubmit() {
    let (drip_addr, head_written) = start_drip_server(LARGE_SEGMENT_SIZE, SEGMENT_SIZE).await;
    let upstream = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);
    let instance = InstanceId(42);

    let url = format!("http://{}/big", drip_addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", instance)
        .unwrap();

    head_written.await.unwrap();
    let ack = bridge.cancel_download(instance).await;

    // cancel only returns once the worker has exited and deregistered.
    assert_eq!(ack, CancelAck::Settled(TerminalOutcome::Cancelled));
    assert!(!bridge.registry().is_active(instance));
    assert_eq!(handle.try_outcome(), Some(TerminalOutcome::Cancelled));
    assert_eq!(recorder.count_for(instance), 1);
    assert_eq!(recorder.completions.lock()[0], (None, instance));

    // The partial file is not left behind.
    let dest = bridge.store().path_for(instance, "capture", "seg.mp4");
    assert!(!dest.exists());

    // The instance can be reused immediately.
    let url = format!("http://{}/segment", upstream);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", instance)
        .unwrap();
    assert_eq!(
        handle.outcome().await,
        Some(TerminalOutcome::Completed(dest.clone()))
    );
    assert_eq!(recorder.count_for(instance), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_submit_is_rejected() {
    let (drip_addr, head_written) = start_drip_server(LARGE_SEGMENT_SIZE, SEGMENT_SIZE).await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);
    let instance = InstanceId(5);

    let url = format!("http://{}/big", drip_addr);
    let _handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", instance)
        .unwrap();

    let err = bridge
        .download_file_from_url("other", "http://127.0.0.1:1/nope", "seg.mp4", instance)
        .unwrap_err();
    assert_eq!(err, BridgeError::Rejected(instance));
    assert!(bridge.registry().is_active(instance));
    assert_eq!(bridge.registry().active_count(), 1);

    head_written.await.unwrap();
    let ack = bridge.cancel_download(instance).await;
    assert_eq!(ack, CancelAck::Settled(TerminalOutcome::Cancelled));
    assert_eq!(recorder.count_for(instance), 1);
}

#[tokio::test]
async fn test_unreachable_url_fails() {
    let addr = unreachable_addr().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);
    let instance = InstanceId(7);

    let url = format!("http://{}/segment", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", instance)
        .unwrap();

    let outcome = handle.outcome().await.unwrap();
    assert!(matches!(outcome, TerminalOutcome::Failed(BridgeError::Open(_))));
    assert!(!bridge.registry().is_active(instance));
    assert!(!bridge.store().path_for(instance, "capture", "seg.mp4").exists());
    assert_eq!(*recorder.completions.lock(), vec![(None, instance)]);
}

#[tokio::test]
async fn test_http_error_status_fails() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    let url = format!("http://{}/missing", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", InstanceId(8))
        .unwrap();
    assert!(matches!(
        handle.outcome().await,
        Some(TerminalOutcome::Failed(BridgeError::Open(_)))
    ));
}

#[tokio::test]
async fn test_cancel_unknown_instance_is_noop() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    assert_eq!(bridge.cancel_download(InstanceId(99)).await, CancelAck::NotActive);
    assert!(recorder.completions.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_after_completion_keeps_completed() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);
    let instance = InstanceId(11);

    let url = format!("http://{}/segment", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", instance)
        .unwrap();
    let outcome = handle.outcome().await.unwrap();
    assert!(matches!(outcome, TerminalOutcome::Completed(_)));

    assert_eq!(bridge.cancel_download(instance).await, CancelAck::NotActive);
    assert_eq!(handle.try_outcome(), Some(outcome));
    assert_eq!(recorder.count_for(instance), 1);
}

#[tokio::test]
async fn test_blocking_fetch() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    let url = format!("http://{}/segment", addr);
    let first = bridge.download_file_from_url_blocking(&url).await.unwrap();
    let second = bridge.download_file_from_url_blocking(&url).await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with(tmp_dir.path()));
    assert_eq!(std::fs::read(&first).unwrap(), generate_content(SEGMENT_SIZE));

    // No registry entry and no completion callback for one-off fetches.
    assert_eq!(bridge.registry().active_count(), 0);
    assert!(recorder.completions.lock().is_empty());

    let unreachable = format!("http://{}/segment", unreachable_addr().await);
    assert!(matches!(
        bridge.download_file_from_url_blocking(&unreachable).await,
        Err(BridgeError::Open(_))
    ));
}

#[tokio::test]
async fn test_store_is_purged_on_drop() {
    let addr = start_upstream().await;
    let tmp_dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let bridge = new_bridge(tmp_dir.path(), &recorder);

    let url = format!("http://{}/segment", addr);
    let mut handle = bridge
        .download_file_from_url("capture", &url, "seg.mp4", InstanceId(21))
        .unwrap();
    let path = match handle.outcome().await {
        Some(TerminalOutcome::Completed(path)) => path,
        other => panic!("unexpected outcome {:?}", other),
    };
    let scratch = bridge.download_file_from_url_blocking(&url).await.unwrap();
    assert!(path.exists());
    assert!(scratch.exists());

    drop(bridge);
    assert!(!path.exists());
    assert!(!scratch.exists());
    assert!(!tmp_dir.path().join("21").exists());
}
