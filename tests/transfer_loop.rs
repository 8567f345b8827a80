use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use download_bridge::presentation::MemorySurface;
use download_bridge::presentation::memory::SurfaceCall;
use download_bridge::service::TaskState;
use download_bridge::{
    BridgeConfig, BridgeGateway, DownloadService, Envelope, ExecutorInbox, InitiatorSide, Report,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn output_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dlbridge_transfer_{}_{}", name, std::process::id()))
}

fn config(name: &str) -> BridgeConfig {
    BridgeConfig {
        output_dir: output_dir(name),
        progress_interval_ms: 1,
        ..BridgeConfig::default()
    }
}

fn service(config: &BridgeConfig) -> (Arc<DownloadService>, Arc<MemorySurface>, InitiatorSide, ExecutorInbox) {
    let surface = Arc::new(MemorySurface::new());
    let (initiator, executor, inbox) = BridgeGateway::open(16);
    let service = DownloadService::new(config, Box::new(surface.clone())).with_transfers(executor, config);
    (Arc::new(service), surface, initiator, inbox)
}

fn collect_reports(initiator: &InitiatorSide) -> (JoinHandle<()>, mpsc::UnboundedReceiver<Report>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = initiator.on_receive(move |report| {
        let _ = tx.send(report);
    });
    (handle, rx)
}

async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    socket.write_all(head.as_bytes()).await.unwrap();
    socket.write_all(body).await.unwrap();
    socket.shutdown().await.unwrap();
}

/// 立即应答一次请求的本地 HTTP 服务
async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        respond(&mut socket, status, &body).await;
    });
    format!("http://{}/files/payload.bin", addr)
}

/// 收到请求后先通知测试，等放行后再以 404 应答
async fn serve_held() -> (String, oneshot::Receiver<()>, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (arrived_tx, arrived_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let _ = arrived_tx.send(());
        let _ = release_rx.await;
        let _ = socket.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    });
    (format!("http://{}/held.bin", addr), arrived_rx, release_tx)
}

async fn wait_for_terminated(reports: &mut mpsc::UnboundedReceiver<Report>, task_id: i64) -> Vec<Report> {
    let mut seen = Vec::new();
    timeout(WAIT, async {
        while let Some(report) = reports.recv().await {
            let done = report == Report::Terminated { task_id };
            seen.push(report);
            if done {
                break;
            }
        }
    })
    .await
    .expect("任务没有结束");
    seen
}

#[tokio::test]
async fn test_transfer_completes_and_stops_task() {
    let config = config("complete");
    let (service, surface, initiator, inbox) = service(&config);
    let (_listener, mut reports) = collect_reports(&initiator);
    let worker = inbox.on_receive(service.clone());

    let body = b"chunk of downloaded bytes".repeat(64);
    let url = serve_once("200 OK", body.clone()).await;

    let receipt = initiator
        .send(Envelope::start_download(1, "payload.bin", url))
        .await
        .unwrap();
    assert_eq!(receipt.state, TaskState::Active);

    let seen = wait_for_terminated(&mut reports, 1).await;
    assert!(!seen.iter().any(|r| matches!(r, Report::Failed { .. })));

    assert!(service.registry().get(1).is_none());
    assert_eq!(service.registry().state_of(1), TaskState::Terminated);
    let calls = surface.calls();
    assert_eq!(calls.first(), Some(&SurfaceCall::Post(1)));
    assert!(calls.contains(&SurfaceCall::Update(1)));
    assert_eq!(calls.last(), Some(&SurfaceCall::Cancel(1)));
    assert_eq!(surface.live_count(), 0);

    let written = tokio::fs::read(config.output_dir.join("payload.bin")).await.unwrap();
    assert_eq!(written, body);

    initiator.disconnect();
    worker.await.unwrap();
    let _ = tokio::fs::remove_dir_all(&config.output_dir).await;
}

#[tokio::test]
async fn test_transfer_failure_is_reported_then_stopped() {
    let config = config("failure");
    let (service, surface, initiator, inbox) = service(&config);
    let (_listener, mut reports) = collect_reports(&initiator);
    let worker = inbox.on_receive(service.clone());

    let url = serve_once("404 Not Found", Vec::new()).await;
    initiator
        .send(Envelope::start_download(2, "missing.bin", url))
        .await
        .unwrap();

    let seen = wait_for_terminated(&mut reports, 2).await;
    let failed = seen
        .iter()
        .position(|r| matches!(r, Report::Failed { task_id: 2, .. }))
        .expect("缺少失败报告");
    assert!(failed < seen.len() - 1);
    assert!(service.registry().get(2).is_none());
    assert_eq!(surface.live_count(), 0);

    initiator.disconnect();
    worker.await.unwrap();
    let _ = tokio::fs::remove_dir_all(&config.output_dir).await;
}

#[tokio::test]
async fn test_restart_cancels_pending_transfer_without_stop() {
    let config = config("restart");
    let (service, surface, initiator, inbox) = service(&config);
    let (_listener, mut reports) = collect_reports(&initiator);
    let worker = inbox.on_receive(service.clone());

    let (url, arrived, release) = serve_held().await;
    initiator
        .send(Envelope::start_download(3, "held.bin", url))
        .await
        .unwrap();
    timeout(WAIT, arrived).await.unwrap().unwrap();

    // 原地重启，不带 URL：旧的传输必须静默退出
    let receipt = initiator.send(Envelope::start(3, "again.bin")).await.unwrap();
    assert_eq!(receipt.state, TaskState::Active);
    let _ = release.send(());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let receipt = initiator.send(Envelope::progress(3, 30, "1KB/s")).await.unwrap();
    assert_eq!(receipt.state, TaskState::Active);
    assert_eq!(service.registry().get(3).unwrap().progress_percent, 30);
    assert_eq!(surface.live(3).unwrap().title, "again.bin");
    while let Ok(report) = reports.try_recv() {
        assert!(!matches!(report, Report::Failed { .. } | Report::Terminated { .. }));
    }
    assert!(!tokio::fs::try_exists(config.output_dir.join("held.bin")).await.unwrap_or(false));

    initiator.disconnect();
    worker.await.unwrap();
    let _ = tokio::fs::remove_dir_all(&config.output_dir).await;
}

#[tokio::test]
async fn test_stop_then_reused_id_is_not_stopped_by_old_transfer() {
    let config = config("reuse");
    let (service, surface, initiator, inbox) = service(&config);
    let (_listener, mut reports) = collect_reports(&initiator);
    let worker = inbox.on_receive(service.clone());

    let (url, arrived, release) = serve_held().await;
    initiator
        .send(Envelope::start_download(4, "held.bin", url))
        .await
        .unwrap();
    timeout(WAIT, arrived).await.unwrap().unwrap();

    let receipt = initiator.send(Envelope::stop(4)).await.unwrap();
    assert_eq!(receipt.state, TaskState::Terminated);
    let receipt = initiator.send(Envelope::start(4, "reused.bin")).await.unwrap();
    assert_eq!(receipt.state, TaskState::Active);
    let _ = release.send(());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(service.registry().state_of(4), TaskState::Active);
    assert!(surface.live(4).is_some());
    let terminated = std::iter::from_fn(|| reports.try_recv().ok())
        .filter(|r| *r == Report::Terminated { task_id: 4 })
        .count();
    assert_eq!(terminated, 1);

    initiator.disconnect();
    worker.await.unwrap();
    let _ = tokio::fs::remove_dir_all(&config.output_dir).await;
}
