pub mod speed;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::envelope::{Envelope, TaskId};
use crate::bridge::error::BridgeError;
use crate::bridge::gateway::{ExecutorSide, Report};
use crate::config::BridgeConfig;
use speed::{format_speed, percent_of};
use writer::ChunkWriter;

const FALLBACK_FILENAME: &str = "download";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效的数据块")]
    InvalidChunk,

    #[error("无法回报进度: {0}")]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TransferJob {
    pub task_id: TaskId,
    pub url: String,
    pub output_path: PathBuf,
    pub progress_interval: Duration,
}

/// 从 URL 的最后一段路径推断文件名
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// 只保留文件名部分，避免写到输出目录之外
fn safe_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FILENAME)
        .to_string()
}

/// 下载一个文件，并通过执行端把进度送回桥接队列
pub async fn run_transfer(
    client: &reqwest::Client,
    job: &TransferJob,
    executor: &ExecutorSide,
    cancel: &CancellationToken,
) -> Result<TransferOutcome, TransferError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
        response = client.get(&job.url).send() => response?.error_for_status()?,
    };
    let total_size = response.content_length().unwrap_or(0);
    debug!(task_id = job.task_id, total_size, "开始传输: {}", job.url);

    // 被取消后不能再碰输出文件，新的传输可能正在写它
    let mut writer = tokio::select! {
        _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
        writer = ChunkWriter::create(&job.output_path) => writer?,
    };
    let mut stream = response.bytes_stream();

    let mut downloaded = 0u64;
    let mut window_bytes = 0u64;
    let mut window_start = Instant::now();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_id = job.task_id, "传输被取消");
                return Ok(TransferOutcome::Cancelled);
            }
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        writer.write_chunk(&chunk, downloaded).await?;
        downloaded += chunk.len() as u64;
        window_bytes += chunk.len() as u64;

        let elapsed = window_start.elapsed();
        if elapsed >= job.progress_interval {
            let speed = format_speed(window_bytes as f64 / elapsed.as_secs_f64());
            executor
                .send_guarded(
                    Envelope::progress(job.task_id, percent_of(downloaded, total_size), speed),
                    cancel,
                )
                .await?;
            window_bytes = 0;
            window_start = Instant::now();
        }
    }

    let path = writer.finish().await?;
    if total_size > 0 {
        executor
            .send_guarded(Envelope::progress(job.task_id, 100, format_speed(0.0)), cancel)
            .await?;
    }
    info!(task_id = job.task_id, bytes = downloaded, "传输完成: {}", path.display());
    Ok(TransferOutcome::Completed { bytes: downloaded })
}

/// 为带 URL 的任务启动传输循环，每个任务最多一个
pub struct TransferLauncher {
    executor: ExecutorSide,
    client: reqwest::Client,
    output_dir: PathBuf,
    progress_interval: Duration,
    running: Arc<DashMap<TaskId, (u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl TransferLauncher {
    pub fn new(executor: ExecutorSide, config: &BridgeConfig) -> Self {
        Self {
            executor,
            client: reqwest::Client::new(),
            output_dir: config.output_dir.clone(),
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            running: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn launch(&self, task_id: TaskId, url: &str, filename: &str) {
        self.cancel(task_id);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.running.insert(task_id, (generation, token.clone()));

        let job = TransferJob {
            task_id,
            url: url.to_string(),
            output_path: self.output_dir.join(safe_filename(filename)),
            progress_interval: self.progress_interval,
        };
        let executor = self.executor.clone();
        let client = self.client.clone();
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let outcome = run_transfer(&client, &job, &executor, &token).await;

            // Stop 要在移出 running 之前入队：在这之间到达的重启
            // 仍能取消 token，使这个 Stop 在出队时被丢弃
            match outcome {
                Ok(TransferOutcome::Completed { .. }) => {
                    if let Err(e) = executor.send_guarded(Envelope::stop(task_id), &token).await {
                        warn!(task_id, "传输完成但无法通知执行端: {}", e);
                    }
                }
                Ok(TransferOutcome::Cancelled) => {}
                Err(TransferError::Bridge(e)) => {
                    error!(task_id, "链路断开，传输中止: {}", e);
                }
                Err(_) if token.is_cancelled() => {
                    debug!(task_id, "已取消的传输出错，忽略");
                }
                Err(e) => {
                    // 不可恢复的失败同样以 Stop 结束任务
                    error!(task_id, "传输失败: {}", e);
                    executor.report(Report::Failed {
                        task_id,
                        message: e.to_string(),
                    });
                    let _ = executor.send_guarded(Envelope::stop(task_id), &token).await;
                }
            }

            running.remove_if(&task_id, |_, (current, _)| *current == generation);
        });
    }

    pub fn cancel(&self, task_id: TaskId) {
        if let Some((_, (_, token))) = self.running.remove(&task_id) {
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.running.iter() {
            entry.value().1.cancel();
        }
        self.running.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_takes_last_segment() {
        assert_eq!(
            filename_from_url("https://host/files/a.zip?x=1"),
            Some("a.zip".to_string())
        );
        assert_eq!(
            filename_from_url("https://host/dir/"),
            Some("dir".to_string())
        );
        assert_eq!(filename_from_url("https://host"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[test]
    fn safe_filename_strips_directories() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("a.zip"), "a.zip");
        assert_eq!(safe_filename(""), FALLBACK_FILENAME);
        assert_eq!(safe_filename(".."), FALLBACK_FILENAME);
    }
}
