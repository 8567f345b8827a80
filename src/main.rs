use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use download_bridge::bridge::gateway::START_FAILED;
use download_bridge::cli::Cli;
use download_bridge::common::logger::{PrettyLogger, init_tracing};
use download_bridge::presentation::{MemorySurface, NotificationSurface, TerminalSurface};
use download_bridge::transfer::filename_from_url;
use download_bridge::{BridgeConfig, BridgeGateway, DownloadService, Report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level);

    let config = BridgeConfig::load(args.config.as_deref())
        .await
        .context("加载配置失败")?
        .merge_cli(&args);
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("创建输出目录失败: {}", config.output_dir.display()))?;

    let filename = args
        .filename
        .clone()
        .or_else(|| filename_from_url(&args.url))
        .unwrap_or_else(|| "download".to_string());
    let task_id = args.id;

    let surface: Box<dyn NotificationSurface> = if config.headless {
        Box::new(MemorySurface::new())
    } else {
        Box::new(TerminalSurface::new())
    };

    // 执行端
    let (initiator, executor, inbox) = BridgeGateway::open(config.queue_capacity);
    let service = Arc::new(DownloadService::new(&config, surface).with_transfers(executor, &config));
    let executor_loop = inbox.on_receive(service.clone());
    info!("执行端已启动, 方法通道: {}", config.method_channel);

    // 发起端
    let (report_tx, mut reports) = mpsc::unbounded_channel();
    let listener = initiator.on_receive(move |report| {
        let _ = report_tx.send(report);
    });

    PrettyLogger::task_info(task_id, &filename);
    PrettyLogger::info(format!("保存目录: {}", config.output_dir.display()));
    let start = json!({
        "method": "start",
        "id": task_id,
        "filename": filename,
        "url": args.url,
    });
    if !initiator.call(&start.to_string()).await {
        PrettyLogger::error(START_FAILED);
        initiator.disconnect();
        let _ = executor_loop.await;
        bail!(START_FAILED);
    }

    let mut failure = None;
    let outcome = loop {
        tokio::select! {
            report = reports.recv() => match report {
                Some(Report::Terminated { task_id: id }) if id == task_id => match failure.take() {
                    Some(message) => break Outcome::Failed(message),
                    None => break Outcome::Completed,
                },
                Some(Report::Failed { task_id: id, message }) if id == task_id => failure = Some(message),
                Some(Report::Warning { message, .. }) => PrettyLogger::warning(message),
                Some(Report::Anomaly { task_id, anomaly }) => warn!(task_id, "{}", anomaly),
                Some(Report::LinkDown) | None => break Outcome::LinkDown,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                PrettyLogger::warning("收到中断信号，停止下载");
                let stop = json!({ "method": "stop", "id": task_id });
                initiator.call(&stop.to_string()).await;
                break Outcome::Interrupted;
            }
        }
    };

    initiator.disconnect();
    executor_loop.await.context("执行端异常退出")?;
    listener.abort();

    PrettyLogger::separator();
    match outcome {
        Outcome::Completed => {
            PrettyLogger::success(format!(
                "任务 #{} 下载完成: {}",
                task_id,
                config.output_dir.join(&filename).display()
            ));
            Ok(())
        }
        Outcome::Interrupted => {
            PrettyLogger::warning(format!("任务 #{} 已中断", task_id));
            Ok(())
        }
        Outcome::Failed(message) => {
            PrettyLogger::error(format!("任务 #{} 下载失败: {}", task_id, message));
            bail!("下载失败: {}", message)
        }
        Outcome::LinkDown => {
            PrettyLogger::error(format!("任务 #{} 未完成: 桥接通道已断开", task_id));
            bail!("桥接通道已断开")
        }
    }
}

/// 单次下载的结局
enum Outcome {
    Completed,
    Failed(String),
    Interrupted,
    LinkDown,
}
