use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;
use crate::presentation::Importance;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 发起端方法通道名
    pub method_channel: String,
    pub channel_id: String,
    pub channel_name: String,
    pub importance: Importance,
    /// 桥接队列容量
    pub queue_capacity: usize,
    /// 传输循环回报进度的最小间隔
    pub progress_interval_ms: u64,
    pub output_dir: PathBuf,
    /// 不绘制终端进度条
    pub headless: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            method_channel: "com.example.nexus/downloads".to_string(),
            channel_id: "DownloadServiceChannel".to_string(),
            channel_name: "Download Service Channel".to_string(),
            importance: Importance::Low,
            queue_capacity: 64,
            progress_interval_ms: 500,
            output_dir: PathBuf::from("."),
            headless: false,
        }
    }
}

impl BridgeConfig {
    /// 读取 JSON 配置文件，没有给出路径时使用默认值
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                Self::from_json(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// 命令行参数覆盖配置文件
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(interval) = cli.progress_interval_ms {
            self.progress_interval_ms = interval;
        }
        if cli.headless {
            self.headless = true;
        }
        self
    }
}
