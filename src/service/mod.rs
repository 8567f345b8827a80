pub mod lifecycle;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::bridge::envelope::{Envelope, EventKind};
use crate::bridge::gateway::{EnvelopeHandler, ExecutorSide, Receipt};
use crate::config::BridgeConfig;
use crate::presentation::{NotificationChannel, NotificationSurface, PresentationAdapter};
use crate::transfer::TransferLauncher;

pub use lifecycle::{TaskAnomaly, TaskState, Transition};
pub use registry::{Applied, Task, TaskRegistry};

/// 执行端：持有任务的真实状态，驱动通知
pub struct DownloadService {
    registry: TaskRegistry,
    transfers: Option<TransferLauncher>,
}

impl DownloadService {
    pub fn new(config: &BridgeConfig, surface: Box<dyn NotificationSurface>) -> Self {
        let channel = NotificationChannel::init(config);
        let presenter = Arc::new(PresentationAdapter::new(surface, channel));
        Self {
            registry: TaskRegistry::new(presenter),
            transfers: None,
        }
    }

    /// 收到带 URL 的 Start 时由执行端自己下载文件
    pub fn with_transfers(mut self, executor: ExecutorSide, config: &BridgeConfig) -> Self {
        self.transfers = Some(TransferLauncher::new(executor, config));
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// 同步处理一个事件
    pub fn process(&self, envelope: &Envelope) -> Receipt {
        let applied = self.registry.apply(envelope);
        let warning = match &applied.presentation {
            Ok(()) => None,
            Err(e) => {
                warn!(task_id = applied.task_id, "通知显示失败，任务状态不受影响: {}", e);
                Some(e.to_string())
            }
        };

        Receipt {
            task_id: applied.task_id,
            previous: applied.previous,
            state: applied.state,
            anomaly: applied.anomaly(),
            warning,
        }
    }

    /// 链路断开：所有进行中的任务失效，不做重试
    pub fn shutdown(&self) -> usize {
        if let Some(transfers) = &self.transfers {
            transfers.cancel_all();
        }
        let terminated = self.registry.clear();
        if !terminated.is_empty() {
            error!("链路断开，终止 {} 个进行中的任务: {:?}", terminated.len(), terminated);
        }
        terminated.len()
    }
}

#[async_trait]
impl EnvelopeHandler for DownloadService {
    async fn handle(&self, envelope: Envelope) -> Receipt {
        let receipt = self.process(&envelope);

        if let Some(transfers) = &self.transfers {
            match (&envelope.kind, receipt.state) {
                (EventKind::Start { filename, url }, TaskState::Active) => {
                    // 原地重启时旧的传输不再有效
                    transfers.cancel(envelope.task_id);
                    if let Some(url) = url {
                        transfers.launch(envelope.task_id, url, filename);
                    }
                }
                (EventKind::Stop, TaskState::Terminated) => {
                    transfers.cancel(envelope.task_id);
                }
                _ => {}
            }
        }
        receipt
    }

    async fn on_link_down(&self) {
        let count = self.shutdown();
        info!("执行端退出，清理 {} 个任务", count);
    }
}
