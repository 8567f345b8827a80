use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::envelope::{self, Envelope, TaskId};
use super::error::BridgeError;
use crate::service::lifecycle::{TaskAnomaly, TaskState};

/// 启动失败时展示给用户的文字
pub const START_FAILED: &str = "download could not start";

const REPORT_CAPACITY: usize = 256;

/// 执行端处理完一个事件后的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub task_id: TaskId,
    pub previous: TaskState,
    pub state: TaskState,
    pub anomaly: Option<TaskAnomaly>,
    pub warning: Option<String>,
}

/// 发给发起端的旁路诊断信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Terminated { task_id: TaskId },
    Anomaly { task_id: TaskId, anomaly: TaskAnomaly },
    Warning { task_id: TaskId, message: String },
    Rejected { task_id: Option<TaskId>, message: String },
    /// 执行端的传输失败，任务随后以 Stop 结束
    Failed { task_id: TaskId, message: String },
    LinkDown,
}

/// 执行端的事件处理器
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Receipt;

    /// 链路断开后调用一次
    async fn on_link_down(&self) {}
}

struct Delivery {
    envelope: Envelope,
    reply: Option<oneshot::Sender<Receipt>>,
    // 出队时已取消则丢弃
    guard: Option<CancellationToken>,
}

/// 发起端与执行端之间的无状态中继。所有事件进入同一个队列，
/// 因此同一任务的事件按到达顺序处理。
pub struct BridgeGateway;

impl BridgeGateway {
    pub fn open(capacity: usize) -> (InitiatorSide, ExecutorSide, ExecutorInbox) {
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity.max(1));
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let link = CancellationToken::new();

        let initiator = InitiatorSide {
            inbox: inbox_tx.clone(),
            reports: reports.clone(),
            link: link.clone(),
        };
        let executor = ExecutorSide {
            inbox: inbox_tx,
            reports: reports.clone(),
            link: link.clone(),
        };
        let inbox = ExecutorInbox {
            rx: inbox_rx,
            reports,
            link,
        };
        (initiator, executor, inbox)
    }
}

async fn deliver(
    inbox: &mpsc::Sender<Delivery>,
    link: &CancellationToken,
    delivery: Delivery,
) -> Result<(), BridgeError> {
    if link.is_cancelled() {
        return Err(BridgeError::ChannelDown);
    }
    inbox.send(delivery).await.map_err(|_| BridgeError::ChannelDown)
}

#[derive(Clone)]
pub struct InitiatorSide {
    inbox: mpsc::Sender<Delivery>,
    reports: broadcast::Sender<Report>,
    link: CancellationToken,
}

impl InitiatorSide {
    /// 发送事件并等待执行端回执
    pub async fn send(&self, envelope: Envelope) -> Result<Receipt, BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        deliver(
            &self.inbox,
            &self.link,
            Delivery {
                envelope,
                reply: Some(reply_tx),
                guard: None,
            },
        )
        .await?;
        reply_rx.await.map_err(|_| BridgeError::ChannelDown)
    }

    /// 解码后发送；格式错误的消息不会进入注册表
    pub async fn send_raw(&self, raw: &str) -> Result<Receipt, BridgeError> {
        let envelope = Envelope::decode(raw)?;
        self.send(envelope).await
    }

    /// 平台方法调用入口：永不抛错，失败时返回 false 并发布诊断
    pub async fn call(&self, raw: &str) -> bool {
        match self.send_raw(raw).await {
            Ok(receipt) => {
                debug!(task_id = receipt.task_id, state = ?receipt.state, "调用已确认");
                true
            }
            Err(err) => {
                let (method, peeked_id) = envelope::peek(raw);
                let task_id = err.task_id().or(peeked_id);
                let is_start = matches!(
                    method.as_deref(),
                    Some("start") | Some("startForegroundService")
                );
                let message = if is_start {
                    warn!(?task_id, "{}: {}", START_FAILED, err);
                    format!("{}: {}", START_FAILED, err)
                } else {
                    debug!(?task_id, "调用失败: {}", err);
                    err.to_string()
                };
                if matches!(err, BridgeError::ChannelDown) {
                    error!("桥接通道已断开，进行中的任务全部失效");
                }
                let _ = self.reports.send(Report::Rejected { task_id, message });
                false
            }
        }
    }

    /// 注册诊断处理器
    pub fn on_receive<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(Report) + Send + Sync + 'static,
    {
        let mut rx = self.reports.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(report) => handler(report),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("诊断消息积压，丢弃 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// 断开链路；之后两端的发送都会得到 ChannelDown
    pub fn disconnect(&self) {
        self.link.cancel();
    }
}

#[derive(Clone)]
pub struct ExecutorSide {
    inbox: mpsc::Sender<Delivery>,
    reports: broadcast::Sender<Report>,
    link: CancellationToken,
}

impl ExecutorSide {
    /// 执行端自己产生的事件（例如传输循环的进度），不等待回执
    pub async fn send(&self, envelope: Envelope) -> Result<(), BridgeError> {
        deliver(
            &self.inbox,
            &self.link,
            Delivery {
                envelope,
                reply: None,
                guard: None,
            },
        )
        .await
    }

    /// 同 send，但如果轮到处理时 guard 已被取消，事件直接丢弃。
    /// 取消发生在处理队列里更早的事件时，所以被取消的传输循环
    /// 发出的事件不会影响同一ID上的新任务。
    pub async fn send_guarded(
        &self,
        envelope: Envelope,
        guard: &CancellationToken,
    ) -> Result<(), BridgeError> {
        deliver(
            &self.inbox,
            &self.link,
            Delivery {
                envelope,
                reply: None,
                guard: Some(guard.clone()),
            },
        )
        .await
    }

    /// 直接向发起端发布诊断
    pub fn report(&self, report: Report) {
        let _ = self.reports.send(report);
    }
}

pub struct ExecutorInbox {
    rx: mpsc::Receiver<Delivery>,
    reports: broadcast::Sender<Report>,
    link: CancellationToken,
}

impl ExecutorInbox {
    /// 注册执行端处理器并开始按顺序处理事件，直到链路断开
    pub fn on_receive<H>(self, handler: Arc<H>) -> JoinHandle<()>
    where
        H: EnvelopeHandler + ?Sized + 'static,
    {
        let ExecutorInbox {
            mut rx,
            reports,
            link,
        } = self;

        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    _ = link.cancelled() => break,
                    delivery = rx.recv() => match delivery {
                        Some(delivery) => delivery,
                        None => break,
                    },
                };

                if delivery.guard.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    debug!(
                        task_id = delivery.envelope.task_id,
                        event = delivery.envelope.kind.name(),
                        "来源已取消，丢弃事件"
                    );
                    continue;
                }

                let receipt = handler.handle(delivery.envelope).await;
                publish(&reports, &receipt);
                if let Some(reply) = delivery.reply {
                    let _ = reply.send(receipt);
                }
            }

            rx.close();
            link.cancel();
            handler.on_link_down().await;
            let _ = reports.send(Report::LinkDown);
        })
    }
}

fn publish(reports: &broadcast::Sender<Report>, receipt: &Receipt) {
    let task_id = receipt.task_id;
    if let Some(anomaly) = receipt.anomaly {
        let _ = reports.send(Report::Anomaly { task_id, anomaly });
    }
    if let Some(message) = &receipt.warning {
        let _ = reports.send(Report::Warning {
            task_id,
            message: message.clone(),
        });
    }
    if receipt.previous == TaskState::Active && receipt.state == TaskState::Terminated {
        let _ = reports.send(Report::Terminated { task_id });
    }
}
