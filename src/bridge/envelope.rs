use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::BridgeError;

/// 任务ID，由调用方提供，同一时刻活跃的任务之间唯一
pub type TaskId = i64;

const KNOWN_METHODS: &[&str] = &[
    "start",
    "progress",
    "stop",
    // 旧版平台通道使用的方法名
    "startForegroundService",
    "updateProgress",
    "stopForegroundService",
];

/// 生命周期事件的种类及其载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Start {
        filename: String,
        url: Option<String>,
    },
    Progress {
        progress_percent: i64,
        speed_label: String,
    },
    Stop,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Start { .. } => "start",
            EventKind::Progress { .. } => "progress",
            EventKind::Stop => "stop",
        }
    }
}

/// 跨边界传递的最小消息单元，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub task_id: TaskId,
    pub kind: EventKind,
}

impl Envelope {
    pub fn start(task_id: TaskId, filename: impl Into<String>) -> Self {
        Self {
            task_id,
            kind: EventKind::Start {
                filename: filename.into(),
                url: None,
            },
        }
    }

    pub fn start_download(task_id: TaskId, filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            task_id,
            kind: EventKind::Start {
                filename: filename.into(),
                url: Some(url.into()),
            },
        }
    }

    pub fn progress(task_id: TaskId, progress_percent: i64, speed_label: impl Into<String>) -> Self {
        Self {
            task_id,
            kind: EventKind::Progress {
                progress_percent,
                speed_label: speed_label.into(),
            },
        }
    }

    pub fn stop(task_id: TaskId) -> Self {
        Self {
            task_id,
            kind: EventKind::Stop,
        }
    }

    /// 解码平台通道上的一条 JSON 消息
    pub fn decode(raw: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| BridgeError::malformed(None, format!("无法解析JSON: {}", e)))?;
        let task_id = value.get("id").and_then(Value::as_i64);

        let method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::malformed(task_id, "缺少 method 字段"))?;
        if !KNOWN_METHODS.contains(&method) {
            return Err(BridgeError::UnknownMethod(method.to_string()));
        }

        let message: BridgeMessage = serde_json::from_value(value)
            .map_err(|e| BridgeError::malformed(task_id, e.to_string()))?;
        Ok(message.into())
    }

    pub fn encode(&self) -> String {
        // 枚举只包含字符串与整数字段，序列化不会失败
        serde_json::to_string(&BridgeMessage::from(self.clone())).unwrap_or_default()
    }
}

/// 只取出 method 和 id，用于给失败的调用生成诊断信息
pub fn peek(raw: &str) -> (Option<String>, Option<TaskId>) {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => (
            value.get("method").and_then(Value::as_str).map(str::to_string),
            value.get("id").and_then(Value::as_i64),
        ),
        Err(_) => (None, None),
    }
}

/// 平台通道上的消息形状
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method")]
pub enum BridgeMessage {
    #[serde(rename = "start", alias = "startForegroundService")]
    Start {
        id: TaskId,
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    #[serde(rename = "progress", alias = "updateProgress")]
    Progress {
        id: TaskId,
        #[serde(rename = "progressPercent", alias = "progress")]
        progress_percent: i64,
        speed: String,
    },
    #[serde(rename = "stop", alias = "stopForegroundService")]
    Stop { id: TaskId },
}

impl From<BridgeMessage> for Envelope {
    fn from(message: BridgeMessage) -> Self {
        match message {
            BridgeMessage::Start { id, filename, url } => Envelope {
                task_id: id,
                kind: EventKind::Start { filename, url },
            },
            BridgeMessage::Progress {
                id,
                progress_percent,
                speed,
            } => Envelope::progress(id, progress_percent, speed),
            BridgeMessage::Stop { id } => Envelope::stop(id),
        }
    }
}

impl From<Envelope> for BridgeMessage {
    fn from(envelope: Envelope) -> Self {
        let id = envelope.task_id;
        match envelope.kind {
            EventKind::Start { filename, url } => BridgeMessage::Start { id, filename, url },
            EventKind::Progress {
                progress_percent,
                speed_label,
            } => BridgeMessage::Progress {
                id,
                progress_percent,
                speed: speed_label,
            },
            EventKind::Stop => BridgeMessage::Stop { id },
        }
    }
}
