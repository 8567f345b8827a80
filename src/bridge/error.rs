use thiserror::Error;

use super::envelope::TaskId;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("消息格式错误 (id={task_id:?}): {reason}")]
    MalformedEnvelope {
        task_id: Option<TaskId>,
        reason: String,
    },

    #[error("未实现的方法: {0}")]
    UnknownMethod(String),

    #[error("桥接通道已断开")]
    ChannelDown,
}

impl BridgeError {
    pub fn malformed(task_id: Option<TaskId>, reason: impl Into<String>) -> Self {
        BridgeError::MalformedEnvelope {
            task_id,
            reason: reason.into(),
        }
    }

    /// 出错消息所属的任务（如果能识别）
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            BridgeError::MalformedEnvelope { task_id, .. } => *task_id,
            _ => None,
        }
    }
}
