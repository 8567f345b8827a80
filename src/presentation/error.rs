use thiserror::Error;

use crate::bridge::envelope::TaskId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresentationError {
    #[error("通知不可用 (任务 {task_id}): {reason}")]
    Unavailable { task_id: TaskId, reason: String },
}
