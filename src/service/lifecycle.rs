use std::fmt;

use crate::bridge::envelope::EventKind;

/// 单个任务的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 注册表中没有该任务
    Idle,
    Active,
    /// 收到 Stop 之后，注册表条目已清除
    Terminated,
}

/// 对未知任务的事件：本地恢复为无操作，只记录日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAnomaly {
    UnknownTaskEvent { event: &'static str },
}

impl fmt::Display for TaskAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAnomaly::UnknownTaskEvent { event } => {
                write!(f, "收到未启动任务的 {} 事件", event)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle/Terminated --Start--> Active
    Begin,
    /// Active --Start--> Active，原地重新初始化
    Restart,
    /// Active --Progress--> Active
    Advance,
    /// Active --Stop--> Terminated
    Finish,
    /// Terminated 之后到达的 Progress/Stop
    Stale,
    /// 从未 Start 过的任务收到 Progress/Stop
    Ignore(TaskAnomaly),
}

impl Transition {
    pub fn next_state(self, current: TaskState) -> TaskState {
        match self {
            Transition::Begin | Transition::Restart | Transition::Advance => TaskState::Active,
            Transition::Finish => TaskState::Terminated,
            Transition::Stale | Transition::Ignore(_) => current,
        }
    }

    /// 是否改变了可观察的状态（需要通知展示层）
    pub fn is_change(self) -> bool {
        matches!(
            self,
            Transition::Begin | Transition::Restart | Transition::Advance | Transition::Finish
        )
    }

    pub fn anomaly(self) -> Option<TaskAnomaly> {
        match self {
            Transition::Ignore(anomaly) => Some(anomaly),
            _ => None,
        }
    }
}

/// 状态转移表
pub fn transition(state: TaskState, event: &EventKind) -> Transition {
    match (state, event) {
        (TaskState::Idle | TaskState::Terminated, EventKind::Start { .. }) => Transition::Begin,
        (TaskState::Active, EventKind::Start { .. }) => Transition::Restart,
        (TaskState::Active, EventKind::Progress { .. }) => Transition::Advance,
        (TaskState::Active, EventKind::Stop) => Transition::Finish,
        (TaskState::Terminated, EventKind::Progress { .. } | EventKind::Stop) => Transition::Stale,
        (TaskState::Idle, EventKind::Progress { .. } | EventKind::Stop) => {
            Transition::Ignore(TaskAnomaly::UnknownTaskEvent {
                event: event.name(),
            })
        }
    }
}

/// 进度限制在 [0, 100]；0 表示进度未知
pub fn clamp_progress(progress_percent: i64) -> u8 {
    progress_percent.clamp(0, 100) as u8
}
