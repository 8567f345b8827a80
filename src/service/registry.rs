use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::lifecycle::{self, TaskAnomaly, TaskState, Transition};
use crate::bridge::envelope::{Envelope, EventKind, TaskId};
use crate::presentation::{PresentationAdapter, PresentationError};

/// 任务刚启动时通知里的说明文字
pub const STARTING_DETAIL: &str = "Starting...";

/// 记住多少个最近结束的任务ID
pub const RETIRED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub filename: String,
    pub url: Option<String>,
    pub state: TaskState,
    pub progress_percent: u8,
    pub speed_label: String,
    pub started_at: DateTime<Local>,
    seq: u64,
}

impl Task {
    fn new(id: TaskId, filename: &str, url: Option<&String>, seq: u64) -> Self {
        Self {
            id,
            filename: filename.to_string(),
            url: url.cloned(),
            state: TaskState::Active,
            progress_percent: 0,
            speed_label: String::new(),
            started_at: Local::now(),
            seq,
        }
    }
}

/// 一次 apply 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub task_id: TaskId,
    pub previous: TaskState,
    pub state: TaskState,
    pub transition: Transition,
    /// 展示层失败不会影响任务状态，只作为警告返回
    pub presentation: Result<(), PresentationError>,
}

impl Applied {
    pub fn anomaly(&self) -> Option<TaskAnomaly> {
        self.transition.anomaly()
    }
}

/// 最近结束的任务ID，满了以后淘汰最早结束的。
/// 被淘汰的ID再收到 Progress/Stop 会按未知任务处理。
#[derive(Debug, Default)]
struct RetiredIds {
    order: VecDeque<TaskId>,
    members: HashSet<TaskId>,
}

impl RetiredIds {
    fn insert(&mut self, task_id: TaskId) {
        if self.members.insert(task_id) {
            self.order.push_back(task_id);
        }
        while self.order.len() > RETIRED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, task_id: TaskId) {
        if self.members.remove(&task_id) {
            self.order.retain(|id| *id != task_id);
        }
    }

    fn contains(&self, task_id: TaskId) -> bool {
        self.members.contains(&task_id)
    }
}

/// 执行端持有的任务表
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Task>,
    // 已经 Stop 的任务ID，新的 Start 会把它移出
    retired: Mutex<RetiredIds>,
    next_seq: AtomicU64,
    presenter: Arc<PresentationAdapter>,
}

impl TaskRegistry {
    pub fn new(presenter: Arc<PresentationAdapter>) -> Self {
        Self {
            tasks: DashMap::new(),
            retired: Mutex::default(),
            next_seq: AtomicU64::new(0),
            presenter,
        }
    }

    pub fn presenter(&self) -> &PresentationAdapter {
        &self.presenter
    }

    fn retired(&self) -> std::sync::MutexGuard<'_, RetiredIds> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 应用一个事件。同一任务的事件在条目锁内串行处理，
    /// 状态变化时恰好通知展示层一次。
    pub fn apply(&self, envelope: &Envelope) -> Applied {
        let task_id = envelope.task_id;
        let entry = self.tasks.entry(task_id);
        let previous = match &entry {
            Entry::Occupied(_) => TaskState::Active,
            Entry::Vacant(_) if self.retired().contains(task_id) => TaskState::Terminated,
            Entry::Vacant(_) => TaskState::Idle,
        };
        let transition = lifecycle::transition(previous, &envelope.kind);

        let presentation = match (transition, &envelope.kind, entry) {
            (Transition::Begin | Transition::Restart, EventKind::Start { filename, url }, entry) => {
                let seq = match &entry {
                    Entry::Occupied(live) => live.get().seq,
                    Entry::Vacant(_) => self.next_seq.fetch_add(1, Ordering::Relaxed),
                };
                let restart = previous == TaskState::Active;
                let task = Task::new(task_id, filename, url.as_ref(), seq);
                self.retired().remove(task_id);
                let _live = entry.insert(task);
                info!(task_id, filename = %filename, restart, "任务开始");
                self.presenter.show(task_id, filename, 0, STARTING_DETAIL)
            }
            (
                Transition::Advance,
                EventKind::Progress {
                    progress_percent,
                    speed_label,
                },
                Entry::Occupied(mut live),
            ) => {
                let task = live.get_mut();
                task.progress_percent = lifecycle::clamp_progress(*progress_percent);
                task.speed_label = speed_label.clone();
                debug!(task_id, progress = task.progress_percent, speed = %task.speed_label, "任务进度");
                self.presenter.show(
                    task_id,
                    &task.filename,
                    task.progress_percent,
                    &task.speed_label,
                )
            }
            (Transition::Finish, _, Entry::Occupied(live)) => {
                let task = live.remove();
                self.retired().insert(task_id);
                info!(task_id, filename = %task.filename, "任务结束");
                self.presenter.release(task_id);
                Ok(())
            }
            (Transition::Ignore(anomaly), _, _) => {
                warn!(task_id, "{}，忽略", anomaly);
                Ok(())
            }
            (transition, kind, _) => {
                debug!(task_id, event = kind.name(), ?transition, "任务已结束，忽略事件");
                Ok(())
            }
        };

        Applied {
            task_id,
            previous,
            state: transition.next_state(previous),
            transition,
            presentation,
        }
    }

    pub fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.get(&task_id).map(|t| t.value().clone())
    }

    pub fn state_of(&self, task_id: TaskId) -> TaskState {
        if self.tasks.contains_key(&task_id) {
            TaskState::Active
        } else if self.retired().contains(task_id) {
            TaskState::Terminated
        } else {
            TaskState::Idle
        }
    }

    /// 活跃任务快照，按首次 Start 的顺序
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 终止所有任务并释放它们的通知，返回被终止的任务ID
    pub fn clear(&self) -> Vec<TaskId> {
        let ids: Vec<TaskId> = self.list().into_iter().map(|t| t.id).collect();
        for &task_id in &ids {
            if self.tasks.remove(&task_id).is_some() {
                self.retired().insert(task_id);
                self.presenter.release(task_id);
            }
        }
        ids
    }
}
