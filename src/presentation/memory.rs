use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use super::error::PresentationError;
use super::surface::{Notification, NotificationSurface};
use crate::bridge::envelope::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceCall {
    Post(TaskId),
    Update(TaskId),
    Cancel(TaskId),
}

/// 不绘制任何东西的通知界面：无终端时使用，同时记录所有调用
#[derive(Debug, Default)]
pub struct MemorySurface {
    live: DashMap<TaskId, Notification>,
    calls: Mutex<Vec<SurfaceCall>>,
    denied: AtomicBool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟平台拒绝显示通知
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn live(&self, task_id: TaskId) -> Option<Notification> {
        self.live.get(&task_id).map(|n| n.value().clone())
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn check(&self, task_id: TaskId) -> Result<(), PresentationError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(PresentationError::Unavailable {
                task_id,
                reason: "平台拒绝显示通知".to_string(),
            });
        }
        Ok(())
    }
}

impl NotificationSurface for MemorySurface {
    fn post(&self, notification: &Notification) -> Result<(), PresentationError> {
        self.check(notification.task_id)?;
        self.record(SurfaceCall::Post(notification.task_id));
        self.live.insert(notification.task_id, notification.clone());
        Ok(())
    }

    fn update(&self, notification: &Notification) -> Result<(), PresentationError> {
        self.check(notification.task_id)?;
        self.record(SurfaceCall::Update(notification.task_id));
        self.live.insert(notification.task_id, notification.clone());
        Ok(())
    }

    fn cancel(&self, task_id: TaskId) {
        self.record(SurfaceCall::Cancel(task_id));
        self.live.remove(&task_id);
    }
}

// 测试需要在交出界面之后继续观察它
impl NotificationSurface for Arc<MemorySurface> {
    fn post(&self, notification: &Notification) -> Result<(), PresentationError> {
        self.as_ref().post(notification)
    }

    fn update(&self, notification: &Notification) -> Result<(), PresentationError> {
        self.as_ref().update(notification)
    }

    fn cancel(&self, task_id: TaskId) {
        self.as_ref().cancel(task_id)
    }
}
