use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use super::channel::NotificationChannel;
use super::error::PresentationError;
use super::surface::{Notification, NotificationSurface, ProgressMode};
use crate::bridge::envelope::TaskId;

/// 每个活跃任务最多持有一条通知
pub struct PresentationAdapter {
    surface: Box<dyn NotificationSurface>,
    channel: &'static NotificationChannel,
    entries: DashMap<TaskId, Notification>,
}

impl PresentationAdapter {
    pub fn new(surface: Box<dyn NotificationSurface>, channel: &'static NotificationChannel) -> Self {
        Self {
            surface,
            channel,
            entries: DashMap::new(),
        }
    }

    /// 显示或原地更新任务的通知
    pub fn show(
        &self,
        task_id: TaskId,
        title: &str,
        progress_percent: u8,
        detail_text: &str,
    ) -> Result<(), PresentationError> {
        let mut notification = Notification::new(
            task_id,
            &self.channel.id,
            title,
            detail_text,
            ProgressMode::from_percent(progress_percent),
        );

        match self.entries.entry(task_id) {
            Entry::Occupied(mut live) => {
                notification.when = live.get().when;
                self.surface.update(&notification).inspect_err(|e| {
                    warn!("更新通知失败: {}", e);
                })?;
                live.insert(notification);
            }
            Entry::Vacant(slot) => {
                self.surface.post(&notification).inspect_err(|e| {
                    warn!("发布通知失败: {}", e);
                })?;
                debug!("发布通知: 任务 {}", task_id);
                slot.insert(notification);
            }
        }
        Ok(())
    }

    /// 释放任务的通知；重复释放或从未显示过时什么都不做
    pub fn release(&self, task_id: TaskId) {
        if self.entries.remove(&task_id).is_some() {
            self.surface.cancel(task_id);
            debug!("释放通知: 任务 {}", task_id);
        }
    }

    pub fn is_live(&self, task_id: TaskId) -> bool {
        self.entries.contains_key(&task_id)
    }

    pub fn entry(&self, task_id: TaskId) -> Option<Notification> {
        self.entries.get(&task_id).map(|n| n.value().clone())
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}
