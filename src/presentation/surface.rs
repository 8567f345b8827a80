use chrono::{DateTime, Local};

use super::error::PresentationError;
use crate::bridge::envelope::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Indeterminate,
    Determinate(u8),
}

impl ProgressMode {
    /// 0 表示还不知道进度
    pub fn from_percent(progress_percent: u8) -> Self {
        match progress_percent {
            0 => ProgressMode::Indeterminate,
            p => ProgressMode::Determinate(p.min(100)),
        }
    }
}

/// 点击通知时的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    OpenInitiator,
}

/// 一条常驻、可更新、只能由应用移除的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub task_id: TaskId,
    pub channel_id: String,
    pub title: String,
    pub detail: String,
    pub progress: ProgressMode,
    pub ongoing: bool,
    pub only_alert_once: bool,
    pub tap_action: TapAction,
    pub when: DateTime<Local>,
}

impl Notification {
    pub fn new(
        task_id: TaskId,
        channel_id: &str,
        title: &str,
        detail: &str,
        progress: ProgressMode,
    ) -> Self {
        Self {
            task_id,
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            detail: detail.to_string(),
            progress,
            ongoing: true,
            only_alert_once: true,
            tap_action: TapAction::OpenInitiator,
            when: Local::now(),
        }
    }
}

/// 平台提供的通知界面
pub trait NotificationSurface: Send + Sync {
    fn post(&self, notification: &Notification) -> Result<(), PresentationError>;

    /// 更新已存在的通知，保持同一个视觉实体
    fn update(&self, notification: &Notification) -> Result<(), PresentationError>;

    fn cancel(&self, task_id: TaskId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_percent_is_indeterminate() {
        assert_eq!(ProgressMode::from_percent(0), ProgressMode::Indeterminate);
        assert_eq!(ProgressMode::from_percent(1), ProgressMode::Determinate(1));
        assert_eq!(ProgressMode::from_percent(100), ProgressMode::Determinate(100));
    }
}
