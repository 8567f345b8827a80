use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use super::error::PresentationError;
use super::surface::{Notification, NotificationSurface, ProgressMode};
use crate::bridge::envelope::TaskId;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}";
const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// 用 indicatif 进度条在终端上绘制通知
pub struct TerminalSurface {
    multi: MultiProgress,
    bars: DashMap<TaskId, ProgressBar>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: DashMap::new(),
        }
    }

    fn style_for(task_id: TaskId, mode: ProgressMode) -> Result<ProgressStyle, PresentationError> {
        let template = match mode {
            ProgressMode::Indeterminate => SPINNER_TEMPLATE,
            ProgressMode::Determinate(_) => BAR_TEMPLATE,
        };
        ProgressStyle::with_template(template)
            .map(|style| style.progress_chars("#>-"))
            .map_err(|e| PresentationError::Unavailable {
                task_id,
                reason: format!("进度条模板错误: {}", e),
            })
    }

    fn render(bar: &ProgressBar, notification: &Notification, style: ProgressStyle) {
        bar.set_style(style);
        bar.set_prefix(notification.title.clone());
        bar.set_message(notification.detail.clone());
        match notification.progress {
            ProgressMode::Indeterminate => bar.enable_steady_tick(Duration::from_millis(120)),
            ProgressMode::Determinate(percent) => {
                bar.disable_steady_tick();
                bar.set_position(u64::from(percent));
            }
        }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSurface for TerminalSurface {
    fn post(&self, notification: &Notification) -> Result<(), PresentationError> {
        let style = Self::style_for(notification.task_id, notification.progress)?;
        let bar = self.multi.add(ProgressBar::new(100));
        Self::render(&bar, notification, style);
        self.bars.insert(notification.task_id, bar);
        Ok(())
    }

    fn update(&self, notification: &Notification) -> Result<(), PresentationError> {
        let style = Self::style_for(notification.task_id, notification.progress)?;
        match self.bars.get(&notification.task_id) {
            Some(bar) => {
                Self::render(bar.value(), notification, style);
                Ok(())
            }
            // 进度条被外部移除了，重新发布
            None => self.post(notification),
        }
    }

    fn cancel(&self, task_id: TaskId) {
        if let Some((_, bar)) = self.bars.remove(&task_id) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}
