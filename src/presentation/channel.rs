use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BridgeConfig;

static CHANNEL: OnceCell<NotificationChannel> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Min,
    #[default]
    Low,
    Default,
    High,
}

/// 进程级的通知渠道，执行端启动时初始化一次，运行期间不会重建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
}

impl NotificationChannel {
    pub fn init(config: &BridgeConfig) -> &'static NotificationChannel {
        let channel = CHANNEL.get_or_init(|| {
            info!(
                "创建通知渠道: {} ({}, {:?})",
                config.channel_id, config.channel_name, config.importance
            );
            NotificationChannel {
                id: config.channel_id.clone(),
                name: config.channel_name.clone(),
                importance: config.importance,
            }
        });

        if channel.id != config.channel_id {
            warn!(
                "通知渠道已初始化为 {}，忽略新的渠道配置 {}",
                channel.id, config.channel_id
            );
        }
        channel
    }

    pub fn get() -> Option<&'static NotificationChannel> {
        CHANNEL.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialises_once() {
        let first = NotificationChannel::init(&BridgeConfig::default());
        let other = BridgeConfig {
            channel_id: "Other".to_string(),
            ..BridgeConfig::default()
        };
        let second = NotificationChannel::init(&other);

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.id, "DownloadServiceChannel");
        assert_eq!(NotificationChannel::get(), Some(first));
    }
}
