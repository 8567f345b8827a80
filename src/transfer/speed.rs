const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

/// 把速度格式化成通知里显示的文字，例如 "2.0MB/s"
pub fn format_speed(bytes_per_sec: f64) -> String {
    let mut value = if bytes_per_sec.is_finite() {
        bytes_per_sec.max(0.0)
    } else {
        0.0
    };
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{:.0}{}", value, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// 已下载字节数换算成百分比；总大小未知时为 0（不确定进度）
pub fn percent_of(downloaded: u64, total: u64) -> i64 {
    if total == 0 {
        return 0;
    }
    ((downloaded.saturating_mul(100)) / total).min(100) as i64
}
