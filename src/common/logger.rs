use colored::*;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing；RUST_LOG 存在时优先使用
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 漂亮的控制台输出
pub struct PrettyLogger;

impl PrettyLogger {
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示任务信息
    pub fn task_info(task_id: i64, filename: impl AsRef<str>) {
        println!(
            "{} {} #{}",
            "⬇".blue().bold(),
            filename.as_ref().bold(),
            task_id.to_string().cyan()
        );
    }

    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }
}
