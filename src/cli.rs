use clap::Parser;
use std::path::PathBuf;

/// 后台下载 + 进度通知
#[derive(Parser, Debug)]
#[command(name = "dlbridge")]
#[command(version = "0.1")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "在后台下载文件，并用常驻进度条显示进度", long_about = None)]
pub struct Cli {
    /// 下载链接
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub url: String,

    /// 保存的文件名 (默认取URL最后一段)
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// 任务ID
    #[arg(long, default_value_t = 1)]
    pub id: i64,

    /// 文件保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,

    #[arg(long, value_name = "MS")]
    pub progress_interval_ms: Option<u64>,

    /// 不显示终端进度条
    #[arg(long)]
    pub headless: bool,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
