//! Copymanga Downloader（拷贝漫画下载器）Rust 实现。
//!
//! 本 crate 负责：配置加载、命令行交互、章节下载调度、接口解析与打包导出（cbz/zip/epub）。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/文件工具等基础设施
//! - `network_parser`：接口客户端与响应解析
//! - `download`：账号池、图片下载、单章流水线与任务队列
//! - `packager`：ComicInfo.xml 与 cbz/zip/epub 打包
//! - `ui`：命令行子命令

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod base_system;
mod download;
mod network_parser;
mod packager;
mod ui;

use base_system::config::{load_or_create, resolve_path};
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use tracing::info;
use ui::cli::DownloadRequest;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "copymanga-downloader", version)]
#[command(about = "Copymanga Downloader (Rust CLI)")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件，方便 Docker 挂载）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 按关键字搜索作品
    Search {
        keyword: String,
        /// 结果页码，从 1 开始
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// 查看作品信息与章节列表
    Info {
        /// 作品 path_word 或作品页链接
        path_word: String,
    },
    /// 下载章节
    Download {
        /// 作品 path_word 或作品页链接
        path_word: String,
        /// 章节选择，如 `1-5,8`（从 1 开始）
        #[arg(long, conflicts_with = "all")]
        chapters: Option<String>,
        /// 下载全部章节
        #[arg(long, default_value_t = false)]
        all: bool,
        /// 打包格式：cbz / zip / epub
        #[arg(long)]
        format: Option<String>,
        /// 文件命名：title / index-title / 02d-index-title / 03d-index-title
        #[arg(long)]
        naming: Option<String>,
        /// 输出目录，覆盖配置中的 output_path
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config_path = resolve_path::<Config>(None, data_dir);
    let config = load_or_create::<Config>(&config_path).map_err(|e| anyhow!(e.to_string()))?;

    match cli.command {
        Command::Search { keyword, page } => ui::cli::search(&config, &keyword, page),
        Command::Info { path_word } => ui::cli::info(&config, &path_word),
        Command::Download {
            path_word,
            chapters,
            all,
            format,
            naming,
            output,
        } => {
            let req = DownloadRequest {
                path_word,
                chapters,
                all,
                format,
                naming,
                output,
            };
            ui::cli::download(&config, &config_path, &req)
        }
    }
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
