//! 命令行交互：搜索、查看作品、下载章节。

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::info;

use crate::base_system::context::Config;
use crate::download::chapter::ChapterPipeline;
use crate::download::credentials::CredentialPool;
use crate::download::manager::DownloadManager;
use crate::download::models::{ArchiveFormat, ChapterDescriptor, NamingStyle, OutputOptions};
use crate::download::page_fetcher::PageFetcher;
use crate::download::progress::ProgressBoard;
use crate::network_parser::client::CopyClient;

/// `download` 子命令的参数。
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub path_word: String,
    /// `1-5,8` 形式，从 1 开始
    pub chapters: Option<String>,
    pub all: bool,
    pub format: Option<String>,
    pub naming: Option<String>,
    pub output: Option<PathBuf>,
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line)
}

static RE_RANGE: OnceLock<Regex> = OnceLock::new();
static RE_COMIC_URL: OnceLock<Regex> = OnceLock::new();

fn re_range() -> &'static Regex {
    RE_RANGE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*(?:-\s*(\d+))?\s*$").expect("compile RE_RANGE"))
}

fn re_comic_url() -> &'static Regex {
    RE_COMIC_URL
        .get_or_init(|| Regex::new(r"/comic/([A-Za-z0-9_-]+)").expect("compile RE_COMIC_URL"))
}

/// 作品页链接（`https://www.mangacopy.com/comic/dandadan`）或直接的 path_word。
pub(crate) fn parse_path_word(input: &str) -> String {
    let input = input.trim();
    re_comic_url()
        .captures(input)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| input.trim_matches('/').to_string())
}

/// 解析 `1-5,8` 形式的章节选择，返回去重排序后的 0 起下标。
pub(crate) fn parse_chapter_selection(spec: &str, total: usize) -> Result<Vec<usize>> {
    let mut picked = BTreeSet::new();
    for part in spec.split([',', '，']).filter(|p| !p.trim().is_empty()) {
        let caps = re_range()
            .captures(part)
            .ok_or_else(|| anyhow!("无法识别的章节范围: {}", part.trim()))?;
        let start: usize = caps[1].parse().context("章节编号过大")?;
        let end: usize = match caps.get(2) {
            Some(m) => m.as_str().parse().context("章节编号过大")?,
            None => start,
        };
        if start == 0 || end < start {
            bail!("章节范围无效: {}", part.trim());
        }
        if end > total {
            bail!("章节 {} 超出范围（共 {} 章）", end, total);
        }
        picked.extend(start - 1..end);
    }
    if picked.is_empty() {
        bail!("没有选择任何章节");
    }
    Ok(picked.into_iter().collect())
}

fn print_chapters(chapters: &[ChapterDescriptor]) {
    for c in chapters {
        if c.size_hint > 0 {
            println!("{:>4}. {} ({}P)", c.index + 1, c.name, c.size_hint);
        } else {
            println!("{:>4}. {}", c.index + 1, c.name);
        }
    }
}

pub fn search(config: &Config, keyword: &str, page: usize) -> Result<()> {
    let client = CopyClient::from_config(config).context("初始化客户端失败")?;
    let hits = client
        .search(keyword, page)
        .with_context(|| format!("搜索失败: {}", keyword))?;

    if hits.is_empty() {
        println!("未搜索到结果");
        return Ok(());
    }
    println!("\n===== 搜索结果（第 {} 页） =====", page.max(1));
    for (idx, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} | ID: {} | 作者: {}",
            idx + 1,
            hit.name,
            hit.path_word,
            hit.authors
        );
    }
    Ok(())
}

pub fn info(config: &Config, path_word: &str) -> Result<()> {
    let client = CopyClient::from_config(config).context("初始化客户端失败")?;
    let path_word = parse_path_word(path_word);
    let (meta, chapters) = client
        .work_overview(&path_word)
        .with_context(|| format!("获取作品信息失败: {}", path_word))?;

    println!("\n===== {} =====", meta.title);
    println!("作者: {}", meta.authors);
    println!("题材: {}", meta.genres);
    println!("简介: {}", meta.synopsis);
    println!("共 {} 章\n", chapters.len());
    print_chapters(&chapters);
    Ok(())
}

pub fn download(config: &Config, config_path: &Path, req: &DownloadRequest) -> Result<()> {
    let start_time = Instant::now();
    let client = CopyClient::from_config(config).context("初始化客户端失败")?;
    let path_word = parse_path_word(&req.path_word);
    let (meta, chapters) = client
        .work_overview(&path_word)
        .with_context(|| format!("获取作品信息失败: {}", path_word))?;
    if chapters.is_empty() {
        bail!("作品 {} 没有可下载的章节", path_word);
    }

    let indices = if req.all {
        (0..chapters.len()).collect()
    } else if let Some(spec) = &req.chapters {
        parse_chapter_selection(spec, chapters.len())?
    } else {
        println!("\n===== {} =====", meta.title);
        print_chapters(&chapters);
        let input = read_line("请输入要下载的章节（如 1-5,8；直接回车下载全部）：")?;
        if input.trim().is_empty() {
            (0..chapters.len()).collect()
        } else {
            parse_chapter_selection(&input, chapters.len())?
        }
    };

    let output = OutputOptions {
        root: req.output.clone().unwrap_or_else(|| config.output_root()),
        format: match &req.format {
            Some(f) => ArchiveFormat::parse(f).ok_or_else(|| anyhow!("不支持的格式: {f}"))?,
            None => config.archive_format(),
        },
        naming: match &req.naming {
            Some(n) => NamingStyle::parse(n).ok_or_else(|| anyhow!("不支持的命名方式: {n}"))?,
            None => config.naming(),
        },
    };

    info!(
        target: "download",
        "开始下载《{}》{} 章 → {}",
        meta.title,
        indices.len(),
        output.root.display()
    );

    let pool = Arc::new(CredentialPool::new(
        config.user_list.clone(),
        Some(config_path.to_path_buf()),
    ));
    let pipeline = ChapterPipeline::new(
        Arc::new(client),
        pool,
        PageFetcher::from_config(config),
        config.page_workers,
    );
    let board = Arc::new(ProgressBoard::new());
    let manager = DownloadManager::start(pipeline, config.chapter_workers, Some(board.observer()));
    manager.submit(Arc::new(meta), &chapters, &indices, &output);
    let report = manager.wait();
    board.finish();

    println!(
        "\n完成 {} 章，失败 {} 章，用时 {:.1}s",
        report.archives.len(),
        report.failures.len(),
        start_time.elapsed().as_secs_f64()
    );
    for (name, err) in &report.failures {
        println!("  失败: {} ({})", name, err);
    }
    if report.archives.is_empty() {
        bail!("没有章节下载成功");
    }
    Ok(())
}
