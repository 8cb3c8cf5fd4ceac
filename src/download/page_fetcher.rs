//! 单张图片下载：固定间隔重试 + 文件头校验 + 原子落盘。

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::DownloadError;
use crate::base_system::context::Config;
use crate::base_system::fs_utils::write_atomic;
use crate::network_parser::ComicApi;

const LOW_QUALITY_MARK: &str = ".c800x.";
const HIGH_QUALITY_MARK: &str = ".c1500x.";

#[derive(Debug, Clone)]
pub struct PageFetcher {
    pub attempts: u32,
    pub backoff: Duration,
    pub upgrade_quality: bool,
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self {
            attempts: 50,
            backoff: Duration::from_secs(3),
            upgrade_quality: true,
        }
    }
}

impl PageFetcher {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            attempts: cfg.page_retry_limit.max(1),
            backoff: cfg.page_retry_delay(),
            upgrade_quality: cfg.upgrade_image_quality,
        }
    }

    /// 下载 `url` 写入 `dest`。失败时 `dest` 不会被创建。
    pub fn fetch(&self, api: &dyn ComicApi, url: &str, dest: &Path) -> Result<(), DownloadError> {
        if url.trim().is_empty() {
            warn!(target: "download", "图片地址为空: {}", dest.display());
            return Err(DownloadError::DownloadFailed { url: url.to_string() });
        }
        let url = if self.upgrade_quality {
            upgrade_quality_url(url)
        } else {
            url.to_string()
        };
        let attempts = self.attempts.max(1);

        for attempt in 1..=attempts {
            let outcome = api.fetch_page(&url).and_then(|bytes| {
                if sniff_image(&bytes).is_none() {
                    return Err(DownloadError::Empty(format!(
                        "not an image ({} bytes)",
                        bytes.len()
                    )));
                }
                write_atomic(dest, &bytes)
                    .map_err(|e| DownloadError::Transport(format!("write {}: {e}", dest.display())))
            });

            match outcome {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(target: "download", "图片下载失败 ({attempt}/{attempts}) {url}: {err}");
                }
            }
            if attempt < attempts && !self.backoff.is_zero() {
                std::thread::sleep(self.backoff);
            }
        }

        warn!(target: "download", "图片重试耗尽: {url}");
        Err(DownloadError::DownloadFailed { url })
    }
}

/// 只替换第一处 `.c800x.`。
pub(crate) fn upgrade_quality_url(url: &str) -> String {
    url.replacen(LOW_QUALITY_MARK, HIGH_QUALITY_MARK, 1)
}

/// 根据文件头判断图片格式，返回扩展名；不是图片时返回 None。
pub(crate) fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }
    // ISO BMFF：`ftyp` 盒的主品牌与兼容品牌中出现 avif
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let end = box_len.clamp(12, bytes.len());
        if bytes[8..end].chunks_exact(4).any(|brand| brand == b"avif") {
            return Some("avif");
        }
    }
    None
}

/// 第 `index` 张（从 0 开始）图片的文件名：`001.jpg`。扩展名取自 URL 路径，取不到时用 jpg。
pub(crate) fn page_file_name(index: usize, url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    let ext = last
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());
    format!("{:03}.{}", index + 1, ext)
}
