//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及账号池回写。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::{ConfigError, ConfigSpec, FieldMeta, load_or_create, write_with_comments};
use crate::download::models::{ArchiveFormat, Credential, NamingStyle};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 接口配置
    #[serde(default = "default_url_base")]
    pub url_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    // 保存配置
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_package_type")]
    pub package_type: String,
    #[serde(default = "default_naming_style")]
    pub naming_style: String,

    // 下载配置
    #[serde(default = "default_chapter_workers")]
    pub chapter_workers: usize,
    #[serde(default = "default_page_workers")]
    pub page_workers: usize,
    #[serde(default = "default_page_retry_limit")]
    pub page_retry_limit: u32,
    #[serde(default = "default_page_retry_delay_ms")]
    pub page_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub upgrade_image_quality: bool,

    // 账号池
    #[serde(default)]
    pub user_list: Vec<Credential>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_base: default_url_base(),
            request_timeout: default_request_timeout(),
            output_path: default_output_path(),
            package_type: default_package_type(),
            naming_style: default_naming_style(),
            chapter_workers: default_chapter_workers(),
            page_workers: default_page_workers(),
            page_retry_limit: default_page_retry_limit(),
            page_retry_delay_ms: default_page_retry_delay_ms(),
            upgrade_image_quality: default_true(),
            user_list: Vec::new(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "url_base",
                description: "接口域名（也可以写完整地址，如 http://127.0.0.1:8080）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "output_path",
                description: "保存路径",
            },
            FieldMeta {
                name: "package_type",
                description: "打包格式, 可选: [cbz, zip, epub]",
            },
            FieldMeta {
                name: "naming_style",
                description: "章节文件夹命名, 可选: [title, 03d-index-title, 02d-index-title, index-title]",
            },
            FieldMeta {
                name: "chapter_workers",
                description: "同时下载的章节数",
            },
            FieldMeta {
                name: "page_workers",
                description: "每章同时下载的图片数",
            },
            FieldMeta {
                name: "page_retry_limit",
                description: "单张图片最大尝试次数",
            },
            FieldMeta {
                name: "page_retry_delay_ms",
                description: "图片下载失败后的固定等待时间, 单位ms",
            },
            FieldMeta {
                name: "upgrade_image_quality",
                description: "是否把 c800x 图片地址替换为 c1500x 高清地址",
            },
            FieldMeta {
                name: "user_list",
                description: "自动注册的账号（程序维护，一般无需手动修改）",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn output_root(&self) -> PathBuf {
        if self.output_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.output_path)
        }
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        ArchiveFormat::parse(&self.package_type).unwrap_or_else(|| {
            warn!("未知的 package_type: {}，改用 cbz", self.package_type);
            ArchiveFormat::Cbz
        })
    }

    pub fn naming(&self) -> NamingStyle {
        NamingStyle::parse(&self.naming_style).unwrap_or_else(|| {
            warn!("未知的 naming_style: {}，改用 title", self.naming_style);
            NamingStyle::Title
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn page_retry_delay(&self) -> Duration {
        Duration::from_millis(self.page_retry_delay_ms)
    }
}

/// 把账号池写回配置文件，其余字段以磁盘上的内容为准。
pub fn save_users(path: &Path, users: &[Credential]) -> Result<(), ConfigError> {
    let mut on_disk: Config = load_or_create(path)?;
    on_disk.user_list = users.to_vec();
    write_with_comments(&on_disk, path)
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' => '：',
            '"' => '＂',
            '<' => '《',
            '>' => '》',
            '/' | '\\' => '、',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if (c as u32) < 32 => replacement.chars().next().unwrap_or('_'),
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_true() -> bool {
    true
}

fn default_url_base() -> String {
    "mangacopy.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_output_path() -> String {
    "./".to_string()
}

fn default_package_type() -> String {
    "cbz".to_string()
}

fn default_naming_style() -> String {
    "title".to_string()
}

fn default_chapter_workers() -> usize {
    2
}

fn default_page_workers() -> usize {
    16
}

fn default_page_retry_limit() -> u32 {
    50
}

fn default_page_retry_delay_ms() -> u64 {
    3000
}
