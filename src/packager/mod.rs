//! 章节打包：暂存目录 → cbz / zip / epub，成功后删除暂存目录。
//!
//! 子模块：
//! - `archive`    — 目录原样压缩
//! - `comic_info` — cbz 附带的 ComicInfo.xml
//! - `epub`       — 图片型 EPUB 3
//! - `markup`     — XML 文本转义

pub(crate) mod archive;
pub(crate) mod comic_info;
pub(crate) mod epub;
pub(crate) mod markup;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::base_system::fs_utils::{list_files_sorted, remove_dir_logged};
use crate::download::error::DownloadError;
use crate::download::models::{ArchiveFormat, ChapterJob};
use comic_info::{COMIC_INFO_FILE, ComicInfo};
use epub::EpubMetadata;

/// `<dir>` → `<dir>.<ext>`；不用 `with_extension`，章节名里可能有 `.`。
pub(crate) fn archive_path(staging: &Path, format: ArchiveFormat) -> PathBuf {
    let mut name = OsString::from(staging.as_os_str());
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// 暂存目录中的图片文件（按文件名排序），忽略元数据与下载中的临时文件。
pub(crate) fn page_files(staging: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    let files =
        list_files_sorted(staging).map_err(|e| DownloadError::packaging(staging.display(), e))?;
    Ok(files
        .into_iter()
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name != COMIC_INFO_FILE && !name.ends_with("part")
        })
        .collect())
}

/// 按任务的打包格式打包其暂存目录，返回生成的文件路径。
pub fn package(job: &ChapterJob) -> Result<PathBuf, DownloadError> {
    let staging = job.staging_dir();
    let format = job.output.format;
    let dest = archive_path(&staging, format);
    let pages = page_files(&staging)?;

    match format {
        ArchiveFormat::Cbz => {
            ComicInfo::new(&job.work, &job.chapter, pages.len()).write_to(&staging)?;
            archive::zip_dir(&staging, &dest)?;
        }
        ArchiveFormat::Zip => archive::zip_dir(&staging, &dest)?,
        ArchiveFormat::Epub => {
            let meta = EpubMetadata::new(&job.work, &job.chapter);
            epub::write_epub(&meta, &staging, &pages, &dest)?;
        }
    }

    remove_dir_logged(&staging);
    info!(target: "package", "已打包 {}", dest.display());
    Ok(dest)
}
