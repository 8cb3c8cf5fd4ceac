//! `ComicInfo.xml`（ComicRack 元数据），随 cbz 一起打包。

use std::fmt::Write as _;
use std::path::Path;

use super::markup::escape_markup;
use crate::base_system::fs_utils::write_atomic;
use crate::download::error::DownloadError;
use crate::download::models::{ChapterDescriptor, WorkMetadata};

pub(crate) const COMIC_INFO_FILE: &str = "ComicInfo.xml";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ComicInfo {
    pub series: String,
    pub writer: String,
    pub publisher: String,
    pub genre: String,
    pub summary: String,
    pub title: String,
    pub number: String,
    pub volume: String,
    pub page_count: String,
}

impl ComicInfo {
    pub fn new(work: &WorkMetadata, chapter: &ChapterDescriptor, page_count: usize) -> Self {
        Self {
            series: work.title.clone(),
            writer: work.authors.clone(),
            publisher: String::new(),
            genre: work.genres.clone(),
            summary: work.synopsis.clone(),
            title: chapter.name.clone(),
            number: (chapter.index + 1).to_string(),
            volume: String::new(),
            page_count: page_count.to_string(),
        }
    }

    pub fn to_xml(&self) -> String {
        let fields = [
            ("Series", &self.series),
            ("Writer", &self.writer),
            ("Publisher", &self.publisher),
            ("Genre", &self.genre),
            ("Summary", &self.summary),
            ("Title", &self.title),
            ("Number", &self.number),
            ("Volume", &self.volume),
            ("PageCount", &self.page_count),
        ];
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo>\n");
        for (tag, value) in fields {
            let _ = writeln!(out, "  <{tag}>{}</{tag}>", escape_markup(value));
        }
        out.push_str("</ComicInfo>\n");
        out
    }

    pub fn write_to(&self, dir: &Path) -> Result<(), DownloadError> {
        let path = dir.join(COMIC_INFO_FILE);
        write_atomic(&path, self.to_xml().as_bytes())
            .map_err(|e| DownloadError::packaging(path.display(), e))
    }
}

/// 从 XML 文本中取出单个标签的值（未反转义）。只用于读回自己写的文件。
#[cfg(test)]
pub(crate) fn read_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}
