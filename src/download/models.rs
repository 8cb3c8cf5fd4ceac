//! 下载相关的数据模型定义。
//!
//! 包含作品元数据、章节描述、账号、打包格式、章节任务与进度快照。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

impl Credential {
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// 作品元数据，获取后不再修改，由同一作品的所有章节任务共享。
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkMetadata {
    pub path_word: String,
    pub title: String,
    /// 作者列表，以 `", "` 连接
    pub authors: String,
    pub synopsis: String,
    /// 题材列表，以 `", "` 连接
    pub genres: String,
    pub cover: String,
}

impl WorkMetadata {
    pub fn genre_list(&self) -> Vec<String> {
        self.genres
            .split(", ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterDescriptor {
    /// 按接口返回顺序分配，从 0 开始
    pub index: usize,
    pub uuid: String,
    pub name: String,
    /// 接口给出的 `count` 提示值，仅展示用
    pub count_hint: u64,
    /// 接口给出的 `size`（页数）提示值，仅展示用
    pub size_hint: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub path_word: String,
    pub authors: String,
    pub cover: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// 带 ComicInfo.xml 的漫画压缩包
    Cbz,
    Zip,
    Epub,
}

impl ArchiveFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cbz" => Some(Self::Cbz),
            "zip" => Some(Self::Zip),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Cbz => "cbz",
            Self::Zip => "zip",
            Self::Epub => "epub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStyle {
    Title,
    /// `003-标题`
    Index3Title,
    /// `03-标题`
    Index2Title,
    /// `3-标题`
    IndexTitle,
}

impl NamingStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "title" => Some(Self::Title),
            "03d-index-title" => Some(Self::Index3Title),
            "02d-index-title" => Some(Self::Index2Title),
            "index-title" => Some(Self::IndexTitle),
            _ => None,
        }
    }

    /// 章节文件夹名；前缀是从 0 开始的章节下标，与 ComicInfo 的 Number（index + 1）不同。
    pub fn folder_name(self, index: usize, safe_title: &str) -> String {
        match self {
            Self::Title => safe_title.to_string(),
            Self::Index3Title => format!("{index:03}-{safe_title}"),
            Self::Index2Title => format!("{index:02}-{safe_title}"),
            Self::IndexTitle => format!("{index}-{safe_title}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub root: PathBuf,
    pub format: ArchiveFormat,
    pub naming: NamingStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    ResolvingUrls,
    Downloading,
    Packaging,
    Done,
    Failed,
}

/// 一个章节的下载任务。
///
/// 进度只增不减；多个下载线程并发上报时以最大值为准。
#[derive(Debug)]
pub struct ChapterJob {
    pub id: u64,
    pub work: Arc<WorkMetadata>,
    pub chapter: ChapterDescriptor,
    pub output: OutputOptions,
    progress: AtomicU8,
    state: Mutex<JobState>,
}

impl ChapterJob {
    pub fn new(
        id: u64,
        work: Arc<WorkMetadata>,
        chapter: ChapterDescriptor,
        output: OutputOptions,
    ) -> Self {
        Self {
            id,
            work,
            chapter,
            output,
            progress: AtomicU8::new(0),
            state: Mutex::new(JobState::Pending),
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// 记录 `done / total` 的整数百分比，返回记录后的进度。
    ///
    /// 整数除法向下取整，只有 `done == total` 时才会得到 100。
    pub fn record_progress(&self, done: usize, total: usize) -> u8 {
        let pct = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u8
        };
        let prev = self.progress.fetch_max(pct, Ordering::SeqCst);
        prev.max(pct)
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, state: JobState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// 可以从活动列表中移除：进度满或已失败。
    pub fn is_settled(&self) -> bool {
        self.progress() >= 100 || self.state() == JobState::Failed
    }

    pub fn folder_name(&self) -> String {
        let safe_title = crate::base_system::context::safe_fs_name(&self.chapter.name, "_", 120);
        self.output.naming.folder_name(self.chapter.index, &safe_title)
    }

    /// `<root>/<series>/<chapter folder>`
    pub fn staging_dir(&self) -> PathBuf {
        let series = crate::base_system::context::safe_fs_name(&self.work.title, "_", 120);
        self.output.root.join(series).join(self.folder_name())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            series: self.work.title.clone(),
            chapter: self.chapter.name.clone(),
            index: self.chapter.index,
            state: self.state(),
            progress: self.progress(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: u64,
    pub series: String,
    pub chapter: String,
    pub index: usize,
    pub state: JobState,
    pub progress: u8,
}

/// 进度观察者：每次图片完成、状态变化、清理活动列表后收到完整的活动任务列表。
pub type ProgressObserver = Arc<dyn Fn(&[JobSnapshot]) + Send + Sync>;

#[cfg(test)]
pub(crate) fn test_job(id: u64, root: PathBuf, format: ArchiveFormat) -> ChapterJob {
    let work = Arc::new(WorkMetadata {
        path_word: "dandadan".to_string(),
        title: "胆大党".to_string(),
        authors: "龙幸伸".to_string(),
        synopsis: "超自然 & <战斗>".to_string(),
        genres: "冒险, 搞笑".to_string(),
        cover: String::new(),
    });
    let chapter = ChapterDescriptor {
        index: id as usize,
        uuid: format!("uuid-{id}"),
        name: format!("第{:02}话", id + 1),
        count_hint: 0,
        size_hint: 0,
    };
    ChapterJob::new(
        id,
        work,
        chapter,
        OutputOptions {
            root,
            format,
            naming: NamingStyle::Title,
        },
    )
}
