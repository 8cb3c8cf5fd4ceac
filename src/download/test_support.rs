//! 测试用的假接口。

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::error::DownloadError;
use crate::network_parser::ComicApi;

pub(crate) const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

/// 记录同时进行的调用数及其峰值。
#[derive(Default)]
pub(crate) struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// 每章返回 `pages` 个图片地址；设置了 `required_token` 时匿名请求一律限速，
/// 登录返回该令牌。地址里含有 `broken` 中任一片段的图片返回网页而不是图片。
#[derive(Default)]
pub(crate) struct FakeComicApi {
    pub pages: usize,
    pub required_token: Option<String>,
    pub broken: Vec<String>,
    pub registers: AtomicUsize,
    pub logins: AtomicUsize,
    pub fetches: AtomicUsize,
    /// 每次解析地址/下载图片前等待的时间，用来拉长并发窗口
    pub resolve_delay: Duration,
    pub page_delay: Duration,
    pub resolving: Gauge,
    pub fetching: Gauge,
    /// 从某章第一张图开始下载到最后一张下载完，算作该章在进行中
    pub chapters: Gauge,
    pub chapter_pages: Mutex<HashMap<String, (usize, usize)>>,
}

impl FakeComicApi {
    pub fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }
}

impl ComicApi for FakeComicApi {
    fn page_urls(
        &self,
        path_word: &str,
        chapter_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>, DownloadError> {
        self.resolving.enter();
        std::thread::sleep(self.resolve_delay);
        self.resolving.leave();

        if let Some(required) = &self.required_token
            && token != Some(required.as_str())
        {
            return Err(DownloadError::RateLimited);
        }
        if chapter_id.starts_with("missing") {
            return Err(DownloadError::NotFound(chapter_id.to_string()));
        }
        Ok((1..=self.pages)
            .map(|i| format!("https://img.test/{path_word}/{chapter_id}/{i}.c800x.jpg"))
            .collect())
    }

    fn register(&self, _username: &str, _password: &str) -> Result<(), DownloadError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn login(&self, _username: &str, _password: &str) -> Result<String, DownloadError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.required_token
            .clone()
            .ok_or_else(|| DownloadError::AuthFailed("no token configured".into()))
    }

    fn fetch_page(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // `https://img.test/{path_word}/{chapter_id}/{i}...`
        let chapter = url.rsplit('/').nth(1).unwrap_or_default().to_string();
        {
            let mut pages = self.chapter_pages.lock().unwrap();
            let entry = pages.entry(chapter.clone()).or_default();
            if entry.0 == 0 {
                self.chapters.enter();
            }
            entry.0 += 1;
        }

        self.fetching.enter();
        std::thread::sleep(self.page_delay);
        self.fetching.leave();

        {
            let mut pages = self.chapter_pages.lock().unwrap();
            let entry = pages.entry(chapter).or_default();
            entry.1 += 1;
            if entry.1 == self.pages {
                self.chapters.leave();
            }
        }

        if self.broken.iter().any(|b| url.contains(b.as_str())) {
            return Ok(b"<html>503</html>".to_vec());
        }
        Ok(JPEG.to_vec())
    }
}
