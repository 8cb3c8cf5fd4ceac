//! 单章流水线：解析图片地址 → 并发下载 → 打包。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel as channel;
use tracing::{error, info, warn};

use super::credentials::CredentialPool;
use super::error::DownloadError;
use super::models::{ChapterJob, JobState};
use super::page_fetcher::{PageFetcher, page_file_name};
use crate::network_parser::ComicApi;
use crate::packager;

pub struct ChapterPipeline {
    api: Arc<dyn ComicApi>,
    pool: Arc<CredentialPool>,
    fetcher: PageFetcher,
    /// 地址解析（含注册/登录）同一时间只允许一个章节进行
    resolve_lock: Mutex<()>,
    page_workers: usize,
}

impl ChapterPipeline {
    pub fn new(
        api: Arc<dyn ComicApi>,
        pool: Arc<CredentialPool>,
        fetcher: PageFetcher,
        page_workers: usize,
    ) -> Self {
        Self {
            api,
            pool,
            fetcher,
            resolve_lock: Mutex::new(()),
            page_workers: page_workers.max(1),
        }
    }

    /// 跑完一个章节。每次图片完成或状态变化都会调用 `on_progress`，可能来自多个线程。
    pub fn run(
        &self,
        job: &ChapterJob,
        on_progress: &(dyn Fn(&ChapterJob) + Sync),
    ) -> Result<PathBuf, DownloadError> {
        let result = self.run_stages(job, on_progress);
        if let Err(err) = &result {
            error!(
                target: "download",
                "章节失败 [{}] {}: {err}",
                job.work.title, job.chapter.name
            );
            job.set_state(JobState::Failed);
            on_progress(job);
        }
        result
    }

    fn run_stages(
        &self,
        job: &ChapterJob,
        on_progress: &(dyn Fn(&ChapterJob) + Sync),
    ) -> Result<PathBuf, DownloadError> {
        job.set_state(JobState::ResolvingUrls);
        on_progress(job);
        let urls = self.resolve_urls(job)?;

        let staging = job.staging_dir();
        fs::create_dir_all(&staging).map_err(|e| DownloadError::packaging(staging.display(), e))?;

        job.set_state(JobState::Downloading);
        on_progress(job);
        let failed = self.download_pages(job, &urls, &staging, on_progress);
        if failed > 0 {
            warn!(
                target: "download",
                "[{}] {} 有 {failed}/{} 张图片下载失败，仍然打包",
                job.work.title,
                job.chapter.name,
                urls.len()
            );
        }

        job.set_state(JobState::Packaging);
        on_progress(job);
        let dest = packager::package(job)?;

        job.set_state(JobState::Done);
        on_progress(job);
        info!(target: "download", "章节完成: {}", dest.display());
        Ok(dest)
    }

    fn resolve_urls(&self, job: &ChapterJob) -> Result<Vec<String>, DownloadError> {
        let _guard = self.resolve_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.pool.acquire(self.api.as_ref(), |token| {
            self.api
                .page_urls(&job.work.path_word, &job.chapter.uuid, token)
        })
    }

    /// 固定数量的工作线程从队列取图片下载；返回失败张数。
    fn download_pages(
        &self,
        job: &ChapterJob,
        urls: &[String],
        staging: &Path,
        on_progress: &(dyn Fn(&ChapterJob) + Sync),
    ) -> usize {
        let total = urls.len();
        let (tx, rx) = channel::unbounded::<(usize, &str)>();
        for (index, url) in urls.iter().enumerate() {
            let _ = tx.send((index, url.as_str()));
        }
        drop(tx);

        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let workers = self.page_workers.min(total).max(1);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let rx = rx.clone();
                let completed = &completed;
                let failed = &failed;
                s.spawn(move || {
                    for (index, url) in rx.iter() {
                        let dest = staging.join(page_file_name(index, url));
                        if self.fetcher.fetch(self.api.as_ref(), url, &dest).is_err() {
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        job.record_progress(done, total);
                        on_progress(job);
                    }
                });
            }
        });

        failed.load(Ordering::SeqCst)
    }
}
