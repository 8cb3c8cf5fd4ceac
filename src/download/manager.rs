//! 作品级调度：一个无界任务队列 + 固定数量的章节工作线程。
//!
//! 活动任务列表按提交顺序保存，用于进度展示；只从队首清理已结束的任务。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel as channel;
use tracing::{debug, warn};

use super::chapter::ChapterPipeline;
use super::models::{
    ChapterDescriptor, ChapterJob, JobSnapshot, OutputOptions, ProgressObserver, WorkMetadata,
};

/// 从队首开始移除已结束的任务，遇到第一个未结束的任务即停止。
pub(crate) fn evict_settled_prefix(active: &mut Vec<Arc<ChapterJob>>) -> usize {
    let settled = active.iter().take_while(|job| job.is_settled()).count();
    active.drain(..settled);
    settled
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub archives: Vec<PathBuf>,
    /// `(章节名, 错误信息)`
    pub failures: Vec<(String, String)>,
}

struct Shared {
    pipeline: ChapterPipeline,
    active: Mutex<Vec<Arc<ChapterJob>>>,
    observer: Option<ProgressObserver>,
    report: Mutex<DownloadReport>,
}

impl Shared {
    /// 在锁外通知观察者，避免进度上报被阻塞在列表锁上。
    fn publish(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        let snapshots: Vec<JobSnapshot> = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.iter().map(|job| job.snapshot()).collect()
        };
        observer(&snapshots);
    }

    fn run_job(&self, job: &ChapterJob) {
        let on_progress = |_: &ChapterJob| self.publish();
        let outcome = self.pipeline.run(job, &on_progress);
        {
            let mut report = self.report.lock().unwrap_or_else(|e| e.into_inner());
            match outcome {
                Ok(path) => report.archives.push(path),
                Err(err) => report
                    .failures
                    .push((job.chapter.name.clone(), err.to_string())),
            }
        }

        let evicted = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            evict_settled_prefix(&mut active)
        };
        if evicted > 0 {
            debug!(target: "download", "活动列表移除 {evicted} 个已结束任务");
        }
        self.publish();
    }
}

pub struct DownloadManager {
    tx: Option<channel::Sender<Arc<ChapterJob>>>,
    fallback: Option<channel::Receiver<Arc<ChapterJob>>>,
    handles: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl DownloadManager {
    pub fn start(
        pipeline: ChapterPipeline,
        chapter_workers: usize,
        observer: Option<ProgressObserver>,
    ) -> Self {
        let shared = Arc::new(Shared {
            pipeline,
            active: Mutex::new(Vec::new()),
            observer,
            report: Mutex::new(DownloadReport::default()),
        });
        let (tx, rx) = channel::unbounded::<Arc<ChapterJob>>();

        let workers = chapter_workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("chapter-{i}"))
                .spawn(move || {
                    for job in rx.iter() {
                        shared.run_job(&job);
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(target: "download", "无法启动章节线程: {err}"),
            }
        }
        // 一个线程都起不来时，由 wait() 在调用线程上排空队列
        let fallback = if handles.is_empty() {
            warn!(target: "download", "章节线程全部启动失败，改为顺序下载");
            Some(rx)
        } else {
            None
        };

        Self {
            tx: Some(tx),
            fallback,
            handles,
            shared,
            next_id: AtomicU64::new(0),
        }
    }

    /// 为 `chapters` 中下标为 `indices` 的章节创建任务并入队，返回任务 id。越界的下标被忽略。
    pub fn submit(
        &self,
        work: Arc<WorkMetadata>,
        chapters: &[ChapterDescriptor],
        indices: &[usize],
        output: &OutputOptions,
    ) -> Vec<u64> {
        let mut ids = Vec::with_capacity(indices.len());
        let mut jobs = Vec::with_capacity(indices.len());
        for &i in indices {
            let Some(chapter) = chapters.get(i) else {
                warn!(target: "download", "章节下标越界: {i}（共 {} 章）", chapters.len());
                continue;
            };
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            jobs.push(Arc::new(ChapterJob::new(
                id,
                Arc::clone(&work),
                chapter.clone(),
                output.clone(),
            )));
            ids.push(id);
        }

        // 先进入活动列表再入队，保证展示顺序与提交顺序一致
        self.shared
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(jobs.iter().cloned());
        if let Some(tx) = &self.tx {
            for job in jobs {
                let _ = tx.send(job);
            }
        }
        self.shared.publish();
        ids
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.shared
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|job| job.snapshot())
            .collect()
    }

    /// 关闭队列并等待所有已提交的任务结束。
    pub fn wait(mut self) -> DownloadReport {
        drop(self.tx.take());
        if let Some(rx) = self.fallback.take() {
            for job in rx.iter() {
                self.shared.run_job(&job);
            }
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!(target: "download", "章节线程异常退出");
            }
        }
        std::mem::take(&mut *self.shared.report.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::credentials::CredentialPool;
    use crate::download::models::{ArchiveFormat, JobState, NamingStyle, test_job};
    use crate::download::page_fetcher::PageFetcher;
    use crate::download::test_support::FakeComicApi;
    use std::time::Duration;

    fn job_at(id: u64, progress: usize) -> Arc<ChapterJob> {
        let job = test_job(id, PathBuf::from("."), ArchiveFormat::Zip);
        job.record_progress(progress, 100);
        Arc::new(job)
    }

    #[test]
    fn eviction_stops_at_first_unfinished_job() {
        let mut active = vec![job_at(1, 100), job_at(2, 100), job_at(3, 40), job_at(4, 100)];
        assert_eq!(evict_settled_prefix(&mut active), 2);
        let left: Vec<u8> = active.iter().map(|j| j.progress()).collect();
        assert_eq!(left, vec![40, 100]);
        let ids: Vec<u64> = active.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn failed_job_does_not_block_the_list() {
        let failed = job_at(1, 0);
        failed.set_state(JobState::Failed);
        let mut active = vec![failed, job_at(2, 100), job_at(3, 10)];
        evict_settled_prefix(&mut active);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 3);
    }

    #[test]
    fn submitted_chapters_are_downloaded_and_drained() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeComicApi::with_pages(3));
        let pipeline = ChapterPipeline::new(
            api,
            Arc::new(CredentialPool::new(Vec::new(), None)),
            PageFetcher {
                attempts: 1,
                backoff: Duration::ZERO,
                upgrade_quality: true,
            },
            4,
        );

        let published = Arc::new(Mutex::new(Vec::<Vec<JobSnapshot>>::new()));
        let sink = Arc::clone(&published);
        let observer: ProgressObserver =
            Arc::new(move |jobs: &[JobSnapshot]| sink.lock().unwrap().push(jobs.to_vec()));
        let manager = DownloadManager::start(pipeline, 2, Some(observer));

        let work = Arc::new(WorkMetadata {
            path_word: "dandadan".to_string(),
            title: "胆大党".to_string(),
            ..WorkMetadata::default()
        });
        let chapters: Vec<ChapterDescriptor> = (0..4)
            .map(|i| ChapterDescriptor {
                index: i,
                uuid: format!("c{i}"),
                name: format!("第{}话", i + 1),
                ..ChapterDescriptor::default()
            })
            .collect();
        let output = OutputOptions {
            root: dir.path().to_path_buf(),
            format: ArchiveFormat::Cbz,
            naming: NamingStyle::Index3Title,
        };

        let ids = manager.submit(work, &chapters, &[0, 2, 3, 9], &output);
        assert_eq!(ids, vec![1, 2, 3]);

        let report = manager.wait();
        assert_eq!(report.archives.len(), 3);
        assert!(report.failures.is_empty());
        let series = dir.path().join("胆大党");
        for name in ["000-第1话.cbz", "002-第3话.cbz", "003-第4话.cbz"] {
            assert!(series.join(name).exists(), "{name} missing");
        }
        assert!(!series.join("001-第2话.cbz").exists());

        let published = published.lock().unwrap();
        assert!(published.iter().any(|jobs| jobs.len() == 3));
        assert!(published.iter().any(Vec::is_empty));
    }

    #[test]
    fn chapters_in_flight_never_exceed_chapter_workers() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeComicApi {
            pages: 4,
            page_delay: Duration::from_millis(5),
            ..FakeComicApi::default()
        });
        let pipeline = ChapterPipeline::new(
            api.clone(),
            Arc::new(CredentialPool::new(Vec::new(), None)),
            PageFetcher {
                attempts: 1,
                backoff: Duration::ZERO,
                upgrade_quality: false,
            },
            4,
        );
        let manager = DownloadManager::start(pipeline, 2, None);

        let work = Arc::new(WorkMetadata {
            path_word: "dandadan".to_string(),
            title: "胆大党".to_string(),
            ..WorkMetadata::default()
        });
        let chapters: Vec<ChapterDescriptor> = (0..8)
            .map(|i| ChapterDescriptor {
                index: i,
                uuid: format!("c{i}"),
                name: format!("第{}话", i + 1),
                ..ChapterDescriptor::default()
            })
            .collect();
        let output = OutputOptions {
            root: dir.path().to_path_buf(),
            format: ArchiveFormat::Zip,
            naming: NamingStyle::Title,
        };
        let indices: Vec<usize> = (0..8).collect();
        manager.submit(work, &chapters, &indices, &output);

        let report = manager.wait();
        assert_eq!(report.archives.len(), 8);
        assert!(api.chapters.peak() <= 2, "peak {}", api.chapters.peak());
        assert!(api.fetching.peak() <= 2 * 4);
    }
}
