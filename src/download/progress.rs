//! CLI 进度条：每个活动章节一条，由进度观察者驱动。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::{JobSnapshot, JobState, ProgressObserver};

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "等待中",
        JobState::ResolvingUrls => "解析地址",
        JobState::Downloading => "下载中",
        JobState::Packaging => "打包中",
        JobState::Done => "完成",
        JobState::Failed => "失败",
    }
}

pub struct ProgressBoard {
    mp: MultiProgress,
    style: ProgressStyle,
    bars: Mutex<HashMap<u64, ProgressBar>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{prefix:.bold} [{elapsed_precise}] {wide_bar} {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        Self {
            mp: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            style,
            bars: Mutex::new(HashMap::new()),
        }
    }

    pub fn observer(self: &Arc<Self>) -> ProgressObserver {
        let board = Arc::clone(self);
        Arc::new(move |jobs: &[JobSnapshot]| board.update(jobs))
    }

    /// 按最新的活动列表刷新；不在列表中的条目视为已移除，结束其进度条。
    pub fn update(&self, jobs: &[JobSnapshot]) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for job in jobs {
            let bar = bars.entry(job.id).or_insert_with(|| {
                let bar = self.mp.add(ProgressBar::new(100));
                bar.set_style(self.style.clone());
                bar.set_prefix(format!("{} {}", job.series, job.chapter));
                bar
            });
            bar.set_position(u64::from(job.progress));
            bar.set_message(state_label(job.state));
        }

        let gone: Vec<u64> = bars
            .keys()
            .filter(|id| !jobs.iter().any(|j| j.id == **id))
            .copied()
            .collect();
        for id in gone {
            if let Some(bar) = bars.remove(&id) {
                bar.finish();
            }
        }
    }

    pub fn finish(&self) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for (_, bar) in bars.drain() {
            bar.finish();
        }
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}
