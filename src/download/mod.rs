//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`       — 数据模型（WorkMetadata / ChapterDescriptor / ChapterJob 等）
//! - `error`        — 下载错误分类
//! - `credentials`  — 账号池（匿名 → 已有账号 → 自动注册）
//! - `page_fetcher` — 单张图片下载与重试
//! - `chapter`      — 单章流水线
//! - `manager`      — 章节任务队列与活动列表
//! - `progress`     — CLI 进度条

pub mod chapter;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod models;
pub mod page_fetcher;
pub mod progress;

#[cfg(test)]
pub(crate) mod test_support;
