//! 下载流程的错误分类。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// 网络/DNS/TLS 层失败
    #[error("network error: {0}")]
    Transport(String),
    /// 接口明确返回限速
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("not found: {0}")]
    NotFound(String),
    /// 响应格式正确，但没有可用数据
    #[error("empty response: {0}")]
    Empty(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("failed to download image: {url}")]
    DownloadFailed { url: String },
    #[error("packaging failed: {0}")]
    PackagingFailed(String),
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl DownloadError {
    pub(crate) fn packaging(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::PackagingFailed(format!("{context}: {err}"))
    }
}
