//! 拷贝漫画接口访问。
//!
//! - `client` — blocking HTTP 客户端（固定请求头、注册/登录、搜索、章节列表）
//! - `parse`  — 接口 JSON 的字段提取

pub mod client;
pub(crate) mod parse;

use crate::download::error::DownloadError;

/// 下载流水线依赖的接口子集；测试中以假实现替换。
pub trait ComicApi: Send + Sync {
    /// 解析章节图片地址；`token` 仅作用于这一次请求。
    fn page_urls(
        &self,
        path_word: &str,
        chapter_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>, DownloadError>;

    fn register(&self, username: &str, password: &str) -> Result<(), DownloadError>;

    /// 登录并返回令牌。
    fn login(&self, username: &str, password: &str) -> Result<String, DownloadError>;

    fn fetch_page(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}
