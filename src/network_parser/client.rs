//! 拷贝漫画 App 接口客户端（blocking）。
//!
//! 所有请求共用一个 `reqwest::blocking::Client`，固定的客户端标识头在构造时设置一次；
//! 登录令牌只作为单次请求的参数传入，不写回共享状态。

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, REFERER,
    USER_AGENT,
};
use serde_json::Value;
use tracing::debug;

use super::ComicApi;
use super::parse;
use crate::base_system::context::Config;
use crate::download::error::DownloadError;
use crate::download::models::{ChapterDescriptor, SearchHit, WorkMetadata};

pub(crate) const LOGIN_SALT: &str = "582496";
const SEARCH_PAGE_SIZE: usize = 12;
const CHAPTER_LIST_LIMIT: usize = 500;

/// `mangacopy.com` → `https://mangacopy.com/api/v3`；带协议的地址原样使用（便于本地调试）。
pub(crate) fn api_base(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/api/v3")
    } else {
        format!("https://{host}/api/v3")
    }
}

/// 接口要求的密码格式：`base64("{password}-{salt}")`。只是编码，不是加密。
pub(crate) fn encode_login_password(password: &str, salt: &str) -> String {
    BASE64.encode(format!("{password}-{salt}"))
}

fn client_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("COPY/2.2.5"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    // reqwest 未启用 gzip 解码，要求原样返回
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(REFERER, HeaderValue::from_static("com.copymanga.app-2.2.5"));
    let fixed = [
        ("source", "copyApp"),
        ("deviceinfo", "DCO-AL00-DCO-AL00"),
        ("webp", "0"),
        ("platform", "4"),
        ("version", "2.2.5"),
        ("region", "0"),
    ];
    for (name, value) in fixed {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

#[derive(Clone)]
pub struct CopyClient {
    client: Client,
    api_base: String,
}

impl CopyClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .default_headers(client_headers())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base(host),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, DownloadError> {
        Self::new(&cfg.url_base, cfg.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// 发送请求并解析 JSON。非 2xx 但带 JSON 的响应照常返回，交给调用方看 `message`。
    fn send_json(&self, req: RequestBuilder) -> Result<(StatusCode, Value), DownloadError> {
        let resp = req.send()?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound(resp.url().to_string()));
        }
        let bytes = resp.bytes()?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(v) => Ok((status, v)),
            Err(_) if !status.is_success() => {
                Err(DownloadError::Transport(format!("HTTP {status}")))
            }
            Err(err) => Err(DownloadError::Empty(format!("invalid json: {err}"))),
        }
    }

    pub fn search(&self, keyword: &str, page: usize) -> Result<Vec<SearchHit>, DownloadError> {
        let page = page.max(1);
        let offset = ((page - 1) * SEARCH_PAGE_SIZE).to_string();
        let limit = SEARCH_PAGE_SIZE.to_string();
        let req = self.client.get(self.url("/search/comic")).query(&[
            ("offset", offset.as_str()),
            ("platform", "4"),
            ("limit", limit.as_str()),
            ("q", keyword),
            ("q_type", ""),
        ]);
        let (_, body) = self.send_json(req)?;
        Ok(parse::parse_search(&body))
    }

    pub fn comic_info(&self, path_word: &str) -> Result<WorkMetadata, DownloadError> {
        let req = self.client.get(self.url(&format!("/comic2/{path_word}")));
        let (_, body) = self.send_json(req)?;
        Ok(parse::parse_comic(&body, path_word))
    }

    /// 一次请求取完整章节列表（limit 足够大，不翻页），顺序即归档编号顺序。
    pub fn chapters(&self, path_word: &str) -> Result<Vec<ChapterDescriptor>, DownloadError> {
        let limit = CHAPTER_LIST_LIMIT.to_string();
        let req = self
            .client
            .get(self.url(&format!("/comic/{path_word}/group/default/chapters")))
            .query(&[("limit", limit.as_str()), ("offset", "0")]);
        let (_, body) = self.send_json(req)?;
        Ok(parse::parse_chapters(&body))
    }

    /// 并发获取作品信息与章节列表。
    pub fn work_overview(
        &self,
        path_word: &str,
    ) -> Result<(WorkMetadata, Vec<ChapterDescriptor>), DownloadError> {
        let (meta, chapters) = std::thread::scope(|s| {
            let meta = s.spawn(|| self.comic_info(path_word));
            let chapters = self.chapters(path_word);
            let meta = meta.join().unwrap_or_else(|_| {
                Err(DownloadError::Transport("metadata worker panicked".to_string()))
            });
            (meta, chapters)
        });
        Ok((meta?, chapters?))
    }
}

impl ComicApi for CopyClient {
    fn page_urls(
        &self,
        path_word: &str,
        chapter_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>, DownloadError> {
        let mut req = self
            .client
            .get(self.url(&format!("/comic/{path_word}/chapter2/{chapter_id}")));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            req = req.header(AUTHORIZATION, format!("Token {token}"));
        }
        let (status, body) = self.send_json(req)?;
        debug!(target: "download", chapter_id, status = status.as_u16(), "章节图片接口响应");
        parse::parse_page_urls(&body)
    }

    fn register(&self, username: &str, password: &str) -> Result<(), DownloadError> {
        let resp = self
            .client
            .post(self.url("/register"))
            .form(&[("username", username), ("password", password)])
            .send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(DownloadError::AuthFailed(format!(
                "register rejected: HTTP {}",
                resp.status()
            )))
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<String, DownloadError> {
        let encoded = encode_login_password(password, LOGIN_SALT);
        let req = self.client.post(self.url("/login")).form(&[
            ("username", username),
            ("password", encoded.as_str()),
            ("salt", LOGIN_SALT),
        ]);
        let (status, body) = match self.send_json(req) {
            Ok(v) => v,
            Err(DownloadError::Empty(msg)) => return Err(DownloadError::AuthFailed(msg)),
            Err(err) => return Err(err),
        };
        if !status.is_success() {
            return Err(DownloadError::AuthFailed(format!("login rejected: HTTP {status}")));
        }
        parse::parse_token(&body)
            .ok_or_else(|| DownloadError::AuthFailed("login response has no token".to_string()))
    }

    fn fetch_page(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(DownloadError::Transport(format!("HTTP {status}: {url}")));
        }
        Ok(resp.bytes()?.to_vec())
    }
}
