//! 接口 JSON 的字段提取。缺字段时留空，不做结构校验。

use serde_json::Value;

use crate::download::error::DownloadError;
use crate::download::models::{ChapterDescriptor, SearchHit, WorkMetadata};

/// 章节图片接口限速时 `message` 中出现的提示语。
pub(crate) const RATE_LIMIT_PHRASE: &str = "Expected available in";

fn str_of(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn u64_of(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn results_list<'a>(body: &'a Value) -> &'a [Value] {
    body.pointer("/results/list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn join_names(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

pub(crate) fn parse_comic(body: &Value, path_word: &str) -> WorkMetadata {
    let comic = body.pointer("/results/comic").unwrap_or(&Value::Null);
    let own_path_word = str_of(comic, "path_word");
    WorkMetadata {
        path_word: if own_path_word.is_empty() {
            path_word.to_string()
        } else {
            own_path_word
        },
        title: str_of(comic, "name"),
        authors: join_names(comic, "author"),
        synopsis: str_of(comic, "brief"),
        genres: join_names(comic, "theme"),
        cover: str_of(comic, "cover"),
    }
}

pub(crate) fn parse_chapters(body: &Value) -> Vec<ChapterDescriptor> {
    results_list(body)
        .iter()
        .enumerate()
        .map(|(index, item)| ChapterDescriptor {
            index,
            uuid: str_of(item, "uuid"),
            name: str_of(item, "name"),
            count_hint: u64_of(item, "count"),
            size_hint: u64_of(item, "size"),
        })
        .collect()
}

pub(crate) fn parse_page_urls(body: &Value) -> Result<Vec<String>, DownloadError> {
    let message = str_of(body, "message");
    if message.contains(RATE_LIMIT_PHRASE) {
        return Err(DownloadError::RateLimited);
    }

    // 空地址也占一个位置，保证页码与接口顺序一致；该页下载时单独失败
    let urls: Vec<String> = body
        .pointer("/results/chapter/contents")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(|item| str_of(item, "url")).collect())
        .unwrap_or_default();

    if urls.iter().all(|u| u.trim().is_empty()) {
        let detail = if message.is_empty() {
            "no image urls".to_string()
        } else {
            message
        };
        return Err(DownloadError::Empty(detail));
    }
    Ok(urls)
}

pub(crate) fn parse_search(body: &Value) -> Vec<SearchHit> {
    results_list(body)
        .iter()
        .map(|item| SearchHit {
            name: str_of(item, "name"),
            path_word: str_of(item, "path_word"),
            authors: join_names(item, "author"),
            cover: str_of(item, "cover"),
        })
        .collect()
}

pub(crate) fn parse_token(body: &Value) -> Option<String> {
    body.pointer("/results/token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comic_metadata_joins_authors_and_themes() {
        let body = json!({
            "code": 200,
            "results": {
                "comic": {
                    "name": "电锯人",
                    "path_word": "dianjuren",
                    "brief": "恶魔猎人",
                    "cover": "https://img.example/cover.jpg",
                    "author": [{"name": "藤本树", "path_word": "a"}, {"name": "助手", "path_word": "b"}],
                    "theme": [{"name": "热血"}, {"name": "奇幻"}]
                }
            }
        });
        let meta = parse_comic(&body, "ignored");
        assert_eq!(meta.title, "电锯人");
        assert_eq!(meta.path_word, "dianjuren");
        assert_eq!(meta.authors, "藤本树, 助手");
        assert_eq!(meta.genres, "热血, 奇幻");
        assert_eq!(meta.synopsis, "恶魔猎人");
    }

    #[test]
    fn missing_comic_fields_stay_empty() {
        let meta = parse_comic(&json!({"results": {}}), "abc");
        assert_eq!(meta.path_word, "abc");
        assert!(meta.title.is_empty());
        assert!(meta.authors.is_empty());
    }

    #[test]
    fn chapters_keep_api_order() {
        let body = json!({"results": {"list": [
            {"uuid": "u-b", "name": "第1话", "size": 20, "count": 3},
            {"uuid": "u-a", "name": "第2话", "size": 18, "count": 3},
            {"uuid": "u-c", "name": "番外"}
        ]}});
        let chapters = parse_chapters(&body);
        let ids: Vec<_> = chapters.iter().map(|c| c.uuid.as_str()).collect();
        assert_eq!(ids, vec!["u-b", "u-a", "u-c"]);
        assert_eq!(chapters[2].index, 2);
        assert_eq!(chapters[0].size_hint, 20);
        assert_eq!(chapters[2].size_hint, 0);
    }

    #[test]
    fn rate_limit_message_wins_over_contents() {
        let body = json!({
            "code": 210,
            "message": "Request was throttled. Expected available in 40 seconds.",
            "results": {"chapter": {"contents": [{"url": "https://x/1.jpg"}]}}
        });
        assert!(matches!(parse_page_urls(&body), Err(DownloadError::RateLimited)));
    }

    #[test]
    fn empty_contents_is_empty_error() {
        let body = json!({"results": {"chapter": {"contents": []}}});
        assert!(matches!(parse_page_urls(&body), Err(DownloadError::Empty(_))));
    }

    #[test]
    fn page_urls_preserve_order() {
        let body = json!({"results": {"chapter": {"contents": [
            {"url": "https://x/b.c800x.jpg"},
            {"url": "https://x/a.c800x.jpg"}
        ]}}});
        assert_eq!(
            parse_page_urls(&body).unwrap(),
            vec!["https://x/b.c800x.jpg", "https://x/a.c800x.jpg"]
        );
    }

    #[test]
    fn blank_urls_keep_their_page_slot() {
        let body = json!({"results": {"chapter": {"contents": [
            {"url": "https://x/1.jpg"},
            {"url": ""},
            {},
            {"url": "https://x/4.jpg"}
        ]}}});
        let urls = parse_page_urls(&body).unwrap();
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[3], "https://x/4.jpg");
        assert!(urls[1].is_empty() && urls[2].is_empty());

        let all_blank = json!({"results": {"chapter": {"contents": [{"url": " "}]}}});
        assert!(matches!(parse_page_urls(&all_blank), Err(DownloadError::Empty(_))));
    }

    #[test]
    fn token_is_read_from_results() {
        assert_eq!(
            parse_token(&json!({"results": {"token": "abc123"}})),
            Some("abc123".to_string())
        );
        assert_eq!(parse_token(&json!({"results": {"token": ""}})), None);
        assert_eq!(parse_token(&json!({"message": "bad"})), None);
    }
}
