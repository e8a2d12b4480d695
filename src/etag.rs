//! ETag 计算与条件请求校验。

use axum::http::{HeaderMap, header};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    let modified = metadata.modified().ok();
    if let Some(modified) = modified
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// If-None-Match 命中当前 ETag 时返回 true（应答 304）。
pub fn is_not_modified(headers: &HeaderMap, current_etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    if value.trim() == "*" {
        return true;
    }
    value
        .split(',')
        .map(|item| item.trim())
        .any(|item| weak_eq(item, current_etag))
}

fn weak_eq(left: &str, right: &str) -> bool {
    left.trim_start_matches("W/") == right.trim_start_matches("W/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn if_none_match_uses_weak_comparison() {
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, "W/\"3-1-0\""));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"3-1-0\""));
        assert!(is_not_modified(&headers, "W/\"3-1-0\""));

        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("W/\"1-1-1\", W/\"2-2-2\""),
        );
        assert!(!is_not_modified(&headers, "W/\"3-1-0\""));
        assert!(is_not_modified(&headers, "W/\"2-2-2\""));
    }
}
