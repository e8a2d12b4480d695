//! 单张照片下载处理器，支持 Range 请求与缓存相关头。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::{fmt_http_date, parse_http_date};
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::store::PhotoStore;

/// `/photos/` 未给出文件名。
pub async fn photo_not_specified() -> ApiError {
    ApiError::BadRequest("photo not specified".into())
}

/// 按文件名返回照片内容。
pub async fn serve_photo(
    Path(name): Path<String>,
    request_headers: HeaderMap,
    Extension(store): Extension<Arc<PhotoStore>>,
) -> Result<Response, ApiError> {
    if name.is_empty() {
        return Err(ApiError::BadRequest("photo not specified".into()));
    }
    let target = store.resolve_photo(&name, false).await?;
    let metadata = fs::metadata(&target).await.map_err(crate::store::StoreError::from)?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound("photo not found".into()));
    }
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(&target).first_or_octet_stream();
    let header_error = ApiError::internal::<header::InvalidHeaderValue>("failed to build response headers");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag).map_err(header_error)?,
    );
    if let Some(value) = modified.map(fmt_http_date) {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value).map_err(header_error)?,
        );
    }
    if is_not_modified(&request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str()).map_err(header_error)?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let if_range_matches = match request_headers
        .get(header::IF_RANGE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => if_range_allows(value, modified, &etag),
        None => true,
    };

    let range = if if_range_matches {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let mut file = File::open(&target)
        .await
        .map_err(ApiError::internal("failed to open photo"))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(name, start, end, length, "photo range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(ApiError::internal("failed to read photo"))?;
        let stream = ReaderStream::new(file.take(length));
        response_headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, file_size))
                .map_err(header_error)?,
        );
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    debug!(name, size = file_size, "serve full photo");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// If-Range 校验：日期按整秒比较，ETag 需强比较，弱 ETag 一律视为不匹配。
fn if_range_allows(value: &str, modified: Option<SystemTime>, etag: &str) -> bool {
    let value = value.trim();
    match parse_http_date(value) {
        Ok(date) => modified
            .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
            .zip(date.duration_since(UNIX_EPOCH).ok())
            .is_some_and(|(file, since)| file.as_secs() <= since.as_secs()),
        Err(_) => !value.starts_with("W/") && !etag.starts_with("W/") && value == etag,
    }
}

/// 解析 Range 头，返回可读取的范围。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
    let Some(range) = value.strip_prefix("bytes=") else {
        return Err(ApiError::BadRequest("invalid Range header".into()));
    };
    if range.contains(',') {
        return Err(ApiError::BadRequest("multiple ranges not supported".into()));
    }

    let mut parts = range.splitn(2, '-');
    let start_part = parts.next().unwrap_or_default().trim();
    let end_part = parts.next().unwrap_or_default().trim();

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        let end: u64 = if end_part.is_empty() {
            file_size - 1
        } else {
            end_part
                .parse::<u64>()
                .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?
                .min(file_size - 1)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}
