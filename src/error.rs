//! 统一的 API 错误类型与转换。

use axum::extract::multipart::MultipartError;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::fmt::Display;
use std::io::ErrorKind;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge,
    RangeNotSatisfiable(u64),
    Internal(String),
}

impl ApiError {
    /// 记录内部错误详情，向客户端只返回通用消息。
    pub fn internal<E: Display>(message: &'static str) -> impl Fn(E) -> ApiError + Copy {
        move |err| {
            error!(error = %err, "{message}");
            ApiError::Internal(message.into())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "upload too large").into_response()
            }
            ApiError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    "range not satisfiable",
                )
                    .into_response()
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidName(_) => ApiError::BadRequest("invalid photo name".into()),
            StoreError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound("photo not found".into()),
                _ => ApiError::internal("photo store failure")(err),
            },
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        tracing::debug!(error = %error.body_text(), "rejecting malformed form");
        ApiError::BadRequest("unable to process form data".into())
    }
}
