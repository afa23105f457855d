//! HTTP 에러 응답
//!
//! foundation `Error` 를 상태 코드와 `{"error", "detail"}` JSON 으로 변환한다.

use aranes_foundation::Error;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 응답으로 변환 가능한 에러
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = error_response(status, self.0.code(), &self.0.to_string());
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// 에러 종류별 상태 코드
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized(_) | Error::Expired | Error::InvalidCredentials => {
            StatusCode::UNAUTHORIZED
        }
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) | Error::UnknownFieldKey(_) | Error::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::DuplicateFieldKey { .. } => StatusCode::CONFLICT,
        Error::PluginImport { .. } | Error::PluginMount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InternalDispatch(_)
        | Error::StoreCorrupt { .. }
        | Error::StoreIo { .. }
        | Error::Config(_)
        | Error::Io(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": code, "detail": detail}` 응답
pub fn error_response(status: StatusCode, code: &str, detail: &str) -> Response {
    (status, Json(json!({ "error": code, "detail": detail }))).into_response()
}
