//! InternalRequest / InternalResponse

use crate::boundary::Principal;
use aranes_foundation::{Error, Result};
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

// ============================================================================
// InternalRequest
// ============================================================================

/// in-process 요청
#[derive(Debug, Clone)]
pub struct InternalRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// 설정되면 Closed 라우트의 토큰 검증을 건너뛴다
    pub principal: Option<Principal>,
}

impl InternalRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            principal: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// 헤더 추가. 잘못된 이름/값은 무시한다.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }

    /// JSON 본문 + content-type
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Bytes::from(serde_json::to_vec(body)?);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 이미 인증된 주체로 호출
    pub fn as_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub(crate) fn into_http(self) -> Result<Request<Body>> {
        if !self.path.starts_with('/') {
            return Err(Error::Validation(format!(
                "in-process path must start with '/': {}",
                self.path
            )));
        }

        let mut builder = Request::builder().method(self.method).uri(self.path.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
        }
        if let Some(principal) = self.principal {
            builder = builder.extension(principal);
        }
        builder
            .body(Body::from(self.body))
            .map_err(|e| Error::Validation(format!("invalid request {}: {}", self.path, e)))
    }
}

// ============================================================================
// InternalResponse
// ============================================================================

/// in-process 응답 (본문 전체 수집됨)
#[derive(Debug, Clone)]
pub struct InternalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InternalResponse {
    /// 디스패치 실패를 구조화된 JSON 응답으로
    pub(crate) fn failure(status: StatusCode, err: &Error) -> Self {
        let body = json!({ "error": err.code(), "detail": err.to_string() });
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}
