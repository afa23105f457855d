//! In-Process Transport
//!
//! 합성 요청을 리스너와 같은 라이브 서비스(같은 미들웨어 체인)로 디스패치한다.
//! 네트워크를 거치지 않을 뿐 라우팅, 접근 경계, 에러 의미는 외부 호출과 같다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let response = transport
//!     .send(InternalRequest::get("/plugins/quiz/state").as_principal(Principal::internal("stats")))
//!     .await;
//! assert!(response.is_success());
//! ```

mod message;

pub use message::{InternalRequest, InternalResponse};

use crate::routing::{panic_message, LiveService};
use aranes_foundation::Error;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tower::ServiceExt;
use tracing::{debug, warn};

/// 기본 응답 본문 한도
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// in-process 호출기. 복제해도 같은 라이브 테이블을 본다.
#[derive(Clone)]
pub struct InProcessTransport {
    service: LiveService,
    timeout: Option<Duration>,
    body_limit: usize,
}

impl std::fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("timeout", &self.timeout)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl InProcessTransport {
    pub fn new(service: LiveService) -> Self {
        Self {
            service,
            timeout: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// 호출별 타임아웃 (초과 시 504)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// method/path/body/headers 로 호출
    pub async fn invoke(
        &self,
        method: Method,
        path: &str,
        body: impl Into<Bytes>,
        headers: HeaderMap,
    ) -> InternalResponse {
        let mut request = InternalRequest::new(method, path).body(body);
        request.headers = headers;
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> InternalResponse {
        self.send(InternalRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> InternalResponse {
        self.send(InternalRequest::post(path).body(body)).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Bytes>) -> InternalResponse {
        self.send(InternalRequest::put(path).body(body)).await
    }

    pub async fn patch(&self, path: &str, body: impl Into<Bytes>) -> InternalResponse {
        self.send(InternalRequest::patch(path).body(body)).await
    }

    pub async fn delete(&self, path: &str) -> InternalResponse {
        self.send(InternalRequest::delete(path)).await
    }

    /// 요청 디스패치. 실패는 모두 응답으로 변환되며 에러를 반환하지 않는다.
    pub async fn send(&self, request: InternalRequest) -> InternalResponse {
        let method = request.method.clone();
        let path = request.path.clone();

        let http_request = match request.into_http() {
            Ok(r) => r,
            Err(err) => return InternalResponse::failure(StatusCode::BAD_REQUEST, &err),
        };

        let dispatch = AssertUnwindSafe(self.dispatch(http_request)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, dispatch).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("[Transport] {} {} timed out after {:?}", method, path, limit);
                    let err = Error::InternalDispatch(format!("timed out after {:?}", limit));
                    return InternalResponse::failure(StatusCode::GATEWAY_TIMEOUT, &err);
                }
            },
            None => dispatch.await,
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!("[Transport] {} {} failed: {}", method, path, err);
                InternalResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, &err)
            }
            Err(panic) => {
                let err = Error::InternalDispatch(panic_message(&panic));
                warn!("[Transport] {} {} panicked: {}", method, path, err);
                InternalResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, &err)
            }
        };

        debug!("[Transport] {} {} -> {}", method, path, response.status);
        response
    }

    async fn dispatch(
        &self,
        request: axum::http::Request<axum::body::Body>,
    ) -> aranes_foundation::Result<InternalResponse> {
        let response = match self.service.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| Error::InternalDispatch(format!("failed to collect response body: {}", e)))?;

        Ok(InternalResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
