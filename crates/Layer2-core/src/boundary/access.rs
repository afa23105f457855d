//! Access Boundary - Open/Closed 라우트 그룹
//!
//! Closed 라우트는 핸들러 실행 전에 Bearer 토큰을 검증한다.
//! 이미 `Principal` 확장이 붙은 요청(in-process 호출자)은 검증을 건너뛴다.

use super::auth::{AuthService, Principal};
use crate::api::ApiError;
use aranes_foundation::Error;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// 라우트 그룹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteGroup {
    /// 인증 없이 접근 가능
    Open,
    /// Bearer 토큰 필요
    Closed,
}

/// Closed 라우트 인증 경계
#[derive(Clone)]
pub struct AccessBoundary {
    auth: Arc<dyn AuthService>,
}

impl std::fmt::Debug for AccessBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessBoundary").finish_non_exhaustive()
    }
}

impl AccessBoundary {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    /// Authorization 헤더에서 Principal 확인
    pub async fn authorize(&self, headers: &HeaderMap) -> aranes_foundation::Result<Principal> {
        let token = bearer_token(headers)
            .ok_or_else(|| Error::Unauthorized("missing bearer token".to_string()))?;
        self.auth.validate(token).await
    }
}

/// `Authorization: Bearer <token>` 에서 토큰 추출
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Closed 라우트에 `route_layer` 로 붙는 미들웨어
pub async fn enforce(
    State(boundary): State<AccessBoundary>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Principal>().is_some() {
        return next.run(request).await;
    }

    match boundary.authorize(request.headers()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            debug!(
                "[AccessBoundary] rejected {} {}: {}",
                request.method(),
                request.uri().path(),
                err
            );
            let err = if err.is_auth_failure() {
                err
            } else {
                Error::Unauthorized(err.to_string())
            };
            ApiError(err).into_response()
        }
    }
}
