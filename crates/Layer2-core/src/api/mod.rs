//! Core API - 코어 라우트
//!
//! - Open: `GET /health`, `POST /auth/token`
//! - Closed: `/api/loader/*` (플러그인 관리), `GET /api/permissions/schema`

mod auth;
mod error;
mod loader;
mod permissions;

pub use error::{error_response, status_for, ApiError};

use crate::boundary::AuthService;
use crate::plugin::PluginLoader;
use crate::routing::Routes;
use aranes_foundation::{Error, PermissionRegistry};
use axum::routing::{get, post};
use std::sync::{Arc, Weak};

/// 코어 핸들러 공유 상태
#[derive(Clone)]
pub struct ApiState {
    /// 로더가 라우트 테이블을 (간접적으로) 소유하므로 순환을 피하기 위해 Weak
    loader: Weak<PluginLoader>,
    permissions: Arc<PermissionRegistry>,
    auth: Arc<dyn AuthService>,
}

impl ApiState {
    pub fn new(
        loader: &Arc<PluginLoader>,
        permissions: Arc<PermissionRegistry>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            loader: Arc::downgrade(loader),
            permissions,
            auth,
        }
    }

    fn loader(&self) -> Result<Arc<PluginLoader>, ApiError> {
        self.loader
            .upgrade()
            .ok_or_else(|| ApiError(Error::Internal("plugin loader is shut down".to_string())))
    }
}

/// 코어 라우트 선언
pub fn core_routes(state: ApiState) -> Routes {
    Routes::new()
        .open("/health", get(auth::health))
        .open("/auth/token", post(auth::issue_token).with_state(state.clone()))
        .closed(
            "/api/loader/plugins",
            get(loader::list_plugins).with_state(state.clone()),
        )
        .closed(
            "/api/loader/plugins/refresh",
            post(loader::refresh).with_state(state.clone()),
        )
        .closed(
            "/api/loader/plugins/{name}",
            get(loader::get_plugin).with_state(state.clone()),
        )
        .closed(
            "/api/loader/plugins/{name}/switch",
            post(loader::switch_plugin).with_state(state.clone()),
        )
        .closed(
            "/api/permissions/schema",
            get(permissions::schema).with_state(state),
        )
}
