//! 플러그인 관리 엔드포인트 (Closed)

use super::{ApiError, ApiState};
use crate::plugin::{PluginDescriptor, RefreshReport};
use aranes_foundation::Error;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct SwitchParams {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub plugins: Vec<PluginDescriptor>,
    pub report: RefreshReport,
}

pub async fn list_plugins(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PluginDescriptor>>, ApiError> {
    Ok(Json(state.loader()?.list()))
}

pub async fn get_plugin(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<PluginDescriptor>, ApiError> {
    state
        .loader()?
        .get(&name)
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound(format!("plugin {}", name))))
}

/// 활성화/비활성화. 플러그인 로딩 실패는 last_error 가 담긴 디스크립터로 응답한다.
pub async fn switch_plugin(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<SwitchParams>,
) -> Result<Json<PluginDescriptor>, ApiError> {
    let loader = state.loader()?;
    let result = if params.enabled {
        loader.enable(&name).await
    } else {
        loader.disable(&name).await
    };

    match result {
        Ok(descriptor) => Ok(Json(descriptor)),
        Err(err) if err.is_plugin_failure() => {
            warn!("[API] switch {} failed: {}", name, err);
            loader
                .get(&name)
                .map(Json)
                .ok_or_else(|| ApiError(Error::NotFound(format!("plugin {}", name))))
        }
        Err(err) => Err(ApiError(err)),
    }
}

pub async fn refresh(State(state): State<ApiState>) -> Result<Json<RefreshResponse>, ApiError> {
    let loader = state.loader()?;
    let report = loader.refresh().await?;
    Ok(Json(RefreshResponse {
        plugins: loader.list(),
        report,
    }))
}
