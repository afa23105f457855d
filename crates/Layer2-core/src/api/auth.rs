//! 인증/헬스 엔드포인트 (Open)

use super::{ApiError, ApiState};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn issue_token(
    State(state): State<ApiState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let access_token = state
        .auth
        .issue_token(&request.username, &request.password)
        .await?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
