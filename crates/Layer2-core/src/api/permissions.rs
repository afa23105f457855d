//! 권한 스키마 엔드포인트 (Closed)

use super::ApiState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn schema(State(state): State<ApiState>) -> Json<Value> {
    let schema = state.permissions.snapshot();
    let fields: Vec<_> = schema.fields().collect();
    Json(json!({
        "version": schema.version(),
        "fields": fields,
        "defaults": schema.defaults(),
        "jsonSchema": schema.to_json_schema(),
    }))
}
