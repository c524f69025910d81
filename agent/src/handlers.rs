//! Handler模块

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use ztna_common::errors::AppError;
use ztna_common::response::ErrorBody;

use crate::state::AppState;

/// 执行授权查询
///
/// 忽略请求体。行与列按后端产生的顺序返回。
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    params(
        ("Authorization" = String, Header, description = "Bearer <credential>")
    ),
    responses(
        (status = 200, description = "结果行数组，每行是列值数组"),
        (status = 401, description = "凭证缺失或无效", body = ErrorBody),
        (status = 413, description = "请求体超过上限"),
        (status = 429, description = "超出请求频率限制", body = ErrorBody),
        (status = 500, description = "后端连接或查询失败", body = ErrorBody),
        (status = 504, description = "后端超时", body = ErrorBody)
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
) -> Result<Json<Vec<Vec<Value>>>, AppError> {
    let rows = state.mediator.handle().await?;
    Ok(Json(rows))
}

/// 健康检查，不访问后端
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行中", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// 未知路由
pub async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Endpoint not found")))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}
