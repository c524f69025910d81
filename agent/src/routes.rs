//! 路由定义

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use ztna_common::middleware::{auth_middleware, rate_limit_middleware};

use crate::handlers;
use crate::state::AppState;

/// `/query` 先经过限流再经过鉴权；`/health` 开放访问
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/query", post(handlers::execute_query))
        .route_layer(middleware::from_fn_with_state(
            state.config.api_token.clone(),
            auth_middleware,
        ))
        // 后添加的层在外侧：被限流的请求不会进入凭证比较
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .route("/health", get(handlers::health_check))
        .fallback(handlers::not_found)
}
