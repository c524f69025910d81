//! ZTNA 访问代理
//!
//! 位于客户端与医疗记录数据库之间，提供以下功能：
//! - 校验每个 `/query` 请求的 Bearer 凭证
//! - 为每个放行的请求建立独立的后端连接
//! - 执行唯一的授权查询，以 JSON 返回结果行
//! - 无论结果如何都释放连接

mod connector;
mod handlers;
mod routes;
mod service;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use state::AppState;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use ztna_common::config::{AppConfig, LogFormat};
use ztna_common::middleware::rate_limit::cleanup_task;
use ztna_common::middleware::{request_id_middleware, with_security_headers};

const SERVICE_NAME: &str = "ztna-agent";

/// 清理空闲限流桶的间隔
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ZTNA 代理 API",
        version = "0.1.0",
        description = "经 Bearer 鉴权访问医疗记录数据库"
    ),
    paths(
        handlers::execute_query,
        handlers::health_check,
    ),
    components(schemas(
        ztna_common::response::ErrorBody,
        handlers::HealthResponse,
    )),
    tags(
        (name = "query", description = "授权查询端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

fn main() -> anyhow::Result<()> {
    // 配置在运行时启动前加载，此时进程仍是单线程
    let config = AppConfig::load_with_service(SERVICE_NAME).context("failed to load configuration")?;

    init_tracing(config.log_format);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        service = SERVICE_NAME,
        backend_host = %config.backend.host,
        backend_port = config.backend.port,
        database = %config.backend.database,
        timeout_ms = config.backend_timeout.as_millis() as u64,
        rate_limit_max = config.rate_limit.max_requests.get(),
        rate_limit_window_secs = config.rate_limit.window.as_secs(),
        "配置已加载"
    );

    let addr = config.listen_addr();
    let state = AppState::new(config);
    tokio::spawn(cleanup_task(state.rate_limiter.clone(), RATE_LIMIT_CLEANUP_INTERVAL));
    let app = create_router(state);

    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    // 限流按对端地址计数，需要 ConnectInfo
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init(),
    }
}

/// 组装完整路由
///
/// # Arguments
/// * `state` - 共享的应用状态
///
/// # Returns
/// 挂载了请求体限制、压缩、请求 ID、追踪、CORS 与安全响应头的路由
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .merge(routes::router(&state))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    with_security_headers(router).with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// 收到 Ctrl-C 或 SIGTERM 时返回，进行中的请求可以完成
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("收到停止信号，等待进行中的请求完成");
}
