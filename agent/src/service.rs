//! 查询中介服务
//!
//! 在一次已放行请求的生命周期内持有后端连接：连接、执行授权查询、释放、序列化。
//! 任何路径都会释放连接，包括出错、超时以及 handler future 中途被丢弃。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout_at;

use ztna_common::errors::{AppError, AppResult, BackendPhase};
use ztna_common::models::ResultSet;

use crate::connector::{BackendConnection, Connector};

/// 代理唯一会发送的语句
pub const AUTHORIZED_QUERY: &str = "SELECT * FROM patients";

/// 优雅关闭的时间上限，超时则直接丢弃句柄
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 处理已放行的 `/query` 请求
pub struct QueryMediator {
    connector: Arc<dyn Connector>,
    deadline: Duration,
}

impl QueryMediator {
    /// 创建中介实例
    ///
    /// # Arguments
    /// * `connector` - 后端连接器
    /// * `deadline` - 获取连接与执行查询共用的时限
    pub fn new(connector: Arc<dyn Connector>, deadline: Duration) -> Self {
        Self { connector, deadline }
    }

    /// 执行授权查询，返回线上格式的结果行
    ///
    /// 失败只通过返回值上报，由 `AppError` 的响应转换统一记录日志。
    ///
    /// # Errors
    /// - `AppError::DatabaseConnection` 无法建立连接
    /// - `AppError::DatabaseQuery` 后端执行查询失败
    /// - `AppError::Timeout` 时限先到期
    pub async fn handle(&self) -> AppResult<Vec<Vec<Value>>> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.deadline;

        tracing::debug!(phase = "connecting", "acquiring backend connection");
        let conn = timeout_at(deadline, self.connector.connect())
            .await
            .map_err(|_| AppError::Timeout { phase: BackendPhase::Connecting })??;

        let mut guard = ConnectionGuard::new(conn);
        tracing::debug!(phase = "querying", query = AUTHORIZED_QUERY, "executing query");
        let outcome = timeout_at(deadline, guard.fetch_all(AUTHORIZED_QUERY)).await;
        guard.release().await;

        let result_set = outcome.map_err(|_| AppError::Timeout { phase: BackendPhase::Querying })??;

        tracing::debug!(phase = "serializing", rows = result_set.row_count(), "serializing result set");
        let rows = serialize(result_set);

        tracing::info!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query served"
        );
        Ok(rows)
    }
}

fn serialize(result_set: ResultSet) -> Vec<Vec<Value>> {
    let (rows, degraded) = result_set.into_json_rows();
    if degraded > 0 {
        tracing::warn!(cells = degraded, "cells without a JSON mapping were sent as text");
    }
    rows
}

/// 单条后端连接的作用域所有权
///
/// `release` 优雅关闭连接。若 guard 先被丢弃（请求 future 被取消），
/// 句柄随之丢弃，底层 socket 被关闭。
struct ConnectionGuard {
    conn: Option<Box<dyn BackendConnection>>,
}

impl ConnectionGuard {
    fn new(conn: Box<dyn BackendConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet> {
        match self.conn.as_mut() {
            Some(conn) => conn.fetch_all(sql).await,
            None => Err(AppError::Internal("connection already released".into())),
        }
    }

    async fn release(mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_GRACE, conn.close()).await {
            Ok(Ok(())) => tracing::debug!(phase = "closed", "backend connection closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "backend connection close failed, dropping handle"),
            Err(_) => tracing::warn!("backend connection close timed out, dropping handle"),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            tracing::warn!("backend connection dropped without graceful close");
        }
    }
}
