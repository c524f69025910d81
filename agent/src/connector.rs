//! 后端存储访问
//!
//! 中介层只依赖 [`Connector`] 与 [`BackendConnection`] 两个 trait。
//! [`PgConnector`] 是生产实现：每次调用建立一条独立的 PostgreSQL 连接，不使用连接池。

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};

use ztna_common::config::BackendConfig;
use ztna_common::errors::{AppError, AppResult};
use ztna_common::models::{CellValue, ResultSet};

/// 建立后端连接
#[async_trait]
pub trait Connector: Send + Sync {
    /// 获取一条新连接，所有权归调用方
    async fn connect(&self) -> AppResult<Box<dyn BackendConnection>>;
}

/// 一条已打开的连接
#[async_trait]
pub trait BackendConnection: Send {
    /// 执行 `sql` 并收集全部结果行
    async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet>;

    /// 优雅关闭连接，重复调用无副作用
    async fn close(&mut self) -> AppResult<()>;
}

/// 按配置的坐标连接 PostgreSQL
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn new(backend: &BackendConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&backend.host)
            .port(backend.port)
            .database(&backend.database)
            .username(&backend.user)
            .password(&backend.password)
            .application_name("ztna-agent");
        Self { options }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> AppResult<Box<dyn BackendConnection>> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        Ok(Box::new(PgBackendConnection { conn: Some(conn) }))
    }
}

struct PgBackendConnection {
    conn: Option<PgConnection>,
}

#[async_trait]
impl BackendConnection for PgBackendConnection {
    async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| AppError::Internal("connection already closed".into()))?;

        // 简单查询协议：所有列都以文本形式返回，没有 JSON 映射的类型也能回退为文本
        let rows = sqlx::Executor::fetch_all(conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;

        let rows: Vec<Vec<CellValue>> = rows.iter().map(decode_row).collect();
        Ok(ResultSet::new(rows))
    }

    async fn close(&mut self) -> AppResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| AppError::DatabaseConnection(e.to_string())),
            None => Ok(()),
        }
    }
}

fn decode_row(row: &PgRow) -> Vec<CellValue> {
    row.columns()
        .iter()
        .map(|col| {
            let type_name = col.type_info().name();
            match row.try_get_unchecked::<Option<String>, _>(col.ordinal()) {
                Ok(Some(text)) => decode_text(type_name, text),
                Ok(None) => CellValue::Null,
                Err(_) => unrepresentable(type_name, None),
            }
        })
        .collect()
}

/// 把后端的文本表示转换为单元格
///
/// # Arguments
/// * `type_name` - PostgreSQL 类型名，如 `INT4`、`JSONB`
/// * `text` - 后端给出的文本表示
///
/// # Returns
/// 有 JSON 映射时返回对应的类型化单元格，否则保留后端原文
fn decode_text(type_name: &str, text: String) -> CellValue {
    let typed = match type_name {
        "BOOL" => match text.as_str() {
            "t" => Some(CellValue::Bool(true)),
            "f" => Some(CellValue::Bool(false)),
            _ => None,
        },
        "INT2" | "INT4" | "INT8" | "OID" => text.parse::<i64>().ok().map(CellValue::Int),
        // NaN 与 Infinity 保留后端原文
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(CellValue::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => return CellValue::Text(text),
        "JSON" | "JSONB" => serde_json::from_str(&text).ok().map(CellValue::Json),
        _ => None,
    };

    typed.unwrap_or_else(|| unrepresentable(type_name, Some(text)))
}

fn unrepresentable(type_name: &str, text: Option<String>) -> CellValue {
    CellValue::Unrepresentable {
        type_name: type_name.to_string(),
        text,
    }
}
