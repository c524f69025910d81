//! 单元测试使用的内存后端

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use ztna_common::errors::{AppError, AppResult};
use ztna_common::models::{CellValue, ResultSet};

use crate::connector::{BackendConnection, Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    FailConnect,
    FailQuery,
    HangConnect,
    HangQuery,
    HangClose,
}

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    closed_gracefully: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

/// 统计发出的每条连接以及每条被释放（drop）的连接，无论释放方式如何
pub struct MockConnector {
    behavior: MockBehavior,
    result_set: ResultSet,
    counters: Arc<Counters>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior, result_set: ResultSet) -> Self {
        Self {
            behavior,
            result_set,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn closed_gracefully(&self) -> usize {
        self.counters.closed_gracefully.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.counters.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> AppResult<Box<dyn BackendConnection>> {
        match self.behavior {
            MockBehavior::FailConnect => {
                return Err(AppError::DatabaseConnection(
                    "could not translate host name \"db\" to address".into(),
                ))
            }
            MockBehavior::HangConnect => std::future::pending::<()>().await,
            _ => {}
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            behavior: self.behavior,
            result_set: self.result_set.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct MockConnection {
    behavior: MockBehavior,
    result_set: ResultSet,
    counters: Arc<Counters>,
}

#[async_trait]
impl BackendConnection for MockConnection {
    async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet> {
        self.counters.queries.lock().unwrap().push(sql.to_string());
        match self.behavior {
            MockBehavior::FailQuery => {
                Err(AppError::DatabaseQuery("relation \"patients\" does not exist".into()))
            }
            MockBehavior::HangQuery => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ResultSet::default())
            }
            _ => Ok(self.result_set.clone()),
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.behavior == MockBehavior::HangClose {
            std::future::pending::<()>().await;
        }
        self.counters.closed_gracefully.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// 参考部署中的 `patients` 表
pub fn patients() -> ResultSet {
    ResultSet::new(vec![
        vec![CellValue::Int(1), "Alice".into(), CellValue::Int(34)],
        vec![CellValue::Int(2), "Bob".into(), CellValue::Int(51)],
    ])
}

/// 统计 WARN 及以上级别的日志事件
#[derive(Clone, Default)]
pub struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
