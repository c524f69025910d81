//! 应用状态

use std::sync::Arc;

use ztna_common::config::AppConfig;
use ztna_common::middleware::ClientRateLimiter;

use crate::connector::{Connector, PgConnector};
use crate::service::QueryMediator;

/// 各 handler 共享的状态，启动后只读
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub mediator: Arc<QueryMediator>,
    /// 按客户端地址计数，所有请求共享同一份
    pub rate_limiter: Arc<ClientRateLimiter>,
}

impl AppState {
    /// 使用指向配置后端的 PostgreSQL 连接器创建状态
    pub fn new(config: AppConfig) -> Self {
        let connector = Arc::new(PgConnector::new(&config.backend));
        Self::with_connector(config, connector)
    }

    /// 使用任意连接器创建状态
    ///
    /// # Arguments
    /// * `config` - 启动时加载的配置
    /// * `connector` - 后端连接器，测试中可替换为内存实现
    pub fn with_connector(config: AppConfig, connector: Arc<dyn Connector>) -> Self {
        let mediator = QueryMediator::new(connector, config.backend_timeout);
        let rate_limiter = ClientRateLimiter::new(&config.rate_limit);
        Self {
            config: Arc::new(config),
            mediator: Arc::new(mediator),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
