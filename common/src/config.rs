//! Startup configuration.
//!
//! Built once in `main`, before the async runtime starts, from the process
//! environment layered over an optional `.env` file, and shared read-only
//! afterwards. The `.env` file is read, never exported into the environment. A missing credential or backend address
//! is fatal; everything else has a default matching the emulated topology.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "medical_records";
pub const DEFAULT_DB_USER: &str = "admin";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Expected bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a non-empty token.
    pub fn new(token: impl Into<String>) -> AppResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AppError::Config("expected bearer credential is empty".into()));
        }
        Ok(Self(token))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Coordinates of the backend store.
#[derive(Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Per-client request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests a client may make per window.
    pub max_requests: NonZeroU32,
    pub window: Duration,
}

impl RateLimitConfig {
    /// Time for one request's worth of budget to come back. Never zero.
    pub fn replenish_period(&self) -> Duration {
        self.window / self.max_requests.get()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub api_token: ApiToken,
    pub backend: BackendConfig,
    /// Shared deadline for connection acquisition plus query execution.
    pub backend_timeout: Duration,
    pub log_format: LogFormat,
    pub rate_limit: RateLimitConfig,
    /// Request bodies larger than this are rejected with 413.
    pub max_body_bytes: usize,
}

impl AppConfig {
    /// Loads configuration from `.env` (if present) and the process environment.
    ///
    /// # Errors
    /// Returns `AppError::Config` when a required variable is missing or a
    /// value does not parse.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        let dotenv = read_dotenv(Path::new(".env"))?;
        Self::from_lookup(service_name, |key| {
            std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        let api_token = ApiToken::new(required("AGENT_API_TOKEN")?)?;

        let backend = BackendConfig {
            host: required("DB_HOST")?,
            port: parse_or("DB_PORT", var("DB_PORT"), DEFAULT_DB_PORT)?,
            database: var("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            user: var("DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
        };

        let timeout_ms = parse_or(
            "BACKEND_TIMEOUT_MS",
            var("BACKEND_TIMEOUT_MS"),
            DEFAULT_BACKEND_TIMEOUT_MS,
        )?;
        if timeout_ms == 0 {
            return Err(AppError::Config("BACKEND_TIMEOUT_MS must be greater than 0".into()));
        }

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be `text` or `json`, got `{}`",
                    other
                )))
            }
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(
                "RATE_LIMIT_MAX",
                var("RATE_LIMIT_MAX"),
                NonZeroU32::new(DEFAULT_RATE_LIMIT_MAX).unwrap_or(NonZeroU32::MIN),
            )?,
            window: Duration::from_secs(parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                var("RATE_LIMIT_WINDOW_SECS"),
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?),
        };
        if rate_limit.replenish_period().is_zero() {
            return Err(AppError::Config(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".into(),
            ));
        }

        Ok(Self {
            service_name: service_name.to_string(),
            host: var("AGENT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("SERVER_PORT", var("SERVER_PORT"), DEFAULT_PORT)?,
            api_token,
            backend,
            backend_timeout: Duration::from_millis(timeout_ms),
            log_format,
            rate_limit,
            max_body_bytes: parse_or("MAX_BODY_BYTES", var("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?,
        })
    }

    /// `host:port` the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value `{}`", key, v))),
    }
}

/// Reads a `.env` file into a map without touching the process environment.
/// A missing file yields an empty map; a malformed one is a config error.
fn read_dotenv(path: &Path) -> AppResult<HashMap<String, String>> {
    let invalid = |e: dotenvy::Error| AppError::Config(format!("{}: {}", path.display(), e));
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.collect::<Result<_, _>>().map_err(invalid),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(invalid(e)),
    }
}
