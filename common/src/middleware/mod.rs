//! Middleware components.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{admit, auth_middleware, Decision, RejectReason};
pub use rate_limit::{rate_limit_middleware, ClientRateLimiter};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use security_headers::{with_security_headers, SECURITY_HEADERS};
