//! Per-client rate limiting.
//!
//! Each client address gets a token bucket holding `max_requests` tokens that
//! refill evenly over the window. The client address comes from the socket
//! (`ConnectInfo`); forwarding headers are not trusted.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use crate::config::RateLimitConfig;
use crate::errors::AppError;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Token buckets keyed by client address.
pub struct ClientRateLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
}

impl ClientRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        // The period is validated non-zero when the config is loaded.
        let quota = Quota::with_period(config.replenish_period())
            .unwrap_or_else(|| Quota::per_second(config.max_requests))
            .allow_burst(config.max_requests);

        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Takes one token for `client`, or returns how long until one is available.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.limiter
            .check_key(&client)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Forgets clients whose buckets have fully refilled.
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Rate limiting middleware.
///
/// Install with `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
///
/// # Arguments
/// * `limiter` - The shared per-client limiter
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware or handler in the chain
///
/// # Returns
/// The downstream response, or a 429 envelope with `Retry-After` when the
/// client has used up its budget.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ClientRateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = client_ip(&req);
    match limiter.check(client) {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            tracing::warn!(client = %client, retry_after_secs, uri = %req.uri(), "rate limit exceeded");
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

/// Periodically drops idle client buckets so memory stays bounded.
pub async fn cleanup_task(limiter: Arc<ClientRateLimiter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        limiter.cleanup();
        tracing::debug!(clients = limiter.tracked_clients(), "rate limit buckets pruned");
    }
}

fn client_ip<B>(req: &Request<B>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn config(max: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: NonZeroU32::new(max).unwrap(),
            window: Duration::from_secs(900),
        }
    }

    fn client(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_up_to_budget_then_blocks() {
        let limiter = ClientRateLimiter::new(&config(3));

        for _ in 0..3 {
            assert!(limiter.check(client(1)).is_ok());
        }
        let wait = limiter.check(client(1)).unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(300));
    }

    #[test]
    fn test_clients_have_separate_budgets() {
        let limiter = ClientRateLimiter::new(&config(1));

        assert!(limiter.check(client(1)).is_ok());
        assert!(limiter.check(client(1)).is_err());
        assert!(limiter.check(client(2)).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    fn request_from(addr: SocketAddr) -> Request<Body> {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[tokio::test]
    async fn test_middleware_returns_429_with_retry_after() {
        let limiter = Arc::new(ClientRateLimiter::new(&config(1)));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        let addr: SocketAddr = "192.0.2.7:40000".parse().unwrap();

        let first = app.clone().oneshot(request_from(addr)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(request_from(addr)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get("retry-after").unwrap(), "900");

        // Same host, different port: still the same client.
        let other_port: SocketAddr = "192.0.2.7:40001".parse().unwrap();
        let third = app.clone().oneshot(request_from(other_port)).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);

        let other_host: SocketAddr = "192.0.2.8:40000".parse().unwrap();
        let fourth = app.oneshot(request_from(other_host)).await.unwrap();
        assert_eq!(fourth.status(), StatusCode::OK);
    }
}
