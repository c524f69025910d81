//! Access gatekeeper.
//!
//! Decides admit/reject for an inbound request from its `Authorization`
//! header alone. The decision is a pure function; the middleware wrapper only
//! turns a rejection into a 401 before any downstream work happens.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::config::ApiToken;
use crate::errors::AppError;

const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was turned away. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No `Authorization` header.
    MissingCredential,
    /// Header present but not `Bearer <token>` or not valid UTF-8.
    MalformedHeader,
    /// Well-formed credential that is not the expected one.
    Mismatch,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingCredential => write!(f, "missing credential"),
            RejectReason::MalformedHeader => write!(f, "malformed authorization header"),
            RejectReason::Mismatch => write!(f, "credential mismatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject(RejectReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Classifies a request by its credential.
///
/// A missing or malformed header is compared like an empty credential so
/// every path goes through the same constant-time check.
pub fn admit(headers: &HeaderMap, expected: &ApiToken) -> Decision {
    let (presented, failure) = match headers.get(AUTHORIZATION) {
        None => ("", Some(RejectReason::MissingCredential)),
        Some(value) => match value.to_str().ok().and_then(|v| v.strip_prefix(BEARER_PREFIX)) {
            Some(token) => (token, None),
            None => ("", Some(RejectReason::MalformedHeader)),
        },
    };

    let matched = constant_time_compare(presented.as_bytes(), expected.as_bytes());
    match (matched, failure) {
        (true, None) => Decision::Allow,
        (_, Some(reason)) => Decision::Reject(reason),
        (false, None) => Decision::Reject(RejectReason::Mismatch),
    }
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte. Length inequality is folded into the same result.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    let max_len = a.len().max(b.len());

    // Different pad bytes so unequal lengths can never compare equal.
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a);
    b_padded[..b.len()].copy_from_slice(b);

    let lengths_equal = (a.len() as u64).ct_eq(&(b.len() as u64));
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}

/// Gatekeeper middleware.
///
/// Install with `axum::middleware::from_fn_with_state(token, auth_middleware)`
/// on the routes that need protection.
///
/// # Arguments
/// * `expected` - The configured bearer credential
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware or handler in the chain
///
/// # Returns
/// The downstream response, or a 401 envelope if the credential is rejected.
pub async fn auth_middleware(
    State(expected): State<ApiToken>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match admit(req.headers(), &expected) {
        Decision::Allow => next.run(req).await,
        Decision::Reject(reason) => {
            tracing::warn!(reason = %reason, uri = %req.uri(), "request rejected by gatekeeper");
            AppError::Unauthorized.into_response()
        }
    }
}
