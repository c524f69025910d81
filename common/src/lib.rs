//! Shared building blocks for the ZTNA agent.
//!
//! - `config`: startup configuration loaded from the environment
//! - `errors`: the request-scoped error taxonomy and its HTTP mapping
//! - `middleware`: the access gatekeeper and request-id propagation
//! - `models`: backend result sets and their JSON serialization
//! - `response`: wire envelopes

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
