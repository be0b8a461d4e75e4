//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Rate limiter: reject early, before any database work
//! 2. Auth validator: bearer token → `Identity`
//! 3. Audit logger: logs after auth, has the caller's id
//!
//! Handler responses behind auth get `Cache-Control: no-store` from a
//! tower-http layer in the router. `errors::reveal_internal` wraps the whole
//! router outside production.

pub mod audit;
pub mod auth;
pub mod errors;
pub mod rate;

use axum::http::{header, HeaderMap};

/// The token from `Authorization: Bearer <token>`, if present and non-blank.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
