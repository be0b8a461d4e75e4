//! Fixed-window rate limiting, one bucket per client.
//!
//! Runs outermost on every route group so rejected traffic never reaches
//! token verification or the database.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;

use super::bearer_token;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Token characters that identify a client bucket.
const TOKEN_KEY_CHARS: usize = 32;
const ANONYMOUS: &str = "anonymous";

pub async fn limit(
    Extension(ctx): Extension<ApiContext>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    admit(&ctx, &client_key(req.headers()))?;
    Ok(next.run(req).await)
}

/// Count the request against `key`. Synchronous, so the limiter lock is
/// never held across an await.
fn admit(ctx: &ApiContext, key: &str) -> Result<(), ApiError> {
    let mut limiter = ctx
        .rate_limiter
        .lock()
        .map_err(|_| ApiError::Internal("rate limiter poisoned".into()))?;

    limiter.check(key).map_err(|retry_after| {
        tracing::warn!(key, retry_after, "Rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })
}

fn client_key(headers: &HeaderMap) -> String {
    match bearer_token(headers) {
        Some(token) => {
            let prefix: String = token.chars().take(TOKEN_KEY_CHARS).collect();
            format!("token:{prefix}")
        }
        None => ANONYMOUS.to_string(),
    }
}
