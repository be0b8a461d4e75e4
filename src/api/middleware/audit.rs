//! Audit logging middleware.
//!
//! Logs every authenticated request with the caller, method, path, status
//! and latency. Runs innermost, after auth has injected the identity.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::Identity;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let caller = req.extensions().get::<Identity>().map(|i| (i.id, i.role));
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match caller {
        Some((user_id, role)) => tracing::info!(
            %method,
            %path,
            %user_id,
            %role,
            status,
            elapsed_ms,
            "API access"
        ),
        None => tracing::info!(%method, %path, status, elapsed_ms, "API access"),
    }

    response
}
