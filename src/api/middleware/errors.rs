//! Reveals the cause of internal errors outside production.
//!
//! [`ApiError::Internal`](crate::api::error::ApiError) always renders a
//! generic message and stashes the detail in a response extension. This
//! layer, only mounted when not in production, swaps the detail back in.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::error::{ErrorBody, InternalDetail};

pub async fn reveal_internal(req: Request<axum::body::Body>, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorBody {
        error: detail,
        code: "INTERNAL",
    });
    let rebuilt = body.into_response();
    let (_, body) = rebuilt.into_parts();
    Response::from_parts(parts, body)
}
