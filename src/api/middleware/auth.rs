//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies signature and expiry,
//! resolves the subject to a stored user and injects an [`Identity`] into
//! request extensions. Role checks happen in the handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::bearer_token;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Identity};
use crate::db::{self, DatabaseError};

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let identity = authenticate(&ctx, &req)?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

fn authenticate(ctx: &ApiContext, req: &Request<axum::body::Body>) -> Result<Identity, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::MissingToken)?;

    let claims = ctx.core.tokens().verify(token)?;

    // No revocation list: a deleted account is the only way a well-signed
    // token stops resolving.
    let conn = ctx.core.open_db()?;
    match db::get_user(&conn, &claims.sub) {
        Ok(user) => Ok(Identity::from(user)),
        Err(DatabaseError::NotFound { .. }) => {
            tracing::info!(user_id = %claims.sub, "Token for deleted user rejected");
            Err(ApiError::UserNotFound)
        }
        Err(e) => Err(e.into()),
    }
}
