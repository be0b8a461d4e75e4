use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{Role, RoleSet};
use crate::models::{Payment, PaymentFilter};

const CASHIERS: RoleSet = RoleSet::of(&[Role::Admin, Role::Receptionist]);

/// `GET /payments`: most recent first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(filter): ApiQuery<PaymentFilter>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    identity.require(CASHIERS)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_payments(&conn, &filter)?))
}
