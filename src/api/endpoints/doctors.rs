use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::RoleSet;
use crate::models::{DoctorFilter, User};

/// `GET /doctors`: any signed-in user, optionally by specialization.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(filter): ApiQuery<DoctorFilter>,
) -> Result<Json<Vec<User>>, ApiError> {
    identity.require(RoleSet::ANY)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_doctors(&conn, &filter)?))
}
