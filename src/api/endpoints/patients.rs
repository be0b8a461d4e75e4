//! Patient directory.
//!
//! - `GET /patients`: Admin, Doctor, Receptionist
//! - `GET /patients/:id`: the same roles, or a patient reading themself

use axum::extract::State;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::ApiPath;
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{Role, RoleSet};
use crate::models::PatientRecord;

const DIRECTORY: RoleSet = RoleSet::of(&[Role::Admin, Role::Doctor, Role::Receptionist]);
const READERS: RoleSet = RoleSet::of(&[
    Role::Admin,
    Role::Doctor,
    Role::Receptionist,
    Role::Patient,
]);

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<PatientRecord>>, ApiError> {
    identity.require(DIRECTORY)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_patients(&conn)?))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PatientRecord>, ApiError> {
    identity.require(READERS)?;
    if identity.is(Role::Patient) && identity.id != id {
        return Err(ApiError::NotFound("Patient not found".into()));
    }
    let conn = ctx.core.open_db()?;
    Ok(Json(db::get_patient(&conn, &id)?))
}
