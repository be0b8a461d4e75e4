//! Staff management (Admin only).
//!
//! - `GET /employees`
//! - `POST /employees` and `POST /auth/register/employee`
//! - `DELETE /employees/:id`

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::{create_user, validate_new_user};
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{Role, RoleSet, Specialization};
use crate::models::{EmployeeFilter, PatientProfile, User};

const MANAGERS: RoleSet = RoleSet::of(&[Role::Admin]);

#[derive(Deserialize)]
pub struct CreateEmployeeRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub specialization: Option<Specialization>,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(filter): ApiQuery<EmployeeFilter>,
) -> Result<Json<Vec<User>>, ApiError> {
    identity.require(MANAGERS)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_employees(&conn, &filter)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiJson(request): ApiJson<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    identity.require(MANAGERS)?;
    if request.role == Role::Patient {
        return Err(ApiError::BadRequest(
            "Patients register through /auth/register/patient".into(),
        ));
    }

    let new = validate_new_user(
        &request.name,
        &request.email,
        &request.password,
        request.role,
        request.specialization,
    )?;
    let user = create_user(&ctx, new, PatientProfile::default()).await?;
    tracing::info!(admin_id = %identity.id, user_id = %user.id, "Employee created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    identity.require(MANAGERS)?;
    if id == identity.id {
        return Err(ApiError::BadRequest("You cannot delete your own account".into()));
    }

    let conn = ctx.core.open_db()?;
    let user = db::get_user(&conn, &id)?;
    if !user.role.is_staff() {
        return Err(ApiError::NotFound("Employee not found".into()));
    }
    db::delete_user(&conn, &id)?;
    tracing::info!(admin_id = %identity.id, user_id = %id, "Employee deleted");
    Ok(StatusCode::NO_CONTENT)
}
