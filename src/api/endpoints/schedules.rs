//! Weekly doctor availability.
//!
//! `POST /schedules` replaces one (doctor, weekday) slot list. Doctors can
//! only write their own; admins must name the doctor.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{DayOfWeek, Role, RoleSet};
use crate::models::{normalize_slots, Schedule, ScheduleFilter};

const EDITORS: RoleSet = RoleSet::of(&[Role::Admin, Role::Doctor]);

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(filter): ApiQuery<ScheduleFilter>,
) -> Result<Json<Vec<Schedule>>, ApiError> {
    identity.require(RoleSet::ANY)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_schedules(&conn, &filter)?))
}

#[derive(Deserialize)]
pub struct UpsertScheduleRequest {
    pub doctor_id: Option<Uuid>,
    pub day_of_week: DayOfWeek,
    pub time_slots: Vec<String>,
}

pub async fn upsert(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiJson(request): ApiJson<UpsertScheduleRequest>,
) -> Result<Json<Schedule>, ApiError> {
    identity.require(EDITORS)?;

    let doctor_id = if identity.is(Role::Doctor) {
        identity.id
    } else {
        request
            .doctor_id
            .ok_or_else(|| ApiError::BadRequest("doctor_id is required".into()))?
    };
    let slots = normalize_slots(&request.time_slots)
        .map_err(|bad| ApiError::BadRequest(format!("Invalid time slot: {bad}")))?;

    let conn = ctx.core.open_db()?;
    let schedule = db::upsert_schedule(&conn, &doctor_id, request.day_of_week, &slots)?;
    tracing::info!(
        doctor_id = %doctor_id,
        day = %request.day_of_week,
        slots = schedule.time_slots.len(),
        "Schedule saved"
    );
    Ok(Json(schedule))
}
