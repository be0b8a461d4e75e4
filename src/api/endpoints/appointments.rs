//! Appointment endpoints.
//!
//! - `GET /appointments`: filtered list, scoped to the caller for
//!   patients and doctors
//! - `POST /appointments`: book
//! - `GET /appointments/:id`
//! - `PATCH /appointments/:id/status`
//! - `POST /appointments/:id/payment`: record payment and mark paid

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{AppointmentStatus, PaymentMethod, Role, RoleSet};
use crate::models::{normalize_slot, Appointment, AppointmentFilter, NewAppointment, NewPayment, Payment};

const READERS: RoleSet = RoleSet::of(&[
    Role::Admin,
    Role::Doctor,
    Role::Receptionist,
    Role::Patient,
]);
const BOOKERS: RoleSet = RoleSet::of(&[Role::Admin, Role::Receptionist, Role::Patient]);
const CASHIERS: RoleSet = RoleSet::of(&[Role::Admin, Role::Receptionist]);

/// Patients see exactly their own appointments; any person filter they
/// send is dropped. Doctors only see those assigned to them.
fn scope(identity: &Identity, filter: &mut AppointmentFilter) {
    match identity.role {
        Role::Patient => {
            filter.patient_id = Some(identity.id);
            filter.doctor_id = None;
        }
        Role::Doctor => filter.doctor_id = Some(identity.id),
        _ => {}
    }
}

fn visible_to(identity: &Identity, appointment: &Appointment) -> bool {
    match identity.role {
        Role::Patient => appointment.patient_id == identity.id,
        Role::Doctor => appointment.doctor_id == identity.id,
        _ => true,
    }
}

/// Fetch an appointment, hiding ones outside the caller's scope.
fn load_visible(
    conn: &rusqlite::Connection,
    identity: &Identity,
    id: &Uuid,
) -> Result<Appointment, ApiError> {
    let appointment = db::get_appointment(conn, id)?;
    if !visible_to(identity, &appointment) {
        return Err(ApiError::NotFound("Appointment not found".into()));
    }
    Ok(appointment)
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(mut filter): ApiQuery<AppointmentFilter>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    identity.require(READERS)?;
    scope(&identity, &mut filter);
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_appointments(&conn, &filter)?))
}

#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    /// Ignored for patients, who always book for themselves.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiJson(request): ApiJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    identity.require(BOOKERS)?;

    let patient_id = if identity.is(Role::Patient) {
        identity.id
    } else {
        request
            .patient_id
            .ok_or_else(|| ApiError::BadRequest("patient_id is required".into()))?
    };
    let time = normalize_slot(&request.time)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid time: {}", request.time)))?;

    let conn = ctx.core.open_db()?;
    let appointment = db::create_appointment(
        &conn,
        &NewAppointment {
            patient_id,
            doctor_id: request.doctor_id,
            date: request.date,
            time,
        },
    )?;
    tracing::info!(
        appointment_id = %appointment.id,
        booked_by = %identity.id,
        "Appointment booked"
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    identity.require(READERS)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(load_visible(&conn, &identity, &id)?))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

/// Any status may replace any other. Patients may only cancel their own;
/// doctors may only touch their own.
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> Result<Json<Appointment>, ApiError> {
    identity.require(READERS)?;
    let conn = ctx.core.open_db()?;
    load_visible(&conn, &identity, &id)?;
    if identity.is(Role::Patient) && request.status != AppointmentStatus::Cancelled {
        return Err(ApiError::Forbidden);
    }

    let appointment = db::update_appointment_status(&conn, &id, request.status)?;
    tracing::info!(
        appointment_id = %id,
        status = %request.status,
        user_id = %identity.id,
        "Appointment status updated"
    );
    Ok(Json(appointment))
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub method: PaymentMethod,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub appointment: Appointment,
    pub payment: Payment,
}

pub async fn pay(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    identity.require(CASHIERS)?;
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ApiError::BadRequest("amount must be greater than zero".into()));
    }

    let mut conn = ctx.core.open_db()?;
    let (appointment, payment) = db::pay_appointment(
        &mut conn,
        &NewPayment {
            appointment_id: id,
            amount: request.amount,
            method: request.method,
            processed_by: identity.id,
        },
    )?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            appointment,
            payment,
        }),
    ))
}
