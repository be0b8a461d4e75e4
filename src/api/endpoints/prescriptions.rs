//! Prescription endpoints.
//!
//! Doctors write prescriptions and may only change or remove their own.
//! Reads are scoped: patients see theirs, doctors see the ones they wrote.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{optional_text, required_text};
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::types::{ApiContext, Identity};
use crate::db;
use crate::models::enums::{Role, RoleSet};
use crate::models::{NewPrescription, Prescription, PrescriptionFilter, PrescriptionUpdate};

const READERS: RoleSet = RoleSet::of(&[
    Role::Admin,
    Role::Doctor,
    Role::Receptionist,
    Role::Patient,
]);
const PRESCRIBERS: RoleSet = RoleSet::of(&[Role::Doctor]);

fn scope(identity: &Identity, filter: &mut PrescriptionFilter) {
    match identity.role {
        Role::Patient => {
            filter.patient_id = Some(identity.id);
            filter.doctor_id = None;
        }
        Role::Doctor => filter.doctor_id = Some(identity.id),
        _ => {}
    }
}

fn load_visible(
    conn: &rusqlite::Connection,
    identity: &Identity,
    id: &Uuid,
) -> Result<Prescription, ApiError> {
    let prescription = db::get_prescription(conn, id)?;
    let visible = match identity.role {
        Role::Patient => prescription.patient_id == identity.id,
        Role::Doctor => prescription.doctor_id == identity.id,
        _ => true,
    };
    if !visible {
        return Err(ApiError::NotFound("Prescription not found".into()));
    }
    Ok(prescription)
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiQuery(mut filter): ApiQuery<PrescriptionFilter>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    identity.require(READERS)?;
    scope(&identity, &mut filter);
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_prescriptions(&conn, &filter)?))
}

#[derive(Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub instructions: Option<String>,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiJson(request): ApiJson<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    identity.require(PRESCRIBERS)?;
    let new = NewPrescription {
        patient_id: request.patient_id,
        doctor_id: identity.id,
        medication: required_text("medication", &request.medication)?,
        dosage: required_text("dosage", &request.dosage)?,
        instructions: optional_text(request.instructions),
    };

    let conn = ctx.core.open_db()?;
    let prescription = db::create_prescription(&conn, &new)?;
    tracing::info!(prescription_id = %prescription.id, doctor_id = %identity.id, "Prescription written");
    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Prescription>, ApiError> {
    identity.require(READERS)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(load_visible(&conn, &identity, &id)?))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<PrescriptionUpdate>,
) -> Result<Json<Prescription>, ApiError> {
    identity.require(PRESCRIBERS)?;
    let update = PrescriptionUpdate {
        medication: request
            .medication
            .map(|m| required_text("medication", &m))
            .transpose()?,
        dosage: request
            .dosage
            .map(|d| required_text("dosage", &d))
            .transpose()?,
        instructions: request.instructions.map(|i| i.trim().to_string()),
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let conn = ctx.core.open_db()?;
    load_visible(&conn, &identity, &id)?;
    Ok(Json(db::update_prescription(&conn, &id, &update)?))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    identity.require(PRESCRIBERS)?;
    let conn = ctx.core.open_db()?;
    load_visible(&conn, &identity, &id)?;
    db::delete_prescription(&conn, &id)?;
    tracing::info!(prescription_id = %id, doctor_id = %identity.id, "Prescription deleted");
    Ok(StatusCode::NO_CONTENT)
}
