//! Login, self-registration and identity endpoints.
//!
//! - `POST /auth/login`
//! - `POST /auth/register/patient`
//! - `GET /auth/specializations`
//! - `GET /auth/me`
//!
//! Employee registration lives in [`super::employees`].

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{optional_text, required_text};
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, Identity};
use crate::crypto::PasswordHasher;
use crate::db;
use crate::models::enums::{Role, Specialization};
use crate::models::{normalize_email, NewUser, PatientProfile, User};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }

    let credentials = {
        let conn = ctx.core.open_db()?;
        db::find_credentials_by_email(&conn, &request.email)?
    };
    let Some(credentials) = credentials else {
        tracing::info!("Login failed: unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let verified = verify_password(
        *ctx.core.hasher(),
        request.password,
        credentials.password_hash,
    )
    .await?;
    if !verified {
        tracing::info!(user_id = %credentials.user.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let user = credentials.user;
    let token = ctx.core.tokens().issue(user.id, user.role)?;
    tracing::info!(user_id = %user.id, role = %user.role, "Login succeeded");
    Ok(Json(AuthResponse { token, user }))
}

#[derive(Deserialize)]
pub struct RegisterPatientRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub contact_number: Option<String>,
    pub medical_history: Option<String>,
}

/// `POST /auth/register/patient`: public self-registration.
pub async fn register_patient(
    State(ctx): State<ApiContext>,
    ApiJson(request): ApiJson<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let new = validate_new_user(
        &request.name,
        &request.email,
        &request.password,
        Role::Patient,
        None,
    )?;
    let profile = PatientProfile {
        contact_number: optional_text(request.contact_number),
        medical_history: optional_text(request.medical_history),
    };

    let user = create_user(&ctx, new, profile).await?;
    let token = ctx.core.tokens().issue(user.id, user.role)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// `GET /auth/specializations`: the fixed list, no auth.
pub async fn specializations() -> Json<&'static [Specialization]> {
    Json(Specialization::ALL)
}

/// `GET /auth/me`
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// Shape and role checks shared by patient and employee registration.
pub(crate) fn validate_new_user(
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    specialization: Option<Specialization>,
) -> Result<NewUser, ApiError> {
    let name = required_text("name", name)?;
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    match (role, specialization) {
        (Role::Doctor, None) => {
            return Err(ApiError::BadRequest("A doctor requires a specialization".into()))
        }
        (Role::Doctor, Some(_)) | (_, None) => {}
        (_, Some(_)) => {
            return Err(ApiError::BadRequest(
                "Only doctors may have a specialization".into(),
            ))
        }
    }

    Ok(NewUser {
        name,
        email,
        password: password.to_string(),
        role,
        specialization,
    })
}

/// Hash off the async runtime, then insert user and profile.
pub(crate) async fn create_user(
    ctx: &ApiContext,
    new: NewUser,
    profile: PatientProfile,
) -> Result<User, ApiError> {
    let hasher = *ctx.core.hasher();
    let password = new.password.clone();
    let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task: {e}")))?;

    let mut conn = ctx.core.open_db()?;
    let user = db::create_user(&mut conn, &new, &hash, &profile)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(user)
}

async fn verify_password(
    hasher: PasswordHasher,
    password: String,
    stored: String,
) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task: {e}")))?
        .map_err(ApiError::from)
}
