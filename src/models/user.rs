use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Role, Specialization};

/// Public projection of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub specialization: Option<Specialization>,
    pub created_at: String,
}

/// Full credential record, only used by login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub specialization: Option<Specialization>,
}

/// Patient-only profile fields, stored 1:1 with the user row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub contact_number: Option<String>,
    pub medical_history: Option<String>,
}

/// A patient user joined with their profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub profile: PatientProfile,
}

/// Trim and lower-case an email so uniqueness is case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
