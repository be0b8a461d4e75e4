//! API endpoint handlers, one module per resource.
//!
//! Each handler checks the caller's role against the route's `RoleSet`
//! first, then applies identity scoping before touching the store.

pub mod appointments;
pub mod auth;
pub mod doctors;
pub mod employees;
pub mod health;
pub mod patients;
pub mod payments;
pub mod prescriptions;
pub mod schedules;

use crate::api::error::ApiError;

/// Trimmed, non-empty text or a 400 naming the field.
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Blank optional text collapses to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
