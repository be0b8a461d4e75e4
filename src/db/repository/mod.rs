//! Repository layer: entity-scoped database operations.
//!
//! Every list query joins the display names of the users it references and
//! has a fixed ordering. All public functions are re-exported here.

mod appointments;
mod payments;
mod prescriptions;
mod schedules;
mod users;

use chrono::NaiveDate;
use uuid::Uuid;

use super::DatabaseError;

pub use appointments::*;
pub use lab_tests::*;
pub use payments::*;
pub use prescriptions::*;
pub use schedules::*;
pub use users::*;

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date {raw}: {e}")))
}

/// True when `err` is a UNIQUE constraint failure.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Current time in RFC 3339, used for application-set timestamps.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
