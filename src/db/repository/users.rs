use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use super::{is_unique_violation, parse_uuid};
use crate::db::{DatabaseError, WhereClause};
use crate::models::enums::{Role, Specialization};
use crate::models::*;

const USER_COLUMNS: &str = "u.id, u.name, u.email, u.role, u.specialization, u.created_at";

/// Insert a user plus the profile row its role requires, atomically.
///
/// `profile` is only stored for patients. Doctors must carry a
/// specialization. A duplicate email fails with `Conflict` and leaves the
/// existing row untouched.
pub fn create_user(
    conn: &mut Connection,
    new: &NewUser,
    password_hash: &str,
    profile: &PatientProfile,
) -> Result<User, DatabaseError> {
    let id = Uuid::new_v4();
    let email = normalize_email(&new.email);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO users (id, name, email, password_hash, role, specialization)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            new.name.trim(),
            email,
            password_hash,
            new.role.as_str(),
            new.specialization.map(|s| s.as_str()),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            DatabaseError::Conflict("Email already registered".into())
        } else {
            e.into()
        }
    })?;

    match new.role {
        Role::Patient => {
            tx.execute(
                "INSERT INTO patients (user_id, contact_number, medical_history)
                 VALUES (?1, ?2, ?3)",
                params![
                    id.to_string(),
                    profile.contact_number,
                    profile.medical_history,
                ],
            )?;
        }
        Role::Doctor => {
            let specialization = new.specialization.ok_or_else(|| {
                DatabaseError::ConstraintViolation("a doctor requires a specialization".into())
            })?;
            tx.execute(
                "INSERT INTO doctors (user_id, specialization) VALUES (?1, ?2)",
                params![id.to_string(), specialization.as_str()],
            )?;
        }
        Role::Admin | Role::Receptionist | Role::LabTechnician => {}
    }

    let user = get_user(&tx, &id)?;
    tx.commit()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<User, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], user_row_from_rusqlite)
        .optional()?;
    match row {
        Some(row) => user_from_row(row),
        None => Err(DatabaseError::not_found("User", id)),
    }
}

/// Full record including the password hash. Email is normalized first.
pub fn find_credentials_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<UserCredentials>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = ?1");
    let row = conn
        .query_row(&sql, params![normalize_email(email)], |row| {
            Ok((user_row_from_rusqlite(row)?, row.get::<_, String>(6)?))
        })
        .optional()?;

    row.map(|(user, password_hash)| {
        Ok(UserCredentials {
            user: user_from_row(user)?,
            password_hash,
        })
    })
    .transpose()
}

/// Resolve `id` and check it carries `role`; used to validate references.
pub fn require_role(conn: &Connection, id: &Uuid, role: Role) -> Result<User, DatabaseError> {
    match get_user(conn, id) {
        Ok(user) if user.role == role => Ok(user),
        Ok(_) | Err(DatabaseError::NotFound { .. }) => Err(DatabaseError::InvalidReference(
            format!("{id} is not a known {}", role.as_str().to_lowercase()),
        )),
        Err(e) => Err(e),
    }
}

/// Staff users (every role but Patient), ordered by name.
pub fn list_employees(conn: &Connection, filter: &EmployeeFilter) -> Result<Vec<User>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause.eq("u.role", filter.role.map(|r| r.as_str()));

    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u
         WHERE u.role != 'Patient'{} ORDER BY u.name ASC, u.created_at ASC",
        clause.sql()
    );
    query_users(conn, &sql, &clause)
}

pub fn list_doctors(conn: &Connection, filter: &DoctorFilter) -> Result<Vec<User>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause.eq("d.specialization", filter.specialization.map(|s| s.as_str()));

    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u
         JOIN doctors d ON d.user_id = u.id
         WHERE 1=1{} ORDER BY u.name ASC",
        clause.sql()
    );
    query_users(conn, &sql, &clause)
}

pub fn list_patients(conn: &Connection) -> Result<Vec<PatientRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, p.contact_number, p.medical_history FROM users u
         JOIN patients p ON p.user_id = u.id
         ORDER BY u.name ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], patient_row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        let (user, profile) = row?;
        patients.push(PatientRecord {
            user: user_from_row(user)?,
            profile,
        });
    }
    Ok(patients)
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<PatientRecord, DatabaseError> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, p.contact_number, p.medical_history FROM users u
         JOIN patients p ON p.user_id = u.id
         WHERE u.id = ?1"
    );
    let row = conn
        .query_row(&sql, params![id.to_string()], patient_row_from_rusqlite)
        .optional()?;
    match row {
        Some((user, profile)) => Ok(PatientRecord {
            user: user_from_row(user)?,
            profile,
        }),
        None => Err(DatabaseError::not_found("Patient", id)),
    }
}

pub fn delete_user(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

fn query_users(conn: &Connection, sql: &str, clause: &WhereClause) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(clause.params().as_slice(), user_row_from_rusqlite)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(user_from_row(row?)?);
    }
    Ok(users)
}

// Internal row type for User mapping
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    specialization: Option<String>,
    created_at: String,
}

fn user_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        specialization: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn patient_row_from_rusqlite(
    row: &rusqlite::Row<'_>,
) -> Result<(UserRow, PatientProfile), rusqlite::Error> {
    Ok((
        user_row_from_rusqlite(row)?,
        PatientProfile {
            contact_number: row.get(6)?,
            medical_history: row.get(7)?,
        },
    ))
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        name: row.name,
        email: row.email,
        role: Role::from_str(&row.role)?,
        specialization: row
            .specialization
            .as_deref()
            .map(Specialization::from_str)
            .transpose()?,
        created_at: row.created_at,
    })
}
