use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_date, parse_uuid, require_role};
use crate::db::{DatabaseError, WhereClause};
use crate::models::enums::*;
use crate::models::*;

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.patient_id, p.name, a.doctor_id, d.name,
        d.specialization, a.date, a.time, a.status, a.payment_status, a.payment_amount,
        a.created_at
    FROM appointments a
    JOIN users p ON p.id = a.patient_id
    JOIN users d ON d.id = a.doctor_id";

/// Book an appointment. Both ids must resolve to users with the matching role.
pub fn create_appointment(
    conn: &Connection,
    new: &NewAppointment,
) -> Result<Appointment, DatabaseError> {
    require_role(conn, &new.patient_id, Role::Patient)?;
    require_role(conn, &new.doctor_id, Role::Doctor)?;

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, date, time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id.to_string(),
            new.patient_id.to_string(),
            new.doctor_id.to_string(),
            new.date.to_string(),
            new.time,
        ],
    )?;
    get_appointment(conn, &id)
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Appointment, DatabaseError> {
    let sql = format!("{APPOINTMENT_SELECT} WHERE a.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], appointment_row_from_rusqlite)
        .optional()?;
    match row {
        Some(row) => appointment_from_row(row),
        None => Err(DatabaseError::not_found("Appointment", id)),
    }
}

/// Filtered list ordered by date then time, earliest first.
pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause
        .eq("a.patient_id", filter.patient_id.map(|id| id.to_string()))
        .eq("a.doctor_id", filter.doctor_id.map(|id| id.to_string()))
        .eq("a.date", filter.date.map(|d| d.to_string()))
        .eq("a.status", filter.status.map(|s| s.as_str()))
        .eq("a.payment_status", filter.payment_status.map(|s| s.as_str()));

    let sql = format!(
        "{APPOINTMENT_SELECT} WHERE 1=1{} ORDER BY a.date ASC, a.time ASC",
        clause.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clause.params().as_slice(), appointment_row_from_rusqlite)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

/// Overwrite the status. Any status may replace any other, and writing the
/// current value again succeeds.
pub fn update_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: AppointmentStatus,
) -> Result<Appointment, DatabaseError> {
    let updated = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Appointment", id));
    }
    get_appointment(conn, id)
}

// Internal row type for Appointment mapping
struct AppointmentRow {
    id: String,
    patient_id: String,
    patient_name: String,
    doctor_id: String,
    doctor_name: String,
    doctor_specialization: Option<String>,
    date: String,
    time: String,
    status: String,
    payment_status: String,
    payment_amount: Option<f64>,
    created_at: String,
}

fn appointment_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AppointmentRow, rusqlite::Error> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        doctor_id: row.get(3)?,
        doctor_name: row.get(4)?,
        doctor_specialization: row.get(5)?,
        date: row.get(6)?,
        time: row.get(7)?,
        status: row.get(8)?,
        payment_status: row.get(9)?,
        payment_amount: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        patient_name: row.patient_name,
        doctor_id: parse_uuid(&row.doctor_id)?,
        doctor_name: row.doctor_name,
        doctor_specialization: row
            .doctor_specialization
            .as_deref()
            .map(Specialization::from_str)
            .transpose()?,
        date: parse_date(&row.date)?,
        time: row.time,
        status: AppointmentStatus::from_str(&row.status)?,
        payment_status: AppointmentPaymentStatus::from_str(&row.payment_status)?,
        payment_amount: row.payment_amount,
        created_at: row.created_at,
    })
}
