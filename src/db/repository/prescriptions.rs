use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{now_rfc3339, parse_uuid, require_role};
use crate::db::{DatabaseError, WhereClause};
use crate::models::enums::Role;
use crate::models::*;

const PRESCRIPTION_SELECT: &str = "SELECT rx.id, rx.patient_id, p.name, rx.doctor_id, d.name,
        rx.medication, rx.dosage, rx.instructions, rx.created_at
    FROM prescriptions rx
    JOIN users p ON p.id = rx.patient_id
    JOIN users d ON d.id = rx.doctor_id";

pub fn create_prescription(
    conn: &Connection,
    new: &NewPrescription,
) -> Result<Prescription, DatabaseError> {
    require_role(conn, &new.patient_id, Role::Patient)?;
    require_role(conn, &new.doctor_id, Role::Doctor)?;

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, doctor_id, medication, dosage, instructions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            new.patient_id.to_string(),
            new.doctor_id.to_string(),
            new.medication,
            new.dosage,
            new.instructions,
            now_rfc3339(),
        ],
    )?;
    get_prescription(conn, &id)
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Prescription, DatabaseError> {
    let sql = format!("{PRESCRIPTION_SELECT} WHERE rx.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], prescription_row_from_rusqlite)
        .optional()?;
    match row {
        Some(row) => prescription_from_row(row),
        None => Err(DatabaseError::not_found("Prescription", id)),
    }
}

/// Newest first.
pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause
        .eq("rx.patient_id", filter.patient_id.map(|id| id.to_string()))
        .eq("rx.doctor_id", filter.doctor_id.map(|id| id.to_string()));

    let sql = format!(
        "{PRESCRIPTION_SELECT} WHERE 1=1{} ORDER BY rx.created_at DESC, rx.rowid DESC",
        clause.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clause.params().as_slice(), prescription_row_from_rusqlite)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(row?)?);
    }
    Ok(prescriptions)
}

/// Apply the fields present in `update`; absent ones keep their value.
pub fn update_prescription(
    conn: &Connection,
    id: &Uuid,
    update: &PrescriptionUpdate,
) -> Result<Prescription, DatabaseError> {
    let updated = conn.execute(
        "UPDATE prescriptions SET
            medication = COALESCE(?1, medication),
            dosage = COALESCE(?2, dosage),
            instructions = COALESCE(?3, instructions)
         WHERE id = ?4",
        params![
            update.medication,
            update.dosage,
            update.instructions,
            id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::not_found("Prescription", id));
    }
    get_prescription(conn, id)
}

pub fn delete_prescription(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM prescriptions WHERE id = ?1",
        params![id.to_string()],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::not_found("Prescription", id));
    }
    Ok(())
}

struct PrescriptionRow {
    id: String,
    patient_id: String,
    patient_name: String,
    doctor_id: String,
    doctor_name: String,
    medication: String,
    dosage: String,
    instructions: Option<String>,
    created_at: String,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        doctor_id: row.get(3)?,
        doctor_name: row.get(4)?,
        medication: row.get(5)?,
        dosage: row.get(6)?,
        instructions: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        patient_name: row.patient_name,
        doctor_id: parse_uuid(&row.doctor_id)?,
        doctor_name: row.doctor_name,
        medication: row.medication,
        dosage: row.dosage,
        instructions: row.instructions,
        created_at: row.created_at,
    })
}
