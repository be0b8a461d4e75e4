use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use super::{get_appointment, now_rfc3339, parse_uuid};
use crate::db::{DatabaseError, WhereClause};
use crate::models::enums::*;
use crate::models::*;

const PAYMENT_SELECT: &str = "SELECT pay.id, pay.appointment_id, p.name, d.name, pay.amount,
        pay.method, pay.status, pay.paid_at, pay.processed_by, s.name
    FROM payments pay
    JOIN appointments a ON a.id = pay.appointment_id
    JOIN users p ON p.id = a.patient_id
    JOIN users d ON d.id = a.doctor_id
    LEFT JOIN users s ON s.id = pay.processed_by";

/// Record a payment and mark its appointment paid in one transaction.
///
/// Either both rows change or neither does. Paying an appointment that is
/// already paid fails with `Conflict`.
///
/// The write lock is taken up front (`BEGIN IMMEDIATE`) so concurrent payers
/// queue on `busy_timeout` and the losers see the status already `Paid`.
pub fn pay_appointment(
    conn: &mut Connection,
    new: &NewPayment,
) -> Result<(Appointment, Payment), DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current: Option<String> = tx
        .query_row(
            "SELECT payment_status FROM appointments WHERE id = ?1",
            params![new.appointment_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let current = match current {
        Some(status) => AppointmentPaymentStatus::from_str(&status)?,
        None => return Err(DatabaseError::not_found("Appointment", new.appointment_id)),
    };
    if current == AppointmentPaymentStatus::Paid {
        return Err(DatabaseError::Conflict("Appointment is already paid".into()));
    }

    let id = Uuid::new_v4();
    tx.execute(
        "INSERT INTO payments (id, appointment_id, amount, method, status, paid_at, processed_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            new.appointment_id.to_string(),
            new.amount,
            new.method.as_str(),
            PaymentStatus::Paid.as_str(),
            now_rfc3339(),
            new.processed_by.to_string(),
        ],
    )?;
    tx.execute(
        "UPDATE appointments SET payment_status = ?1, payment_amount = ?2 WHERE id = ?3",
        params![
            AppointmentPaymentStatus::Paid.as_str(),
            new.amount,
            new.appointment_id.to_string(),
        ],
    )?;

    let appointment = get_appointment(&tx, &new.appointment_id)?;
    let payment = get_payment(&tx, &id)?;
    tx.commit()?;

    tracing::info!(
        appointment_id = %new.appointment_id,
        payment_id = %id,
        amount = new.amount,
        "Appointment paid"
    );
    Ok((appointment, payment))
}

pub fn get_payment(conn: &Connection, id: &Uuid) -> Result<Payment, DatabaseError> {
    let sql = format!("{PAYMENT_SELECT} WHERE pay.id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], payment_row_from_rusqlite)
        .optional()?;
    match row {
        Some(row) => payment_from_row(row),
        None => Err(DatabaseError::not_found("Payment", id)),
    }
}

/// Filtered list, most recent payment first.
pub fn list_payments(conn: &Connection, filter: &PaymentFilter) -> Result<Vec<Payment>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause
        .eq("pay.appointment_id", filter.appointment_id.map(|id| id.to_string()))
        .eq("pay.method", filter.method.map(|m| m.as_str()))
        .eq("pay.status", filter.status.map(|s| s.as_str()));

    let sql = format!(
        "{PAYMENT_SELECT} WHERE 1=1{} ORDER BY pay.paid_at DESC",
        clause.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clause.params().as_slice(), payment_row_from_rusqlite)?;

    let mut payments = Vec::new();
    for row in rows {
        payments.push(payment_from_row(row?)?);
    }
    Ok(payments)
}

struct PaymentRow {
    id: String,
    appointment_id: String,
    patient_name: String,
    doctor_name: String,
    amount: f64,
    method: String,
    status: String,
    paid_at: String,
    processed_by: Option<String>,
    processed_by_name: Option<String>,
}

fn payment_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PaymentRow, rusqlite::Error> {
    Ok(PaymentRow {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        patient_name: row.get(2)?,
        doctor_name: row.get(3)?,
        amount: row.get(4)?,
        method: row.get(5)?,
        status: row.get(6)?,
        paid_at: row.get(7)?,
        processed_by: row.get(8)?,
        processed_by_name: row.get(9)?,
    })
}

fn payment_from_row(row: PaymentRow) -> Result<Payment, DatabaseError> {
    Ok(Payment {
        id: parse_uuid(&row.id)?,
        appointment_id: parse_uuid(&row.appointment_id)?,
        patient_name: row.patient_name,
        doctor_name: row.doctor_name,
        amount: row.amount,
        method: PaymentMethod::from_str(&row.method)?,
        status: PaymentStatus::from_str(&row.status)?,
        paid_at: row.paid_at,
        processed_by: row.processed_by.as_deref().map(parse_uuid).transpose()?,
        processed_by_name: row.processed_by_name,
    })
}
