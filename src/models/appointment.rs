use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentPaymentStatus, AppointmentStatus, Specialization};

/// Appointment joined with patient and doctor display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub doctor_specialization: Option<Specialization>,
    pub date: NaiveDate,
    pub time: String,
    pub status: AppointmentStatus,
    pub payment_status: AppointmentPaymentStatus,
    pub payment_amount: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    /// Already normalized to `HH:MM`.
    pub time: String,
}
