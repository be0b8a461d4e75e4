//! Typed list filters, deserialized straight from the query string.
//!
//! Every field is optional and an absent field does not constrain the
//! result. Unknown parameters are rejected so a misspelled filter fails
//! loudly instead of silently matching everything.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::enums::*;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub payment_status: Option<AppointmentPaymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrescriptionFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabTestFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<LabTestStatus>,
    pub payment_status: Option<LabPaymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleFilter {
    pub doctor_id: Option<Uuid>,
    pub day_of_week: Option<DayOfWeek>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentFilter {
    pub appointment_id: Option<Uuid>,
    pub method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployeeFilter {
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoctorFilter {
    pub specialization: Option<Specialization>,
}
