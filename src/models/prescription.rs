use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub medication: String,
    pub dosage: String,
    pub instructions: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub instructions: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionUpdate {
    pub medication: Option<String>,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
}

impl PrescriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self.medication.is_none() && self.dosage.is_none() && self.instructions.is_none()
    }
}
