use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub paid_at: String,
    pub processed_by: Option<Uuid>,
    pub processed_by_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub appointment_id: Uuid,
    pub amount: f64,
    pub method: PaymentMethod,
    pub processed_by: Uuid,
}
