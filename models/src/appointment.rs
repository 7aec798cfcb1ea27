// models/src/appointment.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled visit. `date` stays plaintext so the reminder sweep can
/// range-scan it; `description` is encrypted at rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    /// Clinic-local appointment time.
    pub date: NaiveDateTime,
    pub description: Option<String>,
    pub patient_id: Uuid,
    /// Dedup guard for the day-before reminder. Flips false→true exactly
    /// once, only after the gateway confirms a send.
    pub reminded: bool,
}
