use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::aggregate::{PrescriptionStatus, RefillRequest};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewMedicationLine {
    /// Generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub refill_limit: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuePrescriptionInput {
    pub patient_id: String,
    pub doctor_id: String,
    pub issued_on: NaiveDate,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub medications: Vec<NewMedicationLine>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanInput {
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispenseInput {
    /// Version of the prescription the refills were staged against
    pub version: u64,
    pub refills: Vec<RefillRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateStatusInput {
    pub status: PrescriptionStatus,
}
