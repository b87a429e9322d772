use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::aggregate::{MedicationLine, RefillRequest};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Issue a new prescription (doctor action)
    IssuePrescription {
        id: String,
        patient_id: String,
        doctor_id: String,
        issued_on: NaiveDate,
        expires_on: Option<NaiveDate>,
        diagnosis: String,
        notes: Option<String>,
        medications: Vec<MedicationLine>,
    },

    /// Dispense staged refills against the version the pharmacist last read
    DispenseRefills {
        expected_version: u64,
        refills: Vec<RefillRequest>,
    },

    /// Re-derive the expired status from line exhaustion and expiry date
    ReconcileStatus,

    /// Mark the prescription filled
    MarkFilled,

    /// Cancel the prescription
    CancelPrescription,

    /// Expire the prescription explicitly
    ExpirePrescription,
}
