use chrono::{DateTime, NaiveDate, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::{LineRefill, MedicationLine};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    PrescriptionIssued {
        id: String,
        patient_id: String,
        doctor_id: String,
        issued_on: NaiveDate,
        expires_on: Option<NaiveDate>,
        diagnosis: String,
        notes: Option<String>,
        medications: Vec<MedicationLine>,
        issued_at: DateTime<Utc>,
    },

    RefillsDispensed {
        id: String,
        lines: Vec<LineRefill>,
        dispensed_at: DateTime<Utc>,
    },

    PrescriptionExpired {
        id: String,
        updated_at: DateTime<Utc>,
    },

    PrescriptionFilled {
        id: String,
        updated_at: DateTime<Utc>,
    },

    PrescriptionCancelled {
        id: String,
        updated_at: DateTime<Utc>,
    },
}

pub const EVENT_ISSUED: &str = "Prescription:Issued";
pub const EVENT_REFILLS_DISPENSED: &str = "Prescription:RefillsDispensed";
pub const EVENT_EXPIRED: &str = "Prescription:Expired";
pub const EVENT_FILLED: &str = "Prescription:Filled";
pub const EVENT_CANCELLED: &str = "Prescription:Cancelled";

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        let event_type = match self {
            Event::PrescriptionIssued { .. } => EVENT_ISSUED,
            Event::RefillsDispensed { .. } => EVENT_REFILLS_DISPENSED,
            Event::PrescriptionExpired { .. } => EVENT_EXPIRED,
            Event::PrescriptionFilled { .. } => EVENT_FILLED,
            Event::PrescriptionCancelled { .. } => EVENT_CANCELLED,
        };
        event_type.to_string()
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
