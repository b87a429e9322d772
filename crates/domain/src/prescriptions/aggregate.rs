use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{Command, Event};

/// Prescription lifecycle status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    /// Issued and dispensable
    #[default]
    Active,
    /// Marked filled by a doctor or admin
    Filled,
    /// Every line exhausted, expiry date passed, or expired explicitly
    Expired,
    /// Withdrawn by a doctor or admin
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Filled => "filled",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_refill_limit() -> u32 {
    1
}

/// One medication on a prescription, with its dispense allowance.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct MedicationLine {
    pub id: String,
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
    pub refill_count: u32,
    #[serde(default = "default_refill_limit")]
    pub refill_limit: u32,
}

impl MedicationLine {
    /// Units still dispensable against this line.
    pub fn remaining(&self) -> u32 {
        self.refill_limit.saturating_sub(self.refill_count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.refill_count >= self.refill_limit
    }
}

/// A single line's dispense request.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RefillRequest {
    pub line_id: String,
    pub quantity: u32,
}

/// A line's refill count after a dispense.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct LineRefill {
    pub line_id: String,
    pub refill_count: u32,
}

/// Prescription aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub issued_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub medications: Vec<MedicationLine>,

    /// Number of events applied; doubles as the optimistic-concurrency token.
    pub version: u64,

    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const AGGREGATE_TYPE: &str = "Prescription";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for Prescription {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::IssuePrescription {
                id,
                patient_id,
                doctor_id,
                issued_on,
                expires_on,
                diagnosis,
                notes,
                medications,
            } => {
                self.validate_new()?;
                validate_issue(&id, &patient_id, &doctor_id, issued_on, expires_on, &medications)?;

                let medications = medications
                    .into_iter()
                    .map(|line| MedicationLine {
                        refill_count: 0,
                        ..line
                    })
                    .collect();

                Ok(vec![Event::PrescriptionIssued {
                    id,
                    patient_id,
                    doctor_id,
                    issued_on,
                    expires_on,
                    diagnosis,
                    notes,
                    medications,
                    issued_at: Utc::now(),
                }])
            }

            Command::DispenseRefills {
                expected_version,
                refills,
            } => {
                self.validate_existing()?;
                self.validate_version(expected_version)?;
                self.validate_dispensable(Utc::now().date_naive())?;

                let lines = self.plan_refills(&refills);
                if lines.is_empty() {
                    tracing::debug!(prescription_id = %self.id, "no dispensable refills requested");
                    return Ok(vec![]);
                }

                let now = Utc::now();
                let exhausted = self.exhausted_after(&lines);
                let mut events = vec![Event::RefillsDispensed {
                    id: self.id.clone(),
                    lines,
                    dispensed_at: now,
                }];

                if exhausted {
                    events.push(Event::PrescriptionExpired {
                        id: self.id.clone(),
                        updated_at: now,
                    });
                }

                Ok(events)
            }

            Command::ReconcileStatus => {
                self.validate_existing()?;

                if self.should_expire(Utc::now().date_naive()) {
                    Ok(vec![Event::PrescriptionExpired {
                        id: self.id.clone(),
                        updated_at: Utc::now(),
                    }])
                } else {
                    Ok(vec![])
                }
            }

            Command::MarkFilled => {
                self.validate_existing()?;
                self.validate_transition(PrescriptionStatus::Filled)?;

                Ok(vec![Event::PrescriptionFilled {
                    id: self.id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::CancelPrescription => {
                self.validate_existing()?;
                self.validate_transition(PrescriptionStatus::Cancelled)?;

                Ok(vec![Event::PrescriptionCancelled {
                    id: self.id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::ExpirePrescription => {
                self.validate_existing()?;
                self.validate_transition(PrescriptionStatus::Expired)?;

                Ok(vec![Event::PrescriptionExpired {
                    id: self.id.clone(),
                    updated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        self.version += 1;

        match event {
            Event::PrescriptionIssued {
                id,
                patient_id,
                doctor_id,
                issued_on,
                expires_on,
                diagnosis,
                notes,
                medications,
                issued_at,
            } => {
                self.id = id;
                self.patient_id = patient_id;
                self.doctor_id = doctor_id;
                self.issued_on = issued_on;
                self.expires_on = expires_on;
                self.diagnosis = diagnosis;
                self.notes = notes;
                self.medications = medications;
                self.status = PrescriptionStatus::Active;
                self.issued_at = issued_at;
                self.updated_at = issued_at;
            }

            Event::RefillsDispensed {
                lines,
                dispensed_at,
                ..
            } => {
                for refill in lines {
                    if let Some(line) = self.medications.iter_mut().find(|l| l.id == refill.line_id) {
                        // counts only move up
                        line.refill_count = line.refill_count.max(refill.refill_count);
                    }
                }
                self.updated_at = dispensed_at;
            }

            Event::PrescriptionExpired { updated_at, .. } => {
                self.status = PrescriptionStatus::Expired;
                self.updated_at = updated_at;
            }

            Event::PrescriptionFilled { updated_at, .. } => {
                self.status = PrescriptionStatus::Filled;
                self.updated_at = updated_at;
            }

            Event::PrescriptionCancelled { updated_at, .. } => {
                self.status = PrescriptionStatus::Cancelled;
                self.updated_at = updated_at;
            }
        }
    }
}

impl Prescription {
    pub fn line(&self, line_id: &str) -> Option<&MedicationLine> {
        self.medications.iter().find(|l| l.id == line_id)
    }

    /// True when every line is exhausted. A prescription without lines is
    /// never exhausted.
    pub fn all_lines_exhausted(&self) -> bool {
        !self.medications.is_empty() && self.medications.iter().all(MedicationLine::is_exhausted)
    }

    pub fn is_dispensable(&self) -> bool {
        self.status == PrescriptionStatus::Active
    }

    /// Resolve requests into new refill counts, in medication order.
    ///
    /// Requests for unknown or exhausted lines and zero quantities are
    /// dropped. Several requests for one line accumulate under the limit.
    pub fn plan_refills(&self, refills: &[RefillRequest]) -> Vec<LineRefill> {
        let mut counts: HashMap<&str, u32> = HashMap::new();

        for request in refills {
            let Some(line) = self.line(&request.line_id) else {
                tracing::debug!(line_id = %request.line_id, "skipping unknown medication line");
                continue;
            };
            let current = counts.entry(line.id.as_str()).or_insert(line.refill_count);
            if request.quantity == 0 || *current >= line.refill_limit {
                tracing::debug!(line_id = %line.id, "skipping refill with no allowance");
                continue;
            }
            *current = current.saturating_add(request.quantity).min(line.refill_limit);
        }

        self.medications
            .iter()
            .filter_map(|line| {
                counts
                    .get(line.id.as_str())
                    .filter(|count| **count > line.refill_count)
                    .map(|count| LineRefill {
                        line_id: line.id.clone(),
                        refill_count: *count,
                    })
            })
            .collect()
    }

    fn exhausted_after(&self, lines: &[LineRefill]) -> bool {
        !self.medications.is_empty()
            && self.medications.iter().all(|line| {
                let count = lines
                    .iter()
                    .find(|refill| refill.line_id == line.id)
                    .map_or(line.refill_count, |refill| refill.refill_count);
                count >= line.refill_limit
            })
    }

    fn is_past_expiry(&self, today: NaiveDate) -> bool {
        self.expires_on.is_some_and(|expires_on| expires_on < today)
    }

    fn should_expire(&self, today: NaiveDate) -> bool {
        self.status == PrescriptionStatus::Active
            && (self.all_lines_exhausted() || self.is_past_expiry(today))
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness { field: "id".to_string() });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound { entity: AGGREGATE_TYPE.to_string() });
        }
        Ok(())
    }

    fn validate_version(&self, expected: u64) -> Result<(), Error> {
        if self.version != expected {
            return Err(Error::Conflict {
                message: format!(
                    "prescription {} is at version {}, request was based on {}",
                    self.id, self.version, expected
                ),
            });
        }
        Ok(())
    }

    fn validate_dispensable(&self, today: NaiveDate) -> Result<(), Error> {
        if !self.is_dispensable() {
            return Err(Error::validation(format!(
                "prescription is {} and cannot be dispensed",
                self.status
            )));
        }
        if self.is_past_expiry(today) {
            return Err(Error::validation("prescription is past its expiry date"));
        }
        Ok(())
    }

    fn validate_transition(&self, to: PrescriptionStatus) -> Result<(), Error> {
        if self.status != PrescriptionStatus::Active {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

fn validate_issue(
    id: &str,
    patient_id: &str,
    doctor_id: &str,
    issued_on: NaiveDate,
    expires_on: Option<NaiveDate>,
    medications: &[MedicationLine],
) -> Result<(), Error> {
    if id.trim().is_empty() {
        return Err(Error::validation("prescription id is required"));
    }
    if patient_id.trim().is_empty() || doctor_id.trim().is_empty() {
        return Err(Error::validation("patient and doctor are required"));
    }
    if expires_on.is_some_and(|expires_on| expires_on < issued_on) {
        return Err(Error::validation("expiry date precedes issue date"));
    }

    let mut seen = HashSet::new();
    for line in medications {
        if line.id.trim().is_empty() {
            return Err(Error::validation("medication line id is required"));
        }
        if !seen.insert(line.id.as_str()) {
            return Err(Error::Uniqueness {
                field: format!("medications.{}", line.id),
            });
        }
        if line.name.trim().is_empty() {
            return Err(Error::validation(format!("medication {} has no name", line.id)));
        }
        if line.refill_limit == 0 {
            return Err(Error::validation(format!(
                "medication {} must allow at least one refill",
                line.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqrs_es::test::TestFramework;

    type PrescriptionTestFramework = TestFramework<Prescription>;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn line(id: &str, refill_count: u32, refill_limit: u32) -> MedicationLine {
        MedicationLine {
            id: id.to_string(),
            name: format!("Medication {id}"),
            dosage: "500mg".to_string(),
            frequency: "twice daily".to_string(),
            duration: "7 days".to_string(),
            route: "oral".to_string(),
            instructions: String::new(),
            refill_count,
            refill_limit,
        }
    }

    fn issued(medications: Vec<MedicationLine>) -> Event {
        Event::PrescriptionIssued {
            id: "rx-1".to_string(),
            patient_id: "patient-1".to_string(),
            doctor_id: "doctor-1".to_string(),
            issued_on: date(2026, 1, 10),
            expires_on: None,
            diagnosis: "Infection".to_string(),
            notes: None,
            medications,
            issued_at: Utc::now(),
        }
    }

    fn issue_command(medications: Vec<MedicationLine>) -> Command {
        Command::IssuePrescription {
            id: "rx-1".to_string(),
            patient_id: "patient-1".to_string(),
            doctor_id: "doctor-1".to_string(),
            issued_on: date(2026, 1, 10),
            expires_on: Some(date(2026, 7, 10)),
            diagnosis: "Infection".to_string(),
            notes: Some("Take with food".to_string()),
            medications,
        }
    }

    fn dispense(expected_version: u64, refills: &[(&str, u32)]) -> Command {
        Command::DispenseRefills {
            expected_version,
            refills: refills
                .iter()
                .map(|(line_id, quantity)| RefillRequest {
                    line_id: line_id.to_string(),
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    fn dispensed_lines(events: &[Event]) -> Vec<LineRefill> {
        match events.first() {
            Some(Event::RefillsDispensed { lines, .. }) => lines.clone(),
            other => panic!("expected RefillsDispensed, got {other:?}"),
        }
    }

    #[test]
    fn issue_resets_refill_counts() {
        let events = PrescriptionTestFramework::with(Services::default())
            .given_no_previous_events()
            .when(issue_command(vec![line("a", 3, 2)]))
            .inspect_result()
            .unwrap();

        match &events[..] {
            [Event::PrescriptionIssued { medications, .. }] => {
                assert_eq!(medications[0].refill_count, 0);
                assert_eq!(medications[0].refill_limit, 2);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn issue_twice_is_rejected() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![line("a", 0, 1)])])
            .when(issue_command(vec![line("a", 0, 1)]))
            .then_expect_error_message("Uniqueness conflict: id");
    }

    #[test]
    fn issue_rejects_duplicate_lines_and_zero_limits() {
        PrescriptionTestFramework::with(Services::default())
            .given_no_previous_events()
            .when(issue_command(vec![line("a", 0, 1), line("a", 0, 2)]))
            .then_expect_error_message("Uniqueness conflict: medications.a");

        PrescriptionTestFramework::with(Services::default())
            .given_no_previous_events()
            .when(issue_command(vec![line("a", 0, 0)]))
            .then_expect_error_message("Validation error: medication a must allow at least one refill");
    }

    #[test]
    fn dispensing_one_of_two_lines_keeps_prescription_active() {
        let events = PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![line("a", 0, 1), line("b", 0, 2)])])
            .when(dispense(1, &[("a", 1)]))
            .inspect_result()
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(
            dispensed_lines(&events),
            vec![LineRefill { line_id: "a".to_string(), refill_count: 1 }]
        );
    }

    #[test]
    fn exhausting_last_line_expires_in_same_command() {
        let events = PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![line("a", 0, 1)])])
            .when(dispense(1, &[("a", 1)]))
            .inspect_result()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Event::PrescriptionExpired { .. }));
    }

    #[test]
    fn quantities_are_clamped_to_limit() {
        let events = PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![line("a", 0, 2), line("b", 0, 3)])])
            .when(dispense(1, &[("a", 5), ("b", 1), ("b", 1)]))
            .inspect_result()
            .unwrap();

        assert_eq!(
            dispensed_lines(&events),
            vec![
                LineRefill { line_id: "a".to_string(), refill_count: 2 },
                LineRefill { line_id: "b".to_string(), refill_count: 2 },
            ]
        );
    }

    #[test]
    fn exhausted_unknown_and_zero_requests_are_noops() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![
                issued(vec![line("a", 0, 1), line("b", 0, 1)]),
                Event::RefillsDispensed {
                    id: "rx-1".to_string(),
                    lines: vec![LineRefill { line_id: "a".to_string(), refill_count: 1 }],
                    dispensed_at: Utc::now(),
                },
            ])
            .when(dispense(2, &[("a", 1), ("missing", 1), ("b", 0)]))
            .then_expect_events(vec![]);
    }

    #[test]
    fn stale_version_is_a_conflict() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![line("a", 0, 2)])])
            .when(dispense(0, &[("a", 1)]))
            .then_expect_error_message(
                "Conflict: prescription rx-1 is at version 1, request was based on 0",
            );
    }

    #[test]
    fn non_active_prescription_cannot_be_dispensed() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![
                issued(vec![line("a", 0, 2)]),
                Event::PrescriptionCancelled {
                    id: "rx-1".to_string(),
                    updated_at: Utc::now(),
                },
            ])
            .when(dispense(2, &[("a", 1)]))
            .then_expect_error_message(
                "Validation error: prescription is cancelled and cannot be dispensed",
            );
    }

    #[test]
    fn past_expiry_blocks_dispense_and_reconciles_to_expired() {
        let mut given = issued(vec![line("a", 0, 2)]);
        if let Event::PrescriptionIssued { issued_on, expires_on, .. } = &mut given {
            *issued_on = date(2020, 1, 1);
            *expires_on = Some(date(2020, 2, 1));
        }

        PrescriptionTestFramework::with(Services::default())
            .given(vec![given.clone()])
            .when(dispense(1, &[("a", 1)]))
            .then_expect_error_message("Validation error: prescription is past its expiry date");

        let events = PrescriptionTestFramework::with(Services::default())
            .given(vec![given])
            .when(Command::ReconcileStatus)
            .inspect_result()
            .unwrap();
        assert!(matches!(events.as_slice(), [Event::PrescriptionExpired { .. }]));
    }

    #[test]
    fn reconcile_without_lines_stays_active() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![issued(vec![])])
            .when(Command::ReconcileStatus)
            .then_expect_events(vec![]);
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        PrescriptionTestFramework::with(Services::default())
            .given(vec![
                issued(vec![line("a", 0, 1)]),
                Event::PrescriptionFilled {
                    id: "rx-1".to_string(),
                    updated_at: Utc::now(),
                },
            ])
            .when(Command::CancelPrescription)
            .then_expect_error_message("Invalid state transition from filled to cancelled");
    }

    #[test]
    fn commands_on_unknown_prescription_are_not_found() {
        PrescriptionTestFramework::with(Services::default())
            .given_no_previous_events()
            .when(Command::MarkFilled)
            .then_expect_error_message("Entity not found: Prescription");
    }

    #[test]
    fn apply_tracks_version_and_counts() {
        let mut prescription = Prescription::default();
        prescription.apply(issued(vec![line("a", 0, 2)]));
        prescription.apply(Event::RefillsDispensed {
            id: "rx-1".to_string(),
            lines: vec![LineRefill { line_id: "a".to_string(), refill_count: 2 }],
            dispensed_at: Utc::now(),
        });

        assert_eq!(prescription.version, 2);
        assert_eq!(prescription.medications[0].refill_count, 2);
        assert!(prescription.all_lines_exhausted());
    }
}
