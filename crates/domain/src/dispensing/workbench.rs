use crate::errors::Error;
use crate::prescriptions::{
    Command, Prescription, PrescriptionStatus, RefillRequest, AGGREGATE_TYPE,
};

use super::{draft::DispenseDraft, gateway::PrescriptionGateway, scan};

pub const NOT_FOUND_NOTICE: &str = "Prescription not found";

/// Result of a commit attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommitOutcome {
    /// Nothing valid was staged; no request was sent.
    NothingStaged,
    /// Refills were stored and the prescription reloaded.
    Committed {
        status: PrescriptionStatus,
        version: u64,
    },
}

/// A pharmacist's view of one prescription at a time.
///
/// Holds the last successfully loaded prescription, the draft scoped to it
/// and the message to show the user. `commit` borrows the workbench
/// mutably, so one workbench never runs two commits at once.
pub struct Workbench<G> {
    gateway: G,
    current: Option<Prescription>,
    draft: Option<DispenseDraft>,
    notice: Option<String>,
}

impl<G: PrescriptionGateway> Workbench<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            current: None,
            draft: None,
            notice: None,
        }
    }

    pub fn prescription(&self) -> Option<&Prescription> {
        self.current.as_ref()
    }

    pub fn draft(&self) -> Option<&DispenseDraft> {
        self.draft.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Load a prescription, discarding any draft for the previous one.
    ///
    /// On failure the previously displayed prescription and its draft stay.
    pub async fn open(&mut self, id: &str) -> Result<&Prescription, Error> {
        self.notice = None;

        match self.gateway.fetch(id).await {
            Ok(prescription) => {
                self.draft = Some(DispenseDraft::initialize(&prescription));
                Ok(&*self.current.insert(prescription))
            }
            Err(err) => {
                tracing::warn!(prescription_id = %id, error = %err, "prescription lookup failed");
                self.notice = Some(NOT_FOUND_NOTICE.to_string());
                Err(err)
            }
        }
    }

    /// Resolve a scanned code and load the prescription it names.
    pub async fn scan(&mut self, raw: &str) -> Result<&Prescription, Error> {
        match scan::resolve(raw) {
            Some(id) => self.open(&id).await,
            None => {
                self.notice = Some(NOT_FOUND_NOTICE.to_string());
                Err(Error::not_found(AGGREGATE_TYPE))
            }
        }
    }

    pub fn set_checked(&mut self, line_id: &str, checked: bool) -> bool {
        match (self.draft.as_mut(), self.current.as_ref()) {
            (Some(draft), Some(current)) => draft.set_checked(current, line_id, checked),
            _ => false,
        }
    }

    pub fn set_quantity(&mut self, line_id: &str, quantity: u32) -> Option<u32> {
        match (self.draft.as_mut(), self.current.as_ref()) {
            (Some(draft), Some(current)) => draft.set_quantity(current, line_id, quantity),
            _ => None,
        }
    }

    pub fn has_staged_changes(&self) -> bool {
        match (self.draft.as_ref(), self.current.as_ref()) {
            (Some(draft), Some(current)) => draft.has_staged_changes(current),
            _ => false,
        }
    }

    /// Store the staged refills and reload the prescription.
    ///
    /// On failure the pre-commit prescription stays displayed and the draft
    /// is kept for a retry. A version conflict reloads the prescription so
    /// the retry is based on the latest version.
    pub async fn commit(&mut self) -> Result<CommitOutcome, Error> {
        let (Some(current), Some(draft)) = (self.current.as_ref(), self.draft.as_ref()) else {
            return Ok(CommitOutcome::NothingStaged);
        };

        let refills = draft.staged_refills(current);
        if refills.is_empty() {
            tracing::debug!(prescription_id = %current.id, "nothing staged, skipping commit");
            return Ok(CommitOutcome::NothingStaged);
        }

        let id = current.id.clone();
        let version = current.version;
        self.notice = None;

        match self.store(&id, version, refills).await {
            Ok(reloaded) => {
                let outcome = CommitOutcome::Committed {
                    status: reloaded.status,
                    version: reloaded.version,
                };
                self.draft = Some(DispenseDraft::initialize(&reloaded));
                self.current = Some(reloaded);
                Ok(outcome)
            }
            Err(err @ Error::Conflict { .. }) => {
                tracing::warn!(prescription_id = %id, error = %err, "dispense conflicted, reloading");
                // keep the draft; it is re-validated against the fresh snapshot on retry
                match self.gateway.fetch(&id).await {
                    Ok(latest) => {
                        self.current = Some(latest);
                        self.notice = Some(
                            "Prescription changed elsewhere; review the selection and retry"
                                .to_string(),
                        );
                    }
                    Err(reload_err) => {
                        tracing::error!(prescription_id = %id, error = %reload_err, "reload after conflict failed");
                        self.notice = Some(format!("Dispense failed: {err}"));
                    }
                }
                Err(err)
            }
            Err(err) => {
                tracing::error!(prescription_id = %id, error = %err, "dispense commit failed");
                self.notice = Some(format!("Dispense failed: {err}"));
                Err(err)
            }
        }
    }

    async fn store(
        &self,
        id: &str,
        expected_version: u64,
        refills: Vec<RefillRequest>,
    ) -> Result<Prescription, Error> {
        self.gateway
            .execute(
                id,
                Command::DispenseRefills {
                    expected_version,
                    refills,
                },
            )
            .await?;

        let reloaded = self.gateway.fetch(id).await?;
        if reloaded.is_dispensable() && reloaded.all_lines_exhausted() {
            tracing::info!(prescription_id = %id, "all lines exhausted, reconciling status");
            self.gateway.execute(id, Command::ReconcileStatus).await?;
            return self.gateway.fetch(id).await;
        }

        Ok(reloaded)
    }
}
