use std::collections::BTreeMap;

use crate::prescriptions::{MedicationLine, Prescription, RefillRequest};

/// Staged selection for one medication line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DraftEntry {
    pub checked: bool,
    pub quantity: u32,
}

impl Default for DraftEntry {
    fn default() -> Self {
        Self {
            checked: false,
            quantity: 1,
        }
    }
}

/// Unsaved dispense selections for exactly one prescription.
///
/// Every operation takes the prescription snapshot it applies to and is
/// ignored when that snapshot belongs to another prescription, so a draft
/// can never stage lines for anything but its own prescription.
#[derive(Clone, Debug)]
pub struct DispenseDraft {
    prescription_id: String,
    entries: BTreeMap<String, DraftEntry>,
}

impl DispenseDraft {
    pub fn initialize(prescription: &Prescription) -> Self {
        Self {
            prescription_id: prescription.id.clone(),
            entries: prescription
                .medications
                .iter()
                .map(|line| (line.id.clone(), DraftEntry::default()))
                .collect(),
        }
    }

    pub fn prescription_id(&self) -> &str {
        &self.prescription_id
    }

    pub fn entry(&self, line_id: &str) -> Option<DraftEntry> {
        self.entries.get(line_id).copied()
    }

    /// Toggle a line. Returns whether the draft changed.
    pub fn set_checked(&mut self, prescription: &Prescription, line_id: &str, checked: bool) -> bool {
        let Some(line) = self.open_line(prescription, line_id) else {
            return false;
        };
        let remaining = line.remaining();

        let Some(entry) = self.entries.get_mut(line_id) else {
            return false;
        };
        entry.checked = checked;
        entry.quantity = entry.quantity.clamp(1, remaining);
        true
    }

    /// Set a checked line's quantity, clamped to `[1, remaining]`. Returns the
    /// stored quantity, or `None` when the update was ignored.
    pub fn set_quantity(
        &mut self,
        prescription: &Prescription,
        line_id: &str,
        quantity: u32,
    ) -> Option<u32> {
        let remaining = self.open_line(prescription, line_id)?.remaining();

        let entry = self.entries.get_mut(line_id)?;
        if !entry.checked {
            return None;
        }
        entry.quantity = quantity.clamp(1, remaining);
        Some(entry.quantity)
    }

    pub fn has_staged_changes(&self, prescription: &Prescription) -> bool {
        !self.staged_refills(prescription).is_empty()
    }

    /// Commit payload, re-validated against `prescription`.
    ///
    /// Unchecked entries, zero quantities and lines without allowance left in
    /// this snapshot are dropped; quantities are clamped to what remains.
    pub fn staged_refills(&self, prescription: &Prescription) -> Vec<RefillRequest> {
        if prescription.id != self.prescription_id || !prescription.is_dispensable() {
            return vec![];
        }

        prescription
            .medications
            .iter()
            .filter_map(|line| {
                let entry = self.entries.get(&line.id)?;
                let quantity = entry.quantity.min(line.remaining());
                (entry.checked && quantity > 0).then(|| RefillRequest {
                    line_id: line.id.clone(),
                    quantity,
                })
            })
            .collect()
    }

    fn open_line<'a>(&self, prescription: &'a Prescription, line_id: &str) -> Option<&'a MedicationLine> {
        if prescription.id != self.prescription_id || !prescription.is_dispensable() {
            tracing::debug!(
                draft = %self.prescription_id,
                prescription = %prescription.id,
                "ignoring draft change for a foreign or closed prescription"
            );
            return None;
        }
        prescription.line(line_id).filter(|line| !line.is_exhausted())
    }
}
