/// Staged, unsaved dispense selections
pub mod draft;

/// Access to stored prescriptions
pub mod gateway;

/// Scanned code resolution
pub mod scan;

/// Lookup and commit workflow
pub mod workbench;

pub use draft::{DispenseDraft, DraftEntry};
pub use gateway::{CqrsGateway, PrescriptionGateway};
pub use workbench::{CommitOutcome, Workbench, NOT_FOUND_NOTICE};
