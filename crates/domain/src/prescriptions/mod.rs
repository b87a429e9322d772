/// Prescription aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs
pub mod inputs;

/// View (read model)
pub mod view;

/// In-memory view repository
pub mod memory;

/// CQRS setup
pub mod cqrs;

pub use aggregate::{
    LineRefill, MedicationLine, Prescription, PrescriptionStatus, RefillRequest, Services,
    AGGREGATE_TYPE,
};
pub use commands::Command;
pub use events::Event;
pub use view::{Query, View, ViewRepo};
