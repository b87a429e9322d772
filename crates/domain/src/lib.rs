//! Dispensary Domain Models

/// Prescription aggregate
pub mod prescriptions;

/// Pharmacist-side dispensing workflow
pub mod dispensing;

/// Runtime configuration
pub mod config;

/// Domain errors
pub mod errors;

/// Domain events wrapper
pub mod event;

pub use config::Config;
pub use errors::Error;
pub use event::DomainEvent;
