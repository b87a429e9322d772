use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{CqrsFramework, EventStore};
use ulid::Ulid;

use crate::errors::Error;
use crate::prescriptions::{Command, Prescription, View, ViewRepo, AGGREGATE_TYPE};

/// Read and update access to stored prescriptions.
#[async_trait]
pub trait PrescriptionGateway: Send + Sync {
    /// Load the current view, failing with `NotFound` for unknown ids.
    async fn fetch_view(&self, id: &str) -> Result<View, Error>;

    /// Run a command against one prescription.
    async fn execute(&self, id: &str, command: Command) -> Result<(), Error>;

    async fn fetch(&self, id: &str) -> Result<Prescription, Error> {
        Ok(self.fetch_view(id).await?.prescription)
    }
}

#[async_trait]
impl<G: PrescriptionGateway + ?Sized> PrescriptionGateway for Arc<G> {
    async fn fetch_view(&self, id: &str) -> Result<View, Error> {
        (**self).fetch_view(id).await
    }

    async fn execute(&self, id: &str, command: Command) -> Result<(), Error> {
        (**self).execute(id, command).await
    }
}

/// Gateway over a CQRS framework and its prescription view repository.
pub struct CqrsGateway<ES>
where
    ES: EventStore<Prescription>,
    ES::AC: Send,
{
    cqrs: Arc<CqrsFramework<Prescription, ES>>,
    repo: ViewRepo,
}

impl<ES> CqrsGateway<ES>
where
    ES: EventStore<Prescription>,
    ES::AC: Send,
{
    pub fn new(cqrs: Arc<CqrsFramework<Prescription, ES>>, repo: ViewRepo) -> Self {
        Self { cqrs, repo }
    }
}

#[async_trait]
impl<ES> PrescriptionGateway for CqrsGateway<ES>
where
    ES: EventStore<Prescription>,
    ES::AC: Send,
{
    async fn fetch_view(&self, id: &str) -> Result<View, Error> {
        self.repo
            .load(id)
            .await?
            .filter(|view| !view.prescription.id.is_empty())
            .ok_or_else(|| Error::not_found(AGGREGATE_TYPE))
    }

    async fn execute(&self, id: &str, command: Command) -> Result<(), Error> {
        let command_id = Ulid::new().to_string();
        tracing::info!(prescription_id = %id, %command_id, "executing prescription command");

        let mut metadata = HashMap::new();
        metadata.insert("command_id".to_string(), command_id);

        self.cqrs.execute_with_metadata(id, command, metadata).await?;
        Ok(())
    }
}
