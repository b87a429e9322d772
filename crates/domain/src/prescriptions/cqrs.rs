use std::sync::Arc;

use cqrs_es::{mem_store::MemStore, persist::PersistedEventStore, CqrsFramework};
use dynamo_es::{DynamoEventRepository, DynamoViewRepository};

use crate::config::Config;

use super::{memory::MemViewRepository, Prescription, Query, Services, ViewRepo};

pub type DynamoCqrs =
    CqrsFramework<Prescription, PersistedEventStore<DynamoEventRepository, Prescription>>;

pub type MemCqrs = CqrsFramework<Prescription, MemStore<Prescription>>;

pub fn init(
    client: aws_sdk_dynamodb::Client,
    repo: ViewRepo,
    config: &Config,
) -> Arc<DynamoCqrs> {
    let store: PersistedEventStore<DynamoEventRepository, Prescription> =
        PersistedEventStore::new_snapshot_store(
            DynamoEventRepository::new(client)
                .with_tables(&config.event_log_table, &config.event_snapshots_table),
            config.snapshot_size,
        );

    let query: Box<dyn cqrs_es::Query<Prescription>> = Box::new(Query::new(repo));

    Arc::new(CqrsFramework::new(store, vec![query], Services::default()))
}

pub fn init_repo(client: aws_sdk_dynamodb::Client, config: &Config) -> ViewRepo {
    Arc::new(Box::new(DynamoViewRepository::new(&config.view_table, client)))
}

/// Event store and view repository living in process memory.
pub fn init_in_memory() -> (Arc<MemCqrs>, ViewRepo) {
    let repo: ViewRepo = Arc::new(Box::new(MemViewRepository::default()));
    let query: Box<dyn cqrs_es::Query<Prescription>> = Box::new(Query::new(repo.clone()));
    let cqrs = CqrsFramework::new(MemStore::<Prescription>::default(), vec![query], Services::default());

    (Arc::new(cqrs), repo)
}
