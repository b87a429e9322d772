//! Runtime configuration.
//!
//! Resolved once at process startup from the environment and handed to the
//! CQRS wiring, so handlers never read environment variables themselves.

use std::env;

use crate::errors::Error;

const DEFAULT_EVENT_LOG_TABLE: &str = "dispensary-event-log";
const DEFAULT_EVENT_SNAPSHOTS_TABLE: &str = "dispensary-event-snapshots";
const DEFAULT_VIEW_TABLE: &str = "dispensary-prescriptions-view";
const DEFAULT_SNAPSHOT_SIZE: usize = 5;

/// Where aggregate events and views are stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventStoreKind {
    DynamoDb,
    /// Process-local store, for local runs.
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub event_log_table: String,
    pub event_snapshots_table: String,
    pub view_table: String,
    pub snapshot_size: usize,
    pub event_store: EventStoreKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_log_table: DEFAULT_EVENT_LOG_TABLE.to_string(),
            event_snapshots_table: DEFAULT_EVENT_SNAPSHOTS_TABLE.to_string(),
            view_table: DEFAULT_VIEW_TABLE.to_string(),
            snapshot_size: DEFAULT_SNAPSHOT_SIZE,
            event_store: EventStoreKind::DynamoDb,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let snapshot_size = match lookup("EVENT_SNAPSHOT_SIZE") {
            None => defaults.snapshot_size,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(Error::Configuration {
                        message: format!("EVENT_SNAPSHOT_SIZE must be a positive integer, got {raw:?}"),
                    })
                }
            },
        };

        let event_store = match lookup("EVENT_STORE").as_deref().map(str::trim) {
            None | Some("dynamodb") => EventStoreKind::DynamoDb,
            Some("memory") => EventStoreKind::Memory,
            Some(other) => {
                return Err(Error::Configuration {
                    message: format!("unknown EVENT_STORE {other:?}"),
                })
            }
        };

        Ok(Self {
            event_log_table: lookup("DYNAMODB_EVENT_LOG_TABLE").unwrap_or(defaults.event_log_table),
            event_snapshots_table: lookup("DYNAMODB_EVENT_SNAPSHOTS_TABLE")
                .unwrap_or(defaults.event_snapshots_table),
            view_table: lookup("DYNAMODB_PRESCRIPTIONS_VIEW_TABLE").unwrap_or(defaults.view_table),
            snapshot_size,
            event_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.event_log_table, "dispensary-event-log");
        assert_eq!(config.view_table, "dispensary-prescriptions-view");
        assert_eq!(config.snapshot_size, 5);
        assert_eq!(config.event_store, EventStoreKind::DynamoDb);
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("DYNAMODB_EVENT_LOG_TABLE", "log"),
            ("EVENT_SNAPSHOT_SIZE", "20"),
            ("EVENT_STORE", "memory"),
        ]))
        .unwrap();
        assert_eq!(config.event_log_table, "log");
        assert_eq!(config.snapshot_size, 20);
        assert_eq!(config.event_store, EventStoreKind::Memory);
    }

    #[test]
    fn zero_snapshot_size_is_rejected() {
        let err = Config::from_lookup(lookup(&[("EVENT_SNAPSHOT_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn unknown_store_is_rejected() {
        let err = Config::from_lookup(lookup(&[("EVENT_STORE", "postgres")])).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
