use aws_config::BehaviorVersion;
use aws_lambda_events::{
    dynamodb::{Event, EventRecord},
    streams::{DynamoDbBatchItemFailure, DynamoDbEventResponse},
};
use aws_sdk_kinesis::primitives::Blob;
use domain::{prescriptions::AGGREGATE_TYPE, DomainEvent};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Row of the event log table, as written by the DynamoDB event repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventLogRecord {
    aggregate_type_and_id: String,
    event_type: String,
    aggregate_id: String,
    aggregate_type: String,
    #[serde(with = "serde_bytes")]
    metadata: Vec<u8>,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    event_version: String,
    aggregate_id_sequence: usize,
}

impl TryFrom<EventLogRecord> for DomainEvent {
    type Error = String;

    fn try_from(record: EventLogRecord) -> Result<Self, Self::Error> {
        let payload = String::from_utf8(record.payload)
            .map_err(|e| format!("Invalid payload UTF-8: {}", e))?;
        let metadata = String::from_utf8(record.metadata)
            .map_err(|e| format!("Invalid metadata UTF-8: {}", e))?;

        Ok(DomainEvent::new(
            record.aggregate_id,
            record.aggregate_type,
            record.aggregate_id_sequence,
            record.event_type,
            record.event_version,
            payload,
            metadata,
        ))
    }
}

struct Publisher {
    kinesis_client: aws_sdk_kinesis::Client,
    stream_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let stream_name = std::env::var("EVENT_STREAM_NAME")
        .map_err(|_| "EVENT_STREAM_NAME must be set")?;

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let publisher = Publisher {
        kinesis_client: aws_sdk_kinesis::Client::new(&config),
        stream_name,
    };

    lambda_runtime::run(service_fn(|event: LambdaEvent<Event>| async {
        handle(event, &publisher).await
    }))
    .await
}

async fn handle(
    event: LambdaEvent<Event>,
    publisher: &Publisher,
) -> Result<DynamoDbEventResponse, Error> {
    tracing::info!("Processing {} DynamoDB records", event.payload.records.len());

    let mut batch_item_failures = Vec::new();

    for record in event.payload.records.iter() {
        if record.event_name != "INSERT" {
            continue;
        }

        let event_id = record.event_id.clone();
        if let Err(e) = handle_record(record, publisher).await {
            tracing::error!("Failed to process {}: {}", event_id, e);
            batch_item_failures.push(DynamoDbBatchItemFailure {
                item_identifier: Some(event_id),
            });
        }
    }

    Ok(DynamoDbEventResponse { batch_item_failures })
}

async fn handle_record(record: &EventRecord, publisher: &Publisher) -> Result<(), Error> {
    let event_log: EventLogRecord = serde_dynamo::from_item(record.change.new_image.clone())?;

    let Some(domain_event) = to_published(event_log)? else {
        return Ok(());
    };

    tracing::info!(
        prescription_id = %domain_event.id,
        sequence = domain_event.sequence,
        "Publishing {}",
        domain_event.event_type
    );

    let data = serde_json::to_string(&domain_event)?;

    // Per-aggregate partitioning keeps one prescription's events in order.
    publisher
        .kinesis_client
        .put_record()
        .stream_name(&publisher.stream_name)
        .partition_key(&domain_event.id)
        .data(Blob::new(data))
        .send()
        .await?;

    Ok(())
}

/// Convert a log row into the published event, skipping other aggregates.
fn to_published(record: EventLogRecord) -> Result<Option<DomainEvent>, String> {
    if record.aggregate_type != AGGREGATE_TYPE {
        tracing::debug!(aggregate_type = %record.aggregate_type, "skipping foreign aggregate");
        return Ok(None);
    }
    DomainEvent::try_from(record).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(aggregate_type: &str, payload: Vec<u8>) -> EventLogRecord {
        EventLogRecord {
            aggregate_type_and_id: format!("{aggregate_type}:rx-1"),
            event_type: "Prescription:Expired".to_string(),
            aggregate_id: "rx-1".to_string(),
            aggregate_type: aggregate_type.to_string(),
            metadata: br#"{"command_id":"01J"}"#.to_vec(),
            payload,
            event_version: "1.0".to_string(),
            aggregate_id_sequence: 3,
        }
    }

    #[test]
    fn prescription_rows_are_published() {
        let payload = br#"{"type":"PrescriptionExpired","id":"rx-1","updated_at":"2026-05-01T10:00:00Z"}"#.to_vec();
        let event = to_published(record("Prescription", payload)).unwrap().unwrap();

        assert_eq!(event.id, "rx-1");
        assert_eq!(event.sequence, 3);
        assert_eq!(event.event_type, "Prescription:Expired");
        assert_eq!(event.command_id().as_deref(), Some("01J"));
    }

    #[test]
    fn foreign_aggregates_are_skipped() {
        assert!(to_published(record("Dispense", b"{}".to_vec())).unwrap().is_none());
    }

    #[test]
    fn invalid_utf8_payload_fails() {
        assert!(to_published(record("Prescription", vec![0xff, 0xfe])).is_err());
    }
}
