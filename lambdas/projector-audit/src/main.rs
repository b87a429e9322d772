use aws_lambda_events::{
    kinesis::{KinesisEvent, KinesisEventRecord},
    streams::{KinesisBatchItemFailure, KinesisEventResponse},
};
use domain::{
    prescriptions::{Event, AGGREGATE_TYPE},
    DomainEvent,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tracing_subscriber::EnvFilter;

/// One line of the dispense audit trail.
#[derive(Debug, Eq, PartialEq)]
struct AuditEntry {
    prescription_id: String,
    sequence: usize,
    action: &'static str,
    detail: String,
    command_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    lambda_runtime::run(service_fn(|event: LambdaEvent<KinesisEvent>| async {
        handle(event).await
    }))
    .await
}

async fn handle(event: LambdaEvent<KinesisEvent>) -> Result<KinesisEventResponse, Error> {
    tracing::info!("Processing {} Kinesis records", event.payload.records.len());

    let mut batch_item_failures = Vec::new();

    for record in event.payload.records.iter() {
        let sequence = record.kinesis.sequence_number.clone();

        if let Err(e) = handle_record(record) {
            tracing::error!("Failed to process: {}", e);
            batch_item_failures.push(KinesisBatchItemFailure {
                item_identifier: sequence,
            });
        }
    }

    Ok(KinesisEventResponse { batch_item_failures })
}

fn handle_record(record: &KinesisEventRecord) -> Result<(), Error> {
    let data = std::str::from_utf8(&record.kinesis.data)?;
    let event: DomainEvent = serde_json::from_str(data)?;

    if let Some(entry) = audit_entry(&event)? {
        tracing::info!(
            prescription_id = %entry.prescription_id,
            sequence = entry.sequence,
            action = entry.action,
            command_id = entry.command_id.as_deref().unwrap_or(""),
            "{}",
            entry.detail
        );
    }

    Ok(())
}

fn audit_entry(event: &DomainEvent) -> Result<Option<AuditEntry>, serde_json::Error> {
    if event.aggregate_type != AGGREGATE_TYPE {
        return Ok(None);
    }

    let (action, detail) = match event.decode::<Event>()? {
        Event::PrescriptionIssued {
            patient_id,
            doctor_id,
            medications,
            ..
        } => (
            "issued",
            format!(
                "issued by {} for {} with {} medication line(s)",
                doctor_id,
                patient_id,
                medications.len()
            ),
        ),
        Event::RefillsDispensed { lines, .. } => (
            "dispensed",
            lines
                .iter()
                .map(|line| format!("{} -> {}", line.line_id, line.refill_count))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Event::PrescriptionExpired { .. } => ("expired", "prescription expired".to_string()),
        Event::PrescriptionFilled { .. } => ("filled", "prescription marked filled".to_string()),
        Event::PrescriptionCancelled { .. } => ("cancelled", "prescription cancelled".to_string()),
    };

    Ok(Some(AuditEntry {
        prescription_id: event.id.clone(),
        sequence: event.sequence,
        action,
        detail,
        command_id: event.command_id(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::prescriptions::LineRefill;

    fn domain_event(aggregate_type: &str, payload: &Event) -> DomainEvent {
        DomainEvent::new(
            "rx-1".to_string(),
            aggregate_type.to_string(),
            2,
            "Prescription:RefillsDispensed".to_string(),
            "1.0".to_string(),
            serde_json::to_string(payload).unwrap(),
            r#"{"command_id":"01JCMD"}"#.to_string(),
        )
    }

    #[test]
    fn dispensed_refills_are_summarised() {
        let event = Event::RefillsDispensed {
            id: "rx-1".to_string(),
            lines: vec![
                LineRefill { line_id: "a".to_string(), refill_count: 1 },
                LineRefill { line_id: "b".to_string(), refill_count: 2 },
            ],
            dispensed_at: Utc::now(),
        };

        let entry = audit_entry(&domain_event(AGGREGATE_TYPE, &event)).unwrap().unwrap();
        assert_eq!(
            entry,
            AuditEntry {
                prescription_id: "rx-1".to_string(),
                sequence: 2,
                action: "dispensed",
                detail: "a -> 1, b -> 2".to_string(),
                command_id: Some("01JCMD".to_string()),
            }
        );
    }

    #[test]
    fn other_aggregates_are_ignored() {
        let event = Event::PrescriptionExpired {
            id: "rx-1".to_string(),
            updated_at: Utc::now(),
        };
        assert!(audit_entry(&domain_event("Dispense", &event)).unwrap().is_none());
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let mut event = domain_event(
            AGGREGATE_TYPE,
            &Event::PrescriptionFilled { id: "rx-1".to_string(), updated_at: Utc::now() },
        );
        event.payload = "{\"type\":\"Unknown\"}".to_string();
        assert!(audit_entry(&event).is_err());
    }
}
