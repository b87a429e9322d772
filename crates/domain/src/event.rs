use derive_new::new;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A stored aggregate event as it travels on the event stream.
///
/// `payload` and `metadata` hold the JSON documents written by the event
/// store, untouched.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct DomainEvent {
    pub id: String,
    pub aggregate_type: String,
    pub sequence: usize,
    pub event_type: String,
    pub event_version: String,
    pub payload: String,
    pub metadata: String,
}

impl DomainEvent {
    /// Decode the payload into a concrete aggregate event.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn command_id(&self) -> Option<String> {
        let metadata: serde_json::Value = serde_json::from_str(&self.metadata).ok()?;
        metadata
            .get("command_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_id_is_read_from_metadata() {
        let event = DomainEvent::new(
            "rx-1".to_string(),
            "Prescription".to_string(),
            2,
            "Prescription:Expired".to_string(),
            "1.0".to_string(),
            "{}".to_string(),
            r#"{"command_id":"01HZX"}"#.to_string(),
        );

        assert_eq!(event.command_id().as_deref(), Some("01HZX"));
    }

    #[test]
    fn missing_metadata_yields_no_command_id() {
        let event = DomainEvent::new(
            "rx-1".to_string(),
            "Prescription".to_string(),
            1,
            "Prescription:Issued".to_string(),
            "1.0".to_string(),
            "{}".to_string(),
            "not json".to_string(),
        );

        assert_eq!(event.command_id(), None);
    }
}
