use serde_json::Value;

/// Resolve a scanned code or typed text to a prescription id.
///
/// QR codes carry a JSON document with a `prescriptionId` field; anything
/// else is taken as the identifier itself. Blank input resolves to nothing.
pub fn resolve(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(raw) {
        match payload.get("prescriptionId") {
            Some(Value::String(id)) if !id.trim().is_empty() => return Some(id.trim().to_string()),
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }
    }

    Some(raw.to_string())
}
