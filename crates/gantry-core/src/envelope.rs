use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};

const WRAPPER_KEYS: [&str; 5] = ["attachment", "subtask", "comment", "task", "data"];

pub fn unwrap_envelope(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        for key in WRAPPER_KEYS {
            if let Some(inner) = map.get(key)
                && inner.is_object()
            {
                trace!(wrapper = key, "unwrapped enveloped response");
                return inner;
            }
        }
    }
    value
}

pub fn extract_id(value: &Value, kind: &str) -> Option<String> {
    let map = value.as_object()?;
    let snake = format!("{kind}_id");
    let camel = format!("{kind}Id");

    for key in ["id", snake.as_str(), camel.as_str()] {
        match map.get(key) {
            Some(Value::String(id)) if !id.is_empty() => return Some(id.clone()),
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }
    }
    None
}

pub fn normalize_record<T: DeserializeOwned>(raw: &Value, kind: &'static str) -> Result<T> {
    let inner = unwrap_envelope(raw);
    let map = inner
        .as_object()
        .ok_or_else(|| Error::EnvelopeShape(format!("{kind} response is not an object")))?;

    let id = extract_id(inner, kind)
        .ok_or_else(|| Error::EnvelopeShape(format!("no usable id in {kind} response")))?;

    let mut map: Map<String, Value> = map.clone();
    map.insert("id".to_string(), Value::String(id));

    serde_json::from_value(Value::Object(map))
        .map_err(|err| Error::EnvelopeShape(format!("malformed {kind} record: {err}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_id, normalize_record, unwrap_envelope};
    use crate::error::Error;
    use crate::task::Attachment;

    #[test]
    fn bare_object_passes_through() {
        let raw = json!({"id": "a1", "fileName": "brief.pdf"});
        assert_eq!(unwrap_envelope(&raw), &raw);
    }

    #[test]
    fn enveloped_object_is_unwrapped_one_level() {
        let raw = json!({"attachment": {"id": "a1", "fileName": "brief.pdf"}});
        assert_eq!(
            unwrap_envelope(&raw),
            &json!({"id": "a1", "fileName": "brief.pdf"})
        );
    }

    #[test]
    fn id_probe_precedence_prefers_canonical_id() {
        let raw = json!({"id": "canon", "attachment_id": "snake", "attachmentId": "camel"});
        assert_eq!(extract_id(&raw, "attachment"), Some("canon".to_string()));

        let raw = json!({"attachment_id": "snake", "attachmentId": "camel"});
        assert_eq!(extract_id(&raw, "attachment"), Some("snake".to_string()));

        let raw = json!({"attachmentId": "camel"});
        assert_eq!(extract_id(&raw, "attachment"), Some("camel".to_string()));
    }

    #[test]
    fn integer_ids_are_accepted() {
        let raw = json!({"attachmentId": 42});
        assert_eq!(extract_id(&raw, "attachment"), Some("42".to_string()));
    }

    #[test]
    fn normalize_rewrites_alternate_id_spellings() {
        let raw = json!({
            "attachment": {
                "attachmentId": 7,
                "fileName": "notes.txt",
                "size": 120,
                "mimeType": "text/plain",
                "storagePath": "/blobs/7"
            }
        });
        let record: Attachment = normalize_record(&raw, "attachment").expect("normalize");
        assert_eq!(record.id, "7");
        assert_eq!(record.file_name, "notes.txt");
    }

    #[test]
    fn missing_id_is_refused() {
        let raw = json!({"attachment": {"fileName": "notes.txt"}});
        let err = normalize_record::<Attachment>(&raw, "attachment").expect_err("must refuse");
        assert!(matches!(err, Error::EnvelopeShape(_)));
    }

    #[test]
    fn non_object_response_is_refused() {
        let err = normalize_record::<Attachment>(&serde_json::json!([1, 2]), "attachment")
            .expect_err("must refuse");
        assert!(matches!(err, Error::EnvelopeShape(_)));
    }
}
