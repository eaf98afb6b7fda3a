use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::event::ChangeKind;

/// A closed tagged representation of document field values. Adding a new
/// wire value kind means adding a variant here and handling it in
/// `decode_wrapped`, checked at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Map(DocumentFields),
    List(Vec<FieldValue>),
}

pub type DocumentFields = BTreeMap<String, FieldValue>;

/// The decoder's output: the derived change kind plus the normalized field
/// map. Produced once per event and immutable afterwards.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub kind: ChangeKind,
    pub fields: DocumentFields,
}

/// The two identifiers the pipeline runs on. `child_id` is mandatory;
/// a missing `parent_id` only degrades enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifiers {
    pub parent_id: Option<String>,
    pub child_id: String,
}

/// Normalize a raw change-event payload into a `DecodedEvent`.
///
/// Three encodings are tried in fixed priority order: a structured snapshot
/// envelope with typed value wrappers, a byte sequence holding UTF-8 JSON,
/// and finally a lossy identifier-only pattern extraction for anything
/// binary. Fails only when none of them applies.
pub fn decode(payload: &Value) -> Result<DecodedEvent, PipelineError> {
    match payload {
        Value::Object(object) => decode_object(object),
        Value::String(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .unwrap_or_else(|_| encoded.clone().into_bytes());
            decode_bytes(&bytes)
        }
        _ => Err(PipelineError::Decode(
            "no known encoding applies to payload".to_owned(),
        )),
    }
}

fn decode_object(object: &Map<String, Value>) -> Result<DecodedEvent, PipelineError> {
    // A snapshot envelope carries before/after markers the change kind is
    // derived from: absent-before means created, absent-after means deleted.
    if object.contains_key("value") || object.contains_key("oldValue") {
        let before = snapshot_present(object.get("oldValue"));
        let after = snapshot_present(object.get("value"));

        let kind = match (before, after) {
            (false, _) => ChangeKind::Created,
            (true, false) => ChangeKind::Deleted,
            (true, true) => ChangeKind::Updated,
        };

        let snapshot = if after {
            object.get("value")
        } else {
            object.get("oldValue")
        };

        let fields = snapshot
            .and_then(|snapshot| snapshot.get("fields"))
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_default();

        return Ok(DecodedEvent { kind, fields });
    }

    // A bare document with a typed fields map, no snapshot markers.
    if let Some(fields) = object.get("fields").and_then(Value::as_object) {
        return Ok(DecodedEvent {
            kind: ChangeKind::Created,
            fields: decode_fields(fields),
        });
    }

    // Plain JSON: reinterpret the top level as a single-level field map.
    Ok(DecodedEvent {
        kind: ChangeKind::Created,
        fields: json_to_fields(object),
    })
}

fn decode_bytes(bytes: &[u8]) -> Result<DecodedEvent, PipelineError> {
    if let Ok(parsed) = serde_json::from_slice::<Value>(bytes) {
        if let Value::Object(object) = parsed {
            return decode_object(&object);
        }
    }

    extract_identifiers_from_binary(bytes)
}

fn snapshot_present(snapshot: Option<&Value>) -> bool {
    match snapshot {
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

/// Unwrap a typed fields map (`stringValue`, `integerValue`, ...) recursively.
/// Unrecognized or null wrappers are skipped rather than failing the decode.
fn decode_fields(fields: &Map<String, Value>) -> DocumentFields {
    let mut decoded = DocumentFields::new();

    for (name, wrapped) in fields {
        match decode_wrapped(wrapped) {
            Some(value) => {
                decoded.insert(name.clone(), value);
            }
            None => {
                warn!(field = %name, "skipping field with unsupported value wrapper");
            }
        }
    }

    decoded
}

fn decode_wrapped(wrapped: &Value) -> Option<FieldValue> {
    let object = wrapped.as_object()?;

    if let Some(value) = object.get("stringValue") {
        return value.as_str().map(|s| FieldValue::String(s.to_owned()));
    }
    if let Some(value) = object.get("integerValue") {
        // The wire format carries 64-bit integers as strings.
        return match value {
            Value::String(s) => s.parse::<i64>().ok().map(FieldValue::Integer),
            Value::Number(n) => n.as_i64().map(FieldValue::Integer),
            _ => None,
        };
    }
    if let Some(value) = object.get("doubleValue") {
        return value.as_f64().map(FieldValue::Double);
    }
    if let Some(value) = object.get("booleanValue") {
        return value.as_bool().map(FieldValue::Boolean);
    }
    if let Some(value) = object.get("timestampValue") {
        return value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| FieldValue::Timestamp(dt.with_timezone(&Utc)));
    }
    if let Some(value) = object.get("mapValue") {
        let fields = value.get("fields").and_then(Value::as_object);
        return Some(FieldValue::Map(
            fields.map(decode_fields).unwrap_or_default(),
        ));
    }
    if let Some(value) = object.get("arrayValue") {
        let values = value
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(decode_wrapped).collect())
            .unwrap_or_default();
        return Some(FieldValue::List(values));
    }

    None
}

/// Single-level reinterpretation of plain JSON: scalars are kept, nested
/// structures are dropped.
fn json_to_fields(object: &Map<String, Value>) -> DocumentFields {
    let mut fields = DocumentFields::new();

    for (name, value) in object {
        let converted = match value {
            Value::String(s) => Some(FieldValue::String(s.clone())),
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Integer(i))
                } else {
                    n.as_f64().map(FieldValue::Double)
                }
            }
            _ => None,
        };

        if let Some(converted) = converted {
            fields.insert(name.clone(), converted);
        }
    }

    fields
}

static PARENT_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"parentId\W{0,8}([A-Za-z0-9][A-Za-z0-9._-]*)").expect("invalid parentId pattern")
});
static CHILD_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"childId\W{0,8}([A-Za-z0-9][A-Za-z0-9._-]*)").expect("invalid childId pattern")
});

/// Last-resort decoding for binary payloads: scan the lossy UTF-8 rendering
/// for identifier-shaped tokens next to the two identifier field names. This
/// never recovers nested maps, lists or any other field, by contract.
fn extract_identifiers_from_binary(bytes: &[u8]) -> Result<DecodedEvent, PipelineError> {
    let text = String::from_utf8_lossy(bytes);
    let mut fields = DocumentFields::new();

    if let Some(captures) = PARENT_ID_PATTERN.captures(&text) {
        fields.insert(
            "parentId".to_owned(),
            FieldValue::String(captures[1].to_owned()),
        );
    }
    if let Some(captures) = CHILD_ID_PATTERN.captures(&text) {
        fields.insert(
            "childId".to_owned(),
            FieldValue::String(captures[1].to_owned()),
        );
    }

    if fields.is_empty() {
        return Err(PipelineError::Decode(
            "no known encoding applies to payload".to_owned(),
        ));
    }

    Ok(DecodedEvent {
        kind: ChangeKind::Created,
        fields,
    })
}

/// Extract and validate the entity identifiers from a decoded field map.
pub fn validate(fields: &DocumentFields) -> Result<Identifiers, PipelineError> {
    let child_id = match fields.get("childId") {
        Some(FieldValue::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(PipelineError::Validation("missing childId".to_owned())),
    };

    let parent_id = match fields.get("parentId") {
        Some(FieldValue::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => {
            info!(child_id = %child_id, "no parentId on document, enrichment will be degraded");
            None
        }
    };

    Ok(Identifiers {
        parent_id,
        child_id,
    })
}

/// Render a decoded field map back to JSON, for limited-mode cache records.
pub fn fields_to_json(fields: &DocumentFields) -> Value {
    let mut object = Map::new();

    for (name, value) in fields {
        object.insert(name.clone(), field_value_to_json(value));
    }

    Value::Object(object)
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Double(d) => Value::from(*d),
        FieldValue::Boolean(b) => Value::Bool(*b),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        FieldValue::Map(fields) => fields_to_json(fields),
        FieldValue::List(values) => {
            Value::Array(values.iter().map(field_value_to_json).collect())
        }
    }
}
