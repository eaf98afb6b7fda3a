use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// The envelope the broker pushes for every document mutation. `data` is the
/// opaque change payload; its encoding is worked out by the decoder.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subject: String,
    #[serde(default = "default_delivery_attempt")]
    pub delivery_attempt: u32,
    #[serde(default)]
    pub data_content_type: Option<String>,
    pub data: Value,
}

fn default_delivery_attempt() -> u32 {
    1
}

/// One notification of a document mutation, normalized from the envelope.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub event_id: String,
    pub collection_name: String,
    pub subject_path: String,
    pub delivery_attempt: u32,
    pub data: Value,
}

impl From<EventEnvelope> for ChangeEvent {
    fn from(envelope: EventEnvelope) -> Self {
        let collection_name = envelope
            .subject
            .split('/')
            .next()
            .unwrap_or_default()
            .to_owned();

        ChangeEvent {
            event_id: envelope
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            collection_name,
            subject_path: envelope.subject,
            delivery_attempt: envelope.delivery_attempt,
            data: envelope.data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Which enrichment variant applies to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Activity,
    Profile,
}

impl PipelineMode {
    /// Collections holding identity or questionnaire documents take the
    /// profile path; everything else is activity data.
    pub fn from_collection(collection: &str) -> Self {
        if collection.contains("profile") || collection.contains("questionnaire") {
            PipelineMode::Profile
        } else {
            PipelineMode::Activity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parses_with_defaults() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "document.updated",
            "subject": "activities/doc-1",
            "data": {"childId": "c1"},
        }))
        .unwrap();

        assert_eq!(envelope.delivery_attempt, 1);
        assert!(envelope.id.is_none());
        assert!(envelope.data_content_type.is_none());
    }

    #[test]
    fn test_change_event_derives_collection_and_id() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "id": "evt-7",
            "type": "document.updated",
            "subject": "activities/doc-1",
            "deliveryAttempt": 3,
            "data": {},
        }))
        .unwrap();

        let event = ChangeEvent::from(envelope);
        assert_eq!(event.event_id, "evt-7");
        assert_eq!(event.collection_name, "activities");
        assert_eq!(event.subject_path, "activities/doc-1");
        assert_eq!(event.delivery_attempt, 3);
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "document.created",
            "subject": "activities/doc-1",
            "data": {},
        }))
        .unwrap();

        let event = ChangeEvent::from(envelope);
        assert!(!event.event_id.is_empty());
    }

    #[test]
    fn test_mode_from_collection() {
        assert_eq!(
            PipelineMode::from_collection("profiles"),
            PipelineMode::Profile
        );
        assert_eq!(
            PipelineMode::from_collection("questionnaires"),
            PipelineMode::Profile
        );
        assert_eq!(
            PipelineMode::from_collection("activities"),
            PipelineMode::Activity
        );
        assert_eq!(
            PipelineMode::from_collection("sleepLogs"),
            PipelineMode::Activity
        );
    }
}
