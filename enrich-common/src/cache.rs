use chrono::{Duration, Utc};
use serde_json::{json, Value};

/// TTLs for each cache record kind, in seconds.
pub const SUMMARY_TTL_SECONDS: u64 = 86400;
pub const DAY_LOG_TTL_SECONDS: u64 = 1800;
pub const COMBINED_TTL_SECONDS: u64 = 3600;
pub const PROFILE_TTL_SECONDS: u64 = 86400;

/// Cache keys are deterministic functions of the record kind and the entity
/// identifiers, so that redelivered events overwrite rather than duplicate.
/// `prefix` is empty in production and a fixed literal in test mode.
pub fn summary_key(prefix: &str, child_id: &str) -> String {
    format!("{prefix}summary:{child_id}")
}

pub fn day_log_key(prefix: &str, child_id: &str) -> String {
    format!("{prefix}daylog:{child_id}")
}

pub fn combined_key(prefix: &str, parent_id: &str, child_id: &str) -> String {
    format!("{prefix}parent:{parent_id}:child:{child_id}")
}

pub fn limited_key(prefix: &str, child_id: &str, collection: &str) -> String {
    format!("{prefix}limited:child:{child_id}:{collection}")
}

pub fn profile_key(prefix: &str, child_id: &str) -> String {
    format!("{prefix}profile:{child_id}")
}

pub fn profile_parent_key(prefix: &str, parent_id: &str, child_id: &str) -> String {
    format!("{prefix}profile:parent:{parent_id}:child:{child_id}")
}

/// Stamp a cache value with an absolute `expiresAt` mirroring its TTL, so
/// consumers can validate freshness without trusting store-reported TTLs.
/// Non-object values are wrapped so the stamp has somewhere to live.
pub fn with_expires_at(value: Value, ttl_seconds: u64) -> Value {
    let expires_at = (Utc::now() + Duration::seconds(ttl_seconds as i64)).to_rfc3339();

    match value {
        Value::Object(mut map) => {
            map.insert("expiresAt".to_string(), Value::String(expires_at));
            Value::Object(map)
        }
        other => json!({ "value": other, "expiresAt": expires_at }),
    }
}
