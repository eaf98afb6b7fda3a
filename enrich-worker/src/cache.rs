use std::sync::Arc;

use enrich_common::cache::{
    combined_key, day_log_key, limited_key, profile_key, profile_parent_key, summary_key,
    with_expires_at, COMBINED_TTL_SECONDS, DAY_LOG_TTL_SECONDS, PROFILE_TTL_SECONDS,
    SUMMARY_TTL_SECONDS,
};
use enrich_common::Client;
use serde_json::{json, Value};

use crate::decoder::Identifiers;
use crate::enrichment::EnrichmentResult;
use crate::error::PipelineError;

/// Materializes enrichment results into the cache store.
///
/// Keys are deterministic per record kind and identifiers, and every write is
/// an atomic set-with-TTL, so a redelivered event simply overwrites what the
/// previous attempt wrote. Cross-key writes are not transactional; readers
/// tolerate a mix of attempts until all keys for an event land.
pub struct CacheWriter {
    client: Arc<dyn Client + Send + Sync>,
    prefix: String,
}

impl CacheWriter {
    pub fn new(client: Arc<dyn Client + Send + Sync>, prefix: String) -> Self {
        Self { client, prefix }
    }

    /// Persist one enrichment result. Write failures always propagate; a
    /// failed cache write must never be swallowed as success.
    pub async fn write(
        &self,
        identifiers: &Identifiers,
        collection: &str,
        result: &EnrichmentResult,
    ) -> Result<(), PipelineError> {
        match result {
            EnrichmentResult::Activity {
                summary,
                current_logs,
            } => {
                let logs = serde_json::to_value(current_logs)
                    .map_err(|e| PipelineError::Unknown(e.to_string()))?;

                self.set(
                    summary_key(&self.prefix, &identifiers.child_id),
                    summary.clone(),
                    SUMMARY_TTL_SECONDS,
                )
                .await?;

                self.set(
                    day_log_key(&self.prefix, &identifiers.child_id),
                    logs.clone(),
                    DAY_LOG_TTL_SECONDS,
                )
                .await?;

                let key = match identifiers.parent_id.as_deref() {
                    Some(parent_id) => {
                        combined_key(&self.prefix, parent_id, &identifiers.child_id)
                    }
                    None => limited_key(&self.prefix, &identifiers.child_id, collection),
                };
                let combined = json!({
                    "childId": identifiers.child_id,
                    "parentId": identifiers.parent_id,
                    "summary": summary,
                    "currentLogs": logs,
                });

                self.set(key, combined, COMBINED_TTL_SECONDS).await
            }
            EnrichmentResult::Limited { raw_fields } => {
                self.set(
                    limited_key(&self.prefix, &identifiers.child_id, collection),
                    raw_fields.clone(),
                    COMBINED_TTL_SECONDS,
                )
                .await
            }
            EnrichmentResult::Profile { profile } => {
                let record = serde_json::to_value(profile)
                    .map_err(|e| PipelineError::Unknown(e.to_string()))?;

                self.set(
                    profile_key(&self.prefix, &identifiers.child_id),
                    record.clone(),
                    PROFILE_TTL_SECONDS,
                )
                .await?;

                if let Some(parent_id) = identifiers.parent_id.as_deref() {
                    self.set(
                        profile_parent_key(&self.prefix, parent_id, &identifiers.child_id),
                        record,
                        PROFILE_TTL_SECONDS,
                    )
                    .await?;
                }

                Ok(())
            }
        }
    }

    async fn set(&self, key: String, value: Value, ttl_seconds: u64) -> Result<(), PipelineError> {
        let stamped = with_expires_at(value, ttl_seconds);
        self.client
            .setex(key, stamped.to_string(), ttl_seconds)
            .await?;

        Ok(())
    }
}
