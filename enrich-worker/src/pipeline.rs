use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditSink, FailureRecord};
use crate::cache::CacheWriter;
use crate::decoder;
use crate::enrichment::EnrichmentClient;
use crate::error::{classify, Classification, PipelineError};
use crate::event::{ChangeEvent, ChangeKind, EventEnvelope, PipelineMode};

/// How one delivered event ended. `Terminal` means the failure was absorbed,
/// recorded for audit and the event acknowledged.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    SkippedDelete,
    Terminal(Classification),
}

/// One pipeline execution per delivered event: decode, validate, enrich,
/// write, strictly in that order. The only state shared across executions is
/// the injected cache-store client.
pub struct Pipeline {
    enrichment: EnrichmentClient,
    writer: CacheWriter,
    audit: Arc<dyn AuditSink>,
}

impl Pipeline {
    pub fn new(
        enrichment: EnrichmentClient,
        writer: CacheWriter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            enrichment,
            writer,
            audit,
        }
    }

    /// Handle one delivered event end to end.
    ///
    /// `Err` means the failure is retryable and must propagate so the broker
    /// redelivers. Every terminal failure is absorbed here: recorded through
    /// the audit sink, counted, and returned as `Ok(Outcome::Terminal)` so
    /// the event is acknowledged and never redelivered.
    pub async fn handle(&self, envelope: EventEnvelope) -> Result<Outcome, PipelineError> {
        let event = ChangeEvent::from(envelope);
        let labels = [("collection", event.collection_name.clone())];

        metrics::counter!("enrich_events_total", &labels).increment(1);

        match self.process(&event).await {
            Ok(Outcome::SkippedDelete) => {
                metrics::counter!("enrich_events_skipped_delete", &labels).increment(1);
                Ok(Outcome::SkippedDelete)
            }
            Ok(outcome) => {
                metrics::counter!("enrich_events_completed", &labels).increment(1);
                Ok(outcome)
            }
            Err(failure) => {
                let classification = classify(&failure, &event.subject_path);

                if classification.retryable {
                    metrics::counter!("enrich_events_retryable", &labels).increment(1);
                    warn!(
                        event_id = %event.event_id,
                        reason = classification.reason,
                        error = %failure,
                        "retryable failure, propagating for redelivery"
                    );
                    return Err(failure);
                }

                metrics::counter!("enrich_events_terminal", &labels).increment(1);
                error!(
                    event_id = %event.event_id,
                    reason = classification.reason,
                    error = %failure,
                    "terminal failure, acknowledging event"
                );

                let record = FailureRecord::new(&event, &failure);
                if let Err(audit_error) = self.audit.record(&record).await {
                    // Best-effort only: a failure to record must not turn an
                    // acknowledged event back into a retry.
                    error!(
                        event_id = %event.event_id,
                        error = %audit_error,
                        "failed to record terminal failure for audit"
                    );
                }

                Ok(Outcome::Terminal(classification))
            }
        }
    }

    async fn process(&self, event: &ChangeEvent) -> Result<Outcome, PipelineError> {
        let decoded = decoder::decode(&event.data)?;

        if decoded.kind == ChangeKind::Deleted {
            info!(event_id = %event.event_id, "delete event, nothing to enrich");
            return Ok(Outcome::SkippedDelete);
        }

        let identifiers = decoder::validate(&decoded.fields)?;
        let mode = PipelineMode::from_collection(&event.collection_name);

        let result = self
            .enrichment
            .enrich(mode, &identifiers, &decoded.fields)
            .await?;

        self.writer
            .write(&identifiers, &event.collection_name, &result)
            .await?;

        Ok(Outcome::Completed)
    }
}
