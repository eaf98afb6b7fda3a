use std::sync::{Arc, Mutex};
use std::time;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::PipelineError;
use crate::event::ChangeEvent;

/// The audit trail entry for a terminal failure. Write-once, append-only,
/// never read back by this pipeline.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub event_id: String,
    pub collection_name: String,
    pub subject_path: String,
    pub error_kind: String,
    pub message: String,
    pub terminal: bool,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(event: &ChangeEvent, error: &PipelineError) -> Self {
        Self {
            event_id: event.event_id.clone(),
            collection_name: event.collection_name.clone(),
            subject_path: event.subject_path.clone(),
            error_kind: error.kind().to_owned(),
            message: error.to_string(),
            terminal: true,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("failed to deliver audit record: {0}")]
    Delivery(String),
}

/// Destination for terminal-failure audit records. Recording is best-effort:
/// the pipeline logs failures from the sink but never re-throws them, so a
/// failure to record cannot turn an acknowledged event back into a retry.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &FailureRecord) -> Result<(), AuditError>;
}

/// Appends failure records to the durable audit collection over HTTP.
pub struct HttpAuditSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAuditSink {
    pub fn new(url: String, timeout: time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to construct reqwest client for audit sink");

        Self { client, url }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, record: &FailureRecord) -> Result<(), AuditError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| AuditError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuditError::Delivery(format!(
                "audit sink responded with {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// In-memory sink recording entries for tests.
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<FailureRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &FailureRecord) -> Result<(), AuditError> {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }

        Ok(())
    }
}
