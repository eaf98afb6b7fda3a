use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Config;
use crate::decoder::{fields_to_json, DocumentFields, Identifiers};
use crate::error::PipelineError;
use crate::event::PipelineMode;

/// What enrichment produced for one successfully-processed event. Exactly one
/// variant per event.
#[derive(Debug, Clone)]
pub enum EnrichmentResult {
    Activity {
        summary: Value,
        current_logs: CurrentLogs,
    },
    Profile {
        profile: ProfileRecord,
    },
    Limited {
        raw_fields: Value,
    },
}

/// Fixed-shape current-period logs. Defaults to empty lists per log type so
/// a failed fetch degrades to a well-formed record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentLogs {
    #[serde(default)]
    pub sleep: Vec<Value>,
    #[serde(default)]
    pub feed: Vec<Value>,
    #[serde(default)]
    pub diaper: Vec<Value>,
    #[serde(default)]
    pub pumping: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub name: String,
    pub date_of_birth: String,
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<Value>,
}

/// Fan-out client for the external lookups. Every call is bounded by the
/// configured request timeout and never retried here; retry is decided by
/// the classifier at the pipeline level.
pub struct EnrichmentClient {
    client: reqwest::Client,
    token_url: String,
    summary_url: String,
    current_logs_url: String,
    profile_url: String,
    summary_mode: String,
    time_zone: String,
}

impl EnrichmentClient {
    pub fn new(config: &Config) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("Enrichment Worker")
            .timeout(config.request_timeout.0)
            .build()
            .expect("failed to construct reqwest client for enrichment");

        Self {
            client,
            token_url: config.token_url.clone(),
            summary_url: config.summary_url.clone(),
            current_logs_url: config.current_logs_url.clone(),
            profile_url: config.profile_url.clone(),
            summary_mode: config.summary_mode.clone(),
            time_zone: config.time_zone.clone(),
        }
    }

    /// Enrich one validated event according to its pipeline mode.
    pub async fn enrich(
        &self,
        mode: PipelineMode,
        identifiers: &Identifiers,
        fields: &DocumentFields,
    ) -> Result<EnrichmentResult, PipelineError> {
        match mode {
            PipelineMode::Profile => self.enrich_profile(identifiers).await,
            PipelineMode::Activity => self.enrich_activity(identifiers, fields).await,
        }
    }

    /// Profile mode is strict: it needs the parent identifier and a valid
    /// credential, and the profile record must carry the mandatory fields.
    async fn enrich_profile(
        &self,
        identifiers: &Identifiers,
    ) -> Result<EnrichmentResult, PipelineError> {
        let parent_id = identifiers.parent_id.as_deref().ok_or_else(|| {
            PipelineError::Validation("profile requires parentId".to_owned())
        })?;

        let token = self.fetch_token(parent_id).await?;
        let profile = self.fetch_profile(&identifiers.child_id, &token).await?;

        Ok(EnrichmentResult::Profile { profile })
    }

    /// Activity mode degrades instead of failing: a credential failure drops
    /// to limited mode, and each of the two concurrent fetches falls back to
    /// an empty default independently.
    async fn enrich_activity(
        &self,
        identifiers: &Identifiers,
        fields: &DocumentFields,
    ) -> Result<EnrichmentResult, PipelineError> {
        let token = match identifiers.parent_id.as_deref() {
            Some(parent_id) => match self.fetch_token(parent_id).await {
                Ok(token) => Some(token),
                Err(error) => {
                    warn!(%error, "credential lookup failed, continuing without enrichment");
                    None
                }
            },
            None => None,
        };

        let Some(token) = token else {
            return Ok(EnrichmentResult::Limited {
                raw_fields: fields_to_json(fields),
            });
        };

        let (summary, current_logs) = tokio::join!(
            self.fetch_summary(identifiers, &token),
            self.fetch_current_logs(&identifiers.child_id, &token),
        );

        let summary = summary.unwrap_or_else(|error| {
            warn!(%error, "summary lookup failed, defaulting to empty summary");
            Value::Array(vec![])
        });
        let current_logs = current_logs.unwrap_or_else(|error| {
            warn!(%error, "current-log lookup failed, defaulting to empty logs");
            CurrentLogs::default()
        });

        Ok(EnrichmentResult::Activity {
            summary,
            current_logs,
        })
    }

    /// Identifier-scoped bearer credential lookup. Fails fast on non-2xx.
    async fn fetch_token(&self, parent_id: &str) -> Result<String, PipelineError> {
        let url = format!("{}/{}", self.token_url, parent_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "token lookup"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::from_status(status, "token lookup"));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "token lookup"))?;

        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                PipelineError::Schema("token response missing token".to_owned())
            })
    }

    async fn fetch_summary(
        &self,
        identifiers: &Identifiers,
        token: &str,
    ) -> Result<Value, PipelineError> {
        let body = json!({
            "childId": identifiers.child_id,
            "parentId": identifiers.parent_id,
            "timeZone": self.time_zone,
            "mode": self.summary_mode,
        });

        let response = self
            .client
            .post(&self.summary_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "summary lookup"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::from_status(status, "summary lookup"));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "summary lookup"))
    }

    async fn fetch_current_logs(
        &self,
        child_id: &str,
        token: &str,
    ) -> Result<CurrentLogs, PipelineError> {
        let body = json!({
            "childId": child_id,
            "timeZone": self.time_zone,
        });

        let response = self
            .client
            .post(&self.current_logs_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "current-log lookup"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::from_status(status, "current-log lookup"));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "current-log lookup"))
    }

    async fn fetch_profile(
        &self,
        child_id: &str,
        token: &str,
    ) -> Result<ProfileRecord, PipelineError> {
        let url = format!("{}/{}", self.profile_url, child_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "profile lookup"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::from_status(status, "profile lookup"));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest(e, "profile lookup"))?;

        validate_profile(body)
    }
}

/// The profile record must carry `name`, `dateOfBirth` and `gender`; absence
/// of any of them is a terminal schema error, not a degraded result.
pub fn validate_profile(body: Value) -> Result<ProfileRecord, PipelineError> {
    for required in ["name", "dateOfBirth", "gender"] {
        let present = body
            .get(required)
            .map(|value| !value.is_null())
            .unwrap_or(false);
        if !present {
            return Err(PipelineError::Schema(format!(
                "profile record missing {required}"
            )));
        }
    }

    serde_json::from_value(body)
        .map_err(|e| PipelineError::Schema(format!("profile record malformed: {e}")))
}
