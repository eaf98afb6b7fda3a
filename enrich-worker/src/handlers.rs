use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::event::EventEnvelope;
use crate::pipeline::Pipeline;

pub fn add_routes(router: Router, pipeline: Arc<Pipeline>) -> Router {
    router
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/event", post(event).with_state(pipeline))
}

pub async fn index() -> &'static str {
    "enrich-worker"
}

/// The broker pushes one envelope per delivery attempt. A 2xx acknowledges
/// the event; any other status makes the broker redeliver (and dead-letter
/// after its redelivery budget), so only retryable failures surface here.
pub async fn event(
    State(pipeline): State<Arc<Pipeline>>,
    Json(envelope): Json<EventEnvelope>,
) -> StatusCode {
    match pipeline.handle(envelope).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time;

    use axum::body::Body;
    use axum::http::{self, Request};
    use enrich_common::{CustomRedisError, MockRedisClient};
    use http_body_util::BodyExt; // for `collect`
    use serde_json::json;
    use tower::ServiceExt; // for `oneshot`

    use crate::audit::MemoryAuditSink;
    use crate::cache::CacheWriter;
    use crate::config::{Config, EnvMsDuration};
    use crate::enrichment::EnrichmentClient;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 0,
            redis_url: "redis://localhost:6379/".to_owned(),
            token_url: "http://localhost:8010/token".to_owned(),
            summary_url: "http://localhost:8020/summary".to_owned(),
            current_logs_url: "http://localhost:8020/current-logs".to_owned(),
            profile_url: "http://localhost:8030/profile".to_owned(),
            audit_url: "http://localhost:8040/failures".to_owned(),
            request_timeout: EnvMsDuration(time::Duration::from_millis(1000)),
            summary_mode: "week".to_owned(),
            time_zone: "UTC".to_owned(),
            cache_key_prefix: String::new(),
        }
    }

    fn test_app(redis: MockRedisClient) -> Router {
        let config = test_config();
        let pipeline = Arc::new(Pipeline::new(
            EnrichmentClient::new(&config),
            CacheWriter::new(Arc::new(redis), String::new()),
            Arc::new(MemoryAuditSink::new()),
        ));

        add_routes(Router::new(), pipeline)
    }

    #[tokio::test]
    async fn test_index() {
        let app = test_app(MockRedisClient::new());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"enrich-worker");
    }

    #[tokio::test]
    async fn test_event_terminal_failure_is_acknowledged() {
        let app = test_app(MockRedisClient::new());

        // No childId on the document: terminal, so the broker must get a 2xx.
        let envelope = json!({
            "type": "document.updated",
            "subject": "activities/doc-1",
            "data": { "value": { "fields": {
                "parentId": { "stringValue": "p1" },
            }}},
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/event")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(envelope.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_event_retryable_failure_returns_500_for_redelivery() {
        let redis = MockRedisClient::new().setex_ret(
            "limited:child:c1:activities",
            Err(CustomRedisError::Timeout),
        );
        let app = test_app(redis);

        let envelope = json!({
            "type": "document.updated",
            "subject": "activities/doc-1",
            "data": { "value": { "fields": {
                "childId": { "stringValue": "c1" },
            }}},
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/event")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(envelope.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
