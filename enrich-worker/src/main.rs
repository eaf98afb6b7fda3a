//! Consume pushed change events, enrich them via external lookups and
//! materialize the results into the cache store.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use tokio::signal;

use enrich_common::metrics::setup_metrics_routes;
use enrich_common::{Client, RedisClient};
use enrich_worker::audit::HttpAuditSink;
use enrich_worker::cache::CacheWriter;
use enrich_worker::config::Config;
use enrich_worker::enrichment::EnrichmentClient;
use enrich_worker::handlers;
use enrich_worker::pipeline::Pipeline;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    // The cache-store connection is created exactly once, before the server
    // accepts any event, and shared by every invocation afterwards.
    let redis: Arc<dyn Client + Send + Sync> = Arc::new(
        RedisClient::new(config.redis_url.clone())
            .await
            .expect("failed to connect to the cache store"),
    );

    let enrichment = EnrichmentClient::new(&config);
    let writer = CacheWriter::new(redis, config.cache_key_prefix.clone());
    let audit = Arc::new(HttpAuditSink::new(
        config.audit_url.clone(),
        config.request_timeout.0,
    ));
    let pipeline = Arc::new(Pipeline::new(enrichment, writer, audit));

    let app = handlers::add_routes(Router::new(), pipeline);
    let app = setup_metrics_routes(app);

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .expect("failed to bind listener");

    if let Ok(address) = listener.local_addr() {
        tracing::info!("listening on {:?}", address);
    }

    // Once the server returns, the last Arc drop closes the cache-store
    // connection.
    match axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await
    {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to serve enrich-worker http server, {}", e),
    }
}
