pub mod audit;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod enrichment;
pub mod error;
pub mod event;
pub mod handlers;
pub mod pipeline;
