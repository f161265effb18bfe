//! Single-flight caching reverse proxy for HLS manifests and segments.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod server;
pub mod sweeper;
