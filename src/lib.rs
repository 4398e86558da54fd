// ============================================================================
// Order Service
// ============================================================================
//
// Ingests order-creation events from Kafka, validates and stores them in
// PostgreSQL, keeps an LRU snapshot cache and serves orders over HTTP.
//
// Failed messages escalate: orders topic -> retry topic -> dead-letter topic.
//
// ============================================================================

pub mod app;
pub mod broker;
pub mod cache;
pub mod config;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod repository;
pub mod usecase;
