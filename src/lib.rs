//! # listclean-rs
//!
//! Drains a Redis-backed work queue of candidate addresses, checks each one
//! through a pluggable verifier, and partitions them into accepted and
//! rejected sets. Runs can be interrupted and resumed: all item state lives
//! in the queue store.
//!
//! Provides the queue store abstraction, proxy selection, a proxy-aware
//! transport, an SMTP verifier, the worker pool, and OpenTelemetry
//! observability.

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod proxy;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod verify;
