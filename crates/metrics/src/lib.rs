//! Metrics collection and export for hopbus.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//! When the `tracing` feature is enabled, span context is propagated to metrics labels.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hopbus_metrics::{counter, gauge, routing};
//!
//! counter!(routing::MESSAGES_ROUTED_TOTAL, "bucket" => "session").increment(1);
//! gauge!(routing::SESSIONS_BOUND).increment(1.0);
//! ```
//!
//! # Features
//!
//! - `prometheus`: Enable the Prometheus exporter
//! - `tracing`: Enable tracing span context propagation to metrics labels

mod definitions;
pub mod error;
mod recorder;
pub mod tracing_integration;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
