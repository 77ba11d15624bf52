//! Metric name and label definitions.
//!
//! This module defines all metric names and common label keys used throughout hopbus.
//! Centralizing these definitions ensures consistency and makes it easier to document
//! what metrics are available.

/// Per-message routing through virtual endpoints
pub mod routing {
    /// Messages handed to a link successfully (label: bucket = session|any)
    pub const MESSAGES_ROUTED_TOTAL: &str = "hopbus_routing_messages_routed_total";
    /// Messages that found no usable link
    pub const NO_ROUTE_TOTAL: &str = "hopbus_routing_no_route_total";
    /// Individual link send failures while walking the candidate list
    pub const SEND_FAILURES_TOTAL: &str = "hopbus_routing_send_failures_total";
    /// Messages delivered by a later candidate after an earlier one failed
    pub const FALLTHROUGH_TOTAL: &str = "hopbus_routing_fallthrough_total";
    /// Number of candidate links considered per routed message
    pub const CANDIDATES: &str = "hopbus_routing_candidates";
    /// Session bindings currently held across all virtual endpoints
    pub const SESSIONS_BOUND: &str = "hopbus_routing_sessions_bound";
    /// Session binds rejected (unknown link, duplicate session)
    pub const BIND_REJECTED_TOTAL: &str = "hopbus_routing_bind_rejected_total";
}

/// Endpoint directory and link arena
pub mod directory {
    /// Number of registered virtual endpoints
    pub const ENDPOINTS_ACTIVE: &str = "hopbus_directory_endpoints_active";
    /// Virtual endpoints torn down after losing their last route
    pub const ENDPOINTS_TORN_DOWN_TOTAL: &str = "hopbus_directory_endpoints_torn_down_total";
    /// Number of links held by the arena
    pub const LINKS_REGISTERED: &str = "hopbus_directory_links_registered";
    /// Links lost (transport closed)
    pub const LINKS_LOST_TOTAL: &str = "hopbus_directory_links_lost_total";
    /// Links destroyed once unreferenced
    pub const LINKS_REAPED_TOTAL: &str = "hopbus_directory_links_reaped_total";
}

/// Message sealing
pub mod crypto {
    /// Messages sealed before transmission
    pub const MESSAGES_SEALED_TOTAL: &str = "hopbus_crypto_messages_sealed_total";
    /// Seal/unseal failures
    pub const FAILURES_TOTAL: &str = "hopbus_crypto_failures_total";
    /// Seal duration in seconds
    pub const SEAL_DURATION_SECONDS: &str = "hopbus_crypto_seal_duration_seconds";
}

/// Config loading metrics
pub mod config {
    /// Config parse errors by format
    pub const PARSE_ERRORS_TOTAL: &str = "hopbus_config_parse_errors_total";
    /// Validation errors by category
    pub const VALIDATION_ERRORS_TOTAL: &str = "hopbus_config_validation_errors_total";
}

/// Common label keys used across metrics
pub mod labels {
    pub const BUCKET: &str = "bucket";
    pub const PEER: &str = "peer";
    pub const REASON: &str = "reason";
    pub const OPERATION: &str = "operation";
    pub const FORMAT: &str = "format";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Candidate list sizes; a peer is rarely reachable over more than a handful of links
    pub static CANDIDATES: Lazy<Vec<f64>> =
        Lazy::new(|| vec![0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 16.0]);

    /// Seal duration buckets (in seconds)
    /// Covers 1us to 50ms
    pub static SEAL_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05,
        ]
    });
}
