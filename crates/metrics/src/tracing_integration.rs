//! Tracing integration for metrics.
//!
//! Routing code records inside spans such as `scenario{scenario=..}`. Adding
//! [`metrics_layer`] to the global subscriber keeps those span fields around,
//! and the recorder installed by [`crate::init_metrics`] turns them into
//! labels when the `tracing` feature is on.

#[cfg(feature = "tracing")]
use {
    metrics_tracing_context::{
        MetricsLayer, TracingContext, TracingContextLayer, label_filter::IncludeAll,
    },
    metrics_util::layers::Layer,
};

/// Layer to stack onto the process subscriber.
///
/// ```rust,ignore
/// tracing_subscriber::registry()
///     .with(EnvFilter::new("info"))
///     .with(hopbus_metrics::tracing_integration::metrics_layer())
///     .with(fmt::layer())
///     .init();
/// ```
#[cfg(feature = "tracing")]
#[must_use]
pub fn metrics_layer() -> MetricsLayer {
    MetricsLayer::new()
}

/// Wrap `recorder` so metrics emitted inside a span carry its fields.
#[cfg(feature = "tracing")]
#[cfg_attr(not(feature = "prometheus"), allow(dead_code))]
pub(crate) fn with_span_labels<R>(recorder: R) -> TracingContext<R, IncludeAll> {
    TracingContextLayer::all().layer(recorder)
}
