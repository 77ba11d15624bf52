//! Metrics recorder initialization and configuration.

use tracing::info;

use crate::{Error, Result};

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Returns an empty string when collection is disabled or the exporter
    /// was not compiled in.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }

    fn disabled() -> Self {
        Self {
            #[cfg(feature = "prometheus")]
            prometheus_handle: None,
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at process startup. When the `prometheus` feature is enabled this
/// installs the Prometheus recorder globally; otherwise the `metrics` macros
/// stay no-ops.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::disabled());
    }

    if let Some((_, value)) = config.global_labels.iter().find(|(k, _)| k.trim().is_empty()) {
        return Err(Error::EmptyLabelName {
            value: value.clone(),
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics exporter initialized");
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle::disabled())
    }
}

#[cfg(feature = "prometheus")]
fn build_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusRecorder> {
    use {
        crate::buckets,
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(crate::routing::CANDIDATES.to_string()),
            &buckets::CANDIDATES,
        )?
        .set_buckets_for_metric(
            Matcher::Full(crate::crypto::SEAL_DURATION_SECONDS.to_string()),
            &buckets::SEAL_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    Ok(builder.build_recorder())
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let recorder = build_prometheus(config)?;
    let handle = recorder.handle();

    #[cfg(feature = "tracing")]
    let recorder = crate::tracing_integration::with_span_labels(recorder);

    // No HTTP listener; callers render through the handle.
    metrics::set_global_recorder(recorder).map_err(|_| Error::RecorderInstalled)?;
    Ok(handle)
}
