/// Errors raised while installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "prometheus")]
    #[error(transparent)]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),

    /// A configured global label has an empty name.
    #[error("global metric label names must not be empty (value {value:?})")]
    EmptyLabelName { value: String },

    #[error("a global metrics recorder is already installed")]
    RecorderInstalled,
}

pub type Result<T> = std::result::Result<T, Error>;
