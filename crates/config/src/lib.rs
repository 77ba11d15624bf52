//! Configuration loading, validation, and env substitution for the hopbus router.
//!
//! Config files: `hopbus.toml`, `hopbus.yaml`, `hopbus.yml`, or `hopbus.json`
//! Searched in `./` then `~/.config/hopbus/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file,
        find_or_default_config_path, load_config, save_config,
    },
    schema::{
        HopbusConfig, LoggingConfig, MetricsConfig, RebindPolicy, RouterConfig, SECURITY_KEY_LEN,
        SecurityConfig,
    },
    template::default_config_template,
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_toml_str},
};
