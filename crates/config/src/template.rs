//! Default configuration template with all options documented.
//!
//! Written by `hopbus config init`. Every option is present with its default
//! value so the file parses back into `HopbusConfig::default()`.

/// Generate the default config template.
#[must_use]
pub fn default_config_template() -> String {
    r##"# hopbus router configuration
# ===========================
# All available options with their defaults.
#
# Environment variable substitution is supported: ${ENV_VAR} or ${ENV_VAR:-fallback}
# Example: key = "${HOPBUS_SECURITY_KEY}"

# ══════════════════════════════════════════════════════════════════════════════
# ROUTER
# ══════════════════════════════════════════════════════════════════════════════

[router]
rebind_policy = "replace"         # "replace": a new bind moves the session to the new link
                                  # "reject": binding an already-bound session fails
reap_dead_links = true            # Destroy lost links once nothing references them
# local_guid = "0a1b2c3d4e5f60718293a4b5c6d7e8f9"   # GUID used by `hopbus simulate`

# ══════════════════════════════════════════════════════════════════════════════
# LOGGING
# ══════════════════════════════════════════════════════════════════════════════

[logging]
level = "info"                    # trace, debug, info, warn, error (or an EnvFilter directive)
json = false                      # JSON lines instead of human-readable output

# ══════════════════════════════════════════════════════════════════════════════
# METRICS
# ══════════════════════════════════════════════════════════════════════════════

[metrics]
enabled = false                   # Collect routing metrics (Prometheus exporter when compiled in)

[metrics.labels]
# region = "eu-west"

# ══════════════════════════════════════════════════════════════════════════════
# SECURITY
# ══════════════════════════════════════════════════════════════════════════════

[security]
enabled = false                   # Seal message bodies (XChaCha20-Poly1305) before they hit a link
# key = "${HOPBUS_SECURITY_KEY}"  # Base64, 32 bytes
"##
    .to_string()
}
