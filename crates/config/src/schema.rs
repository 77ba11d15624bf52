/// Config schema types (router, logging, metrics, security).
use std::collections::HashMap;

use {
    base64::Engine,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Length in bytes of the message-sealing key.
pub const SECURITY_KEY_LEN: usize = 32;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HopbusConfig {
    pub router: RouterConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub security: SecurityConfig,
}

/// What `bind_session` does when the session id is already bound to a
/// different link on the same virtual endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebindPolicy {
    /// Release the previous binding and bind the new link.
    #[default]
    Replace,
    /// Refuse the new binding; the previous one stays.
    Reject,
}

impl std::fmt::Display for RebindPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for RebindPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown rebind policy: {other}")),
        }
    }
}

/// Routing behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Session rebind policy. Defaults to `replace`.
    pub rebind_policy: RebindPolicy,
    /// Destroy lost links with no remaining references after each link-loss pass.
    pub reap_dead_links: bool,
    /// GUID this router presents to peers (used by `hopbus simulate`).
    pub local_guid: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rebind_policy: RebindPolicy::default(),
            reap_dead_links: true,
            local_guid: None,
        }
    }
}

/// Log output settings. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter (trace, debug, info, warn, error) or a full `EnvFilter` directive.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}

/// Link-level message sealing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Seal message bodies before they reach a link.
    pub enabled: bool,
    /// Base64-encoded 32-byte key.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub key: Option<Secret<String>>,
}

impl SecurityConfig {
    /// Decode the configured key.
    ///
    /// Returns `Ok(None)` when no key is set.
    pub fn decode_key(&self) -> Result<Option<[u8; SECURITY_KEY_LEN]>, String> {
        let Some(encoded) = self.key.as_ref() else {
            return Ok(None);
        };
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.expose_secret().trim())
            .map_err(|e| format!("security.key is not valid base64: {e}"))?;
        let key: [u8; SECURITY_KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            format!(
                "security.key must decode to {SECURITY_KEY_LEN} bytes, got {}",
                raw.len()
            )
        })?;
        Ok(Some(key))
    }

    /// Copy with the key replaced by a placeholder, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            enabled: self.enabled,
            key: self
                .key
                .as_ref()
                .map(|_| Secret::new("<redacted>".to_string())),
        }
    }
}

impl HopbusConfig {
    /// Copy safe to print.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            security: self.security.redacted(),
            ..self.clone()
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = HopbusConfig::default();
        assert_eq!(cfg.router.rebind_policy, RebindPolicy::Replace);
        assert!(cfg.router.reap_dead_links);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.metrics.enabled);
        assert!(!cfg.security.enabled);
    }

    #[test]
    fn parses_rebind_policy() {
        let cfg: HopbusConfig = toml::from_str(
            r#"
[router]
rebind_policy = "reject"
"#,
        )
        .unwrap();
        assert_eq!(cfg.router.rebind_policy, RebindPolicy::Reject);
        assert_eq!("Replace".parse::<RebindPolicy>(), Ok(RebindPolicy::Replace));
        assert!("stack".parse::<RebindPolicy>().is_err());
    }

    #[test]
    fn decodes_security_key() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let sec = SecurityConfig {
            enabled: true,
            key: Some(Secret::new(encoded)),
        };
        assert_eq!(sec.decode_key().unwrap(), Some([7u8; 32]));

        let short = SecurityConfig {
            enabled: true,
            key: Some(Secret::new(
                base64::engine::general_purpose::STANDARD.encode([1u8; 16]),
            )),
        };
        assert!(short.decode_key().unwrap_err().contains("32 bytes"));
        assert_eq!(SecurityConfig::default().decode_key().unwrap(), None);
    }

    #[test]
    fn redacted_hides_key() {
        let cfg = HopbusConfig {
            security: SecurityConfig {
                enabled: true,
                key: Some(Secret::new("c2VjcmV0".into())),
            },
            ..Default::default()
        };
        let shown = toml::to_string(&cfg.redacted()).unwrap();
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("c2VjcmV0"));
    }
}
