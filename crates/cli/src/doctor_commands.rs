//! `hopbus doctor`: config validation and routing/security audit.
//!
//! Prints a structured report with `[ok]`, `[warn]`, `[fail]`, `[skip]`, or
//! `[info]` status indicators per item and exits non-zero on failures.

use std::path::Path;

use {
    anyhow::Result,
    hopbus_common::Guid,
    hopbus_config::{
        HopbusConfig, RebindPolicy,
        validate::{self, Severity, ValidationResult},
    },
    hopbus_crypto::{MessageEncryptor, XChaCha20MessageEncryptor},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-check result used to build the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Skip,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Skip => DIM,
            Self::Info => CYAN,
        }
    }

    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn handle_doctor(config_path: Option<&Path>, config: &HopbusConfig) -> Result<()> {
    eprintln!("{BOLD}hopbus doctor{RESET}");
    eprintln!("{BOLD}============={RESET}\n");

    let result = validate::validate(config_path);

    let sections = vec![
        check_config(&result),
        check_router(config),
        check_security(config, result.config_path.as_deref()),
        check_metrics(config),
    ];

    let (errors, warnings) = print_report(&sections);

    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

// ── 1. Config validation ────────────────────────────────────────────────────

fn check_config(result: &ValidationResult) -> Section {
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));

    let has_syntax_error = result
        .diagnostics
        .iter()
        .any(|d| d.category == "syntax" && d.severity == Severity::Error);

    if has_syntax_error {
        for d in &result.diagnostics {
            if d.category == "syntax" {
                section.push(Status::Fail, format!("syntax: {}", d.message));
            }
        }
        return section;
    }

    for d in &result.diagnostics {
        if d.category == "file-ref" {
            section.push(Status::from_severity(d.severity), d.message.clone());
        }
    }

    let unknown_fields: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "unknown-field")
        .collect();
    if unknown_fields.is_empty() {
        section.push(Status::Ok, "All fields recognized");
    } else {
        for d in &unknown_fields {
            section.push(Status::Fail, format!("{}: {}", d.path, d.message));
        }
    }

    let type_errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "type-error")
        .collect();
    if type_errors.is_empty() {
        section.push(Status::Ok, "No type errors");
    } else {
        for d in &type_errors {
            section.push(Status::Fail, d.message.clone());
        }
    }

    for d in &result.diagnostics {
        if matches!(d.category, "security" | "logging" | "router" | "metrics") {
            let msg = if d.path.is_empty() {
                d.message.clone()
            } else {
                format!("{}: {}", d.path, d.message)
            };
            section.push(Status::from_severity(d.severity), msg);
        }
    }

    section
}

// ── 2. Router ───────────────────────────────────────────────────────────────

fn check_router(config: &HopbusConfig) -> Section {
    let mut section = Section::new("Router");
    let router = &config.router;

    match router.rebind_policy {
        RebindPolicy::Replace => section.push(
            Status::Info,
            "rebind_policy = replace: a rebound session moves to the new link",
        ),
        RebindPolicy::Reject => section.push(
            Status::Info,
            "rebind_policy = reject: rebinding a bound session fails",
        ),
    }

    if router.reap_dead_links {
        section.push(Status::Ok, "Lost links are reaped after each link-loss pass");
    } else {
        section.push(
            Status::Warn,
            "reap_dead_links = false: lost links stay allocated until reaped explicitly",
        );
    }

    match router.local_guid.as_deref() {
        None => section.push(Status::Skip, "local_guid not set; simulate picks a random one"),
        Some(raw) => match raw.parse::<Guid>() {
            Ok(guid) if guid.as_str().len() < hopbus_common::types::SHORT_GUID_LEN => {
                section.push(
                    Status::Warn,
                    format!("local_guid {guid} is shorter than a short guid"),
                );
            },
            Ok(guid) => section.push(
                Status::Ok,
                format!("local_guid {guid} (unique names :{}.N)", guid.short()),
            ),
            Err(e) => section.push(Status::Fail, format!("local_guid: {e}")),
        },
    }

    section
}

// ── 3. Security ─────────────────────────────────────────────────────────────

fn check_security(config: &HopbusConfig, config_path: Option<&Path>) -> Section {
    let mut section = Section::new("Security");

    let encryptor = match XChaCha20MessageEncryptor::from_config(&config.security) {
        Ok(None) => {
            section.push(Status::Info, "Message sealing disabled");
            return section;
        },
        Ok(Some(encryptor)) => encryptor,
        Err(e) => {
            section.push(Status::Fail, format!("{e}"));
            return section;
        },
    };

    section.push(Status::Ok, "Sealing key loaded");
    match self_test(&encryptor) {
        Ok(()) => section.push(Status::Ok, "Seal/open self-test passed"),
        Err(e) => section.push(Status::Fail, format!("Seal/open self-test failed: {e}")),
    }

    #[cfg(unix)]
    if config.security.key.is_some()
        && let Some(path) = config_path
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(meta) if meta.permissions().mode() & 0o077 != 0 => section.push(
                Status::Warn,
                format!(
                    "{} holds the sealing key but is readable by others (mode {:o})",
                    path.display(),
                    meta.permissions().mode() & 0o777
                ),
            ),
            Ok(_) => section.push(Status::Ok, "Config file permissions restrict the key"),
            Err(e) => section.push(Status::Skip, format!("cannot stat {}: {e}", path.display())),
        }
    }
    #[cfg(not(unix))]
    let _ = config_path;

    section
}

fn self_test(encryptor: &dyn MessageEncryptor) -> hopbus_crypto::Result<()> {
    let probe = b"HDRdoctor probe";
    let sealed = encryptor.encrypt(probe, 3)?;
    let opened = encryptor.decrypt(&sealed, 3)?;
    if opened != probe {
        return Err(hopbus_crypto::Error::cipher("round trip mismatch"));
    }
    Ok(())
}

// ── 4. Metrics ──────────────────────────────────────────────────────────────

fn check_metrics(config: &HopbusConfig) -> Section {
    let mut section = Section::new("Metrics");

    if !config.metrics.enabled {
        section.push(Status::Info, "Metrics collection disabled");
        return section;
    }

    if cfg!(feature = "prometheus") {
        section.push(Status::Ok, "Prometheus exporter compiled in");
    } else {
        section.push(
            Status::Warn,
            "metrics.enabled = true but this build has no prometheus exporter",
        );
    }
    if !cfg!(feature = "metrics") {
        section.push(
            Status::Warn,
            "routing metrics are not compiled in; only recorder output is available",
        );
    }
    if !config.metrics.labels.is_empty() {
        let mut keys: Vec<_> = config.metrics.labels.keys().map(String::as_str).collect();
        keys.sort_unstable();
        section.push(Status::Info, format!("Global labels: {}", keys.join(", ")));
    }

    section
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        base64::Engine,
        hopbus_config::{SecurityConfig, validate_toml_str},
    };

    fn statuses(section: &Section) -> Vec<Status> {
        section.items.iter().map(|i| i.status).collect()
    }

    #[test]
    fn status_labels() {
        assert_eq!(Status::Ok.label(), "ok");
        assert_eq!(Status::Warn.label(), "warn");
        assert_eq!(Status::Fail.label(), "fail");
        assert_eq!(Status::Skip.label(), "skip");
        assert_eq!(Status::Info.label(), "info");
    }

    #[test]
    fn print_report_counts_errors_and_warnings() {
        let mut section = Section::new("test");
        section.push(Status::Ok, "fine");
        section.push(Status::Warn, "caution");
        section.push(Status::Warn, "caution2");
        section.push(Status::Fail, "broken");
        section.push(Status::Info, "note");

        let (errors, warnings) = print_report(&[section]);
        assert_eq!(errors, 1);
        assert_eq!(warnings, 2);
    }

    #[test]
    fn syntax_error_stops_config_checks() {
        let section = check_config(&validate_toml_str("[router\n"));
        assert!(!section.items.is_empty());
        assert!(section.items.iter().all(|i| i.status == Status::Fail));
        assert!(section.items[0].message.starts_with("syntax:"));
    }

    #[test]
    fn clean_config_passes() {
        let section = check_config(&validate_toml_str("[router]\nrebind_policy = \"reject\"\n"));
        assert_eq!(statuses(&section), vec![Status::Ok, Status::Ok]);
    }

    #[test]
    fn unknown_field_fails() {
        let section = check_config(&validate_toml_str("[router]\nrebind_polcy = \"reject\"\n"));
        assert!(statuses(&section).contains(&Status::Fail));
        assert!(
            section
                .items
                .iter()
                .any(|i| i.message.contains("router.rebind_polcy"))
        );
    }

    #[test]
    fn router_defaults() {
        let section = check_router(&HopbusConfig::default());
        assert_eq!(statuses(&section), vec![
            Status::Info,
            Status::Ok,
            Status::Skip
        ]);
    }

    #[test]
    fn router_flags_bad_guid_and_disabled_reaping() {
        let mut config = HopbusConfig::default();
        config.router.reap_dead_links = false;
        config.router.local_guid = Some("ab.cd".into());
        let section = check_router(&config);
        assert_eq!(statuses(&section), vec![
            Status::Info,
            Status::Warn,
            Status::Fail
        ]);
    }

    #[test]
    fn security_disabled_is_info() {
        let section = check_security(&HopbusConfig::default(), None);
        assert_eq!(statuses(&section), vec![Status::Info]);
    }

    #[test]
    fn security_with_valid_key_passes_self_test() {
        let config = HopbusConfig {
            security: SecurityConfig {
                enabled: true,
                key: Some(secrecy::Secret::new(
                    base64::engine::general_purpose::STANDARD.encode([5u8; 32]),
                )),
            },
            ..Default::default()
        };
        let section = check_security(&config, None);
        assert_eq!(statuses(&section), vec![Status::Ok, Status::Ok]);
    }

    #[test]
    fn security_without_key_fails() {
        let config = HopbusConfig {
            security: SecurityConfig {
                enabled: true,
                key: None,
            },
            ..Default::default()
        };
        let section = check_security(&config, None);
        assert_eq!(statuses(&section), vec![Status::Fail]);
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_key_file_warns() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hopbus.toml");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let config = HopbusConfig {
            security: SecurityConfig {
                enabled: true,
                key: Some(secrecy::Secret::new(
                    base64::engine::general_purpose::STANDARD.encode([5u8; 32]),
                )),
            },
            ..Default::default()
        };
        let section = check_security(&config, Some(&path));
        assert_eq!(section.items.last().unwrap().status, Status::Warn);

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let section = check_security(&config, Some(&path));
        assert_eq!(section.items.last().unwrap().status, Status::Ok);
    }

    #[test]
    fn metrics_disabled_is_info() {
        let section = check_metrics(&HopbusConfig::default());
        assert_eq!(statuses(&section), vec![Status::Info]);
    }
}
