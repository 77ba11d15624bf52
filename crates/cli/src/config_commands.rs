use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result, bail},
    base64::Engine,
    clap::Subcommand,
    hopbus_config::{HopbusConfig, SECURITY_KEY_LEN},
    rand::RngCore,
    tracing::info,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML (secrets redacted).
    Show,
    /// Write the documented default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print a fresh base64 key for `[security] key`.
    Keygen,
}

pub fn handle_config(
    action: ConfigAction,
    config_path: Option<&Path>,
    config: &HopbusConfig,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", render(config)?);
            Ok(())
        },
        ConfigAction::Init { force } => {
            let path = config_path.map_or_else(default_init_path, Path::to_path_buf);
            init_at(&path, force)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        },
        ConfigAction::Keygen => {
            println!("{}", generate_key());
            Ok(())
        },
    }
}

fn render(config: &HopbusConfig) -> Result<String> {
    toml::to_string_pretty(&config.redacted()).context("serialize config")
}

/// `~/.config/hopbus/hopbus.toml`, or `./hopbus.toml` without a home dir.
fn default_init_path() -> PathBuf {
    hopbus_config::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hopbus.toml")
}

fn init_at(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, hopbus_config::default_config_template())
        .with_context(|| format!("write {}", path.display()))?;

    // The file may later hold the sealing key.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    info!(path = %path.display(), force, "config template written");
    Ok(())
}

fn generate_key() -> String {
    let mut key = [0u8; SECURITY_KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}
