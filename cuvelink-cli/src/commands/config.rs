//! Show and edit the persisted configuration.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::{Cli, CliError, ConfigAction};

/// Write the configuration to the file this invocation names.
///
/// `--config PATH` makes that file the target; otherwise the global
/// configuration file is written.
pub(crate) fn persist(cli: &Cli, config: &Config) -> Result<PathBuf> {
    match &cli.config_path {
        Some(path) => {
            config.save_to(path)?;
            Ok(path.clone())
        },
        None => config.save_global(),
    }
}

/// The file `config reset` deletes and `config path` prints.
fn target_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config_path {
        Some(path) => Ok(path.clone()),
        None => Config::global_config_path()
            .ok_or_else(|| anyhow::anyhow!("no configuration directory on this platform")),
    }
}

pub(crate) fn run(cli: &Cli, config: &mut Config, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered =
                toml::to_string_pretty(config).context("failed to render the configuration")?;
            print!("{rendered}");
            Ok(())
        },
        ConfigAction::Path => {
            let path = target_path(cli)?;
            println!("{}", path.display());
            Ok(())
        },
        ConfigAction::Set { key, value } => set(cli, config, key, value),
        ConfigAction::Reset => reset(cli),
    }
}

fn set(cli: &Cli, config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "port" => config.port.connection.serial = Some(value.to_string()),
        "baud" => {
            let baud: u32 = value
                .parse()
                .map_err(|_| CliError::Usage(format!("invalid baud rate: {value}")))?;
            config.port.connection.baud = Some(baud);
        },
        other => {
            return Err(CliError::Usage(format!(
                "unknown configuration key: {other} (expected port or baud)"
            ))
            .into());
        },
    }

    let path = persist(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Saved {key} to {}", style("✓").green(), path.display());
    }
    Ok(())
}

fn reset(cli: &Cli) -> Result<()> {
    let path = target_path(cli)?;

    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{} Deleted {}", style("✓").green(), path.display());
        }
    } else if !cli.quiet {
        eprintln!(
            "{} Nothing to delete at {}",
            style("ℹ").blue(),
            path.display()
        );
    }
    Ok(())
}
