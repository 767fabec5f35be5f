//! Empty-chamber calibration for cuvette detection.
//!
//! Samples the cuvette sensors with the chamber empty, derives per-sensor
//! covered thresholds, and persists them to the configuration so `status`
//! and `monitor` can classify occupancy.

use anyhow::{Context, Result};
use console::style;
use cuvelink::NullSink;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::serial::confirm_action;
use crate::{Cli, CliError, open_link};

/// Response deadline for the calibration sample.
const CALIBRATE_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn run(cli: &Cli, config: &mut Config, yes: bool) -> Result<()> {
    if !yes {
        if cli.non_interactive {
            return Err(CliError::Usage(
                "calibration requires --yes in non-interactive mode".to_string(),
            )
            .into());
        }
        let confirmed = confirm_action("Calibrate with the chamber empty. Continue?", false)?;
        if !confirmed {
            return Err(CliError::Cancelled("Calibration cancelled".to_string()).into());
        }
    }

    let link = open_link(cli, config, Arc::new(NullSink))?;

    if !cli.quiet {
        eprintln!("{} Sampling the empty chamber", style("⏳").yellow());
    }

    let thresholds = link
        .calibrate_empty_chamber(CALIBRATE_TIMEOUT)
        .context("empty-chamber calibration failed")?;

    println!("position 1 threshold: {:.0}", thresholds.position_1);
    println!("position 2 threshold: {:.0}", thresholds.position_2);
    println!("position 3 threshold: {:.0}", thresholds.position_3);

    config.thresholds = Some(thresholds);
    let path = super::config::persist(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Thresholds saved to {}",
            style("✓").green(),
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_non_interactive_without_yes_is_a_usage_error() {
        let cli = Cli::try_parse_from(["cuvelink", "--non-interactive", "calibrate"]).unwrap();
        let mut config = Config::default();

        let err = run(&cli, &mut config, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
        // Nothing was calibrated, so nothing may be persisted.
        assert!(config.thresholds.is_none());
    }
}
