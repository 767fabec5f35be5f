//! Firmware flashing through the on-chip bootloader.
//!
//! Reads a raw image, confirms the erase, and hands the session to
//! [`cuvelink::McuLink::flash_firmware`]. Progress events drive the bar;
//! Ctrl-C turns into a session cancel so the link tears down cleanly.

use anyhow::{Context, Result};
use console::style;
use cuvelink::{ChannelSink, FlashOptions, FlashState, LinkEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::serial::confirm_action;
use crate::{Cli, CliError, clear_interrupted_flag, open_link, use_fancy_output, was_interrupted};

/// Event-queue poll quantum; cancellation is checked at this rate.
const EVENT_POLL: Duration = Duration::from_millis(100);

pub(crate) fn run(
    cli: &Cli,
    config: &mut Config,
    firmware: &Path,
    retry: bool,
    yes: bool,
) -> Result<()> {
    let image = std::fs::read(firmware)
        .with_context(|| format!("failed to read firmware image {}", firmware.display()))?;
    if image.is_empty() {
        return Err(CliError::Usage(format!(
            "firmware image {} is empty",
            firmware.display()
        ))
        .into());
    }

    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes)",
            style("📦").cyan(),
            style(firmware.display()).bold(),
            image.len()
        );
    }

    if !yes {
        if cli.non_interactive {
            return Err(CliError::Usage(
                "flashing requires --yes in non-interactive mode".to_string(),
            )
            .into());
        }
        let confirmed =
            confirm_action("Erase the MCU flash and write this image. Continue?", false)?;
        if !confirmed {
            return Err(CliError::Cancelled("Flash cancelled".to_string()).into());
        }
    }

    let (sink, events) = ChannelSink::new();
    let link = open_link(cli, config, Arc::new(sink))?;

    if !cli.quiet {
        let note = if retry {
            "Resuming with the bootloader already running"
        } else {
            "Rebooting into the bootloader (takes about ten seconds)"
        };
        eprintln!("{} {note}", style("⏳").yellow());
    }

    let handle = link.flash_firmware(
        image,
        FlashOptions {
            retry,
            ..FlashOptions::default()
        },
    )?;

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut cancel_sent = false;
    loop {
        if was_interrupted() && !cancel_sent {
            cancel_sent = true;
            pb.set_message("cancelling");
            handle.cancel();
        }

        match events.recv_timeout(EVENT_POLL) {
            Ok(LinkEvent::Flash {
                state,
                bytes_written,
                total_bytes,
            }) => {
                pb.set_length(total_bytes as u64);
                pb.set_position(bytes_written as u64);
                pb.set_message(stage_message(state));
                if state.is_terminal() {
                    break;
                }
            },
            Ok(LinkEvent::Error { message }) => {
                pb.suspend(|| eprintln!("{} {message}", style("⚠").yellow()));
            },
            Ok(_) => {},
            Err(_) => {
                if handle.is_finished() {
                    break;
                }
            },
        }
    }

    match handle.wait() {
        Ok(report) => {
            pb.finish_with_message("complete");
            if !cli.quiet {
                eprintln!(
                    "\n{} Firmware written: {} of {} bytes",
                    style("🎉").green().bold(),
                    report.bytes_written,
                    report.total_bytes
                );
            }
            clear_interrupted_flag();
            Ok(())
        },
        Err(err) => {
            pb.abandon_with_message("failed");
            if was_interrupted() {
                clear_interrupted_flag();
                Err(CliError::Cancelled("Flash cancelled".to_string()).into())
            } else {
                Err(err).context("flash session failed")
            }
        },
    }
}

/// Progress-bar caption for each stage of the session.
fn stage_message(state: FlashState) -> &'static str {
    match state {
        FlashState::EnterBootloader => "rebooting into the bootloader",
        FlashState::InBootloader => "bootloader answered",
        FlashState::EraseCmd | FlashState::EraseAll => "erasing flash",
        FlashState::WriteCommand | FlashState::WriteAddress | FlashState::DataWritten => {
            "writing pages"
        },
        FlashState::AllDataWritten | FlashState::GoCommand | FlashState::GoAddress => {
            "starting new firmware"
        },
        FlashState::CompleteSuccess => "complete",
        FlashState::CompleteFailed => "failed",
    }
}
