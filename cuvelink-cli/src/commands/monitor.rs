//! Continuous status polling.
//!
//! Polls the analyzer on a fixed interval and prints one compact line per
//! status frame; button presses and releases get their own lines between
//! polls. Runs until Ctrl-C or, with `--count`, until that many frames have
//! been shown. Missed polls are warnings, not failures; a lost frame on a
//! serial line is routine.

use anyhow::{Context, Result};
use console::style;
use cuvelink::{
    ChannelSink, ControlFrame, CuvetteThresholds, Error, LinkEvent, Photodiode, StatusFrame,
    Thermistor,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::{Cli, clear_interrupted_flag, open_link, was_interrupted};

/// Response deadline for each poll.
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn run(
    cli: &Cli,
    config: &mut Config,
    interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    let thresholds = config.thresholds;
    let (sink, events) = ChannelSink::new();
    let link = open_link(cli, config, Arc::new(sink))?;

    if !cli.quiet {
        eprintln!(
            "{} Polling every {} ms; press Ctrl-C to stop",
            style("ℹ").blue(),
            interval.as_millis()
        );
    }

    let started = Instant::now();
    let mut shown = 0u64;
    loop {
        if was_interrupted() {
            clear_interrupted_flag();
            break;
        }

        match link.request_status(&ControlFrame::new(), POLL_TIMEOUT) {
            Ok(status) => {
                println!(
                    "{}",
                    status_line(started.elapsed(), &status, thresholds.as_ref())
                );
                shown += 1;
            },
            Err(Error::Timeout(_)) => {
                eprintln!(
                    "{} No status frame; is the analyzer still connected?",
                    style("⚠").yellow()
                );
            },
            Err(err) => return Err(err).context("status polling failed"),
        }

        // Surface button edges and link-level errors without stopping the
        // stream.
        for event in events.try_iter() {
            match event {
                LinkEvent::Status {
                    prev: Some(prev),
                    cur,
                } => {
                    for edge in button_edges(&prev, &cur) {
                        println!("           {edge}");
                    }
                },
                LinkEvent::Error { message } => {
                    eprintln!("{} {message}", style("⚠").yellow());
                },
                _ => {},
            }
        }

        if count.is_some_and(|limit| shown >= limit) {
            break;
        }
        thread::sleep(interval);
    }

    Ok(())
}

/// Button presses and releases between two consecutive frames.
fn button_edges(prev: &StatusFrame, cur: &StatusFrame) -> Vec<String> {
    let pressed = cur.buttons() - prev.buttons();
    let released = prev.buttons() - cur.buttons();

    let mut edges = Vec::new();
    for name in super::status::button_names(pressed) {
        edges.push(format!("button {name} pressed"));
    }
    for name in super::status::button_names(released) {
        edges.push(format!("button {name} released"));
    }
    edges
}

/// One line per frame: elapsed time, temperatures, photodiodes, duties,
/// occupancy. Occupancy reads `-` until thresholds are calibrated.
fn status_line(
    elapsed: Duration,
    frame: &StatusFrame,
    thresholds: Option<&CuvetteThresholds>,
) -> String {
    let occupancy = match thresholds {
        Some(thresholds) => thresholds.classify(frame).to_string(),
        None => "-".to_string(),
    };
    let lid = if frame.lid_switch() { "  [lid]" } else { "" };

    format!(
        "{:>8.1}s  amb {:.1}C  chm {:.1}C  trans {:>5} scat {:>5}  white {:>3}% nir {:>3}%  cuvette: {occupancy}{lid}",
        elapsed.as_secs_f32(),
        frame.thermistor_celsius(Thermistor::Ambient),
        frame.thermistor_celsius(Thermistor::Chamber),
        frame.photodiode(Photodiode::Transmission),
        frame.photodiode(Photodiode::Scatter),
        frame.white_led_duty(),
        frame.nir_led_duty(),
    )
}
