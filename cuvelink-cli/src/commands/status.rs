//! Read one status frame and display it.

use anyhow::{Context, Result};
use cuvelink::{
    ButtonFlags, ControlFrame, CuvettePosition, CuvetteThresholds, FanFlags, NullSink, Photodiode,
    StatusFrame, SwitchFlags, Thermistor, Thermopile,
};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, open_link};

pub(crate) fn run(cli: &Cli, config: &mut Config, timeout: Duration) -> Result<()> {
    let thresholds = config.thresholds;
    let link = open_link(cli, config, Arc::new(NullSink))?;

    let status = link
        .request_status(&ControlFrame::new(), timeout)
        .context("no status frame from the analyzer")?;

    print!("{}", render(&status, thresholds.as_ref()));
    Ok(())
}

fn switch_names(flags: SwitchFlags) -> Vec<&'static str> {
    let mut names = Vec::new();
    if flags.contains(SwitchFlags::WHITE_LED) {
        names.push("white-led");
    }
    if flags.contains(SwitchFlags::NIR_LED) {
        names.push("nir-led");
    }
    if flags.contains(SwitchFlags::CUVETTE_1) {
        names.push("cuvette-1");
    }
    if flags.contains(SwitchFlags::CUVETTE_2) {
        names.push("cuvette-2");
    }
    if flags.contains(SwitchFlags::CUVETTE_3) {
        names.push("cuvette-3");
    }
    if flags.contains(SwitchFlags::LID) {
        names.push("lid");
    }
    names
}

pub(crate) fn button_names(flags: ButtonFlags) -> Vec<&'static str> {
    let mut names = Vec::new();
    if flags.contains(ButtonFlags::TOP_LEFT) {
        names.push("top-left");
    }
    if flags.contains(ButtonFlags::MIDDLE_LEFT) {
        names.push("middle-left");
    }
    if flags.contains(ButtonFlags::BOTTOM_LEFT) {
        names.push("bottom-left");
    }
    if flags.contains(ButtonFlags::TOP_RIGHT) {
        names.push("top-right");
    }
    if flags.contains(ButtonFlags::MIDDLE_RIGHT) {
        names.push("middle-right");
    }
    if flags.contains(ButtonFlags::BOTTOM_RIGHT) {
        names.push("bottom-right");
    }
    names
}

fn fan_names(flags: FanFlags) -> Vec<&'static str> {
    let mut names = Vec::new();
    if flags.contains(FanFlags::FAN_1) {
        names.push("fan-1");
    }
    if flags.contains(FanFlags::FAN_2) {
        names.push("fan-2");
    }
    if flags.contains(FanFlags::FAN_3) {
        names.push("fan-3");
    }
    if flags.contains(FanFlags::FAN_4) {
        names.push("fan-4");
    }
    if flags.contains(FanFlags::FAN_5) {
        names.push("fan-5");
    }
    if flags.contains(FanFlags::FAN_6) {
        names.push("fan-6");
    }
    names
}

fn name_list(names: &[&str]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Render the full readout. Occupancy needs calibrated thresholds; without
/// them the line points at the calibrate command instead.
fn render(frame: &StatusFrame, thresholds: Option<&CuvetteThresholds>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{:<18} {}", "Protocol version:", frame.protocol_version());
    let _ = writeln!(out, "{:<18} {}", "Firmware version:", frame.firmware_version());

    let _ = writeln!(
        out,
        "{:<18} {}",
        "Switches:",
        name_list(&switch_names(frame.switches()))
    );
    let _ = writeln!(
        out,
        "{:<18} {}",
        "Buttons:",
        name_list(&button_names(frame.buttons()))
    );
    let _ = writeln!(out, "{:<18} {}", "Fans:", name_list(&fan_names(frame.fans())));

    let mut thermistors = String::new();
    for sensor in Thermistor::ALL {
        let _ = write!(
            thermistors,
            "{sensor} {:.1} C  ",
            frame.thermistor_celsius(sensor)
        );
    }
    let _ = writeln!(out, "{:<18} {}", "Thermistors:", thermistors.trim_end());

    let mut thermopiles = String::new();
    for sensor in Thermopile::ALL {
        let _ = write!(
            thermopiles,
            "{sensor} {:.1} C  ",
            frame.thermopile_celsius(sensor)
        );
    }
    let _ = writeln!(out, "{:<18} {}", "Thermopiles:", thermopiles.trim_end());

    let mut photodiodes = String::new();
    for sensor in Photodiode::ALL {
        let _ = write!(photodiodes, "{sensor} {}  ", frame.photodiode(sensor));
    }
    let _ = writeln!(out, "{:<18} {}", "Photodiodes:", photodiodes.trim_end());

    let mut cuvettes = String::new();
    for position in CuvettePosition::ALL {
        let _ = write!(cuvettes, "{}  ", frame.cuvette_raw(position));
    }
    let _ = writeln!(out, "{:<18} {}", "Cuvette sensors:", cuvettes.trim_end());

    let occupancy = match thresholds {
        Some(thresholds) => thresholds.classify(frame).to_string(),
        None => "unknown (run `cuvelink calibrate` first)".to_string(),
    };
    let _ = writeln!(out, "{:<18} {occupancy}", "Cuvette:");

    let _ = writeln!(
        out,
        "{:<18} white {}%  nir {}%",
        "LED duty:",
        frame.white_led_duty(),
        frame.nir_led_duty()
    );

    out
}
