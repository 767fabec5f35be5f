//! One-shot actuator commands: LEDs, fans, PWM duty.
//!
//! Every control frame is answered with a full status frame, so each
//! command doubles as its own confirmation: the frame goes out, the echo
//! comes back, and the relevant readback bit is compared against the
//! requested state.

use anyhow::{Context, Result};
use console::style;
use cuvelink::{ActuatorFlags, ControlFrame, NullSink, StatusFrame};
use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, LedKind, SwitchState, open_link};

/// Response deadline for the status echo after a one-shot command.
const ECHO_TIMEOUT: Duration = Duration::from_secs(2);

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn send_and_confirm(cli: &Cli, config: &mut Config, frame: &ControlFrame) -> Result<StatusFrame> {
    let link = open_link(cli, config, Arc::new(NullSink))?;
    link.request_status(frame, ECHO_TIMEOUT)
        .context("the analyzer did not acknowledge the command")
}

fn led_frame(led: LedKind, on: bool, duty: Option<u8>) -> ControlFrame {
    let mut frame = ControlFrame::new();
    match led {
        LedKind::White => {
            frame.set_white_led(on);
            if let Some(duty) = duty {
                frame.set_white_led_duty(duty);
            }
        },
        LedKind::Nir => {
            frame.set_nir_led(on);
            if let Some(duty) = duty {
                frame.set_nir_led_duty(duty);
            }
        },
    }
    frame
}

fn duty_frame(led: LedKind, percent: u8) -> ControlFrame {
    let mut frame = ControlFrame::new();
    match led {
        LedKind::White => frame.set_white_led_duty(percent),
        LedKind::Nir => frame.set_nir_led_duty(percent),
    }
    frame
}

pub(crate) fn led(
    cli: &Cli,
    config: &mut Config,
    led: LedKind,
    state: SwitchState,
    duty: Option<u8>,
) -> Result<()> {
    let frame = led_frame(led, state.is_on(), duty);
    let status = send_and_confirm(cli, config, &frame)?;

    let reported = match led {
        LedKind::White => status.white_led_on(),
        LedKind::Nir => status.nir_led_on(),
    };
    if reported != state.is_on() {
        warn!("status frame still reports the {led} LED {}", on_off(reported));
    }

    if !cli.quiet {
        match duty {
            Some(percent) => eprintln!(
                "{} {led} LED {} at {percent}% duty",
                style("✓").green(),
                on_off(state.is_on())
            ),
            None => eprintln!("{} {led} LED {}", style("✓").green(), on_off(state.is_on())),
        }
    }
    Ok(())
}

pub(crate) fn fan(cli: &Cli, config: &mut Config, number: u8, state: SwitchState) -> Result<()> {
    let Some(actuator) = ActuatorFlags::fan(number) else {
        return Err(CliError::Usage(format!("fan number {number} is out of range (1-6)")).into());
    };

    let mut frame = ControlFrame::new();
    frame.set_actuator(actuator, state.is_on());

    let status = send_and_confirm(cli, config, &frame)?;
    if status.fan_running(number) != state.is_on() {
        // The tachometer bit follows the blades, not the switch.
        warn!("fan {number} tachometer has not settled yet");
    }

    if !cli.quiet {
        eprintln!(
            "{} Fan {number} {}",
            style("✓").green(),
            on_off(state.is_on())
        );
    }
    Ok(())
}

pub(crate) fn duty(cli: &Cli, config: &mut Config, led: LedKind, percent: u8) -> Result<()> {
    let frame = duty_frame(led, percent);
    let status = send_and_confirm(cli, config, &frame)?;

    let reported = match led {
        LedKind::White => status.white_led_duty(),
        LedKind::Nir => status.nir_led_duty(),
    };
    if reported != percent {
        warn!("status frame reports {led} LED duty {reported}% after the command");
    }

    if !cli.quiet {
        eprintln!("{} {led} LED duty set to {percent}%", style("✓").green());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    // ---- frame construction ----

    #[test]
    fn test_led_frame_white_on_with_duty() {
        let frame = led_frame(LedKind::White, true, Some(80));
        assert!(frame.control().contains(ActuatorFlags::WHITE_LED));
        assert!(frame.state().contains(ActuatorFlags::WHITE_LED));
        assert_eq!(frame.white_led_duty(), 80);
        assert_eq!(frame.nir_led_duty(), 0);
    }

    #[test]
    fn test_led_frame_nir_off_leaves_duty_alone() {
        let frame = led_frame(LedKind::Nir, false, None);
        assert!(frame.control().contains(ActuatorFlags::NIR_LED));
        assert!(!frame.state().contains(ActuatorFlags::NIR_LED));
        assert_eq!(frame.nir_led_duty(), 0);
    }

    #[test]
    fn test_duty_frame_sets_only_the_duty_byte() {
        let frame = duty_frame(LedKind::Nir, 55);
        assert_eq!(frame.nir_led_duty(), 55);
        assert!(frame.control().is_empty());
        assert!(frame.state().is_empty());
    }

    // ---- argument validation ----

    #[test]
    fn test_fan_out_of_range_is_a_usage_error() {
        let cli = Cli::try_parse_from(["cuvelink", "fan", "1", "on"]).unwrap();
        let mut config = Config::default();

        for number in [0u8, 7] {
            let err = fan(&cli, &mut config, number, SwitchState::On).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CliError>(),
                Some(CliError::Usage(_))
            ));
        }
    }

    #[test]
    fn test_on_off_words() {
        assert_eq!(on_off(true), "on");
        assert_eq!(on_off(false), "off");
    }
}
