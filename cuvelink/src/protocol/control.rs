//! Host to MCU control frame.
//!
//! ## Frame Format
//!
//! 16 bytes, header `0xC3 0xA5`, additive checksum in the last byte:
//!
//! ```text
//! +------+------+------+---------+-------+----------+-------+-------+---------+----------+-------+
//! | 0xC3 | 0xA5 | rsvd | CONTROL | STATE | CONTROL2 | WDUTY | NDUTY | CUVCTRL | reserved | CKSUM |
//! +------+------+------+---------+-------+----------+-------+-------+---------+----------+-------+
//!    0      1      2       3        4         5         6       7       8        9..14      15
//! ```
//!
//! `CONTROL` and `STATE` share the actuator bit assignment: a raised
//! `CONTROL` bit means "this actuator's state is being asserted in this
//! message", and the matching `STATE` bit carries the asserted value.
//! `CONTROL2` gates whether the duty-cycle bytes are applied. Actuators
//! whose `CONTROL` bit is clear are left untouched by the firmware.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::protocol::frame::WireFrame;

const OFF_RESERVED: usize = 2;
const OFF_CONTROL: usize = 3;
const OFF_STATE: usize = 4;
const OFF_CONTROL2: usize = 5;
const OFF_WHITE_DUTY: usize = 6;
const OFF_NIR_DUTY: usize = 7;
const OFF_CUVETTE_CONTROL: usize = 8;

/// Largest accepted duty-cycle value, in percent.
pub const MAX_DUTY: u8 = 100;

/// Reserved-byte tag that marks the enter-bootloader command frame.
const BOOTLOADER_TAG: u8 = 0xAA;

bitflags! {
    /// One bit per actuator, shared by the CONTROL and STATE bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActuatorFlags: u8 {
        /// White (broadband) measurement LED.
        const WHITE_LED = 0x01;
        /// Near-infrared measurement LED.
        const NIR_LED = 0x02;
        /// Fan 1.
        const FAN_1 = 0x04;
        /// Fan 2.
        const FAN_2 = 0x08;
        /// Fan 3.
        const FAN_3 = 0x10;
        /// Fan 4.
        const FAN_4 = 0x20;
        /// Fan 5.
        const FAN_5 = 0x40;
        /// Fan 6.
        const FAN_6 = 0x80;
    }
}

impl ActuatorFlags {
    /// Flag for fan `n` (1-based). `None` outside `1..=6`.
    pub fn fan(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::FAN_1),
            2 => Some(Self::FAN_2),
            3 => Some(Self::FAN_3),
            4 => Some(Self::FAN_4),
            5 => Some(Self::FAN_5),
            6 => Some(Self::FAN_6),
            _ => None,
        }
    }
}

bitflags! {
    /// Gates for the duty-cycle bytes (CONTROL2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Control2Flags: u8 {
        /// Apply the white LED duty-cycle byte.
        const WHITE_LED_DUTY = 0x01;
        /// Apply the NIR LED duty-cycle byte.
        const NIR_LED_DUTY = 0x02;
    }
}

bitflags! {
    /// Cuvette sensor calibration mode (CUVETTE_CONTROL).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CuvetteControlFlags: u8 {
        /// Calibrate against an empty chamber.
        const EMPTY = 0x01;
        /// Calibrate against a full chamber. Accepted by the firmware but
        /// has no effect; kept for wire compatibility.
        const FULL = 0x02;
    }
}

/// Host to MCU control frame. See the module docs for the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    buf: [u8; 16],
}

impl ControlFrame {
    /// A cleared frame: header set, every actuator deasserted, checksum
    /// valid.
    pub fn new() -> Self {
        let mut frame = Self {
            buf: [0u8; Self::LEN],
        };
        frame.buf[0] = Self::HEADER[0];
        frame.buf[1] = Self::HEADER[1];
        frame.set_checksum();
        frame
    }

    /// Reset to the cleared state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The command frame that reboots running firmware into the bootloader.
    ///
    /// Reserved byte 2 carries the `0xAA` entry tag and every CONTROL bit is
    /// raised; the firmware treats this exact pattern as the reboot request.
    pub fn enter_bootloader() -> Self {
        let mut frame = Self::new();
        frame.buf[OFF_RESERVED] = BOOTLOADER_TAG;
        frame.buf[OFF_CONTROL] = 0xFF;
        frame.set_checksum();
        frame
    }

    /// CONTROL byte: which actuators this message asserts.
    pub fn control(&self) -> ActuatorFlags {
        ActuatorFlags::from_bits_retain(self.buf[OFF_CONTROL])
    }

    /// Overwrite the CONTROL byte.
    pub fn set_control(&mut self, flags: ActuatorFlags) {
        self.buf[OFF_CONTROL] = flags.bits();
    }

    /// STATE byte: the asserted actuator values.
    pub fn state(&self) -> ActuatorFlags {
        ActuatorFlags::from_bits_retain(self.buf[OFF_STATE])
    }

    /// Overwrite the STATE byte.
    pub fn set_state(&mut self, flags: ActuatorFlags) {
        self.buf[OFF_STATE] = flags.bits();
    }

    /// CONTROL2 byte: duty-cycle gates.
    pub fn control2(&self) -> Control2Flags {
        Control2Flags::from_bits_retain(self.buf[OFF_CONTROL2])
    }

    /// Overwrite the CONTROL2 byte.
    pub fn set_control2(&mut self, flags: Control2Flags) {
        self.buf[OFF_CONTROL2] = flags.bits();
    }

    /// CUVETTE_CONTROL byte: calibration mode.
    pub fn cuvette_control(&self) -> CuvetteControlFlags {
        CuvetteControlFlags::from_bits_retain(self.buf[OFF_CUVETTE_CONTROL])
    }

    /// Overwrite the CUVETTE_CONTROL byte.
    pub fn set_cuvette_control(&mut self, flags: CuvetteControlFlags) {
        self.buf[OFF_CUVETTE_CONTROL] = flags.bits();
    }

    /// White LED duty-cycle byte.
    pub fn white_led_duty(&self) -> u8 {
        self.buf[OFF_WHITE_DUTY]
    }

    /// NIR LED duty-cycle byte.
    pub fn nir_led_duty(&self) -> u8 {
        self.buf[OFF_NIR_DUTY]
    }

    /// Assert one or more actuators to `on`, leaving the rest untouched.
    ///
    /// Raises the CONTROL bits and sets or clears the matching STATE bits.
    pub fn set_actuator(&mut self, actuator: ActuatorFlags, on: bool) {
        self.buf[OFF_CONTROL] |= actuator.bits();
        let mut state = self.state();
        state.set(actuator, on);
        self.buf[OFF_STATE] = state.bits();
    }

    /// Assert the white LED on or off.
    pub fn set_white_led(&mut self, on: bool) {
        self.set_actuator(ActuatorFlags::WHITE_LED, on);
    }

    /// Assert the NIR LED on or off.
    pub fn set_nir_led(&mut self, on: bool) {
        self.set_actuator(ActuatorFlags::NIR_LED, on);
    }

    /// Set the white LED duty cycle (clamped to [`MAX_DUTY`]) and raise its
    /// CONTROL2 gate.
    pub fn set_white_led_duty(&mut self, duty: u8) {
        self.buf[OFF_CONTROL2] |= Control2Flags::WHITE_LED_DUTY.bits();
        self.buf[OFF_WHITE_DUTY] = duty.min(MAX_DUTY);
    }

    /// Set the NIR LED duty cycle (clamped to [`MAX_DUTY`]) and raise its
    /// CONTROL2 gate.
    pub fn set_nir_led_duty(&mut self, duty: u8) {
        self.buf[OFF_CONTROL2] |= Control2Flags::NIR_LED_DUTY.bits();
        self.buf[OFF_NIR_DUTY] = duty.min(MAX_DUTY);
    }

    /// Request empty-chamber calibration of the cuvette sensors.
    pub fn calibrate_empty(&mut self) {
        let mut mode = self.cuvette_control();
        mode.remove(CuvetteControlFlags::FULL);
        mode.insert(CuvetteControlFlags::EMPTY);
        self.set_cuvette_control(mode);
    }

    /// Request full-chamber calibration.
    ///
    /// The firmware accepts the bit and does nothing with it; this is kept
    /// for wire compatibility, not inferred behavior.
    pub fn calibrate_full(&mut self) {
        let mut mode = self.cuvette_control();
        mode.remove(CuvetteControlFlags::EMPTY);
        mode.insert(CuvetteControlFlags::FULL);
        self.set_cuvette_control(mode);
    }

    /// Leave calibration mode.
    pub fn calibrate_none(&mut self) {
        self.set_cuvette_control(CuvetteControlFlags::empty());
    }
}

impl Default for ControlFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl WireFrame for ControlFrame {
    const LEN: usize = 16;
    const HEADER: [u8; 2] = [0xC3, 0xA5];

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(Error::InvalidFrame(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        let frame = Self { buf };
        if !frame.is_valid() {
            return Err(Error::InvalidFrame(
                "control frame header or checksum mismatch".to_string(),
            ));
        }
        Ok(frame)
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
