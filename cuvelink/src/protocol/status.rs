//! MCU to host status frame.
//!
//! The firmware streams one of these roughly every 100 ms. All multi-byte
//! readings are unsigned 16-bit little-endian ADC values.
//!
//! ## Frame Format
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------
//!      0     2  Header 0x5A 0x3C
//!      2     1  Protocol version (0x01)
//!      3     1  Switch states
//!      4     1  Button states
//!      5     1  Fan tachometer states
//!      6     2  Ambient thermistor, raw
//!      8     2  Transmission-window thermistor, raw
//!     10     2  Scatter-window thermistor, raw
//!     12     2  Chamber thermistor, raw
//!     14     2  Ambient thermopile, raw
//!     16     2  Sample thermopile, raw
//!     18     2  Transmission photodiode, raw
//!     20     2  Scatter photodiode, raw
//!     22     1  White LED duty-cycle echo
//!     23     1  NIR LED duty-cycle echo
//!     24     2  Cuvette sensor 1, raw
//!     26     2  Cuvette sensor 2, raw
//!     28     2  Cuvette sensor 3, raw
//!     30     1  Firmware version
//!     31     1  Checksum
//! ```

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::protocol::frame::WireFrame;

const OFF_VERSION: usize = 2;
const OFF_SWITCHES: usize = 3;
const OFF_BUTTONS: usize = 4;
const OFF_FANS: usize = 5;
const OFF_WHITE_DUTY: usize = 22;
const OFF_NIR_DUTY: usize = 23;
const OFF_FIRMWARE_VERSION: usize = 30;

/// Protocol version byte reported by current firmware.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Raw thermopile reading that corresponds to the sensor's zero point.
pub const THERMOPILE_RAW_BIAS: u16 = 0x2DE4;

bitflags! {
    /// Switch readback bits (offset 3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SwitchFlags: u8 {
        /// White LED drive is on.
        const WHITE_LED = 0x01;
        /// NIR LED drive is on.
        const NIR_LED = 0x02;
        /// Cuvette slot 1 mechanical switch.
        const CUVETTE_1 = 0x10;
        /// Cuvette slot 2 mechanical switch.
        const CUVETTE_2 = 0x20;
        /// Cuvette slot 3 mechanical switch.
        const CUVETTE_3 = 0x40;
        /// Lid switch.
        const LID = 0x80;
    }
}

bitflags! {
    /// Front-panel button bits (offset 4), set while held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonFlags: u8 {
        /// Top-left button.
        const TOP_LEFT = 0x01;
        /// Middle-left button.
        const MIDDLE_LEFT = 0x02;
        /// Bottom-left button.
        const BOTTOM_LEFT = 0x04;
        /// Top-right button.
        const TOP_RIGHT = 0x08;
        /// Middle-right button.
        const MIDDLE_RIGHT = 0x10;
        /// Bottom-right button.
        const BOTTOM_RIGHT = 0x20;
    }
}

impl ButtonFlags {
    /// Flag for button `n` (1-based, in bit order: top-left, middle-left,
    /// bottom-left, top-right, middle-right, bottom-right). `None` outside
    /// `1..=6`.
    pub fn button(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::TOP_LEFT),
            2 => Some(Self::MIDDLE_LEFT),
            3 => Some(Self::BOTTOM_LEFT),
            4 => Some(Self::TOP_RIGHT),
            5 => Some(Self::MIDDLE_RIGHT),
            6 => Some(Self::BOTTOM_RIGHT),
            _ => None,
        }
    }
}

bitflags! {
    /// Fan tachometer bits (offset 5), set while the fan spins.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FanFlags: u8 {
        /// Fan 1.
        const FAN_1 = 0x01;
        /// Fan 2.
        const FAN_2 = 0x02;
        /// Fan 3.
        const FAN_3 = 0x04;
        /// Fan 4.
        const FAN_4 = 0x08;
        /// Fan 5.
        const FAN_5 = 0x10;
        /// Fan 6.
        const FAN_6 = 0x20;
    }
}

impl FanFlags {
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

/// The four chassis thermistors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thermistor {
    /// Ambient air, next to the main board.
    Ambient,
    /// Transmission optical window.
    Transmission,
    /// Scatter optical window.
    Scatter,
    /// Sample chamber wall.
    Chamber,
}

impl Thermistor {
    /// Every thermistor, in frame order.
    pub const ALL: [Self; 4] = [
        Self::Ambient,
        Self::Transmission,
        Self::Scatter,
        Self::Chamber,
    ];

    fn data_offset(self) -> usize {
        match self {
            Self::Ambient => 6,
            Self::Transmission => 8,
            Self::Scatter => 10,
            Self::Chamber => 12,
        }
    }

    /// Convert a raw reading to degrees Celsius.
    ///
    /// The window thermistors sit in a different divider network than the
    /// ambient and chamber ones, hence the two line fits.
    pub fn celsius(self, raw: u16) -> f32 {
        let raw = f32::from(raw);
        match self {
            Self::Ambient | Self::Chamber => raw * 0.06 - 156.58,
            Self::Transmission | Self::Scatter => raw * 0.0058 - 281.5,
        }
    }
}

impl std::fmt::Display for Thermistor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ambient => "ambient",
            Self::Transmission => "transmission",
            Self::Scatter => "scatter",
            Self::Chamber => "chamber",
        };
        write!(f, "{name}")
    }
}

/// The two non-contact thermopiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thermopile {
    /// Ambient reference element.
    Ambient,
    /// Element aimed at the sample.
    Sample,
}

impl Thermopile {
    /// Every thermopile, in frame order.
    pub const ALL: [Self; 2] = [Self::Ambient, Self::Sample];

    fn data_offset(self) -> usize {
        match self {
            Self::Ambient => 14,
            Self::Sample => 16,
        }
    }

    /// Convert a raw reading to degrees Celsius. Both elements share one
    /// calibration.
    pub fn celsius(self, raw: u16) -> f32 {
        match self {
            Self::Ambient | Self::Sample => {
                (f32::from(raw) - f32::from(THERMOPILE_RAW_BIAS)) * 0.02 - 38.2
            }
        }
    }
}

impl std::fmt::Display for Thermopile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ambient => "ambient",
            Self::Sample => "sample",
        };
        write!(f, "{name}")
    }
}

/// The two measurement photodiodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Photodiode {
    /// In the straight-through beam path.
    Transmission,
    /// At the side-scatter angle.
    Scatter,
}

impl Photodiode {
    /// Every photodiode, in frame order.
    pub const ALL: [Self; 2] = [Self::Transmission, Self::Scatter];

    fn data_offset(self) -> usize {
        match self {
            Self::Transmission => 18,
            Self::Scatter => 20,
        }
    }
}

impl std::fmt::Display for Photodiode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transmission => "transmission",
            Self::Scatter => "scatter",
        };
        write!(f, "{name}")
    }
}

/// The three optical cuvette sensors, ordered from the chamber opening
/// inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CuvettePosition {
    /// Shallowest position.
    One,
    /// Middle position.
    Two,
    /// Deepest position.
    Three,
}

impl CuvettePosition {
    /// Every position, in frame order.
    pub const ALL: [Self; 3] = [Self::One, Self::Two, Self::Three];

    /// 1-based slot number.
    pub fn index(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    fn data_offset(self) -> usize {
        match self {
            Self::One => 24,
            Self::Two => 26,
            Self::Three => 28,
        }
    }

    /// The mechanical switch bit for this slot.
    pub fn switch_flag(self) -> SwitchFlags {
        match self {
            Self::One => SwitchFlags::CUVETTE_1,
            Self::Two => SwitchFlags::CUVETTE_2,
            Self::Three => SwitchFlags::CUVETTE_3,
        }
    }
}

impl std::fmt::Display for CuvettePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// MCU to host status frame. See the module docs for the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    buf: [u8; 32],
}

impl StatusFrame {
    /// An all-zero-readings frame: header and protocol version set, checksum
    /// valid.
    pub fn new() -> Self {
        let mut frame = Self {
            buf: [0u8; Self::LEN],
        };
        frame.buf[0] = Self::HEADER[0];
        frame.buf[1] = Self::HEADER[1];
        frame.buf[OFF_VERSION] = PROTOCOL_VERSION;
        frame.set_checksum();
        frame
    }

    fn read_u16(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.buf[offset..offset + 2])
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        LittleEndian::write_u16(&mut self.buf[offset..offset + 2], value);
    }

    /// Protocol version byte.
    pub fn protocol_version(&self) -> u8 {
        self.buf[OFF_VERSION]
    }

    /// Firmware version byte.
    pub fn firmware_version(&self) -> u8 {
        self.buf[OFF_FIRMWARE_VERSION]
    }

    /// Overwrite the firmware version byte.
    pub fn set_firmware_version(&mut self, version: u8) {
        self.buf[OFF_FIRMWARE_VERSION] = version;
    }

    /// Switch readback bits.
    pub fn switches(&self) -> SwitchFlags {
        SwitchFlags::from_bits_retain(self.buf[OFF_SWITCHES])
    }

    /// Overwrite the switch byte.
    pub fn set_switches(&mut self, flags: SwitchFlags) {
        self.buf[OFF_SWITCHES] = flags.bits();
    }

    /// Front-panel button bits.
    pub fn buttons(&self) -> ButtonFlags {
        ButtonFlags::from_bits_retain(self.buf[OFF_BUTTONS])
    }

    /// Overwrite the button byte.
    pub fn set_buttons(&mut self, flags: ButtonFlags) {
        self.buf[OFF_BUTTONS] = flags.bits();
    }

    /// Fan tachometer bits.
    pub fn fans(&self) -> FanFlags {
        FanFlags::from_bits_retain(self.buf[OFF_FANS])
    }

    /// Overwrite the fan byte.
    pub fn set_fans(&mut self, flags: FanFlags) {
        self.buf[OFF_FANS] = flags.bits();
    }

    /// Whether the white LED drive reads on.
    pub fn white_led_on(&self) -> bool {
        self.switches().contains(SwitchFlags::WHITE_LED)
    }

    /// Whether the NIR LED drive reads on.
    pub fn nir_led_on(&self) -> bool {
        self.switches().contains(SwitchFlags::NIR_LED)
    }

    /// Whether the lid switch reads asserted.
    pub fn lid_switch(&self) -> bool {
        self.switches().contains(SwitchFlags::LID)
    }

    /// Whether the mechanical switch for a cuvette slot reads asserted.
    pub fn cuvette_switch(&self, position: CuvettePosition) -> bool {
        self.switches().contains(position.switch_flag())
    }

    /// Whether button `n` (1-based) is held. `false` outside `1..=6`.
    pub fn button_pressed(&self, n: u8) -> bool {
        ButtonFlags::button(n).is_some_and(|flag| self.buttons().contains(flag))
    }

    /// Whether fan `n` (1-based) reports rotation. `false` outside `1..=6`.
    pub fn fan_running(&self, n: u8) -> bool {
        FanFlags::fan(n).is_some_and(|flag| self.fans().contains(flag))
    }

    /// Raw thermistor reading.
    pub fn thermistor_raw(&self, sensor: Thermistor) -> u16 {
        self.read_u16(sensor.data_offset())
    }

    /// Overwrite a raw thermistor reading.
    pub fn set_thermistor_raw(&mut self, sensor: Thermistor, raw: u16) {
        self.write_u16(sensor.data_offset(), raw);
    }

    /// Thermistor reading in degrees Celsius.
    pub fn thermistor_celsius(&self, sensor: Thermistor) -> f32 {
        sensor.celsius(self.thermistor_raw(sensor))
    }

    /// Raw thermopile reading.
    pub fn thermopile_raw(&self, sensor: Thermopile) -> u16 {
        self.read_u16(sensor.data_offset())
    }

    /// Overwrite a raw thermopile reading.
    pub fn set_thermopile_raw(&mut self, sensor: Thermopile, raw: u16) {
        self.write_u16(sensor.data_offset(), raw);
    }

    /// Thermopile reading in degrees Celsius.
    pub fn thermopile_celsius(&self, sensor: Thermopile) -> f32 {
        sensor.celsius(self.thermopile_raw(sensor))
    }

    /// Raw photodiode reading. Photodiodes are reported raw only; their
    /// interpretation depends on the assay.
    pub fn photodiode(&self, sensor: Photodiode) -> u16 {
        self.read_u16(sensor.data_offset())
    }

    /// Overwrite a raw photodiode reading.
    pub fn set_photodiode(&mut self, sensor: Photodiode, raw: u16) {
        self.write_u16(sensor.data_offset(), raw);
    }

    /// Raw cuvette sensor reading.
    pub fn cuvette_raw(&self, position: CuvettePosition) -> u16 {
        self.read_u16(position.data_offset())
    }

    /// Overwrite a raw cuvette sensor reading.
    pub fn set_cuvette_raw(&mut self, position: CuvettePosition, raw: u16) {
        self.write_u16(position.data_offset(), raw);
    }

    /// White LED duty-cycle echo.
    pub fn white_led_duty(&self) -> u8 {
        self.buf[OFF_WHITE_DUTY]
    }

    /// Overwrite the white LED duty-cycle echo.
    pub fn set_white_led_duty(&mut self, duty: u8) {
        self.buf[OFF_WHITE_DUTY] = duty;
    }

    /// NIR LED duty-cycle echo.
    pub fn nir_led_duty(&self) -> u8 {
        self.buf[OFF_NIR_DUTY]
    }

    /// Overwrite the NIR LED duty-cycle echo.
    pub fn set_nir_led_duty(&mut self, duty: u8) {
        self.buf[OFF_NIR_DUTY] = duty;
    }
}

impl Default for StatusFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl WireFrame for StatusFrame {
    const LEN: usize = 32;
    const HEADER: [u8; 2] = [0x5A, 0x3C];

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
                "status frame header or checksum mismatch".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::checksum8;

    fn approx(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 0.01,
            "expected ~{expected}, got {actual}"
        );
    }

    #[test]
    fn test_new_frame_is_valid() {
        let frame = StatusFrame::new();
        assert!(frame.is_valid());
        assert_eq!(frame.bytes()[0], 0x5A);
        assert_eq!(frame.bytes()[1], 0x3C);
        assert_eq!(frame.protocol_version(), PROTOCOL_VERSION);
        assert_eq!(frame.bytes().len(), 32);
    }

    #[test]
    fn test_field_offsets_byte_exact() {
        let mut frame = StatusFrame::new();
        frame.set_switches(SwitchFlags::WHITE_LED | SwitchFlags::LID);
        frame.set_buttons(ButtonFlags::TOP_RIGHT);
        frame.set_fans(FanFlags::FAN_2);
        frame.set_thermistor_raw(Thermistor::Scatter, 0xBEEF);
        frame.set_thermopile_raw(Thermopile::Sample, 0x1122);
        frame.set_photodiode(Photodiode::Scatter, 0x1234);
        frame.set_white_led_duty(70);
        frame.set_nir_led_duty(30);
        frame.set_cuvette_raw(CuvettePosition::Three, 0xCAFE);
        frame.set_firmware_version(9);

        let bytes = frame.bytes();
        assert_eq!(bytes[3], 0x81);
        assert_eq!(bytes[4], 0x08);
        assert_eq!(bytes[5], 0x02);
        assert_eq!(bytes[10], 0xEF);
        assert_eq!(bytes[11], 0xBE);
        assert_eq!(bytes[16], 0x22);
        assert_eq!(bytes[17], 0x11);
        assert_eq!(bytes[20], 0x34);
        assert_eq!(bytes[21], 0x12);
        assert_eq!(bytes[22], 70);
        assert_eq!(bytes[23], 30);
        assert_eq!(bytes[28], 0xFE);
        assert_eq!(bytes[29], 0xCA);
        assert_eq!(bytes[30], 9);
    }

    #[test]
    fn test_parse_hand_built_frame() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x5A;
        bytes[1] = 0x3C;
        bytes[2] = 0x01;
        bytes[3] = 0x12; // NIR on, cuvette 1 switch
        bytes[6] = 0xB8; // ambient thermistor 3000 LE
        bytes[7] = 0x0B;
        bytes[30] = 0x05;
        bytes[31] = checksum8(&bytes[..31]);

        let frame = StatusFrame::from_bytes(&bytes).unwrap();
        assert!(frame.nir_led_on());
        assert!(!frame.white_led_on());
        assert!(frame.cuvette_switch(CuvettePosition::One));
        assert!(!frame.cuvette_switch(CuvettePosition::Two));
        assert_eq!(frame.thermistor_raw(Thermistor::Ambient), 3000);
        assert_eq!(frame.firmware_version(), 5);
    }

    #[test]
    fn test_from_bytes_rejects_corruption() {
        let mut frame = StatusFrame::new();
        frame.set_fans(FanFlags::FAN_1);
        frame.set_checksum();

        let mut bytes = frame.bytes().to_vec();
        bytes[5] ^= 0x02;
        assert!(StatusFrame::from_bytes(&bytes).is_err());

        bytes[5] ^= 0x02;
        bytes[1] = 0x3D;
        assert!(StatusFrame::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_button_and_fan_numbering() {
        let mut frame = StatusFrame::new();
        frame.set_buttons(ButtonFlags::TOP_LEFT | ButtonFlags::BOTTOM_RIGHT);
        frame.set_fans(FanFlags::FAN_6);

        assert!(frame.button_pressed(1));
        assert!(!frame.button_pressed(2));
        assert!(frame.button_pressed(6));
        assert!(!frame.button_pressed(0));
        assert!(!frame.button_pressed(7));

        assert!(frame.fan_running(6));
        assert!(!frame.fan_running(1));
        assert!(!frame.fan_running(9));
    }

    #[test]
    fn test_thermistor_conversions() {
        approx(Thermistor::Ambient.celsius(3000), 23.42);
        approx(Thermistor::Chamber.celsius(3000), 23.42);
        approx(Thermistor::Transmission.celsius(52000), 20.1);
        approx(Thermistor::Scatter.celsius(52000), 20.1);
    }

    #[test]
    fn test_thermopile_conversions() {
        approx(Thermopile::Sample.celsius(THERMOPILE_RAW_BIAS), -38.2);
        // 1910 counts above bias is 38.2 degrees, back to zero.
        approx(Thermopile::Ambient.celsius(THERMOPILE_RAW_BIAS + 1910), 0.0);
        // A raw reading of zero lands on absolute zero.
        approx(Thermopile::Ambient.celsius(0), -273.16);
    }

    #[test]
    fn test_conversion_through_frame_accessors() {
        let mut frame = StatusFrame::new();
        frame.set_thermistor_raw(Thermistor::Ambient, 3000);
        frame.set_thermopile_raw(Thermopile::Sample, THERMOPILE_RAW_BIAS);
        frame.set_checksum();

        approx(frame.thermistor_celsius(Thermistor::Ambient), 23.42);
        approx(frame.thermopile_celsius(Thermopile::Sample), -38.2);
    }

    #[test]
    fn test_enum_inventories() {
        assert_eq!(Thermistor::ALL.len(), 4);
        assert_eq!(Thermopile::ALL.len(), 2);
        assert_eq!(Photodiode::ALL.len(), 2);
        assert_eq!(CuvettePosition::ALL.len(), 3);
        assert_eq!(CuvettePosition::Two.index(), 2);
        assert_eq!(CuvettePosition::Three.to_string(), "3");
    }
}
