//! Protocol implementations.
//!
//! The MCU speaks two unrelated byte protocols over the same UART:
//!
//! - the **framed protocol** ([`control`], [`status`], [`framer`]):
//!   fixed-length checksummed frames exchanged while the application
//!   firmware runs;
//! - the **bootloader protocol** ([`bootloader`]): raw single-byte
//!   ACK/NACK commands spoken only during a firmware update.

pub mod bootloader;
pub mod control;
pub mod frame;
pub mod framer;
pub mod status;

// Re-export common types
pub use control::{ActuatorFlags, Control2Flags, ControlFrame, CuvetteControlFlags};
pub use frame::{WireFrame, checksum8};
pub use framer::Deframer;
pub use status::{
    ButtonFlags, CuvettePosition, FanFlags, Photodiode, StatusFrame, SwitchFlags, Thermistor,
    Thermopile,
};
