//! # cuvelink
//!
//! Serial link to a cuvette-analyzer MCU: frame parsing, instrument
//! control, live status monitoring, and in-field firmware flashing.
//!
//! The instrument speaks a fixed-length binary protocol over UART. The
//! host sends 16-byte control frames (LEDs, fans, PWM duty, calibration
//! flags); the MCU answers every one with a 32-byte status frame carrying
//! switches, buttons, thermistors, thermopiles, photodiodes, and cuvette
//! sensors. This crate models both directions:
//!
//! - [`ControlFrame`] and [`StatusFrame`] are the wire frames, with typed
//!   accessors and additive checksums handled for you.
//! - [`McuLink`] runs the transport: a reader thread deframes and posts
//!   [`LinkEvent`]s to your [`EventSink`], a writer thread keeps outgoing
//!   frames ordered and whole.
//! - [`McuLink::flash_firmware`] reboots the MCU into its ROM bootloader
//!   and streams a new firmware image, with progress events and
//!   cancellation through the returned [`FlashHandle`].
//! - [`CuvetteThresholds`] classifies how far a cuvette is inserted from
//!   the three reflective sensors.
//!
//! ## Features
//!
//! - `native` (default): real serial ports via the `serialport` crate
//! - `serde`: serialization for configuration and reporting types
//!
//! An in-memory transport ([`MemoryPort`]) is always available, so an
//! instrument can be simulated with a device-role link in tests and demos.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cuvelink::{ChannelSink, ControlFrame, LinkEvent, McuLink, SerialConfig, Thermistor};
//!
//! fn main() -> cuvelink::Result<()> {
//!     let (sink, events) = ChannelSink::new();
//!     let config = SerialConfig::new("/dev/ttyUSB0", 115_200);
//!     let link = McuLink::open(&config, Arc::new(sink))?;
//!
//!     // Switch the white LED on and read the instrument back.
//!     let mut frame = ControlFrame::new();
//!     frame.set_white_led(true);
//!     let status = link.request_status(&frame, Duration::from_secs(2))?;
//!     println!(
//!         "chamber {:.1} C, white LED duty {}%",
//!         status.thermistor_celsius(Thermistor::Chamber),
//!         status.white_led_duty(),
//!     );
//!
//!     // Status keeps streaming through the sink while the link is alive.
//!     while let Ok(event) = events.recv() {
//!         if let LinkEvent::Status { cur, .. } = event {
//!             println!("lid closed: {}", cur.lid_switch());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cuvette;
pub mod error;
pub mod event;
pub mod flasher;
pub mod link;
pub mod port;
pub mod protocol;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    cuvette::{CuvetteThresholds, Occupancy},
    error::{Error, Result},
    event::{ChannelSink, EventSink, LinkEvent, NullSink},
    flasher::{FlashConfig, FlashHandle, FlashOptions, FlashReport, FlashState},
    link::{LinkRole, McuLink},
    port::{MemoryPort, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        ActuatorFlags, ButtonFlags, Control2Flags, ControlFrame, CuvetteControlFlags,
        CuvettePosition, Deframer, FanFlags, Photodiode, StatusFrame, SwitchFlags, Thermistor,
        Thermopile, WireFrame, checksum8,
    },
};
