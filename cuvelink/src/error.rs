//! Error types for cuvelink.

use std::io;
use thiserror::Error;

use crate::flasher::FlashState;

/// Result type for cuvelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cuvelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Byte sequence is not a well-formed frame.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Bootloader answered NACK during flashing.
    #[error("Bootloader NACK in state {state}")]
    Nack {
        /// Session state when the response arrived.
        state: FlashState,
    },

    /// Flash session cancelled by the caller.
    #[error("Flash session cancelled")]
    Cancelled,

    /// A flash session is already running on this link.
    #[error("Flash session already active")]
    FlashActive,

    /// Firmware image rejected before flashing.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// Operation on a closed port.
    #[error("Port closed")]
    PortClosed,
}
