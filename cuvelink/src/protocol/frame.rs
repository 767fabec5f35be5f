//! Frame shape and checksum discipline shared by both frame layouts.
//!
//! Both directions use the same abstract shape: two constant header bytes,
//! a fixed-length payload, and a trailing checksum byte equal to the 8-bit
//! truncated sum of every preceding byte. A frame is valid only when the
//! header matches its direction's constants *and* the stored checksum
//! matches the recomputed sum; nothing else in the payload is interpreted
//! until both hold.

use crate::error::Result;

/// Additive 8-bit checksum: the sum of `bytes`, truncated to one byte.
pub fn checksum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// A fixed-length, checksummed frame.
///
/// Implemented by [`ControlFrame`](crate::protocol::ControlFrame) and
/// [`StatusFrame`](crate::protocol::StatusFrame); the
/// [`Deframer`](crate::protocol::Deframer) and the link's send path are
/// generic over this trait.
pub trait WireFrame: Sized {
    /// Total frame length in bytes, including the checksum byte.
    const LEN: usize;

    /// The two constant header bytes identifying the frame direction.
    const HEADER: [u8; 2];

    /// Parse exactly [`Self::LEN`] bytes into a frame.
    ///
    /// Fails unless the length, header, and checksum all check out.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Borrow the raw frame bytes.
    fn bytes(&self) -> &[u8];

    /// Borrow the raw frame bytes mutably.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Recompute the checksum over everything before the checksum byte.
    fn compute_checksum(&self) -> u8 {
        checksum8(&self.bytes()[..Self::LEN - 1])
    }

    /// The checksum byte currently stored in the frame.
    fn stored_checksum(&self) -> u8 {
        self.bytes()[Self::LEN - 1]
    }

    /// Recompute and store the checksum byte.
    ///
    /// Must be called after the last field mutation before a transmit; the
    /// send path does this again on its private copy regardless.
    fn set_checksum(&mut self) {
        let checksum = self.compute_checksum();
        self.bytes_mut()[Self::LEN - 1] = checksum;
    }

    /// Whether header and checksum both match.
    fn is_valid(&self) -> bool {
        let bytes = self.bytes();
        bytes[0] == Self::HEADER[0]
            && bytes[1] == Self::HEADER[1]
            && self.stored_checksum() == self.compute_checksum()
    }
}
