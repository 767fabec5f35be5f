//! Byte-stream resynchronization.
//!
//! Serial lines drop and corrupt bytes: a reader that assumes every chunk
//! starts on a frame boundary desynchronizes permanently after a single
//! glitch. [`Deframer`] buffers raw bytes and scans for the first offset
//! where both header bytes and the trailing checksum line up, discarding
//! everything in front of a recognized frame.
//!
//! After a scan that finds nothing, every offset with a full frame's worth
//! of bytes behind it has been disproven (frames are fixed-length, so the
//! bytes at such an offset will never change). Those bytes are dropped,
//! which keeps the buffer bounded on a line carrying pure noise.

use std::marker::PhantomData;

use log::trace;

use crate::protocol::frame::WireFrame;

/// Incremental frame extractor for one direction of the serial link.
///
/// Feed raw bytes with [`extend`](Self::extend), then pull frames with
/// [`next_frame`](Self::next_frame) until it returns `None`.
#[derive(Debug)]
pub struct Deframer<F: WireFrame> {
    buf: Vec<u8>,
    _frame: PhantomData<F>,
}

impl<F: WireFrame> Deframer<F> {
    /// An empty deframer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(2 * F::LEN),
            _frame: PhantomData,
        }
    }

    /// Append raw bytes received from the line.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed by a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame, if the buffer holds one.
    ///
    /// Returns `None` once no frame starts at any offset that has a full
    /// frame's worth of bytes; call again after the next
    /// [`extend`](Self::extend).
    pub fn next_frame(&mut self) -> Option<F> {
        if self.buf.len() < F::LEN {
            return None;
        }
        let last_start = self.buf.len() - F::LEN;
        for idx in 0..=last_start {
            if self.buf[idx] != F::HEADER[0] || self.buf[idx + 1] != F::HEADER[1] {
                continue;
            }
            if let Ok(frame) = F::from_bytes(&self.buf[idx..idx + F::LEN]) {
                if idx > 0 {
                    trace!("resynchronized after discarding {idx} bytes");
                }
                self.buf.drain(..idx + F::LEN);
                return Some(frame);
            }
        }
        // Offsets 0..=last_start are disproven for good; only the trailing
        // LEN-1 bytes can still open a frame.
        self.buf.drain(..=last_start);
        None
    }

    /// Extract every complete frame currently buffered.
    pub fn drain_frames(&mut self) -> Vec<F> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }
}

impl<F: WireFrame> Default for Deframer<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::control::ControlFrame;
    use crate::protocol::status::{StatusFrame, Thermistor};

    fn control_frame(duty: u8) -> ControlFrame {
        let mut frame = ControlFrame::new();
        frame.set_white_led_duty(duty);
        frame.set_checksum();
        frame
    }

    #[test]
    fn test_short_input_yields_nothing() {
        let mut deframer = Deframer::<ControlFrame>::new();
        assert!(deframer.next_frame().is_none());

        deframer.extend(&[0xC3, 0xA5, 0x00]);
        assert!(deframer.next_frame().is_none());
        // Below one frame length nothing is discarded.
        assert_eq!(deframer.pending(), 3);
    }

    #[test]
    fn test_extracts_back_to_back_frames() {
        let first = control_frame(10);
        let second = control_frame(20);

        let mut deframer = Deframer::<ControlFrame>::new();
        deframer.extend(first.bytes());
        deframer.extend(second.bytes());

        assert_eq!(deframer.drain_frames(), vec![first, second]);
        assert_eq!(deframer.pending(), 0);
    }

    #[test]
    fn test_resynchronizes_through_noise() {
        let first = control_frame(1);
        let second = control_frame(2);

        let mut deframer = Deframer::<ControlFrame>::new();
        deframer.extend(&[0x00, 0x37, 0xFF]);
        deframer.extend(first.bytes());
        deframer.extend(&[0xC3, 0x00, 0x42]);
        deframer.extend(second.bytes());

        assert_eq!(deframer.drain_frames(), vec![first, second]);
    }

    #[test]
    fn test_false_header_is_disproven_by_checksum() {
        let real = control_frame(33);

        // A header pattern whose checksum byte does not add up.
        let mut false_start = [0u8; 16];
        false_start[0] = 0xC3;
        false_start[1] = 0xA5;
        false_start[15] = 0xFF;

        let mut deframer = Deframer::<ControlFrame>::new();
        deframer.extend(&false_start);
        deframer.extend(real.bytes());

        assert_eq!(deframer.drain_frames(), vec![real]);
    }

    #[test]
    fn test_single_byte_feed_matches_bulk() {
        let frame = control_frame(55);

        let mut deframer = Deframer::<ControlFrame>::new();
        let mut collected = Vec::new();
        for byte in frame.bytes() {
            deframer.extend(&[*byte]);
            collected.extend(deframer.drain_frames());
        }
        assert_eq!(collected, vec![frame]);
    }

    #[test]
    fn test_partial_frame_survives_discard() {
        let frame = control_frame(77);

        let mut deframer = Deframer::new();
        deframer.extend(&[0u8; 40]);
        deframer.extend(&frame.bytes()[..10]);
        // A fruitless scan discards the noise but must keep the prefix.
        assert!(deframer.next_frame().is_none());
        assert!(deframer.pending() < 16);

        deframer.extend(&frame.bytes()[10..]);
        assert_eq!(deframer.next_frame(), Some(frame));
    }

    #[test]
    fn test_buffer_stays_bounded_on_pure_noise() {
        let mut deframer = Deframer::<ControlFrame>::new();
        for _ in 0..10 {
            deframer.extend(&[0u8; 64]);
            assert!(deframer.next_frame().is_none());
            assert!(deframer.pending() < 16);
        }
    }

    #[test]
    fn test_status_frames_deframe_too() {
        let mut frame = StatusFrame::new();
        frame.set_thermistor_raw(Thermistor::Chamber, 2700);
        frame.set_checksum();

        let mut deframer = Deframer::<StatusFrame>::new();
        deframer.extend(&[0x5A]); // stray first header byte
        deframer.extend(frame.bytes());

        assert_eq!(deframer.drain_frames(), vec![frame]);
    }
}
