//! In-memory duplex port pair.
//!
//! [`MemoryPort::pair`] returns two connected ports: bytes written to one
//! become readable on the other. Reads block until data arrives or the
//! handle's timeout elapses, mirroring a real serial port with a quiet line.
//!
//! The pair backs the crate's own tests and lets embedders run a simulated
//! instrument (a device-role link on one end, the application on the other)
//! without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::port::Port;

/// One direction of the pair: a byte queue plus an arrival signal.
#[derive(Default)]
struct Channel {
    queue: Mutex<VecDeque<u8>>,
    arrived: Condvar,
}

/// In-memory port. See [`MemoryPort::pair`].
pub struct MemoryPort {
    name: String,
    timeout: Duration,
    baud_rate: u32,
    closed: bool,
    rx: Arc<Channel>,
    tx: Arc<Channel>,
}

impl MemoryPort {
    /// Create a crossed duplex pair.
    ///
    /// Both handles start with a 50ms read timeout so test loops stay
    /// responsive; use [`Port::set_timeout`] to change it.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Channel::default());
        let b = Arc::new(Channel::default());
        (
            Self::new("mem0", Arc::clone(&a), Arc::clone(&b)),
            Self::new("mem1", b, a),
        )
    }

    fn new(name: &str, rx: Arc<Channel>, tx: Arc<Channel>) -> Self {
        Self {
            name: name.to_string(),
            timeout: Duration::from_millis(50),
            baud_rate: 115200,
            closed: false,
            rx,
            tx,
        }
    }

    fn closed_err() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for MemoryPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        if self.closed {
            return Err(crate::error::Error::PortClosed);
        }
        let queue = self
            .rx
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(u32::try_from(queue.len()).unwrap_or(u32::MAX))
    }

    fn clear_buffers(&mut self) -> Result<()> {
        // Writes are delivered instantly, so only the receive side has
        // anything to discard.
        self.rx
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_port(&self) -> Result<Box<dyn Port>> {
        if self.closed {
            return Err(crate::error::Error::PortClosed);
        }
        Ok(Box::new(Self {
            name: self.name.clone(),
            timeout: self.timeout,
            baud_rate: self.baud_rate,
            closed: false,
            rx: Arc::clone(&self.rx),
            tx: Arc::clone(&self.tx),
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Read for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Self::closed_err());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.timeout;
        let mut queue = self
            .rx
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
            }
            let (guard, _) = self
                .rx
                .arrived
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf[..n].iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Self::closed_err());
        }
        let mut queue = self
            .tx
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.extend(buf.iter().copied());
        self.tx.arrived.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
