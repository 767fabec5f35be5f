//! Firmware flash sessions.
//!
//! A session reboots the MCU out of its application firmware into the ROM
//! bootloader, mass-erases the flash, streams the image in 256-byte pages,
//! and jumps back into the new firmware. The wire protocol is the AN3155
//! byte protocol built in [`crate::protocol::bootloader`]; this module owns
//! the state machine that drives it.
//!
//! Sessions are started through [`crate::link::McuLink::flash_firmware`],
//! which hands the link's transport to the engine for the whole session and
//! returns a [`FlashHandle`] for waiting and cancellation. Every session
//! ends in a terminal state and posts a final [`LinkEvent::Flash`] carrying
//! it, whatever went wrong in between.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::event::{EventSink, LinkEvent};
use crate::port::Port;
use crate::protocol::bootloader::{
    self, ACK, CMD_EXTENDED_ERASE, CMD_GO, CMD_WRITE_MEMORY, DISCOVERY, MASS_ERASE, NACK,
};
use crate::protocol::{ControlFrame, WireFrame};

#[allow(clippy::cast_possible_truncation)] // page size fits in u32
const PAGE_STEP: u32 = bootloader::PAGE_SIZE as u32;

/// Cancellation is polled at this interval during long delays.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Where a flash session currently stands.
///
/// `GoCommand` and `GoAddress` are carried for completeness but never
/// entered: the go command and jump address are both exchanged while the
/// session reports `AllDataWritten`, and the jump-address ACK completes the
/// session directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashState {
    /// Rebooting the application firmware into the bootloader.
    EnterBootloader,
    /// Bootloader answered the discovery byte.
    InBootloader,
    /// Extended erase command accepted.
    EraseCmd,
    /// Mass erase finished.
    EraseAll,
    /// Write command accepted.
    WriteCommand,
    /// Page address accepted.
    WriteAddress,
    /// Page data accepted.
    DataWritten,
    /// Final page accepted.
    AllDataWritten,
    /// Unused, see the type docs.
    GoCommand,
    /// Unused, see the type docs.
    GoAddress,
    /// Terminal: new firmware written and started.
    CompleteSuccess,
    /// Terminal: session aborted, MCU state indeterminate.
    CompleteFailed,
}

impl FlashState {
    /// Whether this state ends a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CompleteSuccess | Self::CompleteFailed)
    }
}

impl std::fmt::Display for FlashState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EnterBootloader => "enter-bootloader",
            Self::InBootloader => "in-bootloader",
            Self::EraseCmd => "erase-cmd",
            Self::EraseAll => "erase-all",
            Self::WriteCommand => "write-command",
            Self::WriteAddress => "write-address",
            Self::DataWritten => "data-written",
            Self::AllDataWritten => "all-data-written",
            Self::GoCommand => "go-command",
            Self::GoAddress => "go-address",
            Self::CompleteSuccess => "complete-success",
            Self::CompleteFailed => "complete-failed",
        };
        write!(f, "{name}")
    }
}

/// Session timing and addressing. Defaults are the production values; tests
/// compress them.
#[derive(Debug, Clone)]
pub struct FlashConfig {
    /// Delay before the reboot command and again after it, giving the
    /// firmware time to settle into the bootloader.
    pub settle_delay: Duration,
    /// Response deadline for ordinary commands.
    pub command_timeout: Duration,
    /// Response deadline for the mass erase.
    pub erase_timeout: Duration,
    /// Pause between protocol steps.
    pub step_delay: Duration,
    /// Read quantum while waiting for a response byte.
    pub poll_interval: Duration,
    /// Flash address of the first page, also the jump target.
    pub start_address: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            erase_timeout: Duration::from_secs(60),
            step_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            start_address: 0x0800_0000,
        }
    }
}

/// How to run a flash session.
#[derive(Debug, Clone, Default)]
pub struct FlashOptions {
    /// Assume the MCU is already sitting in the bootloader and skip the
    /// reboot sequence. This is the recovery entry after a failed session.
    pub retry: bool,
    /// Timing and addressing.
    pub config: FlashConfig,
}

/// Outcome of a successful session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashReport {
    /// Image bytes acknowledged by the bootloader.
    pub bytes_written: usize,
    /// Total image bytes after page padding.
    pub total_bytes: usize,
}

/// Handle onto a running flash session.
///
/// Dropping the handle leaves the session running; the link keeps it alive
/// to its terminal state.
#[derive(Debug)]
pub struct FlashHandle {
    pub(crate) join: thread::JoinHandle<Result<FlashReport>>,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl FlashHandle {
    /// Ask the session to stop. It aborts at the next step or response-wait
    /// iteration and terminates as `CompleteFailed`.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether the session has reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the session ends and return its result.
    pub fn wait(self) -> Result<FlashReport> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(Error::Protocol("flash worker panicked".to_string())),
        }
    }
}

/// Drive one complete session over the given transport halves.
///
/// Owns the ports for the duration; the caller has already detached any
/// concurrent reader. Exactly one terminal `Flash` event is posted, last.
pub(crate) fn run_session(
    input: &mut dyn Port,
    output: &mut dyn Port,
    sink: &dyn EventSink,
    cancel: &AtomicBool,
    image: &[u8],
    options: &FlashOptions,
) -> Result<FlashReport> {
    if image.is_empty() {
        return Err(Error::InvalidImage("image is empty".to_string()));
    }
    let image = bootloader::pad_image(image.to_vec());
    let total_bytes = image.len();
    info!(
        "flash session: {total_bytes} bytes, {} pages, retry={}",
        total_bytes / bootloader::PAGE_SIZE,
        options.retry
    );

    let saved_timeout = input.timeout();
    if let Err(err) = input.set_timeout(options.config.poll_interval) {
        sink.post(LinkEvent::Flash {
            state: FlashState::CompleteFailed,
            bytes_written: 0,
            total_bytes,
        });
        return Err(err);
    }

    let mut session = Session {
        input: &mut *input,
        output: &mut *output,
        sink,
        cancel,
        image: &image,
        config: &options.config,
        bytes_written: 0,
    };
    let outcome = session.drive(options.retry);

    let terminal = match &outcome {
        Ok(()) => FlashState::CompleteSuccess,
        Err(err) => {
            warn!("flash session failed: {err}");
            FlashState::CompleteFailed
        }
    };
    session.emit(terminal);
    let bytes_written = session.bytes_written;

    let _ = input.set_timeout(saved_timeout);
    outcome.map(|()| FlashReport {
        bytes_written,
        total_bytes,
    })
}

struct Session<'a> {
    input: &'a mut dyn Port,
    output: &'a mut dyn Port,
    sink: &'a dyn EventSink,
    cancel: &'a AtomicBool,
    image: &'a [u8],
    config: &'a FlashConfig,
    bytes_written: usize,
}

impl Session<'_> {
    fn drive(&mut self, retry: bool) -> Result<()> {
        let mut state = if retry {
            FlashState::InBootloader
        } else {
            FlashState::EnterBootloader
        };
        let mut address = self.config.start_address;

        loop {
            self.sleep(self.config.step_delay)?;
            debug!("flash step: {state}");
            state = self.step(state, &mut address)?;
            if state == FlashState::CompleteSuccess {
                return Ok(());
            }
        }
    }

    /// Perform the protocol exchange for one state and return the next.
    fn step(&mut self, state: FlashState, address: &mut u32) -> Result<FlashState> {
        let command_timeout = self.config.command_timeout;
        match state {
            FlashState::EnterBootloader => {
                // Let the firmware's status stream wind down first.
                self.sleep(self.config.settle_delay)?;
                self.write(ControlFrame::enter_bootloader().bytes())?;
                // Wait out the reboot into the bootloader.
                self.sleep(self.config.settle_delay)?;
                self.flush_input()?;
                self.write(&[DISCOVERY])?;
                self.await_ack(state, FlashState::InBootloader, command_timeout)
            }
            FlashState::InBootloader => {
                self.flush_input()?;
                self.emit(state);
                self.write(&CMD_EXTENDED_ERASE)?;
                self.await_ack(state, FlashState::EraseCmd, command_timeout)
            }
            FlashState::EraseCmd => {
                self.flush_input()?;
                self.write(&MASS_ERASE)?;
                self.await_ack(state, FlashState::EraseAll, self.config.erase_timeout)
            }
            FlashState::EraseAll => {
                self.flush_input()?;
                self.emit(state);
                self.write(&CMD_WRITE_MEMORY)?;
                self.await_ack(state, FlashState::WriteCommand, command_timeout)
            }
            FlashState::WriteCommand => {
                self.flush_input()?;
                self.write(&bootloader::address_packet(*address))?;
                self.await_ack(state, FlashState::WriteAddress, command_timeout)
            }
            FlashState::WriteAddress => {
                self.flush_input()?;
                let end = self.bytes_written + bootloader::PAGE_SIZE;
                let packet = bootloader::page_packet(&self.image[self.bytes_written..end]);
                self.write(&packet)?;
                self.await_ack(state, FlashState::DataWritten, command_timeout)
            }
            FlashState::DataWritten => {
                self.bytes_written += bootloader::PAGE_SIZE;
                *address += PAGE_STEP;
                if self.bytes_written >= self.image.len() {
                    self.emit(FlashState::AllDataWritten);
                    self.write(&CMD_GO)?;
                    self.await_ack(
                        FlashState::AllDataWritten,
                        FlashState::AllDataWritten,
                        command_timeout,
                    )
                } else {
                    self.emit(state);
                    self.write(&CMD_WRITE_MEMORY)?;
                    self.await_ack(state, FlashState::WriteCommand, command_timeout)
                }
            }
            FlashState::AllDataWritten => {
                self.flush_input()?;
                // The jump target is the start of the image just written.
                self.write(&bootloader::address_packet(self.config.start_address))?;
                self.await_ack(state, FlashState::CompleteSuccess, command_timeout)
            }
            FlashState::GoCommand
            | FlashState::GoAddress
            | FlashState::CompleteSuccess
            | FlashState::CompleteFailed => Err(Error::Protocol(format!(
                "flash session cannot step from state {state}"
            ))),
        }
    }

    /// Block until a response byte arrives or `timeout` passes. ACK advances
    /// to `next`; anything else ends the session.
    fn await_ack(
        &mut self,
        current: FlashState,
        next: FlashState,
        timeout: Duration,
    ) -> Result<FlashState> {
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            match self.input.read(&mut byte) {
                Ok(0) => {}
                Ok(_) => {
                    return match byte[0] {
                        ACK => {
                            trace!("ACK in state {current}");
                            Ok(next)
                        }
                        NACK => Err(Error::Nack { state: current }),
                        other => Err(Error::Protocol(format!(
                            "unexpected bootloader response 0x{other:02X} in state {current}"
                        ))),
                    };
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => return Err(err.into()),
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "no bootloader response in state {current}"
                )));
            }
        }
    }

    /// Sleep, waking early on cancellation.
    fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("flash tx {} bytes", bytes.len());
        self.output.write_all_bytes(bytes)
    }

    /// Discard stale input, the way every command exchange starts.
    fn flush_input(&mut self) -> Result<()> {
        let mut scratch = [0u8; 64];
        while self.input.bytes_to_read()? > 0 {
            let _ = self.input.read(&mut scratch)?;
        }
        Ok(())
    }

    fn emit(&self, state: FlashState) {
        self.sink.post(LinkEvent::Flash {
            state,
            bytes_written: self.bytes_written,
            total_bytes: self.image.len(),
        });
    }
}
