//! Bidirectional MCU link.
//!
//! [`McuLink`] owns a serial transport split into two halves: a reader
//! thread deframes incoming bytes and posts [`LinkEvent`]s, and a writer
//! thread drains a send queue so outgoing frames hit the wire whole and in
//! submission order. Public send methods only enqueue; they never touch the
//! port directly.
//!
//! A firmware flash session suspends this machinery: the reader detaches,
//! the session worker takes both transport halves for its exclusive use,
//! and ordinary sends are rejected with [`Error::FlashActive`] until the
//! session reaches a terminal state.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};

use crate::cuvette::CuvetteThresholds;
use crate::error::{Error, Result};
use crate::event::{EventSink, LinkEvent};
use crate::flasher::{self, FlashHandle, FlashOptions, FlashReport};
use crate::port::Port;
#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};
use crate::protocol::{ControlFrame, Deframer, StatusFrame, WireFrame};

/// Read chunk size, a few frames' worth per wakeup.
const RX_CHUNK: usize = 4 * StatusFrame::LEN;

/// Reader idle interval while a flash session owns the transport.
const DETACH_IDLE: Duration = Duration::from_millis(5);

/// Backoff after a transport read error.
const READ_ERROR_DELAY: Duration = Duration::from_millis(250);

/// Which side of the wire this link plays.
///
/// A host sends control frames and receives status frames; a device (a
/// simulated instrument) receives control frames and sends status frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// The application side, talking to an instrument.
    Host,
    /// The instrument side, for simulators and loopback tests.
    Device,
}

impl std::fmt::Display for LinkRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// Receive-side state, guarded by one mutex so the reader thread and a
/// flash session exchange the input half atomically.
struct RxState {
    port: Box<dyn Port>,
    path: RxPath,
}

/// Frame parser for the direction this link listens to.
enum RxPath {
    Status {
        framer: Deframer<StatusFrame>,
        prev: Option<StatusFrame>,
    },
    Control {
        framer: Deframer<ControlFrame>,
    },
}

#[derive(Default)]
struct LatestStatus {
    /// Bumped once per delivered status frame.
    seq: u64,
    frame: Option<StatusFrame>,
}

struct Shared {
    input: Mutex<RxState>,
    output: Mutex<Box<dyn Port>>,
    sink: Arc<dyn EventSink>,
    latest: Mutex<LatestStatus>,
    status_arrived: Condvar,
    rx_detached: AtomicBool,
    shutdown: AtomicBool,
    flash_active: AtomicBool,
    /// Cancellation flag of the session currently holding the transport.
    active_cancel: Mutex<Option<Arc<AtomicBool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live connection to an analyzer MCU (or to the host, in device role).
///
/// Dropping the link shuts both worker threads down and closes the
/// transport. A flash session still running keeps its own handle on the
/// transport and is cancelled rather than abandoned.
pub struct McuLink {
    shared: Arc<Shared>,
    send_queue: Option<Sender<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    role: LinkRole,
    name: String,
}

impl McuLink {
    /// Open a native serial port and attach a host-role link to it.
    #[cfg(feature = "native")]
    pub fn open(config: &SerialConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let port = NativePort::open(config)?;
        Self::attach(Box::new(port), LinkRole::Host, sink)
    }

    /// Attach a link to an already open transport.
    ///
    /// The port is cloned into independent reader and writer halves and any
    /// stale receive data is discarded before the reader starts.
    pub fn attach(port: Box<dyn Port>, role: LinkRole, sink: Arc<dyn EventSink>) -> Result<Self> {
        let mut reader_half = port.try_clone_port()?;
        reader_half.clear_buffers()?;
        let name = port.name().to_string();

        let path = match role {
            LinkRole::Host => RxPath::Status {
                framer: Deframer::new(),
                prev: None,
            },
            LinkRole::Device => RxPath::Control {
                framer: Deframer::new(),
            },
        };

        let shared = Arc::new(Shared {
            input: Mutex::new(RxState {
                port: reader_half,
                path,
            }),
            output: Mutex::new(port),
            sink,
            latest: Mutex::new(LatestStatus::default()),
            status_arrived: Condvar::new(),
            rx_detached: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            flash_active: AtomicBool::new(false),
            active_cancel: Mutex::new(None),
        });

        let (send_queue, queue) = crossbeam_channel::unbounded::<Vec<u8>>();

        let reader_shared = Arc::clone(&shared);
        let reader = thread::spawn(move || reader_loop(&reader_shared));

        let writer_shared = Arc::clone(&shared);
        let writer = thread::spawn(move || writer_loop(&writer_shared, queue));

        debug!("link attached to {name} as {role}");
        Ok(Self {
            shared,
            send_queue: Some(send_queue),
            reader: Some(reader),
            writer: Some(writer),
            role,
            name,
        })
    }

    /// The role this link was attached with.
    pub fn role(&self) -> LinkRole {
        self.role
    }

    /// Name of the underlying transport.
    pub fn port_name(&self) -> &str {
        &self.name
    }

    /// Whether a flash session currently owns the transport.
    pub fn is_flashing(&self) -> bool {
        self.shared.flash_active.load(Ordering::SeqCst)
    }

    /// The most recent status frame received, if any.
    pub fn latest_status(&self) -> Option<StatusFrame> {
        lock(&self.shared.latest).frame.clone()
    }

    /// Queue a control frame for transmission.
    ///
    /// The frame is copied and its checksum recomputed, so the caller's
    /// copy can be edited freely afterwards.
    pub fn send_control(&self, frame: &ControlFrame) -> Result<()> {
        if self.role != LinkRole::Host {
            return Err(Error::Protocol(
                "control frames are sent by the host role".to_string(),
            ));
        }
        self.enqueue(frame)
    }

    /// Queue a status frame for transmission (device role).
    pub fn send_status(&self, frame: &StatusFrame) -> Result<()> {
        if self.role != LinkRole::Device {
            return Err(Error::Protocol(
                "status frames are sent by the device role".to_string(),
            ));
        }
        self.enqueue(frame)
    }

    fn enqueue<F: WireFrame + Clone>(&self, frame: &F) -> Result<()> {
        if self.is_flashing() {
            return Err(Error::FlashActive);
        }
        let mut copy = frame.clone();
        copy.set_checksum();
        let sender = self.send_queue.as_ref().ok_or(Error::PortClosed)?;
        sender
            .send(copy.bytes().to_vec())
            .map_err(|_| Error::PortClosed)
    }

    /// Send a control frame and block until the next status frame arrives.
    ///
    /// The MCU reports its full state in every status frame, so any control
    /// frame doubles as a status request; pass [`ControlFrame::new`] for a
    /// pure poll.
    pub fn request_status(&self, frame: &ControlFrame, timeout: Duration) -> Result<StatusFrame> {
        if self.role != LinkRole::Host {
            return Err(Error::Protocol(
                "status requests are made by the host role".to_string(),
            ));
        }
        let start_seq = lock(&self.shared.latest).seq;
        self.send_control(frame)?;

        let deadline = Instant::now() + timeout;
        let mut latest = lock(&self.shared.latest);
        while latest.seq == start_seq {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout("no status frame arrived".to_string()));
            }
            let (guard, _) = self
                .shared
                .status_arrived
                .wait_timeout(latest, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            latest = guard;
        }
        latest
            .frame
            .clone()
            .ok_or_else(|| Error::Protocol("status slot empty after arrival".to_string()))
    }

    /// Derive cuvette thresholds from an empty chamber.
    ///
    /// Asserts the empty-chamber calibration flag, samples one status frame
    /// under it, then clears the flag again. The chamber must actually be
    /// empty; the thresholds come out wrong otherwise.
    pub fn calibrate_empty_chamber(&self, timeout: Duration) -> Result<CuvetteThresholds> {
        let mut calibrate = ControlFrame::new();
        calibrate.calibrate_empty();
        let status = self.request_status(&calibrate, timeout)?;
        let thresholds = CuvetteThresholds::from_empty_chamber(&status);

        let mut done = ControlFrame::new();
        done.calibrate_none();
        self.send_control(&done)?;

        info!(
            "empty-chamber calibration: thresholds {:.0}/{:.0}/{:.0}",
            thresholds.position_1, thresholds.position_2, thresholds.position_3
        );
        Ok(thresholds)
    }

    /// Start a firmware flash session on a worker thread.
    ///
    /// At most one session runs per link; a second call while one is active
    /// returns [`Error::FlashActive`]. The session takes the transport away
    /// from the reader and writer until it reaches a terminal state, which
    /// the returned handle waits for.
    pub fn flash_firmware(&self, image: Vec<u8>, options: FlashOptions) -> Result<FlashHandle> {
        if self.role != LinkRole::Host {
            return Err(Error::Protocol(
                "flashing requires the host role".to_string(),
            ));
        }
        if image.is_empty() {
            return Err(Error::InvalidImage("image is empty".to_string()));
        }
        if self
            .shared
            .flash_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::FlashActive);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        *lock(&self.shared.active_cancel) = Some(Arc::clone(&cancel));
        info!("flash session started: {} image bytes", image.len());

        let shared = Arc::clone(&self.shared);
        let worker_cancel = Arc::clone(&cancel);
        let join = thread::spawn(move || flash_worker(&shared, &worker_cancel, &image, &options));
        Ok(FlashHandle { join, cancel })
    }
}

impl Drop for McuLink {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.shared.active_cancel).as_ref() {
            cancel.store(true, Ordering::SeqCst);
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);
        drop(self.send_queue.take());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        debug!("link to {} closed", self.name);
    }
}

fn reader_loop(shared: &Arc<Shared>) {
    let mut chunk = [0u8; RX_CHUNK];
    while !shared.shutdown.load(Ordering::SeqCst) {
        if shared.rx_detached.load(Ordering::SeqCst) {
            thread::sleep(DETACH_IDLE);
            continue;
        }
        let mut rx = lock(&shared.input);
        if shared.rx_detached.load(Ordering::SeqCst) || shared.shutdown.load(Ordering::SeqCst) {
            continue;
        }
        match rx.port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => deliver(shared, &mut rx.path, &chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                warn!("link read error: {err}");
                shared.sink.post(LinkEvent::Error {
                    message: format!("link read error: {err}"),
                });
                drop(rx);
                thread::sleep(READ_ERROR_DELAY);
            }
        }
    }
    debug!("reader thread exiting");
}

/// Feed received bytes through the frame parser and post one event per
/// complete frame.
fn deliver(shared: &Shared, path: &mut RxPath, bytes: &[u8]) {
    trace!("rx {} bytes", bytes.len());
    match path {
        RxPath::Status { framer, prev } => {
            framer.extend(bytes);
            while let Some(frame) = framer.next_frame() {
                let previous = prev.replace(frame.clone());
                {
                    let mut latest = lock(&shared.latest);
                    latest.seq += 1;
                    latest.frame = Some(frame.clone());
                }
                shared.status_arrived.notify_all();
                shared.sink.post(LinkEvent::Status {
                    prev: previous,
                    cur: frame,
                });
            }
        }
        RxPath::Control { framer } => {
            framer.extend(bytes);
            while let Some(frame) = framer.next_frame() {
                shared.sink.post(LinkEvent::Command { frame });
            }
        }
    }
}

fn writer_loop(shared: &Arc<Shared>, queue: Receiver<Vec<u8>>) {
    for buf in queue {
        let mut port = lock(&shared.output);
        if let Err(err) = port.write_all_bytes(&buf) {
            warn!("link write error: {err}");
            shared.sink.post(LinkEvent::Error {
                message: format!("link write error: {err}"),
            });
        }
    }
    debug!("writer thread exiting");
}

/// Run a flash session with exclusive ownership of both transport halves.
fn flash_worker(
    shared: &Arc<Shared>,
    cancel: &AtomicBool,
    image: &[u8],
    options: &FlashOptions,
) -> Result<FlashReport> {
    struct Reattach<'a> {
        shared: &'a Shared,
    }
    impl Drop for Reattach<'_> {
        fn drop(&mut self) {
            *lock(&self.shared.active_cancel) = None;
            self.shared.rx_detached.store(false, Ordering::SeqCst);
            self.shared.flash_active.store(false, Ordering::SeqCst);
        }
    }
    let _reattach = Reattach { shared };

    shared.rx_detached.store(true, Ordering::SeqCst);
    let mut rx = lock(&shared.input);
    let mut tx = lock(&shared.output);
    debug!("flash session took over the transport");

    flasher::run_session(
        rx.port.as_mut(),
        tx.as_mut(),
        shared.sink.as_ref(),
        cancel,
        image,
        options,
    )
}
