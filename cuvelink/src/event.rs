//! Link event delivery.
//!
//! The reader thread and the flash engine publish what happens on the link
//! through an [`EventSink`]. Sinks are called synchronously from the thread
//! that produced the event, one event at a time, so implementations see
//! events in the order they occurred and should return quickly.

use crossbeam_channel::{Receiver, Sender};

use crate::flasher::FlashState;
use crate::protocol::{ControlFrame, StatusFrame};

/// Something observable happened on the link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A valid status frame arrived (host role).
    Status {
        /// The previous status frame, absent for the first one after attach.
        prev: Option<StatusFrame>,
        /// The frame that just arrived.
        cur: StatusFrame,
    },
    /// A valid control frame arrived (device role).
    Command {
        /// The frame that just arrived.
        frame: ControlFrame,
    },
    /// The reader thread hit an I/O error it could not retry.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// A firmware flash session changed state or wrote data.
    Flash {
        /// State the session just entered.
        state: FlashState,
        /// Image bytes acknowledged by the bootloader so far.
        bytes_written: usize,
        /// Total image bytes after page padding.
        total_bytes: usize,
    },
}

/// Receives [`LinkEvent`]s as they happen.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Called from link worker threads.
    fn post(&self, event: LinkEvent);
}

impl<F> EventSink for F
where
    F: Fn(LinkEvent) + Send + Sync,
{
    fn post(&self, event: LinkEvent) {
        self(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn post(&self, _event: LinkEvent) {}
}

/// Sink that forwards events into an unbounded channel, for consumers that
/// want to pull events on their own thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<LinkEvent>,
}

impl ChannelSink {
    /// A connected sink and receiver pair.
    pub fn new() -> (Self, Receiver<LinkEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn post(&self, event: LinkEvent) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_channel_sink_preserves_order() {
        let (sink, receiver) = ChannelSink::new();

        sink.post(LinkEvent::Status {
            prev: None,
            cur: StatusFrame::new(),
        });
        sink.post(LinkEvent::Command {
            frame: ControlFrame::new(),
        });
        sink.post(LinkEvent::Error {
            message: "boom".to_string(),
        });

        assert!(matches!(
            receiver.try_recv().unwrap(),
            LinkEvent::Status { prev: None, .. }
        ));
        assert!(matches!(receiver.try_recv().unwrap(), LinkEvent::Command { .. }));
        assert!(matches!(receiver.try_recv().unwrap(), LinkEvent::Error { .. }));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.post(LinkEvent::Error {
            message: "nobody home".to_string(),
        });
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: LinkEvent| {
            seen.lock().unwrap().push(event);
        };

        sink.post(LinkEvent::Command {
            frame: ControlFrame::enter_bootloader(),
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], LinkEvent::Command { .. }));
    }
}
