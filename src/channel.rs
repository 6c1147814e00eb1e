//! Per-connection message channels.
//!
//! One connection, two directions: the transport feeds [`Incoming`] messages
//! to the application through a [`Receiver`], and the application emits
//! [`Event`] messages to the transport through a [`Sender`].
//!
//! The [`Sender`] remembers whether an [`Event::Start`] has passed through
//! it. Both supervision middlewares consult that flag: once a response has
//! started, nobody may send a second one, and errors caught after that point
//! re-raise instead.
//!
//! The outbound channel is bounded — a slow transport exerts backpressure
//! and [`Sender::send`] suspends cooperatively until there is room.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http::StatusCode;
use tokio::sync::mpsc;

use crate::error::Error;

/// Default buffer size for the outbound event channel.
pub const EVENT_BUFFER: usize = 16;

/// A message from the application to the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The response head. Sent exactly once per HTTP exchange.
    Start {
        status: StatusCode,
        headers: Vec<(String, String)>,
    },
    /// A chunk of the response body. `more: false` terminates the response.
    Body { data: Bytes, more: bool },
    /// Acknowledges [`Incoming::Startup`] on the lifecycle scope.
    StartupComplete,
    /// Acknowledges [`Incoming::Shutdown`] on the lifecycle scope.
    ShutdownComplete,
}

/// A message from the transport to the application.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// A chunk of the request body. `more: false` terminates it.
    Body { data: Bytes, more: bool },
    /// The client went away.
    Disconnect,
    /// Lifecycle scope: the host is starting up.
    Startup,
    /// Lifecycle scope: the host is shutting down.
    Shutdown,
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// The application's half of the outbound channel.
///
/// Cloning is cheap; clones share the response-started flag, so every layer
/// of the middleware stack observes the same answer to "has the response
/// begun?".
#[derive(Clone, Debug)]
pub struct Sender {
    events: mpsc::Sender<Event>,
    started: Arc<AtomicBool>,
}

impl Sender {
    /// Sends one event to the transport, suspending if its buffer is full.
    ///
    /// Fails with [`Error::ChannelClosed`] once the transport has dropped
    /// its half — for instance after cancellation. Nothing is sent after
    /// that point.
    pub async fn send(&self, event: Event) -> Result<(), Error> {
        let is_start = matches!(event, Event::Start { .. });
        self.events
            .send(event)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        if is_start {
            self.started.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Whether an [`Event::Start`] has been delivered on this connection.
    pub fn response_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// The application's half of the inbound channel.
#[derive(Debug)]
pub struct Receiver {
    messages: mpsc::UnboundedReceiver<Incoming>,
}

impl Receiver {
    /// The next inbound message, or `None` once the transport is done.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.messages.recv().await
    }
}

// ── Constructors ──────────────────────────────────────────────────────────────

/// Creates the outbound channel: the application's [`Sender`] and the
/// transport's event stream.
pub fn send_channel(buffer: usize) -> (Sender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    let sender = Sender {
        events: tx,
        started: Arc::new(AtomicBool::new(false)),
    };
    (sender, rx)
}

/// Creates the inbound channel: the transport's message handle and the
/// application's [`Receiver`].
pub fn receive_channel() -> (mpsc::UnboundedSender<Incoming>, Receiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Receiver { messages: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_event_marks_the_response_started() {
        let (sender, mut rx) = send_channel(4);
        assert!(!sender.response_started());

        sender
            .send(Event::Start { status: StatusCode::OK, headers: Vec::new() })
            .await
            .unwrap();

        assert!(sender.response_started());
        // The clone shares the flag.
        assert!(sender.clone().response_started());
        assert!(matches!(rx.recv().await, Some(Event::Start { .. })));
    }

    #[tokio::test]
    async fn body_events_do_not_mark_the_response_started() {
        let (sender, _rx) = send_channel(4);
        sender
            .send(Event::Body { data: Bytes::from_static(b"hi"), more: false })
            .await
            .unwrap();
        assert!(!sender.response_started());
    }

    #[tokio::test]
    async fn send_fails_once_the_transport_is_gone() {
        let (sender, rx) = send_channel(4);
        drop(rx);
        let err = sender
            .send(Event::Start { status: StatusCode::OK, headers: Vec::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        // A failed send does not count as a started response.
        assert!(!sender.response_started());
    }
}
