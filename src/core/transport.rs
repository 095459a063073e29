//! WebSocket transport
//!
//! One long-lived, bidirectional text channel to the remote process. The
//! socket lives on a dedicated I/O thread; everything it learns is posted
//! into the control channel as a [`SessionEvent`] tagged with the attempt
//! generation of the connect cycle that opened it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message};

/// How long the I/O thread blocks in a socket read before checking for
/// outbound text and the shutdown flag.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("transport is closed")]
    Closed,
}

/// Events delivered to the control thread. All session-side work runs on
/// that one thread; I/O threads and timers only ever post here.
#[derive(Debug)]
pub enum SessionEvent {
    /// The transport's open handshake completed.
    Opened { generation: u64 },
    /// A chunk of remote output arrived.
    Data { generation: u64, text: String },
    /// The transport closed, failed to open, or errored.
    Closed {
        generation: u64,
        reason: Option<String>,
    },
    /// A backoff timer fired.
    ReconnectTimer { generation: u64 },
    /// A surface attach wants a geometry fit once layout has settled.
    FitRequested,
}

/// A live outbound handle to the remote process.
pub trait Transport {
    /// Queue a text fragment for delivery. No framing is added.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Ask the I/O thread to shut down. Idempotent.
    fn close(&mut self);
}

/// Opens transports. The open is asynchronous: the factory returns a
/// handle immediately and the outcome arrives as `Opened` or `Closed` on
/// the event channel.
pub trait TransportFactory {
    fn open(
        &mut self,
        url: &str,
        generation: u64,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Derive the WebSocket URL from a configured endpoint. `http(s)` bases
/// map to `ws(s)` so the secure variant follows the base scheme.
pub fn ws_url(endpoint: &str) -> Result<String, TransportError> {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        Ok(format!("wss://{}", rest))
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        Ok(format!("ws://{}", rest))
    } else if endpoint.starts_with("wss://") || endpoint.starts_with("ws://") {
        Ok(endpoint.to_string())
    } else {
        Err(TransportError::InvalidUrl(endpoint.to_string()))
    }
}

/// WebSocket transport backed by a blocking tungstenite client.
pub struct WsTransport {
    outgoing: Sender<String>,
    running: Arc<AtomicBool>,
    io_thread: Option<JoinHandle<()>>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.outgoing
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn open(
        &mut self,
        url: &str,
        generation: u64,
        events: Sender<SessionEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let url = ws_url(url)?;
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>();
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let io_thread = thread::spawn(move || {
            io_loop(&url, generation, events, outgoing_rx, thread_running);
        });

        Ok(Box::new(WsTransport {
            outgoing: outgoing_tx,
            running,
            io_thread: Some(io_thread),
        }))
    }
}

/// Connect, then pump the socket until it dies or the handle is closed.
/// Open failure and post-open close both end in a single `Closed` event.
fn io_loop(
    url: &str,
    generation: u64,
    events: Sender<SessionEvent>,
    outgoing: mpsc::Receiver<String>,
    running: Arc<AtomicBool>,
) {
    let mut ws = match tungstenite::connect(url) {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!("connect to {} failed: {}", url, e);
            let _ = events.send(SessionEvent::Closed {
                generation,
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    // Bounded reads so the loop can service outbound text and shutdown.
    match ws.get_ref() {
        MaybeTlsStream::Plain(stream) => {
            let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
        }
        MaybeTlsStream::NativeTls(stream) => {
            let _ = stream.get_ref().set_read_timeout(Some(READ_TIMEOUT));
        }
        _ => {}
    }

    debug!("connected to {}", url);
    let _ = events.send(SessionEvent::Opened { generation });

    let mut close_reason = None;

    'io: loop {
        if !running.load(Ordering::SeqCst) {
            let _ = ws.close(None);
            let _ = ws.flush();
            break;
        }

        // Drain pending outbound text first; input is latency-sensitive.
        loop {
            match outgoing.try_recv() {
                Ok(text) => {
                    if let Err(e) = ws.send(Message::text(text)) {
                        close_reason = Some(e.to_string());
                        break 'io;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = ws.close(None);
                    break 'io;
                }
            }
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                let _ = events.send(SessionEvent::Data {
                    generation,
                    text: text.to_string(),
                });
            }
            Ok(Message::Binary(bytes)) => {
                let _ = events.send(SessionEvent::Data {
                    generation,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong is handled inside tungstenite on the next I/O call.
            Ok(_) => {}
            Err(WsError::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
            Err(e) => {
                close_reason = Some(e.to_string());
                break;
            }
        }
    }

    debug!("transport closed: {:?}", close_reason);
    let _ = events.send(SessionEvent::Closed {
        generation,
        reason: close_reason,
    });
}
