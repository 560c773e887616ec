//! The serial session: one port handle, its configuration and its receive loop.
//!
//! # Architecture
//!
//! ```text
//!            open/close/send                     deliver / on_fatal
//! caller ──────────────────> SerialSession ────────────────────────> ChunkSink
//!                              │  writer half (under the state lock)
//!                              └─ reader half ──> receive thread ─────┘
//! ```
//!
//! All state transitions happen under one lock. The receive thread reads on
//! its own cloned handle and only takes the lock to tear the session down
//! after a fatal read error, so sends never wait on reads.

mod receiver;
pub mod sink;

use crate::error::{SessionError, SessionResult};
use crate::port::{PortInfo, PortError, SerialBackend, SerialPortAdapter, SystemBackend};
use crate::state::{PortConfig, SessionState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use receiver::{ReaderHandle, ReceiveLoop};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use receiver::READ_BUFFER_SIZE;
pub use sink::{CallbackSink, ChannelSink, ChunkSink, Delivery, ReceivedChunk, SessionEvent};

/// Extra time `close` allows the receive loop beyond one read timeout.
pub const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Traffic counters for the current (or most recent) session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub chunks_delivered: u64,
    /// Times a busy sink made the receive loop wait.
    pub backoffs: u64,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    chunks_delivered: AtomicU64,
    backoffs: AtomicU64,
}

impl SessionCounters {
    fn record_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn record_write(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn record_delivery(&self) {
        self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn record_backoff(&self) {
        self.backoffs.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, opened_at: Option<DateTime<Utc>>) -> SessionStats {
        SessionStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            chunks_delivered: self.chunks_delivered.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            opened_at,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    config: Option<PortConfig>,
    /// Write half of the port; present only while OPEN.
    writer: Option<Box<dyn SerialPortAdapter>>,
    reader: Option<ReaderHandle>,
    /// The receive loop of the current generation has not exited yet.
    loop_running: bool,
    /// `close` gave up waiting; the loop finishes the teardown itself.
    loop_detached: bool,
    /// Bumped on every open so a stale loop cannot tear down a newer session.
    generation: u64,
    session_id: Option<Uuid>,
    counters: Arc<SessionCounters>,
    opened_at: Option<DateTime<Utc>>,
}

impl Inner {
    fn finish_close(&mut self) {
        self.writer = None;
        self.reader = None;
        self.config = None;
        self.loop_detached = false;
        self.state = SessionState::Closed;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    /// Record that the receive loop of `generation` has stopped and dropped
    /// its half of the handle.
    ///
    /// With `fatal` set and the session still OPEN, the session is closed
    /// here and true is returned: the caller reports the error. A loop from
    /// an older session, or a read error racing a `close`, reports nothing.
    fn loop_exited(&self, generation: u64, fatal: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.loop_running = false;
        match inner.state {
            SessionState::Open if fatal => {
                inner.finish_close();
                true
            }
            SessionState::Closing if inner.loop_detached => {
                inner.finish_close();
                info!("serial session closed by its receive loop");
                false
            }
            _ => false,
        }
    }
}

/// An exclusively owned, restartable serial session.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use uart_term::session::{CallbackSink, ReceivedChunk, SerialSession};
/// use uart_term::state::PortConfig;
/// use uart_term::SessionError;
///
/// let sink = CallbackSink::new(
///     |chunk: ReceivedChunk| println!("{}", String::from_utf8_lossy(&chunk.bytes)),
///     |err: &SessionError| eprintln!("{err}"),
/// );
/// let session = SerialSession::system(Arc::new(sink));
/// session.open(PortConfig::new("/dev/ttyUSB0"))?;
/// session.send(b"AT\r\n")?;
/// session.close();
/// # Ok::<(), uart_term::SessionError>(())
/// ```
pub struct SerialSession {
    backend: Arc<dyn SerialBackend>,
    sink: Arc<dyn ChunkSink>,
    shared: Arc<Shared>,
}

impl SerialSession {
    pub fn new(backend: Arc<dyn SerialBackend>, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            backend,
            sink,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A session over the operating system's serial devices.
    pub fn system(sink: Arc<dyn ChunkSink>) -> Self {
        Self::new(Arc::new(SystemBackend), sink)
    }

    /// Open the port described by `config` and start receiving.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyOpen` if the session is not CLOSED; the
    ///   running session is left untouched
    /// - `SessionError::OpenFailed` if the config is invalid, the transport
    ///   rejects a parameter, or the device cannot be opened
    pub fn open(&self, config: PortConfig) -> SessionResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state != SessionState::Closed {
            return Err(SessionError::AlreadyOpen);
        }

        config.validate().map_err(SessionError::open_failed)?;

        let writer = self.backend.open(&config).map_err(|e| {
            warn!(port = %config.port_name, error = %e, "failed to open serial port");
            SessionError::open_failed(e)
        })?;
        let reader_port = writer
            .try_clone_port()
            .map_err(SessionError::open_failed)?;

        let session_id = Uuid::new_v4();
        let counters = Arc::new(SessionCounters::default());
        inner.generation += 1;

        let receive_loop = ReceiveLoop {
            port: reader_port,
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            cancel: Arc::new(AtomicBool::new(false)),
            counters: Arc::clone(&counters),
            generation: inner.generation,
            session_id,
            max_backoff: config.timeout(),
        };
        let reader = receive_loop
            .spawn()
            .map_err(|e| SessionError::open_failed(PortError::Io(e)))?;

        info!(
            port = %config.port_name,
            settings = %config.summary(),
            session = %session_id,
            "serial session opened"
        );

        inner.reader = Some(reader);
        inner.loop_running = true;
        inner.loop_detached = false;
        inner.writer = Some(writer);
        inner.config = Some(config);
        inner.session_id = Some(session_id);
        inner.counters = counters;
        inner.opened_at = Some(Utc::now());
        inner.state = SessionState::Open;
        Ok(())
    }

    /// Stop the receive loop and release the port.
    ///
    /// A no-op when already CLOSED. Waits at most one read timeout plus
    /// [`CLOSE_GRACE`] for the loop to exit. If the loop is still running
    /// after that (a sink slower than the bound, or `close` called from the
    /// sink itself) this returns with the session CLOSING, and the loop
    /// releases its handle and sets CLOSED as soon as it sees the cancel.
    pub fn close(&self) {
        let (reader, bound, port_name) = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                SessionState::Closed => return,
                SessionState::Closing => {
                    debug!("close already in progress");
                    return;
                }
                SessionState::Open => {}
            }
            inner.state = SessionState::Closing;
            let (bound, port_name) = inner
                .config
                .as_ref()
                .map(|c| (c.timeout() + CLOSE_GRACE, c.port_name.clone()))
                .unwrap_or((CLOSE_GRACE, String::new()));
            (inner.reader.take(), bound, port_name)
        };

        // The lock is released here so a loop failing concurrently can see
        // CLOSING and step aside.
        let leftover = reader.and_then(|reader| reader.stop(bound));

        let mut inner = self.shared.inner.lock();
        inner.writer = None;
        if leftover.is_some() && inner.loop_running {
            warn!(
                port = %port_name,
                "receive loop still running; it will finish closing the session"
            );
            inner.reader = leftover;
            inner.loop_detached = true;
            return;
        }
        inner.finish_close();
        info!(port = %port_name, "serial session closed");
    }

    /// Write `payload` to the port.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotOpen` if the session is not OPEN
    /// - `SessionError::EmptyPayload` if `payload` is empty
    /// - `SessionError::WriteFailed` if the transport fails; not retried
    pub fn send(&self, payload: &[u8]) -> SessionResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state != SessionState::Open {
            return Err(SessionError::NotOpen);
        }
        if payload.is_empty() {
            return Err(SessionError::EmptyPayload);
        }

        let counters = Arc::clone(&inner.counters);
        let writer = inner.writer.as_mut().ok_or(SessionError::NotOpen)?;
        writer
            .write_all_bytes(payload)
            .and_then(|()| writer.flush())
            .map_err(|e| {
                warn!(error = %e, "serial write failed");
                SessionError::write_failed(&e)
            })?;

        counters.record_write(payload.len());
        debug!(bytes = payload.len(), "payload sent");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Configuration of the open session, if any.
    pub fn config(&self) -> Option<PortConfig> {
        self.shared.inner.lock().config.clone()
    }

    /// Identifier of the current (or most recent) session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.inner.lock().session_id
    }

    /// Counters for the current (or most recent) session.
    pub fn stats(&self) -> SessionStats {
        let inner = self.shared.inner.lock();
        inner.counters.snapshot(inner.opened_at)
    }

    /// Devices the backend can see right now.
    pub fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        self.backend.available_ports()
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("SerialSession")
            .field("state", &inner.state)
            .field("config", &inner.config)
            .field("session_id", &inner.session_id)
            .finish()
    }
}
