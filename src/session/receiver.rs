//! The background receive loop of an open session.

use super::sink::{ChunkSink, Delivery, ReceivedChunk};
use super::{SessionCounters, Shared};
use crate::error::SessionError;
use crate::port::{PortError, SerialPortAdapter};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info_span, trace, warn};
use uuid::Uuid;

/// Upper bound on the bytes returned by one read.
pub const READ_BUFFER_SIZE: usize = 4096;

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);

enum Exit {
    Cancelled,
    Fatal(PortError),
}

/// State moved onto the receive thread.
pub(crate) struct ReceiveLoop {
    pub(crate) port: Box<dyn SerialPortAdapter>,
    pub(crate) sink: Arc<dyn ChunkSink>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) counters: Arc<SessionCounters>,
    pub(crate) generation: u64,
    pub(crate) session_id: Uuid,
    /// Longest pause between delivery attempts to a busy sink.
    pub(crate) max_backoff: Duration,
}

impl ReceiveLoop {
    /// Spawn the loop on a named thread.
    pub(crate) fn spawn(self) -> std::io::Result<ReaderHandle> {
        let cancel = Arc::clone(&self.cancel);
        // Never sent on; the sender dropping tells `close` the loop is gone.
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name(format!("serial-rx-{}", self.port.name()))
            .spawn(move || {
                let _done = done_tx;
                self.run();
            })?;
        Ok(ReaderHandle {
            thread,
            done: done_rx,
            cancel,
        })
    }

    fn run(mut self) {
        let span = info_span!("serial_rx", port = %self.port.name(), session = %self.session_id);
        let _entered = span.enter();
        debug!("receive loop started");

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let exit = self.pump(&mut buffer);

        let ReceiveLoop {
            port,
            sink,
            shared,
            generation,
            ..
        } = self;
        // Release our half of the handle before reporting the loop gone.
        drop(port);

        match exit {
            Exit::Cancelled => {
                shared.loop_exited(generation, false);
                debug!("receive loop stopped");
            }
            Exit::Fatal(err) => {
                let error = SessionError::read_failed(&err);
                if shared.loop_exited(generation, true) {
                    error!(%error, "receive loop hit a fatal read error; session closed");
                    sink.on_fatal(&error);
                } else {
                    debug!(%error, "read error during teardown ignored");
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn pump(&mut self, buffer: &mut [u8]) -> Exit {
        let mut seq = 0u64;
        loop {
            if self.cancelled() {
                return Exit::Cancelled;
            }

            let n = match self.port.read_bytes(buffer) {
                Ok(0) => {
                    if self.cancelled() {
                        return Exit::Cancelled;
                    }
                    return Exit::Fatal(PortError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial port reached end of file",
                    )));
                }
                Ok(n) => n,
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    if self.cancelled() {
                        return Exit::Cancelled;
                    }
                    return Exit::Fatal(e);
                }
            };

            trace!(bytes = n, seq, "chunk read");
            self.counters.record_read(n);
            if self.cancelled() {
                debug!(bytes = n, "chunk read during close discarded");
                return Exit::Cancelled;
            }

            let chunk = ReceivedChunk::new(seq, buffer[..n].to_vec());
            seq += 1;
            if !self.hand_off(chunk) {
                return Exit::Cancelled;
            }
        }
    }

    /// Deliver one chunk, backing off while the sink is busy.
    ///
    /// Returns false if cancellation arrived before the sink took the chunk.
    fn hand_off(&self, mut chunk: ReceivedChunk) -> bool {
        let mut backoff = INITIAL_BACKOFF.min(self.max_backoff);
        loop {
            match self.sink.deliver(chunk) {
                Delivery::Accepted => {
                    self.counters.record_delivery();
                    return true;
                }
                Delivery::Busy(returned) => {
                    if self.cancelled() {
                        debug!(bytes = returned.len(), "undelivered chunk discarded on close");
                        return false;
                    }
                    self.counters.record_backoff();
                    trace!(?backoff, "sink busy, backing off");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.max_backoff);
                    chunk = returned;
                }
            }
        }
    }
}

/// Control side of a running receive loop.
#[derive(Debug)]
pub(crate) struct ReaderHandle {
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
    cancel: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Cancel the loop and wait up to `bound` for it to exit.
    ///
    /// Hands the handle back if the loop was still running when the wait
    /// ended, or if called from the loop's own thread.
    pub(crate) fn stop(self, bound: Duration) -> Option<Self> {
        self.cancel();

        if self.thread.thread().id() == thread::current().id() {
            debug!("close called from the receive thread; not waiting for it to exit");
            return Some(self);
        }

        match self.done.recv_timeout(bound) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    error!("receive thread panicked");
                }
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?bound, "receive loop did not stop in time");
                Some(self)
            }
        }
    }
}
