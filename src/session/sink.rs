//! Consumer side of a session: where received chunks and fatal errors go.
//!
//! The receive loop hands every chunk to a [`ChunkSink`] before it reads
//! again. A sink that cannot take a chunk right now answers
//! [`Delivery::Busy`] and the loop backs off and retries the same chunk, so
//! a slow consumer throttles reading instead of growing a buffer.

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use tracing::debug;

/// One batch of bytes read from the port in a single read call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedChunk {
    /// Position of this chunk within its session, starting at 0.
    pub seq: u64,
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl ReceivedChunk {
    pub fn new(seq: u64, bytes: Vec<u8>) -> Self {
        Self {
            seq,
            bytes,
            timestamp: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

/// Outcome of offering a chunk to a sink.
#[derive(Debug)]
pub enum Delivery {
    Accepted,
    /// The sink is full; the chunk is handed back to be offered again.
    Busy(ReceivedChunk),
}

/// Receives the output of a session's receive loop.
///
/// Both methods run on the receive thread. They must not call
/// [`open`](super::SerialSession::open) or [`close`](super::SerialSession::close)
/// on the same session; queue such requests for another thread instead.
pub trait ChunkSink: Send + Sync {
    fn deliver(&self, chunk: ReceivedChunk) -> Delivery;

    /// Called exactly once when a read error ends the session. The session
    /// is already closed when this runs.
    fn on_fatal(&self, error: &SessionError);
}

/// Synchronous handoff to a pair of closures.
pub struct CallbackSink<C, E> {
    on_chunk: C,
    on_error: E,
}

impl<C, E> CallbackSink<C, E>
where
    C: Fn(ReceivedChunk) + Send + Sync,
    E: Fn(&SessionError) + Send + Sync,
{
    pub fn new(on_chunk: C, on_error: E) -> Self {
        Self { on_chunk, on_error }
    }
}

impl<C, E> ChunkSink for CallbackSink<C, E>
where
    C: Fn(ReceivedChunk) + Send + Sync,
    E: Fn(&SessionError) + Send + Sync,
{
    fn deliver(&self, chunk: ReceivedChunk) -> Delivery {
        (self.on_chunk)(chunk);
        Delivery::Accepted
    }

    fn on_fatal(&self, error: &SessionError) {
        (self.on_error)(error);
    }
}

impl<C, E> fmt::Debug for CallbackSink<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

/// What a [`ChannelSink`] puts on its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Chunk(ReceivedChunk),
    Fatal(SessionError),
}

/// Bounded queue between the receive loop and a consumer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: SyncSender<SessionEvent>,
}

impl ChannelSink {
    /// Create a sink holding at most `capacity` undelivered chunks.
    pub fn bounded(capacity: usize) -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ChunkSink for ChannelSink {
    fn deliver(&self, chunk: ReceivedChunk) -> Delivery {
        match self.tx.try_send(SessionEvent::Chunk(chunk)) {
            Ok(()) => Delivery::Accepted,
            Err(TrySendError::Full(event)) => match event {
                SessionEvent::Chunk(chunk) => Delivery::Busy(chunk),
                SessionEvent::Fatal(_) => unreachable!("deliver only queues chunks"),
            },
            Err(TrySendError::Disconnected(event)) => {
                debug!(?event, "chunk dropped: consumer is gone");
                Delivery::Accepted
            }
        }
    }

    fn on_fatal(&self, error: &SessionError) {
        // Blocking send: the notification must not be lost to a full queue.
        if self.tx.send(SessionEvent::Fatal(error.clone())).is_err() {
            debug!(%error, "fatal error dropped: consumer is gone");
        }
    }
}
