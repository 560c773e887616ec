//! Shared test utilities for session tests.
//!
//! This module provides common test infrastructure including:
//! - A mock-backed session harness
//! - A sink that records everything it is given
//! - Polling helpers for conditions reached on the receive thread

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uart_term::{
    ChannelSink, ChunkSink, Delivery, MockBackend, MockPortController, PortConfig,
    ReceivedChunk, SerialSession, SessionError, SessionEvent,
};

/// Read timeout used by most tests; short so close paths stay fast.
pub const TIMEOUT_MS: u64 = 40;

/// Upper bound for waiting on anything the receive loop does.
pub const WAIT: Duration = Duration::from_secs(3);

pub const PORT: &str = "MOCK0";

/// A port config for the mock device with the test timeout.
pub fn mock_config() -> PortConfig {
    let mut config = PortConfig::new(PORT);
    config.timeout_ms = TIMEOUT_MS;
    config
}

/// Records chunks and fatal errors in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    chunks: Mutex<Vec<ReceivedChunk>>,
    errors: Mutex<Vec<SessionError>>,
}

impl RecordingSink {
    pub fn chunks(&self) -> Vec<ReceivedChunk> {
        self.chunks.lock().clone()
    }

    pub fn received_bytes(&self) -> Vec<u8> {
        self.chunks
            .lock()
            .iter()
            .flat_map(|c| c.bytes.iter().copied())
            .collect()
    }

    pub fn errors(&self) -> Vec<SessionError> {
        self.errors.lock().clone()
    }
}

impl ChunkSink for RecordingSink {
    fn deliver(&self, chunk: ReceivedChunk) -> Delivery {
        self.chunks.lock().push(chunk);
        Delivery::Accepted
    }

    fn on_fatal(&self, error: &SessionError) {
        self.errors.lock().push(error.clone());
    }
}

/// A session over one mock device, recording into a [`RecordingSink`].
pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub device: MockPortController,
    pub sink: Arc<RecordingSink>,
    pub session: SerialSession,
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(MockBackend::new());
        let device = backend.add_device(PORT);
        let sink = Arc::new(RecordingSink::default());
        let session = SerialSession::new(backend.clone(), sink.clone());
        Self {
            backend,
            device,
            sink,
            session,
        }
    }

    pub fn opened() -> Self {
        let harness = Self::new();
        harness
            .session
            .open(mock_config())
            .expect("mock port should open");
        harness
    }
}

/// A session whose chunks land on a bounded channel.
pub fn channel_session(
    capacity: usize,
) -> (SerialSession, MockPortController, Receiver<SessionEvent>) {
    let backend = Arc::new(MockBackend::new());
    let device = backend.add_device(PORT);
    let (sink, rx) = ChannelSink::bounded(capacity);
    let session = SerialSession::new(backend, Arc::new(sink));
    (session, device, rx)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
