use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Abstraction over an output target that consumes full [`Event`] objects.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to render it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Sink that writes one rendered line per event to stdout.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().expect("sink poisoned").clone()
    }

    /// Rendered messages of all captured events, for substring assertions.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|event| event.message().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().expect("sink poisoned").clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries
            .lock()
            .expect("sink poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Channel-based sink forwarding events to an async consumer.
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
