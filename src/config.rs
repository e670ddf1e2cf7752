//! Immutable per-run configuration.
//!
//! A [`RunConfig`] is constructed once, handed to the orchestrator, and
//! threaded through to every runner invocation — the engine never reads
//! flags from ambient process state. Environment fallbacks (thread count)
//! are resolved at construction time only.

use crate::event_bus::{EventBus, MemorySink, StdOutSink};

/// Immutable configuration for one invocation.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Size of the worker pool.
    pub threads: usize,
    /// Stop dispatching new nodes after the first node error.
    pub fail_fast: bool,
    /// Force the full-rebuild branch for every node whose own config does
    /// not override it.
    pub full_refresh: bool,
    /// Gate readiness on the full transitive edge set instead of direct
    /// parents only.
    pub preserve_edges: bool,
    pub event_bus: EventBusConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: Self::resolve_threads(None),
            fail_fast: false,
            full_refresh: false,
            preserve_edges: true,
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_threads(provided: Option<usize>) -> usize {
        if let Some(threads) = provided {
            return threads.max(1);
        }
        dotenvy::dotenv().ok();
        std::env::var("STRATA_THREADS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Self::resolve_threads(Some(threads));
        self
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn with_full_refresh(mut self, full_refresh: bool) -> Self {
        self.full_refresh = full_refresh;
        self
    }

    #[must_use]
    pub fn with_preserve_edges(mut self, preserve_edges: bool) -> Self {
        self.preserve_edges = preserve_edges;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Which sinks the orchestrator's default event bus is built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Declarative event bus configuration carried inside [`RunConfig`].
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}

impl EventBusConfig {
    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut],
        }
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut, SinkConfig::Memory],
        }
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    /// Materialize the configured bus.
    #[must_use]
    pub fn build_event_bus(&self) -> EventBus {
        let sinks = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::StdOut => {
                    Box::new(StdOutSink::default()) as Box<dyn crate::event_bus::EventSink>
                }
                SinkConfig::Memory => Box::new(MemorySink::new()),
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}
