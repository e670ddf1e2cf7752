//! Structured run events, fan-out, and sinks.
//!
//! The module is organised around an [`EventBus`] that drains a channel of
//! [`Event`]s into pluggable [`EventSink`]s. Result lines and the
//! reconciler's verbatim log lines both travel through here; `tracing`
//! carries the same information for operators who prefer log subscribers.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, EventLevel, ResultLineEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
