//! Observability: session lifecycle events and sink abstractions.
//!
//! Session logic does not talk to a concrete sink directly; all
//! instrumentation flows through [`SessionEvent`] and [`EventSink`].

pub(crate) mod sink;

pub use sink::{CaptureSink, EventSink, SessionEvent, with_event_sink};

pub(crate) use sink::emit;
