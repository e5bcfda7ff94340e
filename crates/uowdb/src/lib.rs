//! UowDB — a unit-of-work session runtime over an embedded in-memory
//! relational store.
//!
//! ## Crate layout
//! - `core`: the runtime — engine, committed tables, connection pool,
//!   tracked instances, sessions, and the query surface.
//!
//! The `prelude` module mirrors the runtime surface application code
//! actually touches; observability hooks live under [`obs`].

pub use uowdb_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::error::{Error, ErrorClass, ErrorOrigin};

/// Event sinks and session lifecycle events.
pub mod obs {
    pub use crate::core::obs::{CaptureSink, EventSink, SessionEvent, with_event_sink};
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db::{Engine, Instance, Lifecycle, Query, Session},
        model::{EntityModel, FieldKind, FieldModel},
        traits::{EntityKind, Path},
        types::{Date, Decimal, Key, SessionId},
        value::Value,
    };
}
