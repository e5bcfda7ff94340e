//! Core runtime for UowDB: the engine, unit-of-work sessions, entity
//! instances with lifecycle tracking, and the ergonomics exported via
//! the `prelude`.
#![warn(unreachable_pub)]

pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod traits;
pub mod types;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Domain vocabulary only; errors and internals stay one module down.
///

pub mod prelude {
    pub use crate::{
        db::{Engine, Instance, Lifecycle, Query, Session},
        model::{EntityModel, FieldKind, FieldModel},
        traits::{EntityKind, Path},
        types::{Date, Decimal, Key, SessionId},
        value::Value,
    };
}
