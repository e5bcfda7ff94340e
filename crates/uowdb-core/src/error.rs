use crate::types::{Key, SessionId};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Top-level runtime error: origin-specific detail plus a stable
/// class/origin classification for callers that branch on failure kind.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl Error {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Session(err) => err.class(),
            Self::Store(err) => err.class(),
            Self::Model(err) => err.class(),
            Self::Pool(err) => err.class(),
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Session(_) => ErrorOrigin::Session,
            Self::Store(_) => ErrorOrigin::Store,
            Self::Model(_) => ErrorOrigin::Model,
            Self::Pool(_) => ErrorOrigin::Pool,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }

    #[must_use]
    pub const fn is_cross_context_binding(&self) -> bool {
        matches!(self, Self::Session(SessionError::CrossContextBinding { .. }))
    }

    #[must_use]
    pub const fn is_detached_access(&self) -> bool {
        matches!(self, Self::Session(SessionError::DetachedAccess { .. }))
    }

    #[must_use]
    pub const fn is_stale_context(&self) -> bool {
        matches!(self, Self::Session(SessionError::StaleContext { .. }))
    }

    #[must_use]
    pub const fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::Store(StoreError::IntegrityViolation { .. }))
    }
}

///
/// SessionError
///
/// Lifecycle and binding failures raised at the session boundary.
///

#[derive(Debug, ThisError)]
pub enum SessionError {
    /// One instance, one active context.
    #[error("instance of {path} is already bound to open session {bound_session}")]
    CrossContextBinding {
        path: &'static str,
        bound_session: SessionId,
    },

    #[error(
        "instance of {path} is not bound to an open session; attribute '{attribute}' requires a deferred load"
    )]
    DetachedAccess {
        path: &'static str,
        attribute: &'static str,
    },

    /// At most one tracked instance per store identity.
    #[error("another instance of {path} key {key} is already tracked by this session")]
    IdentityConflict { path: &'static str, key: Key },

    #[error("session {id} has a failed flush pending; roll back before committing again")]
    StaleContext { id: SessionId },

    #[error("session {id} is closed")]
    Closed { id: SessionId },

    #[error("instance of {path} is not tracked by this session")]
    NotTracked { path: &'static str },
}

impl SessionError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::CrossContextBinding { .. } | Self::IdentityConflict { .. } => {
                ErrorClass::Conflict
            }
            Self::DetachedAccess { .. } | Self::Closed { .. } | Self::NotTracked { .. } => {
                ErrorClass::InvariantViolation
            }
            Self::StaleContext { .. } => ErrorClass::Stale,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Session
    }
}

///
/// StoreError
///
/// Committed-state failures raised during flush or deferred loads.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("unique constraint violation: {path} key {key}")]
    IntegrityViolation { path: &'static str, key: Key },

    #[error("row not found: {path} key {key}")]
    NotFound { path: &'static str, key: Key },

    #[error("unknown entity path: '{path}'")]
    UnknownEntity { path: &'static str },
}

impl StoreError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::IntegrityViolation { .. } => ErrorClass::Conflict,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::UnknownEntity { .. } => ErrorClass::Unsupported,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Store
    }
}

///
/// ModelError
///
/// Schema-shape failures: unknown attributes and mismatched value kinds.
///

#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error("unknown field '{field}' on {path}")]
    UnknownField { path: &'static str, field: String },

    #[error("value kind does not match field '{field}' on {path}")]
    KindMismatch {
        path: &'static str,
        field: &'static str,
    },
}

impl ModelError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Unsupported
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Model
    }
}

///
/// PoolError
///

#[derive(Debug, ThisError)]
pub enum PoolError {
    #[error("connection pool exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },
}

impl PoolError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Exhausted
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        ErrorOrigin::Pool
    }
}

///
/// ErrorClass
/// Runtime error taxonomy; stable labels for diagnostics.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    NotFound,
    Stale,
    Exhausted,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Stale => "stale",
            Self::Exhausted => "exhausted",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy; stable labels for diagnostics.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Session,
    Store,
    Model,
    Pool,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Session => "session",
            Self::Store => "store",
            Self::Model => "model",
            Self::Pool => "pool",
        };
        write!(f, "{label}")
    }
}
