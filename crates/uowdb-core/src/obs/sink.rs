//! Event sink boundary.
//!
//! The sink override is thread-local and scoped: it is installed only for
//! the dynamic extent of `with_event_sink`, so the raw pointer stored here
//! is always live when `emit` dereferences it.

use crate::types::SessionId;
use std::{
    cell::RefCell,
    sync::{Mutex, PoisonError},
};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn EventSink>> = const { RefCell::new(None) };
}

///
/// SessionEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    SessionOpened {
        id: SessionId,
    },
    SessionClosed {
        id: SessionId,
    },
    CommitApplied {
        id: SessionId,
        inserts: u64,
        updates: u64,
        deletes: u64,
    },
    /// A flush was rejected and the session now requires a rollback.
    CommitRejected {
        id: SessionId,
    },
    /// A post-rollback commit found nothing to flush; pre-rollback
    /// mutations were discarded.
    DiscardedState {
        id: SessionId,
    },
    /// A session was dropped without close; its pooled connection is
    /// gone for good.
    ConnectionLeaked {
        id: SessionId,
    },
}

///
/// EventSink
///

pub trait EventSink {
    fn record(&self, event: SessionEvent);
}

/// Run `f` with `sink` receiving every session event emitted on this
/// thread, restoring the previous sink afterwards.
pub fn with_event_sink<T>(sink: &dyn EventSink, f: impl FnOnce() -> T) -> T {
    struct Restore(Option<*const dyn EventSink>);

    impl Drop for Restore {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| *cell.borrow_mut() = self.0.take());
        }
    }

    // SAFETY:
    // - `sink_ptr` is installed only for this dynamic scope.
    // - `Restore` always puts the previous slot back on all exits,
    //   including panic.
    // - `emit` only dereferences synchronously and never persists the
    //   pointer, so the erased lifetime cannot be observed expired.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn EventSink, *const dyn EventSink>(sink) };
    let previous = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink_ptr));
    let _restore = Restore(previous);

    f()
}

pub(crate) fn emit(event: SessionEvent) {
    SINK_OVERRIDE.with(|cell| {
        if let Some(ptr) = *cell.borrow() {
            // Live for the extent of with_event_sink; see module docs.
            let sink = unsafe { &*ptr };
            sink.record(event);
        }
    });
}

///
/// CaptureSink
///
/// Records every event it sees; used by tests to assert on emissions.
///

#[derive(Debug, Default)]
pub struct CaptureSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl CaptureSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn contains(&self, event: &SessionEvent) -> bool {
        self.events().contains(event)
    }
}

impl EventSink for CaptureSink {
    fn record(&self, event: SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
