use crate::error::PoolError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

///
/// ConnectionPool
///
/// Fixed-capacity pool with explicit release only. A connection dropped
/// without release is counted as leaked and its slot stays consumed; an
/// unclosed session therefore leaks its connection.
///

#[derive(Debug)]
pub struct ConnectionPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    checked_out: usize,
    leaked: usize,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> Result<Connection, PoolError> {
        let mut state = self.lock();

        if state.checked_out >= self.capacity {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        }
        state.checked_out += 1;

        Ok(Connection {
            pool: Arc::clone(self),
            released: false,
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn checked_out(&self) -> usize {
        self.lock().checked_out
    }

    #[must_use]
    pub fn leaked(&self) -> usize {
        self.lock().leaked
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

///
/// Connection
///
/// One checked-out slot. Held by an open session and returned only by
/// explicit release on session close.
///

#[derive(Debug)]
pub struct Connection {
    pool: Arc<ConnectionPool>,
    released: bool,
}

impl Connection {
    pub(crate) fn release(mut self) {
        self.released = true;
        let mut state = self.pool.lock();
        state.checked_out = state.checked_out.saturating_sub(1);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // No automatic release: the slot stays consumed.
        if !self.released {
            self.pool.lock().leaked += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_respects_capacity() {
        let pool = Arc::new(ConnectionPool::new(1));

        let conn = pool.acquire().expect("first slot");
        assert!(matches!(
            pool.acquire(),
            Err(PoolError::Exhausted { capacity: 1 })
        ));

        conn.release();
        assert_eq!(pool.checked_out(), 0);
        let _again = pool.acquire().expect("slot returned");
    }

    #[test]
    fn dropped_connection_leaks_its_slot() {
        let pool = Arc::new(ConnectionPool::new(1));

        let conn = pool.acquire().expect("slot");
        drop(conn);

        assert_eq!(pool.leaked(), 1);
        assert_eq!(pool.checked_out(), 1);
        assert!(pool.acquire().is_err());
    }
}
