use crate::{
    db::{
        pool::{Connection, ConnectionPool},
        row::Row,
        session::Session,
        table::Table,
    },
    error::{Error, PoolError, StoreError},
    traits::EntityKind,
    types::Key,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Default connection pool capacity for a freshly created engine.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

///
/// Engine
///
/// Process-wide committed store: one table per registered entity plus the
/// connection pool. Cloning shares the same underlying state, so sessions
/// opened from clones observe the same committed rows (read committed).
///

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    tables: Mutex<BTreeMap<&'static str, Table>>,
    pool: Arc<ConnectionPool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool_capacity(DEFAULT_POOL_CAPACITY)
    }

    #[must_use]
    pub fn with_pool_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                tables: Mutex::new(BTreeMap::new()),
                pool: Arc::new(ConnectionPool::new(capacity)),
            }),
        }
    }

    /// Register an entity, creating its (empty) committed table. Repeated
    /// registration is a no-op.
    pub fn register<E: EntityKind>(&self) {
        let mut tables = self.lock_tables();
        tables
            .entry(E::MODEL.path)
            .or_insert_with(|| Table::new(E::MODEL));
    }

    /// Open a new unit-of-work session, checking one connection out of the
    /// pool. The connection is returned only by `Session::close`.
    pub fn session(&self) -> Result<Session, PoolError> {
        let conn: Connection = self.inner.pool.acquire()?;

        Ok(Session::open(self.clone(), conn))
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.inner.pool
    }

    pub(crate) fn committed_row(
        &self,
        path: &'static str,
        key: Key,
    ) -> Result<Option<Row>, StoreError> {
        let tables = self.lock_tables();
        let table = tables.get(path).ok_or(StoreError::UnknownEntity { path })?;

        Ok(table.get(key).cloned())
    }

    pub(crate) fn scan(&self, path: &'static str) -> Result<Vec<(Key, Row)>, StoreError> {
        let tables = self.lock_tables();
        let table = tables.get(path).ok_or(StoreError::UnknownEntity { path })?;

        Ok(table.scan().map(|(key, row)| (key, row.clone())).collect())
    }

    /// Validate and apply one flush batch atomically: every operation is
    /// checked against committed state under a single lock before any
    /// mutation, so either the whole batch lands or the store is untouched.
    ///
    /// Returns the key applied per operation, in batch order; inserts
    /// without an explicit key get an engine-allocated one.
    pub(crate) fn apply(&self, ops: &[FlushOp]) -> Result<Vec<Option<Key>>, Error> {
        let mut tables = self.lock_tables();

        let mut staged: BTreeSet<(&'static str, Key)> = BTreeSet::new();
        for op in ops {
            let path = op.path();
            let table = tables.get(path).ok_or(StoreError::UnknownEntity { path })?;

            match op {
                FlushOp::Insert { key, row, .. } => {
                    row.validate(table.model())?;
                    if let Some(key) = key
                        && (table.contains(*key) || !staged.insert((path, *key)))
                    {
                        return Err(StoreError::IntegrityViolation { path, key: *key }.into());
                    }
                }
                FlushOp::Update { key, row, .. } => {
                    row.validate(table.model())?;
                    if !table.contains(*key) {
                        return Err(StoreError::NotFound { path, key: *key }.into());
                    }
                }
                // Deleting an already-gone row is a no-op.
                FlushOp::Delete { .. } => {}
            }
        }

        let mut applied = Vec::with_capacity(ops.len());
        for op in ops {
            let path = op.path();
            let table = tables
                .get_mut(path)
                .ok_or(StoreError::UnknownEntity { path })?;

            match op {
                FlushOp::Insert { key, row, .. } => {
                    let key = key.unwrap_or_else(|| table.allocate_key());
                    table.insert(key, row.clone())?;
                    applied.push(Some(key));
                }
                FlushOp::Update { key, row, .. } => {
                    table.update(*key, row)?;
                    applied.push(Some(*key));
                }
                FlushOp::Delete { key, .. } => {
                    table.remove(*key);
                    applied.push(None);
                }
            }
        }

        Ok(applied)
    }

    fn lock_tables(&self) -> MutexGuard<'_, BTreeMap<&'static str, Table>> {
        self.inner
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

///
/// FlushOp
///
/// One staged mutation in a session flush batch.
///

#[derive(Clone, Debug)]
pub(crate) enum FlushOp {
    Insert {
        path: &'static str,
        key: Option<Key>,
        row: Row,
    },
    Update {
        path: &'static str,
        key: Key,
        row: Row,
    },
    Delete {
        path: &'static str,
        key: Key,
    },
}

impl FlushOp {
    pub(crate) const fn path(&self) -> &'static str {
        match self {
            Self::Insert { path, .. } | Self::Update { path, .. } | Self::Delete { path, .. } => {
                path
            }
        }
    }
}
