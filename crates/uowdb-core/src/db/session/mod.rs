
use crate::{
    db::{
        engine::{Engine, FlushOp},
        instance::{Instance, InstanceCell, InstanceState, Lifecycle},
        pool::Connection,
        query::{Predicate, Query},
    },
    error::{Error, SessionError, StoreError},
    obs::{self, SessionEvent},
    traits::EntityKind,
    types::{Key, SessionId},
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

///
/// SessionShared
///
/// State shared between a session and the instances bound to it. The
/// open flag is how a detached handle knows its session is gone.
///

pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) engine: Engine,
    pub(crate) open: Cell<bool>,
}

///
/// Session
///
/// One unit-of-work context: tracks instances through an identity map,
/// stages changes, and flushes them atomically on commit.
///
/// Sessions are single-threaded by construction (`Rc` handles) and hold
/// one pooled connection from open until `close`. There is no implicit
/// close: dropping an open session detaches its instances but leaks the
/// connection.
///

pub struct Session {
    shared: Rc<SessionShared>,
    conn: Option<Connection>,
    /// Identity map: at most one instance with store identity per
    /// (path, key).
    identity: BTreeMap<(&'static str, Key), InstanceCell>,
    /// Pending inserts (keyed or keyless) that have never been flushed.
    /// Kept apart from the identity map so a duplicate explicit key can
    /// coexist with a tracked persistent instance until flush rejects it.
    pending: Vec<InstanceCell>,
    /// Set when a flush was rejected; cleared only by rollback.
    pending_rollback: bool,
    /// Set when a rollback discarded staged state.
    discarded_state: bool,
}

impl Session {
    pub(crate) fn open(engine: Engine, conn: Connection) -> Self {
        let id = SessionId::new(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        obs::emit(SessionEvent::SessionOpened { id });

        Self {
            shared: Rc::new(SessionShared {
                id,
                engine,
                open: Cell::new(true),
            }),
            conn: Some(conn),
            identity: BTreeMap::new(),
            pending: Vec::new(),
            pending_rollback: false,
            discarded_state: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.open.get()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.shared.open.get() {
            Ok(())
        } else {
            Err(SessionError::Closed { id: self.shared.id })
        }
    }

    /// Attach an instance to this session (transient → pending, detached →
    /// pending). Attaching an instance already bound here is a no-op;
    /// attaching one bound to another open session fails regardless of
    /// that session's commit status, and attaching one whose store
    /// identity is already tracked by a different instance here fails
    /// with an identity conflict.
    pub fn attach<E: EntityKind>(&mut self, instance: &Instance<E>) -> Result<(), Error> {
        self.ensure_open()?;
        let cell = instance.cell();

        {
            let state = cell.borrow();
            if let Some(bound) = state.bound_open_session() {
                if Rc::ptr_eq(&bound, &self.shared) {
                    return Ok(());
                }
                return Err(SessionError::CrossContextBinding {
                    path: state.model.path,
                    bound_session: bound.id,
                }
                .into());
            }
        }

        let mut state = cell.borrow_mut();
        // The identity slot is never evicted: a different instance already
        // tracked under this identity would otherwise lose its staged
        // writes silently.
        if state.has_identity
            && let Some(key) = state.key
            && self
                .identity
                .get(&(state.model.path, key))
                .is_some_and(|tracked| !Rc::ptr_eq(tracked, cell))
        {
            return Err(SessionError::IdentityConflict {
                path: state.model.path,
                key,
            }
            .into());
        }

        state.binding = Some(Rc::clone(&self.shared));
        state.lifecycle = Lifecycle::Pending;
        state.deleted = false;
        match (state.has_identity, state.key) {
            // Re-attached with store identity: flushes as an update.
            (true, Some(key)) => {
                self.identity.insert((state.model.path, key), Rc::clone(cell));
            }
            // Never flushed: flushes as an insert, duplicate keys and all.
            _ => self.pending.push(Rc::clone(cell)),
        }

        Ok(())
    }

    /// Release an instance from this session: detached when it has store
    /// identity, transient otherwise.
    pub fn expunge<E: EntityKind>(&mut self, instance: &Instance<E>) -> Result<(), Error> {
        self.ensure_open()?;
        let cell = instance.cell();
        let mut state = cell.borrow_mut();

        if !self.tracks(&state) {
            return Err(SessionError::NotTracked {
                path: state.model.path,
            }
            .into());
        }

        if let Some(key) = state.key
            && self
                .identity
                .get(&(state.model.path, key))
                .is_some_and(|tracked| Rc::ptr_eq(tracked, cell))
        {
            self.identity.remove(&(state.model.path, key));
        }
        self.pending.retain(|tracked| !Rc::ptr_eq(tracked, cell));
        state.binding = None;
        // Without store identity there is nothing to be detached from.
        state.lifecycle = if state.has_identity {
            Lifecycle::Detached
        } else {
            Lifecycle::Transient
        };

        Ok(())
    }

    /// Mark a tracked instance for deletion at the next commit. Deleting
    /// an instance that was never flushed simply untracks it.
    pub fn delete<E: EntityKind>(&mut self, instance: &Instance<E>) -> Result<(), Error> {
        self.ensure_open()?;
        let cell = instance.cell();

        {
            let state = cell.borrow();
            if !self.tracks(&state) {
                return Err(SessionError::NotTracked {
                    path: state.model.path,
                }
                .into());
            }
            if !state.has_identity {
                drop(state);
                return self.expunge(instance);
            }
        }
        cell.borrow_mut().deleted = true;

        Ok(())
    }

    #[must_use]
    pub fn query<E: EntityKind>(&mut self) -> Query<'_, E> {
        Query::new(self)
    }

    /// Rematerialize every attribute from committed state, discarding
    /// local writes.
    pub fn refresh<E: EntityKind>(&mut self, instance: &Instance<E>) -> Result<(), Error> {
        self.ensure_open()?;
        let cell = instance.cell();
        let mut state = cell.borrow_mut();

        let path = state.model.path;
        if !self.tracks(&state) {
            return Err(SessionError::NotTracked { path }.into());
        }
        let Some(key) = state.key else {
            return Err(SessionError::NotTracked { path }.into());
        };
        let row = self
            .shared
            .engine
            .committed_row(path, key)?
            .ok_or(StoreError::NotFound { path, key })?;

        state.expire_all();
        state.materialize_from(&row);
        state.lifecycle = Lifecycle::Persistent;
        state.has_identity = true;

        Ok(())
    }

    /// Flush staged changes atomically. On an integrity failure the
    /// session enters the pending-rollback state: further commits fail
    /// with a stale-context error until `rollback` runs.
    pub fn commit(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.pending_rollback {
            return Err(SessionError::StaleContext { id: self.shared.id }.into());
        }

        let ops = self.stage();
        if ops.is_empty() {
            // No-op commit; warn if a rollback discarded state since.
            if self.discarded_state {
                obs::emit(SessionEvent::DiscardedState { id: self.shared.id });
                self.discarded_state = false;
            }
            return Ok(());
        }

        let (inserts, updates, deletes) = op_counts(&ops);
        let applied = match self.shared.engine.apply(&ops) {
            Ok(applied) => applied,
            Err(err) => {
                self.pending_rollback = true;
                obs::emit(SessionEvent::CommitRejected { id: self.shared.id });
                return Err(err);
            }
        };

        // Pending inserts are staged first; adopt their applied keys and
        // move them into the identity map.
        let pending = std::mem::take(&mut self.pending);
        for (cell, applied_key) in pending.into_iter().zip(&applied) {
            let (path, key) = {
                let mut state = cell.borrow_mut();
                if state.key.is_none() {
                    state.key = *applied_key;
                }
                (state.model.path, state.key)
            };
            if let Some(key) = key {
                self.identity.insert((path, key), cell);
            }
        }

        // Promote and expire: committed attributes are reloaded on next
        // read, so stale in-memory values cannot outlive the flush.
        let mut removed = Vec::new();
        for (map_key, cell) in &self.identity {
            let mut state = cell.borrow_mut();
            if state.deleted {
                state.deleted = false;
                state.has_identity = false;
                state.binding = None;
                state.lifecycle = Lifecycle::Detached;
                removed.push(*map_key);
            } else {
                state.lifecycle = Lifecycle::Persistent;
                state.has_identity = true;
                state.expire_all();
            }
        }
        for map_key in removed {
            self.identity.remove(&map_key);
        }

        self.discarded_state = false;
        obs::emit(SessionEvent::CommitApplied {
            id: self.shared.id,
            inserts,
            updates,
            deletes,
        });

        Ok(())
    }

    /// Discard staged state: unflushed inserts revert to transient, dirty
    /// attributes of persistent instances are expired so reads reload
    /// last-known-committed values, and the pending-rollback gate opens.
    pub fn rollback(&mut self) -> Result<(), Error> {
        self.ensure_open()?;

        let mut discarded = false;
        for cell in self.identity.values() {
            let mut state = cell.borrow_mut();
            if state.deleted {
                state.deleted = false;
                discarded = true;
            }
            if matches!(
                state.lifecycle,
                Lifecycle::Pending | Lifecycle::Persistent
            ) {
                if !state.dirty.is_empty() {
                    discarded = true;
                }
                state.expire_dirty();
                state.lifecycle = Lifecycle::Persistent;
            }
        }
        for cell in std::mem::take(&mut self.pending) {
            let mut state = cell.borrow_mut();
            state.binding = None;
            state.lifecycle = Lifecycle::Transient;
            discarded = true;
        }

        self.discarded_state = discarded;
        self.pending_rollback = false;

        Ok(())
    }

    /// Close the session: detach every tracked instance and return the
    /// pooled connection. Unflushed inserts revert to transient.
    pub fn close(mut self) {
        self.shared.open.set(false);

        for cell in self.identity.values() {
            let mut state = cell.borrow_mut();
            state.binding = None;
            state.lifecycle = Lifecycle::Detached;
        }
        for cell in std::mem::take(&mut self.pending) {
            let mut state = cell.borrow_mut();
            state.binding = None;
            state.lifecycle = Lifecycle::Transient;
        }
        self.identity.clear();

        if let Some(conn) = self.conn.take() {
            conn.release();
        }
        obs::emit(SessionEvent::SessionClosed { id: self.shared.id });
    }

    fn tracks(&self, state: &InstanceState) -> bool {
        state
            .binding
            .as_ref()
            .is_some_and(|bound| Rc::ptr_eq(bound, &self.shared))
    }

    /// Stage the flush batch: pending inserts first (their applied keys
    /// are adopted from the result), then keyed operations.
    fn stage(&self) -> Vec<FlushOp> {
        let mut ops = Vec::new();

        for cell in &self.pending {
            let state = cell.borrow();
            ops.push(FlushOp::Insert {
                path: state.model.path,
                key: state.key,
                row: state.insert_row(),
            });
        }

        for cell in self.identity.values() {
            let state = cell.borrow();
            let Some(key) = state.key else { continue };
            let path = state.model.path;

            if state.deleted {
                ops.push(FlushOp::Delete { path, key });
                continue;
            }
            if matches!(
                state.lifecycle,
                Lifecycle::Pending | Lifecycle::Persistent
            ) && !state.dirty.is_empty()
            {
                ops.push(FlushOp::Update {
                    path,
                    key,
                    row: state.update_row(),
                });
            }
        }

        ops
    }

    pub(crate) fn execute_query<E: EntityKind>(
        &mut self,
        predicates: &[Predicate],
    ) -> Result<Vec<Instance<E>>, Error> {
        self.ensure_open()?;
        let model = E::MODEL;
        for predicate in predicates {
            predicate.validate(model)?;
        }

        let committed = self.shared.engine.scan(model.path)?;
        let mut out = Vec::new();

        // Committed rows, overlaid with this session's tracked state. A
        // row already tracked comes back as the identity-mapped instance.
        for (key, row) in &committed {
            let tracked = self.identity.get(&(model.path, *key)).cloned();
            if let Some(cell) = tracked {
                let matched = {
                    let state = cell.borrow();
                    let view = |field: &str| state.effective_value(field, Some(row));
                    !state.deleted && predicates.iter().all(|p| p.matches(Some(*key), &view))
                };
                if matched {
                    out.push(Instance::from_cell(cell));
                }
            } else {
                let view = |field: &str| row.value(field);
                if predicates.iter().all(|p| p.matches(Some(*key), &view)) {
                    let cell: InstanceCell = Rc::new(RefCell::new(InstanceState::persistent(
                        model,
                        *key,
                        row,
                        Rc::clone(&self.shared),
                    )));
                    self.identity.insert((model.path, *key), Rc::clone(&cell));
                    out.push(Instance::from_cell(cell));
                }
            }
        }

        // Same-session pending inserts: visible here, invisible to other
        // sessions until commit (read committed).
        for cell in &self.pending {
            let state = cell.borrow();
            if state.model.path != model.path {
                continue;
            }
            let view = |field: &str| state.effective_value(field, None);
            if predicates.iter().all(|p| p.matches(state.key, &view)) {
                out.push(Instance::from_cell(Rc::clone(cell)));
            }
        }

        Ok(out)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropping an open session is not a close: instances read as
        // detached via the open flag, and the unreleased connection is
        // counted as leaked by the pool.
        if self.shared.open.get() {
            self.shared.open.set(false);
            if self.conn.is_some() {
                obs::emit(SessionEvent::ConnectionLeaked { id: self.shared.id });
            }
        }
    }
}

const fn op_counts(ops: &[FlushOp]) -> (u64, u64, u64) {
    let (mut inserts, mut updates, mut deletes) = (0, 0, 0);
    let mut i = 0;
    while i < ops.len() {
        match &ops[i] {
            FlushOp::Insert { .. } => inserts += 1,
            FlushOp::Update { .. } => updates += 1,
            FlushOp::Delete { .. } => deletes += 1,
        }
        i += 1;
    }

    (inserts, updates, deletes)
}
