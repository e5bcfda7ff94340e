use crate::{
    db::{row::Row, session::SessionShared},
    error::{Error, ModelError, SessionError, StoreError},
    model::EntityModel,
    traits::EntityKind,
    types::Key,
    value::Value,
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    fmt,
    marker::PhantomData,
    rc::Rc,
};

///
/// Lifecycle
///
/// Tracked-object states relative to a unit-of-work session.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    /// Constructed, untracked.
    Transient,
    /// Attached to a session, not yet flushed.
    Pending,
    /// Flushed and tracked by an open session.
    Persistent,
    /// Released, or the tracking session closed.
    Detached,
}

///
/// Attr
///
/// Per-attribute materialization state. Deferred attributes require a
/// round-trip through the bound session to read.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Attr {
    Loaded(Option<Value>),
    Deferred,
}

pub(crate) type InstanceCell = Rc<RefCell<InstanceState>>;

///
/// InstanceState
///

pub(crate) struct InstanceState {
    pub(crate) model: &'static EntityModel,
    pub(crate) key: Option<Key>,
    pub(crate) lifecycle: Lifecycle,
    /// True once the instance has ever been flushed or loaded from the
    /// store: a re-attached instance with identity flushes as an update,
    /// one without flushes as an insert.
    pub(crate) has_identity: bool,
    pub(crate) deleted: bool,
    pub(crate) attrs: BTreeMap<&'static str, Attr>,
    pub(crate) dirty: BTreeSet<&'static str>,
    pub(crate) binding: Option<Rc<SessionShared>>,
}

impl InstanceState {
    pub(crate) fn transient(model: &'static EntityModel, key: Option<Key>) -> Self {
        // A constructed instance is fully materialized: every attribute
        // starts as an in-memory null.
        let attrs = model
            .fields
            .iter()
            .map(|field| (field.name, Attr::Loaded(None)))
            .collect();

        Self {
            model,
            key,
            lifecycle: Lifecycle::Transient,
            has_identity: false,
            deleted: false,
            attrs,
            dirty: BTreeSet::new(),
            binding: None,
        }
    }

    pub(crate) fn persistent(
        model: &'static EntityModel,
        key: Key,
        row: &Row,
        binding: Rc<SessionShared>,
    ) -> Self {
        let mut state = Self::transient(model, Some(key));
        state.lifecycle = Lifecycle::Persistent;
        state.has_identity = true;
        state.binding = Some(binding);
        state.materialize_from(row);

        state
    }

    pub(crate) fn bound_open_session(&self) -> Option<Rc<SessionShared>> {
        self.binding
            .as_ref()
            .filter(|shared| shared.open.get())
            .cloned()
    }

    /// A closed or dropped session leaves the instance behaving as
    /// detached even if the stored tag still says otherwise.
    pub(crate) fn effective_lifecycle(&self) -> Lifecycle {
        match self.lifecycle {
            Lifecycle::Pending | Lifecycle::Persistent if self.bound_open_session().is_none() => {
                Lifecycle::Detached
            }
            state => state,
        }
    }

    /// Materialize deferred attributes from a committed row, keeping
    /// local unflushed writes.
    pub(crate) fn materialize_from(&mut self, row: &Row) {
        for field in self.model.fields {
            if self.dirty.contains(field.name) {
                continue;
            }
            self.attrs
                .insert(field.name, Attr::Loaded(row.value(field.name)));
        }
    }

    /// Expire every attribute (post-commit: the next read reloads
    /// committed state).
    pub(crate) fn expire_all(&mut self) {
        for field in self.model.fields {
            self.attrs.insert(field.name, Attr::Deferred);
        }
        self.dirty.clear();
    }

    /// Expire only locally written attributes (rollback: unflushed writes
    /// are discarded, clean loads stay materialized).
    pub(crate) fn expire_dirty(&mut self) {
        for name in std::mem::take(&mut self.dirty) {
            self.attrs.insert(name, Attr::Deferred);
        }
    }

    /// Effective value for predicate evaluation: a locally loaded value
    /// wins, a deferred one falls back to the committed row.
    pub(crate) fn effective_value(&self, field: &str, committed: Option<&Row>) -> Option<Value> {
        match self.attrs.get(field) {
            Some(Attr::Loaded(value)) => value.clone(),
            _ => committed.and_then(|row| row.value(field)),
        }
    }

    /// Full row image for an insert flush. Deferred attributes flush as
    /// null.
    pub(crate) fn insert_row(&self) -> Row {
        let mut row = Row::new();
        for field in self.model.fields {
            let value = match self.attrs.get(field.name) {
                Some(Attr::Loaded(value)) => value.clone(),
                _ => None,
            };
            row.set(field.name, value);
        }

        row
    }

    /// Changed-attribute image for an update flush.
    pub(crate) fn update_row(&self) -> Row {
        let mut row = Row::new();
        for name in &self.dirty {
            let value = match self.attrs.get(name) {
                Some(Attr::Loaded(value)) => value.clone(),
                _ => None,
            };
            row.set(name, value);
        }

        row
    }
}

///
/// Instance
///
/// Shared handle to one entity instance. Clones share state; the handle
/// stays usable after its session closes — detached reads of materialized
/// attributes succeed, deferred reads fail, writes succeed silently and
/// only persist after re-attach and commit.
///

pub struct Instance<E: EntityKind> {
    cell: InstanceCell,
    _marker: PhantomData<E>,
}

impl<E: EntityKind> Clone for Instance<E> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

// Manual impl: the cell is an internal type, so derive would leak it.
impl<E: EntityKind> fmt::Debug for Instance<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.borrow();
        f.debug_struct("Instance")
            .field("path", &state.model.path)
            .field("key", &state.key)
            .field("lifecycle", &state.effective_lifecycle())
            .finish_non_exhaustive()
    }
}

impl<E: EntityKind> Default for Instance<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityKind> Instance<E> {
    /// Construct a transient instance with an engine-allocated key.
    #[must_use]
    pub fn new() -> Self {
        Self::from_cell(Rc::new(RefCell::new(InstanceState::transient(
            E::MODEL,
            None,
        ))))
    }

    /// Construct a transient instance with an explicit key. The key is
    /// only checked against committed state at commit.
    #[must_use]
    pub fn with_key(key: impl Into<Key>) -> Self {
        Self::from_cell(Rc::new(RefCell::new(InstanceState::transient(
            E::MODEL,
            Some(key.into()),
        ))))
    }

    pub(crate) const fn from_cell(cell: InstanceCell) -> Self {
        Self {
            cell,
            _marker: PhantomData,
        }
    }

    pub(crate) const fn cell(&self) -> &InstanceCell {
        &self.cell
    }

    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.cell.borrow().key
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.cell.borrow().effective_lifecycle()
    }

    #[must_use]
    pub fn is_materialized(&self, field: &str) -> bool {
        matches!(
            self.cell.borrow().attrs.get(field),
            Some(Attr::Loaded(_))
        )
    }

    /// Read an attribute. Materialized attributes are served from memory;
    /// deferred ones reload the committed row through the bound session
    /// and fail with a detached-access error when no open session tracks
    /// this instance.
    pub fn get(&self, field: &str) -> Result<Option<Value>, Error> {
        let mut state = self.cell.borrow_mut();
        let Some(field_model) = state.model.field(field) else {
            return Err(ModelError::UnknownField {
                path: state.model.path,
                field: field.to_string(),
            }
            .into());
        };

        if let Some(Attr::Loaded(value)) = state.attrs.get(field_model.name) {
            return Ok(value.clone());
        }

        let (Some(session), Some(key)) = (state.bound_open_session(), state.key) else {
            return Err(SessionError::DetachedAccess {
                path: state.model.path,
                attribute: field_model.name,
            }
            .into());
        };

        let path = state.model.path;
        let row = session
            .engine
            .committed_row(path, key)?
            .ok_or(StoreError::NotFound { path, key })?;
        state.materialize_from(&row);

        Ok(state.effective_value(field_model.name, Some(&row)))
    }

    /// Write an attribute in memory. Never raises for detached instances;
    /// the value persists only once the instance is attached and its
    /// session commits.
    pub fn set(&self, field: &str, value: Option<Value>) -> Result<(), Error> {
        let mut state = self.cell.borrow_mut();
        let Some(field_model) = state.model.field(field) else {
            return Err(ModelError::UnknownField {
                path: state.model.path,
                field: field.to_string(),
            }
            .into());
        };

        if let Some(value) = &value
            && !field_model.kind.matches(value)
        {
            return Err(ModelError::KindMismatch {
                path: state.model.path,
                field: field_model.name,
            }
            .into());
        }

        state.attrs.insert(field_model.name, Attr::Loaded(value));
        state.dirty.insert(field_model.name);

        Ok(())
    }
}
