//! Persistent object handles.
//!
//! An [`ObjectHandle`] is a shared, interior-mutable reference to one
//! persistent object. Every handle is in one of two body states: a ghost
//! (oid known, body not read yet) or loaded. The database is the only thing
//! that turns a ghost into a loaded object.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::{Fields, Node, TypeTag};
use crate::db::error::{DatabaseError, DatabaseResult};
use crate::storage::Oid;

/// Persistence state relative to what is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// never written
    New,
    /// matches the stored copy
    Clean,
    /// modified since it was loaded or written
    Dirty,
}

#[derive(Debug)]
enum Body {
    Ghost,
    Loaded(Fields),
}

#[derive(Debug)]
struct ObjectState {
    oid: Option<Oid>,
    type_tag: Option<TypeTag>,
    body: Body,
    status: ObjectStatus,
    frozen: bool,
}

/// Shared handle to a persistent object.
///
/// Clones share state; two handles are the same object if they share the
/// same allocation.
#[derive(Clone)]
pub struct ObjectHandle {
    inner: Arc<RwLock<ObjectState>>,
}

impl ObjectHandle {
    /// a new, unsaved object
    pub fn new(type_tag: TypeTag, fields: Fields) -> Self {
        Self::from_state(ObjectState {
            oid: None,
            type_tag: Some(type_tag),
            body: Body::Loaded(fields),
            status: ObjectStatus::New,
            frozen: false,
        })
    }

    pub(crate) fn ghost(oid: Oid, type_tag: Option<TypeTag>) -> Self {
        Self::from_state(ObjectState {
            oid: Some(oid),
            type_tag,
            body: Body::Ghost,
            status: ObjectStatus::Clean,
            frozen: false,
        })
    }

    fn from_state(state: ObjectState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn oid(&self) -> Option<Oid> {
        self.inner.read().oid.clone()
    }

    pub(crate) fn set_oid(&self, oid: Oid) {
        self.inner.write().oid = Some(oid);
    }

    /// None only for a ghost created without knowing its type
    pub fn type_tag(&self) -> Option<TypeTag> {
        self.inner.read().type_tag
    }

    pub fn status(&self) -> ObjectStatus {
        self.inner.read().status
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self.inner.read().body, Body::Ghost)
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }

    pub fn freeze(&self) {
        self.inner.write().frozen = true;
    }

    /// allow mutation of a frozen object again
    pub fn unfreeze(&self) {
        let mut state = self.inner.write();
        if state.frozen {
            tracing::info!(
                oid = state.oid.as_ref().map(|o| o.short()).unwrap_or("-"),
                type_tag = state.type_tag.map(|t| t.name()).unwrap_or("-"),
                "unfreezing object"
            );
        }
        state.frozen = false;
    }

    /// the domain identifier (`id`, falling back to `_id`) if the object has one
    pub fn domain_id(&self) -> Option<String> {
        let state = self.inner.read();
        match &state.body {
            Body::Loaded(fields) => ["id", "_id"]
                .iter()
                .find_map(|name| fields.get(*name).and_then(Node::as_str))
                .map(str::to_string),
            Body::Ghost => None,
        }
    }

    /// snapshot of the object's fields
    pub fn fields(&self) -> DatabaseResult<Fields> {
        match &self.inner.read().body {
            Body::Loaded(fields) => Ok(fields.clone()),
            Body::Ghost => Err(DatabaseError::Ghost),
        }
    }

    pub fn field(&self, name: &str) -> DatabaseResult<Option<Node>> {
        match &self.inner.read().body {
            Body::Loaded(fields) => Ok(fields.get(name).cloned()),
            Body::Ghost => Err(DatabaseError::Ghost),
        }
    }

    /// borrow the fields without cloning them
    pub fn with_fields<R>(&self, f: impl FnOnce(&Fields) -> R) -> DatabaseResult<R> {
        match &self.inner.read().body {
            Body::Loaded(fields) => Ok(f(fields)),
            Body::Ghost => Err(DatabaseError::Ghost),
        }
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Node>) -> DatabaseResult<()> {
        let name = name.into();
        let value = value.into();
        self.update(|fields| {
            fields.insert(name, value);
        })
    }

    pub fn remove_field(&self, name: &str) -> DatabaseResult<Option<Node>> {
        self.update(|fields| fields.remove(name))
    }

    pub fn replace_fields(&self, fields: Fields) -> DatabaseResult<()> {
        self.update(|current| *current = fields)
    }

    /// mutate the fields in place, marking the object dirty
    ///
    /// fails on frozen objects and on ghosts
    pub fn update<R>(&self, f: impl FnOnce(&mut Fields) -> R) -> DatabaseResult<R> {
        let mut state = self.inner.write();
        if state.frozen {
            let name = state.type_tag.map(|t| t.name().to_string()).unwrap_or_default();
            return Err(DatabaseError::Frozen(name));
        }
        let result = match &mut state.body {
            Body::Loaded(fields) => f(fields),
            Body::Ghost => return Err(DatabaseError::Ghost),
        };
        if state.status == ObjectStatus::Clean {
            state.status = ObjectStatus::Dirty;
        }
        Ok(result)
    }

    /// ghost -> loaded, with the state read from storage
    pub(crate) fn load(&self, type_tag: TypeTag, fields: Fields) {
        let mut state = self.inner.write();
        state.type_tag = Some(type_tag);
        state.body = Body::Loaded(fields);
        state.status = ObjectStatus::Clean;
    }

    pub(crate) fn mark_clean(&self) {
        self.inner.write().status = ObjectStatus::Clean;
    }

    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// same allocation, or same oid
    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.oid(), other.oid()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read();
        f.debug_struct("ObjectHandle")
            .field("oid", &state.oid)
            .field("type", &state.type_tag)
            .field("status", &state.status)
            .field("ghost", &matches!(state.body, Body::Ghost))
            .finish()
    }
}
