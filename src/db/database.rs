//! The database: identity map, staging and commit.
//!
//! One `Database` is bound to one metadata directory. It is the only place
//! that assigns oids, turns ghosts into loaded objects and writes objects to
//! storage.
//!
//! Three identity maps keep a single in-memory instance per oid:
//!
//! - `cache`: objects loaded from or committed to storage
//! - `pre_cache`: objects whose load is in progress, so a nested lookup of
//!   the same oid during deserialization finds the half-built instance
//! - `objects_to_commit`: objects staged for the next `commit()`

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::codec::{registry, Fields, Node, ObjectReader, ObjectWriter, Record, TypeRegistry, TypeTag};
use crate::db::config::DatabaseConfig;
use crate::db::error::{DatabaseError, DatabaseResult};
use crate::db::index::Index;
use crate::db::object::{ObjectHandle, ObjectStatus};
use crate::model::Persistable;
use crate::storage::{Oid, Storage, StorageError};

type IdentityMap = Mutex<HashMap<Oid, ObjectHandle>>;

/// The main database handle.
pub struct Database {
    storage: Storage,
    registry: Arc<TypeRegistry>,
    compress: bool,
    root: RwLock<ObjectHandle>,
    cache: IdentityMap,
    pre_cache: IdentityMap,
    objects_to_commit: IdentityMap,
}

impl Database {
    /// Open the database at the configured path with the standard type registry.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
        if !config.path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(&config.path).map_err(StorageError::from)?;
            } else {
                return Err(StorageError::NotFound { path: config.path }.into());
            }
        }
        Ok(Self::with_registry(
            Storage::new(&config.path),
            TypeRegistry::standard(),
            config.compress,
        ))
    }

    /// Build a database over an existing storage and registry.
    pub fn with_registry(storage: Storage, registry: Arc<TypeRegistry>, compress: bool) -> Self {
        let root = if storage.exists(Oid::ROOT, false) {
            ObjectHandle::ghost(Oid::root(), Some(registry::BTREE))
        } else {
            new_root()
        };
        tracing::debug!(path = %storage.path().display(), "opened database");

        Self {
            storage,
            registry,
            compress,
            root: RwLock::new(root),
            cache: Mutex::new(HashMap::new()),
            pre_cache: Mutex::new(HashMap::new()),
            objects_to_commit: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// compute the oid an object would get, without assigning it
    ///
    /// existing oid first, then the hash of the domain id, then a random oid
    pub fn generate_oid(&self, object: &ObjectHandle) -> Oid {
        if let Some(oid) = object.oid() {
            return oid;
        }
        match object.domain_id() {
            Some(id) => Oid::from_domain_id(&id),
            None => Oid::generate(),
        }
    }

    /// generate and assign an oid
    pub fn assign_oid(&self, object: &ObjectHandle) -> Oid {
        let oid = self.generate_oid(object);
        object.set_oid(oid.clone());
        oid
    }

    /// stage an object under the given oid, or a generated one
    pub fn add(&self, object: &ObjectHandle, oid: Option<Oid>) -> DatabaseResult<Oid> {
        let oid = match (oid, object.oid()) {
            (Some(given), Some(current)) if given != current => {
                return Err(DatabaseError::OidMismatch {
                    expected: current,
                    actual: given,
                });
            }
            (Some(given), _) => {
                object.set_oid(given.clone());
                given
            }
            (None, _) => self.assign_oid(object),
        };
        self.stage(oid.clone(), object.clone());
        Ok(oid)
    }

    /// stage an object, checking that its oid still matches its domain id
    pub fn register(&self, object: &ObjectHandle) -> DatabaseResult<Oid> {
        let oid = match object.oid() {
            Some(oid) => oid,
            None => self.assign_oid(object),
        };
        if !oid.is_root() {
            if let Some(id) = object.domain_id() {
                let expected = Oid::from_domain_id(&id);
                if expected != oid {
                    return Err(DatabaseError::OidMismatch { expected, actual: oid });
                }
            }
        }
        self.stage(oid.clone(), object.clone());
        Ok(oid)
    }

    fn stage(&self, oid: Oid, object: ObjectHandle) {
        if oid.is_root() {
            // the root is tracked by `root`, not by the identity maps
            return;
        }
        self.objects_to_commit.lock().insert(oid, object);
    }

    /// an in-memory instance for the oid, if any
    pub fn get_cached(&self, oid: &Oid) -> Option<ObjectHandle> {
        if oid.is_root() {
            return Some(self.root.read().clone());
        }
        if let Some(object) = self.cache.lock().get(oid) {
            return Some(object.clone());
        }
        if let Some(object) = self.pre_cache.lock().get(oid) {
            return Some(object.clone());
        }
        self.objects_to_commit.lock().get(oid).cloned()
    }

    /// the single instance for an oid referenced from a stored object
    ///
    /// returns the cached instance if there is one, otherwise a ghost that
    /// is added to the cache
    pub(crate) fn ghost(&self, oid: Oid, type_tag: TypeTag) -> ObjectHandle {
        if let Some(object) = self.get_cached(&oid) {
            return object;
        }
        let ghost = ObjectHandle::ghost(oid.clone(), Some(type_tag));
        self.cache.lock().insert(oid, ghost.clone());
        ghost
    }

    /// fetch a loaded object by oid
    pub fn get(&self, oid: &Oid) -> DatabaseResult<ObjectHandle> {
        if let Some(object) = self.get_cached(oid) {
            self.materialize(&object)?;
            return Ok(object);
        }

        let object = ObjectHandle::ghost(oid.clone(), None);
        self.pre_cache.lock().insert(oid.clone(), object.clone());
        let loaded = self.load_state(oid, &object);
        self.pre_cache.lock().remove(oid);
        loaded?;

        self.cache.lock().insert(oid.clone(), object.clone());
        Ok(object)
    }

    /// fetch a loaded object by its domain id
    pub fn get_by_id(&self, id: &str) -> DatabaseResult<ObjectHandle> {
        self.get(&Oid::from_domain_id(id))
    }

    /// load a ghost's body; no-op for loaded objects
    pub fn materialize(&self, object: &ObjectHandle) -> DatabaseResult<()> {
        if !object.is_ghost() {
            return Ok(());
        }
        let oid = object.oid().ok_or(DatabaseError::Ghost)?;
        self.load_state(&oid, object)
    }

    /// the fields of an object, loading it first if it is a ghost
    pub fn fields(&self, object: &ObjectHandle) -> DatabaseResult<Fields> {
        self.materialize(object)?;
        object.fields()
    }

    fn load_state(&self, oid: &Oid, object: &ObjectHandle) -> DatabaseResult<()> {
        let data = self.storage.load(oid.as_str(), false).map_err(|e| {
            if e.is_not_found() {
                DatabaseError::ObjectNotFound(oid.clone())
            } else {
                e.into()
            }
        })?;
        let record = ObjectReader::new(self).deserialize(&data)?;

        if let Some(stored) = &record.oid {
            if stored != oid {
                return Err(DatabaseError::OidMismatch {
                    expected: oid.clone(),
                    actual: stored.clone(),
                });
            }
        }
        if let Some(expected) = object.type_tag() {
            if expected != record.type_tag {
                return Err(DatabaseError::TypeMismatch {
                    expected: expected.name().to_string(),
                    found: record.type_tag.name().to_string(),
                });
            }
        }

        self.apply(object, record)?;
        tracing::trace!(oid = oid.short(), "loaded object");
        Ok(())
    }

    fn apply(&self, object: &ObjectHandle, record: Record) -> DatabaseResult<()> {
        let spec = *self.registry.spec(record.type_tag)?;
        object.load(record.type_tag, record.fields);
        if spec.frozen_on_load {
            object.freeze();
        }
        Ok(())
    }

    /// read an object from an arbitrary file, bypassing the identity maps
    ///
    /// used for the local/base/remote copies of a conflicting file; nested
    /// references still resolve through this database
    pub fn get_from_path(&self, path: &Path) -> DatabaseResult<ObjectHandle> {
        let data = self.storage.load(&path.to_string_lossy(), true)?;
        let record = ObjectReader::new(self).deserialize(&data)?;
        let oid = record
            .oid
            .clone()
            .ok_or_else(|| DatabaseError::CorruptData(format!("{} has no oid", path.display())))?;

        let object = ObjectHandle::ghost(oid, None);
        let spec = *self.registry.spec(record.type_tag)?;
        object.load(record.type_tag, record.fields);
        if spec.frozen_on_load {
            object.freeze();
        }
        Ok(object)
    }

    /// write one object to an arbitrary file
    ///
    /// new or modified nested objects are staged for the next `commit()`
    pub fn persist_to_path(&self, object: &ObjectHandle, path: &Path) -> DatabaseResult<()> {
        let tag = object.type_tag().ok_or(DatabaseError::Ghost)?;
        let compress = self.compress && self.registry.spec(tag)?.compressed;
        let data = ObjectWriter::new(self).serialize(object)?;
        self.storage.store(&path.to_string_lossy(), &data, compress, true)?;
        Ok(())
    }

    /// write every new or modified object; returns the number of files written
    pub fn commit(&self) -> DatabaseResult<usize> {
        let dirty: Vec<(Oid, ObjectHandle)> = self
            .cache
            .lock()
            .iter()
            .filter(|(_, object)| object.status() == ObjectStatus::Dirty)
            .map(|(oid, object)| (oid.clone(), object.clone()))
            .collect();
        for (oid, object) in dirty {
            self.stage(oid, object);
        }

        let mut written = 0;
        let root = self.root.read().clone();
        if root.status() != ObjectStatus::Clean {
            self.store_object(&root)?;
            root.mark_clean();
            written += 1;
        }

        loop {
            let next = {
                let mut staged = self.objects_to_commit.lock();
                let oid = staged.keys().next().cloned();
                oid.and_then(|oid| staged.remove_entry(&oid))
            };
            let Some((oid, object)) = next else { break };

            if matches!(object.status(), ObjectStatus::New | ObjectStatus::Dirty) {
                self.store_object(&object)?;
                written += 1;
            }
            object.mark_clean();
            self.cache.lock().insert(oid, object);
        }

        tracing::debug!(written, "committed database");
        Ok(written)
    }

    fn store_object(&self, object: &ObjectHandle) -> DatabaseResult<()> {
        let tag = object.type_tag().ok_or(DatabaseError::Ghost)?;
        let compress = self.compress && self.registry.spec(tag)?.compressed;
        let data = ObjectWriter::new(self).serialize(object)?;
        let oid = object.oid().ok_or(DatabaseError::Ghost)?;
        self.storage.store(oid.as_str(), &data, compress, false)?;
        tracing::trace!(oid = oid.short(), type_tag = %tag, compress, "stored object");
        Ok(())
    }

    /// the root B-tree, loaded
    pub fn root(&self) -> DatabaseResult<ObjectHandle> {
        let root = self.root.read().clone();
        self.materialize(&root)?;
        Ok(root)
    }

    /// create a named index under the root
    pub fn add_index(&self, name: &str, object_type: TypeTag, attribute: Option<&str>) -> DatabaseResult<Index> {
        let root = self.root()?;
        if root.field(name)?.is_some() {
            return Err(DatabaseError::NameTaken(name.to_string()));
        }
        let index = Index::new(name, object_type, attribute);
        root.set_field(name, Node::Index(index.clone()))?;
        Ok(index)
    }

    /// put a persistent object under a name in the root
    pub fn add_root_object(&self, name: &str, object: &ObjectHandle) -> DatabaseResult<()> {
        let root = self.root()?;
        if root.field(name)?.is_some() {
            return Err(DatabaseError::NameTaken(name.to_string()));
        }
        root.set_field(name, Node::Persistent(object.clone()))?;
        Ok(())
    }

    pub fn root_entry(&self, name: &str) -> DatabaseResult<Node> {
        self.root()?
            .field(name)?
            .ok_or_else(|| DatabaseError::NoSuchRootEntry(name.to_string()))
    }

    pub fn index(&self, name: &str) -> DatabaseResult<Index> {
        match self.root_entry(name)? {
            Node::Index(index) => Ok(index),
            other => Err(DatabaseError::TypeMismatch {
                expected: "index".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// a persistent root entry, loaded
    pub fn root_object(&self, name: &str) -> DatabaseResult<ObjectHandle> {
        match self.root_entry(name)? {
            Node::Persistent(object) => {
                self.materialize(&object)?;
                Ok(object)
            }
            other => Err(DatabaseError::TypeMismatch {
                expected: "persistent object".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// drop all in-memory state and start from an empty root
    ///
    /// files already on disk are left alone
    pub fn clear(&self) {
        self.cache.lock().clear();
        self.pre_cache.lock().clear();
        self.objects_to_commit.lock().clear();
        *self.root.write() = new_root();
        tracing::debug!(path = %self.storage.path().display(), "cleared database");
    }

    /// register a typed domain value as a new persistent object
    pub fn insert<T: Persistable>(&self, value: &T) -> DatabaseResult<ObjectHandle> {
        let object = ObjectHandle::new(T::TYPE, value.to_fields());
        self.register(&object)?;
        Ok(object)
    }

    pub fn load<T: Persistable>(&self, oid: &Oid) -> DatabaseResult<T> {
        let object = self.get(oid)?;
        self.decode(&object)
    }

    pub fn load_by_id<T: Persistable>(&self, id: &str) -> DatabaseResult<T> {
        self.load(&Oid::from_domain_id(id))
    }

    /// decode a persistent object into its typed form
    pub fn decode<T: Persistable>(&self, object: &ObjectHandle) -> DatabaseResult<T> {
        self.materialize(object)?;
        match object.type_tag() {
            Some(tag) if tag == T::TYPE => object.with_fields(|fields| T::from_fields(fields))?,
            other => Err(DatabaseError::TypeMismatch {
                expected: T::TYPE.name().to_string(),
                found: other.map(|t| t.name()).unwrap_or("unknown").to_string(),
            }),
        }
    }
}

fn new_root() -> ObjectHandle {
    let root = ObjectHandle::new(registry::BTREE, Fields::new());
    root.set_oid(Oid::root());
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TypeSpec;
    use tempfile::TempDir;

    const NOTE: TypeTag = TypeTag::new("tests.Note");
    const FROZEN_NOTE: TypeTag = TypeTag::new("tests.FrozenNote");

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let mut registry = TypeRegistry::new();
        registry.register(TypeSpec::record(NOTE));
        registry.register(TypeSpec::record(FROZEN_NOTE).frozen());
        let db = Database::with_registry(Storage::new(dir.path()), Arc::new(registry), true);
        (dir, db)
    }

    fn reopen(dir: &TempDir, db: &Database) -> Database {
        Database::with_registry(Storage::new(dir.path()), Arc::new(db.registry().clone()), true)
    }

    fn note(id: &str, text: &str) -> ObjectHandle {
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from(id));
        fields.insert("text".into(), Node::from(text));
        ObjectHandle::new(NOTE, fields)
    }

    #[test]
    fn test_oid_from_domain_id() {
        let (_dir, db) = setup();
        let a = note("/notes/1", "a");
        let b = note("/notes/1", "b");
        assert_eq!(db.generate_oid(&a), db.generate_oid(&b));
        assert_eq!(db.generate_oid(&a), Oid::from_domain_id("/notes/1"));

        let anonymous = ObjectHandle::new(NOTE, Fields::new());
        let other = ObjectHandle::new(NOTE, Fields::new());
        assert_ne!(db.generate_oid(&anonymous), db.generate_oid(&other));
    }

    #[test]
    fn test_commit_and_reload() {
        let (dir, db) = setup();
        let obj = note("/notes/1", "hello");
        let oid = db.register(&obj).unwrap();
        assert_eq!(db.commit().unwrap(), 2); // root + note
        assert_eq!(obj.status(), ObjectStatus::Clean);

        let db2 = reopen(&dir, &db);
        let loaded = db2.get(&oid).unwrap();
        assert_eq!(loaded.field("text").unwrap(), Some(Node::from("hello")));
        assert!(db2.get(&oid).unwrap().ptr_eq(&loaded));
    }

    #[test]
    fn test_second_commit_is_noop() {
        let (_dir, db) = setup();
        db.register(&note("/notes/1", "x")).unwrap();
        db.commit().unwrap();
        assert_eq!(db.commit().unwrap(), 0);
    }

    #[test]
    fn test_dirty_cached_object_is_recommitted() {
        let (dir, db) = setup();
        let obj = note("/notes/1", "v1");
        let oid = db.register(&obj).unwrap();
        db.commit().unwrap();

        obj.set_field("text", "v2").unwrap();
        assert_eq!(db.commit().unwrap(), 1);

        let db2 = reopen(&dir, &db);
        assert_eq!(db2.get(&oid).unwrap().field("text").unwrap(), Some(Node::from("v2")));
    }

    #[test]
    fn test_register_detects_oid_drift() {
        let (_dir, db) = setup();
        let obj = note("/notes/1", "x");
        db.register(&obj).unwrap();
        obj.set_field("id", "/notes/2").unwrap();

        let err = db.register(&obj).unwrap_err();
        assert!(matches!(err, DatabaseError::OidMismatch { .. }));
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_add_with_conflicting_oid() {
        let (_dir, db) = setup();
        let obj = note("/notes/1", "x");
        db.add(&obj, None).unwrap();
        let result = db.add(&obj, Some(Oid::from_domain_id("/other")));
        assert!(matches!(result, Err(DatabaseError::OidMismatch { .. })));
    }

    #[test]
    fn test_get_missing_object() {
        let (_dir, db) = setup();
        let err = db.get(&Oid::from_domain_id("/nothing")).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, DatabaseError::ObjectNotFound(_)));
    }

    #[test]
    fn test_frozen_type_is_frozen_on_load() {
        let (dir, db) = setup();
        let mut fields = Fields::new();
        fields.insert("id".into(), Node::from("/frozen/1"));
        let obj = ObjectHandle::new(FROZEN_NOTE, fields);
        let oid = db.register(&obj).unwrap();
        db.commit().unwrap();

        let db2 = reopen(&dir, &db);
        let loaded = db2.get(&oid).unwrap();
        assert!(loaded.is_frozen());
        assert!(matches!(loaded.set_field("x", 1i64), Err(DatabaseError::Frozen(_))));
    }

    #[test]
    fn test_nested_reference_loads_as_ghost() {
        let (dir, db) = setup();
        let child = note("/notes/child", "inner");
        let parent = note("/notes/parent", "outer");
        parent.set_field("child", child.clone()).unwrap();
        let parent_oid = db.register(&parent).unwrap();
        db.commit().unwrap();
        assert!(child.oid().is_some());
        assert_eq!(child.status(), ObjectStatus::Clean);

        let db2 = reopen(&dir, &db);
        let loaded = db2.get(&parent_oid).unwrap();
        let nested = loaded.field("child").unwrap().unwrap();
        let nested = nested.as_persistent().unwrap();
        assert!(nested.is_ghost());

        let fields = db2.fields(nested).unwrap();
        assert_eq!(fields.get("text"), Some(&Node::from("inner")));
        assert!(db2.get_by_id("/notes/child").unwrap().ptr_eq(nested));
    }

    #[test]
    fn test_self_reference_round_trip() {
        let (dir, db) = setup();
        let obj = note("/notes/self", "loop");
        obj.set_field("me", obj.clone()).unwrap();
        let oid = db.register(&obj).unwrap();
        db.commit().unwrap();

        let db2 = reopen(&dir, &db);
        let loaded = db2.get(&oid).unwrap();
        let me = loaded.field("me").unwrap().unwrap();
        assert!(me.as_persistent().unwrap().ptr_eq(&loaded));
    }

    #[test]
    fn test_root_entries() {
        let (dir, db) = setup();
        db.add_index("notes", NOTE, Some("id")).unwrap();
        let err = db.add_index("notes", NOTE, None).unwrap_err();
        assert!(matches!(err, DatabaseError::NameTaken(_)));

        let obj = note("/notes/1", "x");
        db.add_root_object("first", &obj).unwrap();
        db.commit().unwrap();

        let db2 = reopen(&dir, &db);
        let index = db2.index("notes").unwrap();
        assert_eq!(index.name(), "notes");
        assert_eq!(index.object_type(), NOTE);
        let first = db2.root_object("first").unwrap();
        assert_eq!(first.field("text").unwrap(), Some(Node::from("x")));
        assert!(matches!(db2.root_entry("missing"), Err(DatabaseError::NoSuchRootEntry(_))));
    }

    #[test]
    fn test_clear_keeps_files() {
        let (dir, db) = setup();
        let oid = db.register(&note("/notes/1", "x")).unwrap();
        db.add_index("notes", NOTE, Some("id")).unwrap();
        db.commit().unwrap();

        db.clear();
        assert!(db.get_cached(&oid).is_none());
        assert!(matches!(db.index("notes"), Err(DatabaseError::NoSuchRootEntry(_))));
        assert!(db.storage().exists(oid.as_str(), false));
        drop(dir);
    }

    #[test]
    fn test_path_round_trip() {
        let (dir, db) = setup();
        let obj = note("/notes/1", "x");
        db.assign_oid(&obj);
        let path = dir.path().join("copy");
        db.persist_to_path(&obj, &path).unwrap();

        let copy = db.get_from_path(&path).unwrap();
        assert!(!copy.ptr_eq(&obj));
        assert_eq!(copy.oid(), obj.oid());
        assert_eq!(copy.fields().unwrap(), obj.fields().unwrap());
    }
}
