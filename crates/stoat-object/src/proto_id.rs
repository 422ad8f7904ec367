//! Prototype-id fast path for built-in prototype objects.
//!
//! Built-in prototypes carry a small fixed set of well-known members
//! (methods, `length`, ...). Instead of allocating a slot per member on
//! every prototype, the names map to small integer ids backed by a lazily
//! allocated parallel value array. Each id is materialized at most once,
//! under double-checked locking, so concurrent first access still runs the
//! initializer exactly once.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ScriptResult;
use crate::object::{DynamicObject, ObjectRef, ScriptObject, TypeHint};
use crate::slot::{PropertyDescriptor, attrib, check_attributes};
use crate::value::{PropertyKey, Value};

/// Initializer invoked once per id to materialize its value (typically a
/// bound native function).
pub type IdInitializer = dyn Fn(usize) -> Value + Send + Sync;

/// Name→id map plus the lazily populated parallel arrays.
pub struct PrototypeIdMap {
    names: FxHashMap<&'static str, usize>,
    attributes: Vec<u8>,
    /// Allocated on first materialization; `None` until then so a
    /// presence check never pays for the array.
    values: RwLock<Option<Box<[Option<Value>]>>>,
    /// The `constructor` member is held out-of-line: answering
    /// `has("constructor")` must not allocate the value array.
    constructor: RwLock<Option<Value>>,
    /// Ids removed by a script `delete`; the name table itself is fixed.
    deleted: RwLock<FxHashSet<usize>>,
    init: Box<IdInitializer>,
}

impl PrototypeIdMap {
    /// Build a map from `(name, attributes)` entries; ids are assigned in
    /// entry order.
    pub fn new(
        entries: &[(&'static str, u8)],
        init: impl Fn(usize) -> Value + Send + Sync + 'static,
    ) -> Self {
        let mut names = FxHashMap::default();
        let mut attributes = Vec::with_capacity(entries.len());
        for (id, (name, attrs)) in entries.iter().enumerate() {
            check_attributes(*attrs);
            names.insert(*name, id);
            attributes.push(*attrs);
        }
        Self {
            names,
            attributes,
            values: RwLock::new(None),
            constructor: RwLock::new(None),
            deleted: RwLock::new(FxHashSet::default()),
            init: Box::new(init),
        }
    }

    /// The id registered for a name, if any. Deleted ids no longer
    /// resolve.
    pub fn find_id(&self, name: &str) -> Option<usize> {
        let id = self.names.get(name).copied()?;
        (!self.deleted.read().contains(&id)).then_some(id)
    }

    /// Remove an id member, as a script `delete` does.
    pub fn delete(&self, id: usize) {
        self.deleted.write().insert(id);
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when no ids are registered.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes of an id. Out-of-range ids are an engine bug.
    pub fn attributes(&self, id: usize) -> u8 {
        match self.attributes.get(id) {
            Some(attrs) => *attrs,
            None => panic!("unregistered prototype id {id}"),
        }
    }

    /// The value for an id, materializing it on first access.
    pub fn value(&self, id: usize) -> Value {
        assert!(id < self.attributes.len(), "unregistered prototype id {id}");
        // Fast path: already materialized.
        {
            let values = self.values.read();
            if let Some(values) = values.as_ref() {
                if let Some(value) = &values[id] {
                    return value.clone();
                }
            }
        }
        // Slow path: re-check under the write lock so a racing first
        // access initializes exactly once.
        let mut values = self.values.write();
        let values =
            values.get_or_insert_with(|| vec![None; self.attributes.len()].into_boxed_slice());
        if let Some(value) = &values[id] {
            return value.clone();
        }
        let value = (self.init)(id);
        values[id] = Some(value.clone());
        value
    }

    /// The `constructor` member, if one has been installed.
    pub fn constructor(&self) -> Option<Value> {
        self.constructor.read().clone()
    }

    /// Install the `constructor` member.
    pub fn set_constructor(&self, value: Value) {
        *self.constructor.write() = Some(value);
    }

    /// Registered names in id order, skipping deleted ids.
    pub fn names(&self) -> Vec<&'static str> {
        let deleted = self.deleted.read();
        let mut ordered: Vec<(&'static str, usize)> = self
            .names
            .iter()
            .filter(|(_, id)| !deleted.contains(id))
            .map(|(n, i)| (*n, *i))
            .collect();
        ordered.sort_by_key(|(_, id)| *id);
        ordered.into_iter().map(|(n, _)| n).collect()
    }
}

/// A built-in prototype object: id-mapped members in front of an ordinary
/// slot map for everything defined later.
pub struct PrototypeObject {
    base: ScriptObject,
    ids: PrototypeIdMap,
}

impl PrototypeObject {
    /// Create a prototype object for a built-in class.
    pub fn new(class_name: impl Into<String>, ids: PrototypeIdMap) -> Arc<Self> {
        Arc::new(Self {
            base: ScriptObject::new(class_name),
            ids,
        })
    }

    /// The id map (for embedders wiring constructors).
    pub fn id_map(&self) -> &PrototypeIdMap {
        &self.ids
    }

    fn id_key(key: &PropertyKey) -> Option<&str> {
        match key {
            PropertyKey::String(name) => Some(name),
            _ => None,
        }
    }
}

impl DynamicObject for PrototypeObject {
    fn class_name(&self) -> &str {
        self.base.class_name()
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        if let Some(name) = Self::id_key(key) {
            if name == "constructor" {
                return self.ids.constructor().is_some() || self.base.has_own(key);
            }
            if self.ids.find_id(name).is_some() {
                return true;
            }
        }
        self.base.has_own(key)
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        if let Some(name) = Self::id_key(key) {
            if name == "constructor" {
                if let Some(ctor) = self.ids.constructor() {
                    return Ok(Some(ctor));
                }
            } else if let Some(id) = self.ids.find_id(name) {
                return Ok(Some(self.ids.value(id)));
            }
        }
        self.base.get(key, this)
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        // Id members behave like ordinary slots with their registered
        // attributes; a write to a writable id member lands in the slot
        // map and shadows the id from then on.
        if let Some(name) = Self::id_key(key) {
            if let Some(id) = self.ids.find_id(name) {
                if self.ids.attributes(id) & attrib::READONLY != 0 {
                    return if strict {
                        Err(crate::error::ScriptError::type_error(
                            crate::error::MessageId::ReadOnlyProperty,
                            [key.to_display()],
                        ))
                    } else {
                        Ok(())
                    };
                }
                self.base
                    .define_property(key.clone(), value, self.ids.attributes(id));
                return Ok(());
            }
        }
        self.base.put(key, value, strict)
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        if let Some(name) = Self::id_key(key) {
            if let Some(id) = self.ids.find_id(name) {
                if self.ids.attributes(id) & attrib::PERMANENT != 0 {
                    return if strict {
                        Err(crate::error::ScriptError::type_error(
                            crate::error::MessageId::PermanentProperty,
                            [key.to_display()],
                        ))
                    } else {
                        Ok(())
                    };
                }
                // Drop the shadowing slot (if a write created one) along
                // with the id itself.
                self.base.delete(key, strict)?;
                self.ids.delete(id);
                return Ok(());
            }
        }
        self.base.delete(key, strict)
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        if let Some(attrs) = self.base.get_attributes(key) {
            return Some(attrs);
        }
        Self::id_key(key)
            .and_then(|name| self.ids.find_id(name))
            .map(|id| self.ids.attributes(id))
    }

    fn set_attributes(&self, key: &PropertyKey, attributes: u8) {
        self.base.set_attributes(key, attributes)
    }

    fn prototype(&self) -> Option<ObjectRef> {
        self.base.prototype()
    }

    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()> {
        self.base.set_prototype(proto)
    }

    fn parent_scope(&self) -> Option<ObjectRef> {
        self.base.parent_scope()
    }

    fn set_parent_scope(&self, scope: Option<ObjectRef>) {
        self.base.set_parent_scope(scope)
    }

    fn ids(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = Vec::with_capacity(self.ids.len());
        for name in self.ids.names() {
            let key = PropertyKey::new(name);
            if self.ids.attributes(self.ids.find_id(name).unwrap()) & attrib::DONTENUM == 0
                && !self.base.has_own(&key)
            {
                keys.push(key);
            }
        }
        keys.extend(self.base.ids());
        keys
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = self
            .ids
            .names()
            .into_iter()
            .map(PropertyKey::new)
            .filter(|key| !self.base.has_own(key))
            .collect();
        keys.extend(self.base.all_ids());
        keys
    }

    fn define_own_property(
        &self,
        key: PropertyKey,
        descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()> {
        self.base.define_own_property(key, descriptor)
    }

    fn prevent_extensions(&self) {
        self.base.prevent_extensions()
    }

    fn is_extensible(&self) -> bool {
        self.base.is_extensible()
    }

    fn default_value(&self, hint: TypeHint, this: &Value) -> ScriptResult<Value> {
        self.base.default_value(hint, this)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NativeFunction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_map(counter: Arc<AtomicUsize>) -> PrototypeIdMap {
        PrototypeIdMap::new(
            &[("first", attrib::DONTENUM), ("second", attrib::EMPTY)],
            move |id| {
                counter.fetch_add(1, Ordering::SeqCst);
                NativeFunction::value("member", move |_, _| Ok(Value::int32(id as i32)))
            },
        )
    }

    #[test]
    fn test_lazy_materialization_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let map = counted_map(counter.clone());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let a = map.value(0);
        let b = map.value(0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let (Value::Object(a), Value::Object(b)) = (a, b) else {
            panic!("expected functions")
        };
        assert!(crate::object::is_same_object(&a, &b));
    }

    #[test]
    fn test_concurrent_first_access_initializes_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let map = Arc::new(counted_map(counter.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = map.clone();
                std::thread::spawn(move || map.value(1))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_constructor_presence_without_array_allocation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let proto = PrototypeObject::new("Builtin", counted_map(counter.clone()));
        assert!(!proto.has_own(&PropertyKey::new("constructor")));
        proto.id_map().set_constructor(Value::int32(1));
        assert!(proto.has_own(&PropertyKey::new("constructor")));
        assert_eq!(
            proto
                .get(&PropertyKey::new("constructor"), &Value::Undefined)
                .unwrap()
                .unwrap()
                .as_int32(),
            Some(1)
        );
        // No id initializer ran for the presence checks.
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delete_honors_id_member_attributes() {
        let map = PrototypeIdMap::new(
            &[("free", attrib::EMPTY), ("fixed", attrib::PERMANENT)],
            |_| Value::int32(5),
        );
        let proto = PrototypeObject::new("Builtin", map);

        proto.delete(&PropertyKey::new("free"), true).unwrap();
        assert!(!proto.has_own(&PropertyKey::new("free")));
        assert!(proto
            .get(&PropertyKey::new("free"), &Value::Undefined)
            .unwrap()
            .is_none());
        assert_eq!(proto.ids().len(), 1);

        let err = proto.delete(&PropertyKey::new("fixed"), true).unwrap_err();
        assert!(matches!(err, crate::error::ScriptError::Type(_)));
        // Non-strict delete of a permanent member stays a silent no-op.
        proto.delete(&PropertyKey::new("fixed"), false).unwrap();
        assert!(proto.has_own(&PropertyKey::new("fixed")));
    }

    #[test]
    #[should_panic(expected = "unregistered prototype id")]
    fn test_unregistered_id_is_fatal() {
        let map = PrototypeIdMap::new(&[("only", attrib::EMPTY)], |_| Value::Undefined);
        map.value(3);
    }

    #[test]
    fn test_id_members_visible_through_protocol() {
        let counter = Arc::new(AtomicUsize::new(0));
        let proto = PrototypeObject::new("Builtin", counted_map(counter));
        let got = proto
            .get(&PropertyKey::new("second"), &Value::Undefined)
            .unwrap()
            .unwrap();
        let Value::Object(f) = got else { panic!("expected function") };
        assert_eq!(f.call(&Value::Undefined, &[]).unwrap().as_int32(), Some(1));
        // DONTENUM id member hidden from enumeration, visible in all_ids.
        let ids: Vec<String> = proto.ids().iter().map(|k| k.to_display()).collect();
        assert_eq!(ids, ["second"]);
        assert_eq!(proto.all_ids().len(), 2);
    }
}
