//! The dynamic-object protocol and its standard implementation.
//!
//! `DynamicObject` is the seam between the interpreter and every value
//! that has properties: plain scripted objects, built-in prototypes, and
//! the host-backed wrappers in the interop layer all implement it.
//! `ScriptObject` is the standard slot-backed implementation.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{MessageId, ScriptError, ScriptResult};
use crate::property_map::PropertyMap;
use crate::slot::{PropertyDescriptor, Slot, SlotValue, attrib, check_attributes};
use crate::value::{PropertyKey, Value, same_object};

/// Shared handle to a dynamic object.
pub type ObjectRef = Arc<dyn DynamicObject>;

/// Hint for [`DynamicObject::default_value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeHint {
    /// No preference (treated as string-first).
    Default,
    /// Prefer a string result.
    String,
    /// Prefer a numeric result.
    Number,
}

/// The property protocol every dynamic value implements.
///
/// `this` parameters carry the object the access started on, so accessor
/// slots found on a prototype run against the original receiver.
pub trait DynamicObject: Send + Sync {
    /// Class name used by `typeof`-style display and default values.
    fn class_name(&self) -> &str;

    /// Own-property check (no prototype walk).
    fn has_own(&self, key: &PropertyKey) -> bool;

    /// Property check including the prototype chain.
    fn has(&self, key: &PropertyKey) -> bool {
        if self.has_own(key) {
            return true;
        }
        match self.prototype() {
            Some(proto) => proto.has(key),
            None => false,
        }
    }

    /// Read a property, walking the prototype chain.
    ///
    /// Returns `None` when the key is absent everywhere. Accessor slots
    /// invoke their getter against `this`; a getter-less accessor reads
    /// as undefined.
    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>>;

    /// Write a property.
    ///
    /// Non-strict mode reproduces the language's silent failures: writes
    /// to read-only or setter-less properties and writes on non-extensible
    /// objects are no-ops. Strict mode raises a type error instead.
    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()>;

    /// Delete an own property. Permanent slots make this a no-op
    /// (non-strict) or a type error (strict).
    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()>;

    /// The attribute bitset of an own property.
    fn get_attributes(&self, key: &PropertyKey) -> Option<u8>;

    /// Replace the attribute bitset of an own property. Unknown keys are
    /// ignored; undefined bits are fatal.
    fn set_attributes(&self, key: &PropertyKey, attributes: u8);

    /// The prototype link.
    fn prototype(&self) -> Option<ObjectRef>;

    /// Replace the prototype link; rejects chains that would cycle back
    /// through this object.
    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()>;

    /// The enclosing lexical scope object.
    fn parent_scope(&self) -> Option<ObjectRef>;

    /// Replace the enclosing lexical scope object.
    fn set_parent_scope(&self, scope: Option<ObjectRef>);

    /// Enumerable own keys: integer indices ascending, then string keys
    /// in insertion order. This exact ordering is load-bearing.
    fn ids(&self) -> Vec<PropertyKey>;

    /// All own keys including non-enumerable ones and symbols.
    fn all_ids(&self) -> Vec<PropertyKey>;

    /// ECMAScript-style descriptor (re)definition with validity checks
    /// against non-configurable properties.
    fn define_own_property(
        &self,
        key: PropertyKey,
        descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()>;

    /// Forbid adding new properties.
    fn prevent_extensions(&self);

    /// Whether new properties may be added.
    fn is_extensible(&self) -> bool;

    /// Seal: prevent extensions and make every existing slot permanent.
    /// Writable slots stay writable.
    fn seal(&self) {
        self.prevent_extensions();
        for key in self.all_ids() {
            if let Some(attributes) = self.get_attributes(&key) {
                self.set_attributes(&key, attributes | attrib::PERMANENT);
            }
        }
    }

    /// Sealed: non-extensible with every slot permanent.
    fn is_sealed(&self) -> bool {
        !self.is_extensible()
            && self.all_ids().iter().all(|key| {
                self.get_attributes(key)
                    .is_some_and(|a| a & attrib::PERMANENT != 0)
            })
    }

    /// Convert to a primitive using `toString`/`valueOf` in hint order,
    /// falling back to `"[object <class>]"`.
    fn default_value(&self, hint: TypeHint, this: &Value) -> ScriptResult<Value>;

    /// Invoke this object as a function. Most objects are not callable.
    fn call(&self, _this: &Value, _args: &[Value]) -> ScriptResult<Value> {
        Err(ScriptError::type_error(
            MessageId::NotCallable,
            [format!("[object {}]", self.class_name())],
        ))
    }

    /// Invoke this object as a constructor.
    fn construct(&self, _args: &[Value]) -> ScriptResult<Value> {
        Err(ScriptError::type_error(
            MessageId::NotConstructible,
            [format!("[object {}]", self.class_name())],
        ))
    }

    /// Downcast hook for concrete wrapper types.
    fn as_any(&self) -> &dyn Any;
}

struct ObjectState {
    map: PropertyMap,
    prototype: Option<ObjectRef>,
    parent: Option<ObjectRef>,
    extensible: bool,
}

/// The standard slot-backed dynamic object.
pub struct ScriptObject {
    class_name: String,
    state: RwLock<ObjectState>,
}

impl ScriptObject {
    /// Create an empty extensible object with no prototype.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            state: RwLock::new(ObjectState {
                map: PropertyMap::new(),
                prototype: None,
                parent: None,
                extensible: true,
            }),
        }
    }

    /// Create an object with the given prototype.
    pub fn with_prototype(class_name: impl Into<String>, proto: ObjectRef) -> Self {
        let object = Self::new(class_name);
        object.state.write().prototype = Some(proto);
        object
    }

    /// Define (or overwrite) a data property with explicit attributes,
    /// bypassing extensibility and readonly checks. This is the engine's
    /// tool for populating objects, not a script-visible operation.
    pub fn define_property(&self, key: impl Into<PropertyKey>, value: Value, attributes: u8) {
        check_attributes(attributes);
        let key = key.into();
        self.state
            .write()
            .map
            .insert(Slot::data(key, value, attributes));
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.state.read().map.len()
    }

    /// True when the object has no own properties.
    pub fn is_empty(&self) -> bool {
        self.state.read().map.is_empty()
    }

    fn own_slot(&self, key: &PropertyKey) -> Option<Slot> {
        self.state.read().map.get(key).cloned()
    }

    /// First slot for `key` found on the prototype chain (excluding this
    /// object), together with nothing else: put() needs it to honor
    /// inherited accessors and readonly data slots.
    fn chain_slot(&self, key: &PropertyKey) -> Option<Slot> {
        let mut current = self.state.read().prototype.clone();
        while let Some(object) = current {
            if let Some(script) = object.as_any().downcast_ref::<ScriptObject>() {
                if let Some(slot) = script.own_slot(key) {
                    return Some(slot);
                }
                current = script.state.read().prototype.clone();
            } else {
                // Foreign implementations answer through the protocol; an
                // inherited slot there behaves as writable data.
                if object.has_own(key) {
                    return None;
                }
                current = object.prototype();
            }
        }
        None
    }

    fn validate_redefine(current: &Slot, descriptor: &PropertyDescriptor) -> bool {
        if !current.is_permanent() {
            return true;
        }
        // Non-configurable: configurable/enumerable flips and
        // representation changes are rejected.
        if descriptor.configurable == Some(true) {
            return false;
        }
        if let Some(enumerable) = descriptor.enumerable {
            if enumerable == current.is_dont_enum() {
                return false;
            }
        }
        match &current.value {
            SlotValue::Data(value) => {
                if descriptor.is_accessor_descriptor() {
                    return false;
                }
                if current.is_readonly() {
                    if descriptor.writable == Some(true) {
                        return false;
                    }
                    if let Some(new_value) = &descriptor.value {
                        if !new_value.same_value(value) {
                            return false;
                        }
                    }
                }
                true
            }
            SlotValue::Accessor { getter, setter } => {
                if descriptor.is_data_descriptor() {
                    return false;
                }
                let same = |old: &Option<Value>, new: &Option<Value>| match (old, new) {
                    (_, None) => true,
                    (Some(a), Some(b)) => a.same_value(b),
                    (None, Some(_)) => false,
                };
                same(getter, &descriptor.getter) && same(setter, &descriptor.setter)
            }
        }
    }

    fn apply_descriptor(current: Option<&Slot>, key: PropertyKey, d: &PropertyDescriptor) -> Slot {
        let current_desc = current.map(Slot::to_descriptor).unwrap_or_default();
        let pick = |new: &Option<bool>, old: &Option<bool>| new.or(*old).unwrap_or(false);
        let enumerable = pick(&d.enumerable, &current_desc.enumerable);
        let configurable = pick(&d.configurable, &current_desc.configurable);
        let mut attributes = attrib::EMPTY;
        if !enumerable {
            attributes |= attrib::DONTENUM;
        }
        if !configurable {
            attributes |= attrib::PERMANENT;
        }
        if d.is_accessor_descriptor()
            || (!d.is_data_descriptor() && !current.map(Slot::is_data).unwrap_or(true))
        {
            let getter = d.getter.clone().or(current_desc.getter);
            let setter = d.setter.clone().or(current_desc.setter);
            Slot::accessor(key, getter, setter, attributes)
        } else {
            if !pick(&d.writable, &current_desc.writable) {
                attributes |= attrib::READONLY;
            }
            let value = d
                .value
                .clone()
                .or(current_desc.value)
                .unwrap_or(Value::Undefined);
            Slot::data(key, value, attributes)
        }
    }
}

impl DynamicObject for ScriptObject {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        self.state.read().map.get(key).is_some()
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        let (slot, proto) = {
            let state = self.state.read();
            (state.map.get(key).cloned(), state.prototype.clone())
        };
        match slot {
            Some(slot) => match slot.value {
                SlotValue::Data(value) => Ok(Some(value)),
                SlotValue::Accessor { getter, .. } => match getter {
                    Some(Value::Object(f)) => f.call(this, &[]).map(Some),
                    _ => Ok(Some(Value::Undefined)),
                },
            },
            None => match proto {
                Some(proto) => proto.get(key, this),
                None => Ok(None),
            },
        }
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        // Own slot first.
        if let Some(slot) = self.own_slot(key) {
            match slot.value {
                SlotValue::Data(_) => {
                    if slot.is_uninitialized_const() {
                        let mut state = self.state.write();
                        if let Some(slot) = state.map.get_mut(key) {
                            slot.initialize_const();
                            slot.value = SlotValue::Data(value);
                        }
                        return Ok(());
                    }
                    if slot.is_readonly() {
                        return if strict {
                            Err(ScriptError::type_error(
                                MessageId::ReadOnlyProperty,
                                [key.to_display()],
                            ))
                        } else {
                            Ok(())
                        };
                    }
                    let mut state = self.state.write();
                    if let Some(slot) = state.map.get_mut(key) {
                        slot.value = SlotValue::Data(value);
                    }
                    return Ok(());
                }
                SlotValue::Accessor { setter, .. } => {
                    return run_setter(setter, key, self_value_hint(), value, strict);
                }
            }
        }

        // Inherited accessors and readonly data slots intercept the write.
        if let Some(slot) = self.chain_slot(key) {
            match slot.value {
                SlotValue::Accessor { setter, .. } => {
                    return run_setter(setter, key, self_value_hint(), value, strict);
                }
                SlotValue::Data(_) if slot.is_readonly() => {
                    return if strict {
                        Err(ScriptError::type_error(
                            MessageId::ReadOnlyProperty,
                            [key.to_display()],
                        ))
                    } else {
                        Ok(())
                    };
                }
                SlotValue::Data(_) => {}
            }
        }

        // Fresh own property.
        let mut state = self.state.write();
        if !state.extensible {
            return if strict {
                Err(ScriptError::type_error(
                    MessageId::NotExtensible,
                    [key.to_display()],
                ))
            } else {
                Ok(())
            };
        }
        state
            .map
            .insert(Slot::data(key.clone(), value, attrib::EMPTY));
        Ok(())
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        let mut state = self.state.write();
        match state.map.get(key) {
            Some(slot) if slot.is_permanent() => {
                if strict {
                    Err(ScriptError::type_error(
                        MessageId::PermanentProperty,
                        [key.to_display()],
                    ))
                } else {
                    Ok(())
                }
            }
            Some(_) => {
                state.map.remove(key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        self.state.read().map.get(key).map(Slot::attributes)
    }

    fn set_attributes(&self, key: &PropertyKey, attributes: u8) {
        check_attributes(attributes);
        if let Some(slot) = self.state.write().map.get_mut(key) {
            slot.set_attributes(attributes);
        }
    }

    fn prototype(&self) -> Option<ObjectRef> {
        self.state.read().prototype.clone()
    }

    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()> {
        if let Some(start) = &proto {
            let mut current = Some(start.clone());
            while let Some(object) = current {
                if std::ptr::eq(object.as_any() as *const _ as *const u8, self as *const _
                    as *const u8)
                {
                    return Err(ScriptError::type_error(
                        MessageId::PrototypeCycle,
                        Vec::<String>::new(),
                    ));
                }
                current = object.prototype();
            }
        }
        self.state.write().prototype = proto;
        Ok(())
    }

    fn parent_scope(&self) -> Option<ObjectRef> {
        self.state.read().parent.clone()
    }

    fn set_parent_scope(&self, scope: Option<ObjectRef>) {
        self.state.write().parent = scope;
    }

    fn ids(&self) -> Vec<PropertyKey> {
        self.state.read().map.ordered_keys(false)
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        self.state.read().map.all_keys()
    }

    fn define_own_property(
        &self,
        key: PropertyKey,
        descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()> {
        let mut state = self.state.write();
        let current = state.map.get(&key).cloned();
        match &current {
            None => {
                if !state.extensible {
                    return Err(ScriptError::type_error(
                        MessageId::NotExtensible,
                        [key.to_display()],
                    ));
                }
            }
            Some(slot) => {
                if !Self::validate_redefine(slot, descriptor) {
                    return Err(ScriptError::type_error(
                        MessageId::RedefineNonConfigurable,
                        [key.to_display()],
                    ));
                }
            }
        }
        let slot = Self::apply_descriptor(current.as_ref(), key, descriptor);
        state.map.insert(slot);
        Ok(())
    }

    fn prevent_extensions(&self) {
        self.state.write().extensible = false;
    }

    fn is_extensible(&self) -> bool {
        self.state.read().extensible
    }

    fn default_value(&self, hint: TypeHint, this: &Value) -> ScriptResult<Value> {
        let order: [&str; 2] = match hint {
            TypeHint::Number => ["valueOf", "toString"],
            TypeHint::String | TypeHint::Default => ["toString", "valueOf"],
        };
        for name in order {
            let key = PropertyKey::new(name);
            if let Some(Value::Object(f)) = self.get(&key, this)? {
                let result = f.call(this, &[])?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Ok(Value::string(format!("[object {}]", self.class_name)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Receiver placeholder used when a setter runs without an explicit start
/// object (plain `put` through the protocol).
fn self_value_hint() -> Value {
    Value::Undefined
}

fn run_setter(
    setter: Option<Value>,
    key: &PropertyKey,
    this: Value,
    value: Value,
    strict: bool,
) -> ScriptResult<()> {
    match setter {
        Some(Value::Object(f)) => {
            f.call(&this, &[value])?;
            Ok(())
        }
        _ => {
            if strict {
                Err(ScriptError::type_error(
                    MessageId::GetterOnly,
                    [key.to_display()],
                ))
            } else {
                Ok(())
            }
        }
    }
}

/// A callable object backed by a native Rust closure.
///
/// Used for accessor functions, materialized prototype members, and bound
/// host methods.
pub struct NativeFunction {
    base: ScriptObject,
    func: NativeFn,
}

/// Closure type behind [`NativeFunction`].
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> ScriptResult<Value> + Send + Sync>;

impl NativeFunction {
    /// Wrap a closure as a callable object.
    pub fn new(name: &str, func: NativeFn) -> Arc<Self> {
        let base = ScriptObject::new("Function");
        base.define_property(
            "name",
            Value::string(name),
            attrib::READONLY | attrib::DONTENUM,
        );
        Arc::new(Self { base, func })
    }

    /// Convenience wrapper producing a callable `Value`.
    pub fn value(
        name: &str,
        f: impl Fn(&Value, &[Value]) -> ScriptResult<Value> + Send + Sync + 'static,
    ) -> Value {
        Value::object(Self::new(name, Arc::new(f)))
    }
}

impl DynamicObject for NativeFunction {
    fn class_name(&self) -> &str {
        "Function"
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        self.base.has_own(key)
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        self.base.get(key, this)
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        self.base.put(key, value, strict)
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        self.base.delete(key, strict)
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        self.base.get_attributes(key)
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
        self.base.ids()
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        self.base.all_ids()
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

    fn default_value(&self, _hint: TypeHint, _this: &Value) -> ScriptResult<Value> {
        let name = self
            .base
            .own_slot(&PropertyKey::new("name"))
            .and_then(|slot| match slot.value {
                SlotValue::Data(Value::String(s)) => Some(s.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(Value::string(format!("function {name}() {{ [native code] }}")))
    }

    fn call(&self, this: &Value, args: &[Value]) -> ScriptResult<Value> {
        (self.func)(this, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Compare two object handles for identity (re-export convenience).
pub fn is_same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    same_object(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> Arc<ScriptObject> {
        Arc::new(ScriptObject::new("Object"))
    }

    fn key(name: &str) -> PropertyKey {
        PropertyKey::new(name)
    }

    #[test]
    fn test_get_walks_prototype_chain() {
        let proto = object();
        proto.define_property("inherited", Value::int32(7), attrib::EMPTY);
        let child = object();
        child.set_prototype(Some(proto.clone() as ObjectRef)).unwrap();

        let got = child.get(&key("inherited"), &Value::Undefined).unwrap();
        assert_eq!(got.unwrap().as_int32(), Some(7));
        assert!(child.get(&key("missing"), &Value::Undefined).unwrap().is_none());
        assert!(child.has(&key("inherited")));
        assert!(!child.has_own(&key("inherited")));
    }

    #[test]
    fn test_put_readonly_silent_vs_strict() {
        let obj = object();
        obj.define_property("x", Value::int32(1), attrib::READONLY);
        obj.put(&key("x"), Value::int32(2), false).unwrap();
        assert_eq!(
            obj.get(&key("x"), &Value::Undefined).unwrap().unwrap().as_int32(),
            Some(1)
        );
        let err = obj.put(&key("x"), Value::int32(2), true).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn test_put_on_non_extensible_is_silent_noop() {
        let obj = object();
        obj.prevent_extensions();
        obj.put(&key("new"), Value::int32(1), false).unwrap();
        assert!(!obj.has_own(&key("new")));
        assert!(obj.put(&key("new"), Value::int32(1), true).is_err());
    }

    #[test]
    fn test_accessor_without_setter() {
        let obj = object();
        let getter = NativeFunction::value("get x", |_, _| Ok(Value::int32(10)));
        obj.define_own_property(
            key("x"),
            &PropertyDescriptor::accessor(Some(getter), None, true, true),
        )
        .unwrap();

        let got = obj.get(&key("x"), &Value::Undefined).unwrap().unwrap();
        assert_eq!(got.as_int32(), Some(10));
        // Silent in non-strict mode, type error in strict mode.
        obj.put(&key("x"), Value::int32(1), false).unwrap();
        assert!(obj.put(&key("x"), Value::int32(1), true).is_err());
    }

    #[test]
    fn test_delete_permanent() {
        let obj = object();
        obj.define_property("keep", Value::int32(1), attrib::PERMANENT);
        obj.delete(&key("keep"), false).unwrap();
        assert!(obj.has_own(&key("keep")));
        assert!(obj.delete(&key("keep"), true).is_err());
        obj.define_property("drop", Value::int32(2), attrib::EMPTY);
        obj.delete(&key("drop"), false).unwrap();
        assert!(!obj.has_own(&key("drop")));
    }

    #[test]
    fn test_define_then_get_attributes_round_trip() {
        let obj = object();
        let attrs = attrib::READONLY | attrib::DONTENUM;
        obj.define_property("x", Value::int32(1), attrs);
        assert_eq!(obj.get_attributes(&key("x")), Some(attrs));
    }

    #[test]
    fn test_redefine_non_configurable_rejected() {
        let obj = object();
        obj.define_own_property(
            key("x"),
            &PropertyDescriptor::data(Value::int32(1), false, true, false),
        )
        .unwrap();

        // writable false -> true
        let err = obj
            .define_own_property(
                key("x"),
                &PropertyDescriptor {
                    writable: Some(true),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));

        // value change while non-writable
        assert!(
            obj.define_own_property(
                key("x"),
                &PropertyDescriptor {
                    value: Some(Value::int32(2)),
                    ..Default::default()
                },
            )
            .is_err()
        );

        // data -> accessor conversion
        let getter = NativeFunction::value("g", |_, _| Ok(Value::Undefined));
        assert!(
            obj.define_own_property(
                key("x"),
                &PropertyDescriptor::accessor(Some(getter), None, true, false),
            )
            .is_err()
        );

        // The property is unchanged.
        let got = obj.get(&key("x"), &Value::Undefined).unwrap().unwrap();
        assert_eq!(got.as_int32(), Some(1));

        // Same-value redefinition is allowed.
        obj.define_own_property(
            key("x"),
            &PropertyDescriptor {
                value: Some(Value::int32(1)),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_redefine_configurable_switches_representation() {
        let obj = object();
        obj.define_own_property(
            key("x"),
            &PropertyDescriptor::data(Value::int32(1), true, true, true),
        )
        .unwrap();
        let getter = NativeFunction::value("g", |_, _| Ok(Value::int32(5)));
        obj.define_own_property(
            key("x"),
            &PropertyDescriptor::accessor(Some(getter), None, true, true),
        )
        .unwrap();
        let got = obj.get(&key("x"), &Value::Undefined).unwrap().unwrap();
        assert_eq!(got.as_int32(), Some(5));
    }

    #[test]
    fn test_enumeration_order() {
        let obj = object();
        for name in ["b", "2", "a", "0"] {
            obj.put(&key(name), Value::int32(0), false).unwrap();
        }
        let ids: Vec<String> = obj.ids().iter().map(|k| k.to_display()).collect();
        assert_eq!(ids, ["0", "2", "b", "a"]);
    }

    #[test]
    fn test_seal() {
        let obj = object();
        obj.define_property("x", Value::int32(1), attrib::EMPTY);
        obj.seal();
        assert!(obj.is_sealed());
        obj.put(&key("y"), Value::int32(2), false).unwrap();
        assert!(!obj.has_own(&key("y")));
        // Existing writable property stays mutable.
        obj.put(&key("x"), Value::int32(3), false).unwrap();
        let got = obj.get(&key("x"), &Value::Undefined).unwrap().unwrap();
        assert_eq!(got.as_int32(), Some(3));
        // But it can no longer be deleted.
        obj.delete(&key("x"), false).unwrap();
        assert!(obj.has_own(&key("x")));
    }

    #[test]
    fn test_prototype_cycle_rejected() {
        let a = object();
        let b = object();
        b.set_prototype(Some(a.clone() as ObjectRef)).unwrap();
        let err = a.set_prototype(Some(b.clone() as ObjectRef)).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn test_uninitialized_const_first_write() {
        let obj = object();
        obj.define_property(
            "c",
            Value::Undefined,
            attrib::PERMANENT | attrib::UNINITIALIZED_CONST,
        );
        obj.put(&key("c"), Value::int32(9), false).unwrap();
        assert_eq!(
            obj.get_attributes(&key("c")),
            Some(attrib::PERMANENT),
            "first write clears UNINITIALIZED_CONST"
        );
        let got = obj.get(&key("c"), &Value::Undefined).unwrap().unwrap();
        assert_eq!(got.as_int32(), Some(9));
    }

    #[test]
    fn test_inherited_readonly_blocks_write() {
        let proto = object();
        proto.define_property("x", Value::int32(1), attrib::READONLY);
        let child = object();
        child.set_prototype(Some(proto as ObjectRef)).unwrap();
        child.put(&key("x"), Value::int32(2), false).unwrap();
        assert!(!child.has_own(&key("x")));
        assert!(child.put(&key("x"), Value::int32(2), true).is_err());
    }

    #[test]
    fn test_native_function_call() {
        let f = NativeFunction::value("double", |_, args| {
            Ok(Value::int32(args[0].as_int32().unwrap_or(0) * 2))
        });
        let Value::Object(f) = f else { unreachable!() };
        let result = f.call(&Value::Undefined, &[Value::int32(21)]).unwrap();
        assert_eq!(result.as_int32(), Some(42));
    }
}
