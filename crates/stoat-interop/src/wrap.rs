//! Host-backed implementations of the dynamic-object protocol.
//!
//! `HostObject` presents a live host instance, `HostClassObject` presents
//! a registered class (statics plus construction), and `HostArrayObject`
//! presents a host array. Scripts see ordinary objects; every access
//! dispatches through the scope's member tables.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;

use stoat_object::{
    DynamicObject, MessageId, ObjectRef, PropertyDescriptor, PropertyKey, ScriptError,
    ScriptResult, TypeHint, Value, attrib,
};

use crate::host::{ClassId, ClassKind, HostArray, HostInstance, HostValue};
use crate::member::{marshal_arguments, wrap_host_error_script};
use crate::metadata::ClassMembers;
use crate::overload::resolve_memo;
use crate::scope::Scope;

fn reject_cycle(this: *const u8, proto: &Option<ObjectRef>) -> ScriptResult<()> {
    let mut current = proto.clone();
    while let Some(object) = current {
        if std::ptr::eq(object.as_any() as *const _ as *const u8, this) {
            return Err(ScriptError::type_error(
                MessageId::PrototypeCycle,
                Vec::<String>::new(),
            ));
        }
        current = object.prototype();
    }
    Ok(())
}

fn proto_get(
    proto: Option<ObjectRef>,
    key: &PropertyKey,
    this: &Value,
) -> ScriptResult<Option<Value>> {
    match proto {
        Some(proto) => proto.get(key, this),
        None => Ok(None),
    }
}

/// Sorted member names as enumeration keys; host members have no
/// insertion order scripts could observe, so the order is alphabetical
/// for determinism.
fn member_keys(members: &ClassMembers, statics: bool) -> Vec<PropertyKey> {
    let table = if statics {
        &members.statics
    } else {
        &members.members
    };
    let mut names: Vec<&Arc<str>> = table.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| PropertyKey::String(name.clone()))
        .collect()
}

/// A host instance seen as a dynamic object.
pub struct HostObject {
    instance: HostInstance,
    members: Arc<ClassMembers>,
    scope: Arc<Scope>,
    prototype: RwLock<Option<ObjectRef>>,
    parent: RwLock<Option<ObjectRef>>,
}

impl HostObject {
    /// Wrap a host instance for a scope.
    pub fn new(scope: &Arc<Scope>, instance: HostInstance) -> Self {
        let members = scope.members_of(instance.class);
        Self {
            instance,
            members,
            scope: scope.clone(),
            prototype: RwLock::new(None),
            parent: RwLock::new(None),
        }
    }

    /// The wrapped instance.
    pub fn instance(&self) -> &HostInstance {
        &self.instance
    }

    /// The member tables backing this wrapper.
    pub fn members(&self) -> &Arc<ClassMembers> {
        &self.members
    }

    fn indexed_invoke(&self, method: &str, args: &[Value]) -> ScriptResult<Value> {
        match self.members.member(method) {
            Some(member) => member
                .invoke(&self.scope, Some(&self.instance), args)
                .map_err(|e| e.into_script(method)),
            None => Err(ScriptError::type_error(
                MessageId::MemberNotFound,
                [self.members.name.to_string(), method.to_string()],
            )),
        }
    }
}

impl DynamicObject for HostObject {
    fn class_name(&self) -> &str {
        &self.members.name
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        match key {
            PropertyKey::String(name) => {
                self.members.member(name).is_some()
                    || (name.as_ref() == "length" && self.members.indexed.is_some())
            }
            PropertyKey::Index(_) => self.members.indexed.is_some(),
            PropertyKey::Symbol(_) => false,
        }
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        match key {
            PropertyKey::String(name) => {
                if let Some(member) = self.members.member(name) {
                    return member
                        .get(&self.scope, Some(&self.instance), this)
                        .map(Some)
                        .map_err(|e| e.into_script(name));
                }
                if name.as_ref() == "length" {
                    if let Some(indexed) = &self.members.indexed {
                        let length = indexed.length.clone();
                        return self.indexed_invoke(&length, &[]).map(Some);
                    }
                }
            }
            PropertyKey::Index(index) => {
                if let Some(indexed) = &self.members.indexed {
                    let getter = indexed.get.clone();
                    return self
                        .indexed_invoke(&getter, &[Value::int32(*index as i32)])
                        .map(Some);
                }
            }
            PropertyKey::Symbol(_) => {}
        }
        // No own member; inherited properties come from the attached
        // prototype, matching the chain walk `has` performs.
        proto_get(self.prototype(), key, this)
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        match key {
            PropertyKey::String(name) => match self.members.member(name) {
                Some(member) => member
                    .set(&self.scope, Some(&self.instance), &value)
                    .map_err(|e| e.into_script(name)),
                None => match self.prototype() {
                    Some(proto) => proto.put(key, value, strict),
                    None => Err(ScriptError::type_error(
                        MessageId::MemberNotFound,
                        [self.members.name.to_string(), name.to_string()],
                    )),
                },
            },
            PropertyKey::Index(index) => {
                let Some(indexed) = &self.members.indexed else {
                    return match self.prototype() {
                        Some(proto) => proto.put(key, value, strict),
                        None => Err(ScriptError::type_error(
                            MessageId::MemberNotFound,
                            [self.members.name.to_string(), key.to_display()],
                        )),
                    };
                };
                let Some(setter) = indexed.set.clone() else {
                    return Err(ScriptError::type_error(
                        MessageId::ReadOnlyProperty,
                        [key.to_display()],
                    ));
                };
                self.indexed_invoke(&setter, &[Value::int32(*index as i32), value])?;
                Ok(())
            }
            PropertyKey::Symbol(_) => match self.prototype() {
                Some(proto) => proto.put(key, value, strict),
                None => Ok(()),
            },
        }
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        // Host members are permanent.
        if strict && self.has_own(key) {
            return Err(ScriptError::type_error(
                MessageId::PermanentProperty,
                [key.to_display()],
            ));
        }
        Ok(())
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        self.has_own(key).then_some(attrib::PERMANENT)
    }

    fn set_attributes(&self, _key: &PropertyKey, _attributes: u8) {}

    fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()> {
        reject_cycle(self.as_any() as *const _ as *const u8, &proto)?;
        *self.prototype.write() = proto;
        Ok(())
    }

    fn parent_scope(&self) -> Option<ObjectRef> {
        self.parent.read().clone()
    }

    fn set_parent_scope(&self, scope: Option<ObjectRef>) {
        *self.parent.write() = scope;
    }

    fn ids(&self) -> Vec<PropertyKey> {
        member_keys(&self.members, false)
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        self.ids()
    }

    fn define_own_property(
        &self,
        key: PropertyKey,
        _descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()> {
        Err(ScriptError::type_error(
            MessageId::RedefineNonConfigurable,
            [key.to_display()],
        ))
    }

    fn prevent_extensions(&self) {}

    fn is_extensible(&self) -> bool {
        false
    }

    fn default_value(&self, _hint: TypeHint, this: &Value) -> ScriptResult<Value> {
        // A host toString (raw or bean-synthesized) wins over the generic
        // rendering.
        let key = PropertyKey::new("toString");
        if let Some(Value::Object(f)) = self.get(&key, this)? {
            let result = f.call(this, &[])?;
            if !matches!(result, Value::Object(_)) {
                return Ok(result);
            }
        }
        Ok(Value::string(format!("[object {}]", self.members.name)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A registered host class seen as a dynamic object: static members plus
/// construction.
pub struct HostClassObject {
    class: ClassId,
    members: Arc<ClassMembers>,
    scope: Arc<Scope>,
    prototype: RwLock<Option<ObjectRef>>,
    parent: RwLock<Option<ObjectRef>>,
}

impl HostClassObject {
    /// Wrap a registered class for a scope.
    pub fn new(scope: &Arc<Scope>, class: ClassId) -> Self {
        let members = scope.members_of(class);
        Self {
            class,
            members,
            scope: scope.clone(),
            prototype: RwLock::new(None),
            parent: RwLock::new(None),
        }
    }

    /// The class this object represents.
    pub fn class_id(&self) -> ClassId {
        self.class
    }
}

impl DynamicObject for HostClassObject {
    fn class_name(&self) -> &str {
        &self.members.name
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        match key {
            PropertyKey::String(name) => {
                name.as_ref() == "name" || self.members.static_member(name).is_some()
            }
            _ => false,
        }
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        if let PropertyKey::String(name) = key {
            if let Some(member) = self.members.static_member(name) {
                return member
                    .get(&self.scope, None, this)
                    .map(Some)
                    .map_err(|e| e.into_script(name));
            }
            if name.as_ref() == "name" {
                return Ok(Some(Value::string(self.members.name.clone())));
            }
        }
        proto_get(self.prototype(), key, this)
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        let PropertyKey::String(name) = key else {
            return match self.prototype() {
                Some(proto) => proto.put(key, value, strict),
                None => Ok(()),
            };
        };
        match self.members.static_member(name) {
            Some(member) => member
                .set(&self.scope, None, &value)
                .map_err(|e| e.into_script(name)),
            None => match self.prototype() {
                Some(proto) => proto.put(key, value, strict),
                None => Err(ScriptError::type_error(
                    MessageId::MemberNotFound,
                    [self.members.name.to_string(), name.to_string()],
                )),
            },
        }
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        if strict && self.has_own(key) {
            return Err(ScriptError::type_error(
                MessageId::PermanentProperty,
                [key.to_display()],
            ));
        }
        Ok(())
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        self.has_own(key).then_some(attrib::PERMANENT)
    }

    fn set_attributes(&self, _key: &PropertyKey, _attributes: u8) {}

    fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()> {
        reject_cycle(self.as_any() as *const _ as *const u8, &proto)?;
        *self.prototype.write() = proto;
        Ok(())
    }

    fn parent_scope(&self) -> Option<ObjectRef> {
        self.parent.read().clone()
    }

    fn set_parent_scope(&self, scope: Option<ObjectRef>) {
        *self.parent.write() = scope;
    }

    fn ids(&self) -> Vec<PropertyKey> {
        member_keys(&self.members, true)
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        self.ids()
    }

    fn define_own_property(
        &self,
        key: PropertyKey,
        _descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()> {
        Err(ScriptError::type_error(
            MessageId::RedefineNonConfigurable,
            [key.to_display()],
        ))
    }

    fn prevent_extensions(&self) {}

    fn is_extensible(&self) -> bool {
        false
    }

    fn default_value(&self, _hint: TypeHint, _this: &Value) -> ScriptResult<Value> {
        Ok(Value::string(format!("[class {}]", self.members.name)))
    }

    fn call(&self, _this: &Value, args: &[Value]) -> ScriptResult<Value> {
        // Calling a class object constructs, matching `new`-less usage.
        self.construct(args)
    }

    fn construct(&self, args: &[Value]) -> ScriptResult<Value> {
        if self.members.kind != ClassKind::Concrete {
            return Err(ScriptError::type_error(
                MessageId::NotInstantiable,
                [self.members.name.to_string()],
            ));
        }
        let set = &self.members.ctors;
        if set.ctors.is_empty() {
            return Err(ScriptError::type_error(
                MessageId::NotInstantiable,
                [self.members.name.to_string()],
            ));
        }
        let winner = resolve_memo(&self.scope, &self.members.name, &set.memo, &set.ctors, args)?;
        let ctor = &set.ctors[winner];
        let host_args =
            marshal_arguments(&self.scope, &self.members.name, &ctor.params, ctor.variadic, args)?;
        let instance = (ctor.construct)(&host_args)
            .map_err(|e| wrap_host_error_script(&self.scope, &self.members.name, e))?;
        Ok(self.scope.wrap_host(HostValue::Instance(instance)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A host array seen as a dynamic object: live indexed elements plus a
/// read-only `length`.
pub struct HostArrayObject {
    array: HostArray,
    scope: Arc<Scope>,
    prototype: RwLock<Option<ObjectRef>>,
    parent: RwLock<Option<ObjectRef>>,
}

impl HostArrayObject {
    /// Wrap a host array for a scope.
    pub fn new(scope: &Arc<Scope>, array: HostArray) -> Self {
        Self {
            array,
            scope: scope.clone(),
            prototype: RwLock::new(None),
            parent: RwLock::new(None),
        }
    }

    /// The wrapped array.
    pub fn array(&self) -> &HostArray {
        &self.array
    }

    fn out_of_range(&self, index: u32) -> ScriptError {
        ScriptError::range_error(
            MessageId::ArrayIndexOutOfRange,
            [index.to_string(), self.array.len().to_string()],
        )
    }
}

impl DynamicObject for HostArrayObject {
    fn class_name(&self) -> &str {
        "HostArray"
    }

    fn has_own(&self, key: &PropertyKey) -> bool {
        match key {
            PropertyKey::Index(index) => (*index as usize) < self.array.len(),
            PropertyKey::String(name) => name.as_ref() == "length",
            PropertyKey::Symbol(_) => false,
        }
    }

    fn get(&self, key: &PropertyKey, this: &Value) -> ScriptResult<Option<Value>> {
        match key {
            PropertyKey::Index(index) => {
                if let Some(element) = self.array.get(*index as usize) {
                    return Ok(Some(self.scope.wrap_host(element)));
                }
            }
            PropertyKey::String(name) if name.as_ref() == "length" => {
                return Ok(Some(Value::int32(self.array.len() as i32)));
            }
            _ => {}
        }
        proto_get(self.prototype(), key, this)
    }

    fn put(&self, key: &PropertyKey, value: Value, strict: bool) -> ScriptResult<()> {
        match key {
            PropertyKey::Index(index) => {
                let element =
                    crate::coerce::coerce(&self.scope, &value, &self.array.component)?;
                if !self.array.set(*index as usize, element) {
                    return Err(self.out_of_range(*index));
                }
                Ok(())
            }
            PropertyKey::String(name) if name.as_ref() == "length" => Err(
                ScriptError::type_error(MessageId::ReadOnlyProperty, ["length".to_string()]),
            ),
            _ => match self.prototype() {
                Some(proto) => proto.put(key, value, strict),
                None => Ok(()),
            },
        }
    }

    fn delete(&self, key: &PropertyKey, strict: bool) -> ScriptResult<()> {
        if strict && self.has_own(key) {
            return Err(ScriptError::type_error(
                MessageId::PermanentProperty,
                [key.to_display()],
            ));
        }
        Ok(())
    }

    fn get_attributes(&self, key: &PropertyKey) -> Option<u8> {
        match key {
            PropertyKey::Index(index) if (*index as usize) < self.array.len() => {
                Some(attrib::PERMANENT)
            }
            PropertyKey::String(name) if name.as_ref() == "length" => {
                Some(attrib::READONLY | attrib::DONTENUM | attrib::PERMANENT)
            }
            _ => None,
        }
    }

    fn set_attributes(&self, _key: &PropertyKey, _attributes: u8) {}

    fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    fn set_prototype(&self, proto: Option<ObjectRef>) -> ScriptResult<()> {
        reject_cycle(self.as_any() as *const _ as *const u8, &proto)?;
        *self.prototype.write() = proto;
        Ok(())
    }

    fn parent_scope(&self) -> Option<ObjectRef> {
        self.parent.read().clone()
    }

    fn set_parent_scope(&self, scope: Option<ObjectRef>) {
        *self.parent.write() = scope;
    }

    fn ids(&self) -> Vec<PropertyKey> {
        (0..self.array.len() as u32).map(PropertyKey::Index).collect()
    }

    fn all_ids(&self) -> Vec<PropertyKey> {
        let mut keys = self.ids();
        keys.push(PropertyKey::new("length"));
        keys
    }

    fn define_own_property(
        &self,
        key: PropertyKey,
        _descriptor: &PropertyDescriptor,
    ) -> ScriptResult<()> {
        Err(ScriptError::type_error(
            MessageId::RedefineNonConfigurable,
            [key.to_display()],
        ))
    }

    fn prevent_extensions(&self) {}

    fn is_extensible(&self) -> bool {
        false
    }

    fn default_value(&self, _hint: TypeHint, _this: &Value) -> ScriptResult<Value> {
        Ok(Value::string(format!(
            "[object HostArray[{}]]",
            self.array.len()
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Box a host value into its dynamic representation.
///
/// Integral host numbers up to 32 bits box as exact integers; a 64-bit
/// value outside the 32-bit range degrades to a double.
pub fn wrap_host(scope: &Arc<Scope>, value: HostValue) -> Value {
    match value {
        HostValue::Void => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::boolean(b),
        HostValue::I8(v) => Value::int32(i32::from(v)),
        HostValue::I16(v) => Value::int32(i32::from(v)),
        HostValue::I32(v) => Value::int32(v),
        HostValue::I64(v) => match i32::try_from(v) {
            Ok(v) => Value::int32(v),
            Err(_) => Value::number(v as f64),
        },
        HostValue::F32(v) => Value::number(f64::from(v)),
        HostValue::F64(v) => Value::number(v),
        HostValue::Str(s) => Value::string(s),
        HostValue::Instance(instance) => {
            Value::object(Arc::new(HostObject::new(scope, instance)))
        }
        HostValue::Array(array) => Value::object(Arc::new(HostArrayObject::new(scope, array))),
        HostValue::Dynamic(value) => value,
    }
}

/// The class object of a registered class, as a value.
pub fn class_value(scope: &Arc<Scope>, class: ClassId) -> Value {
    Value::object(Arc::new(HostClassObject::new(scope, class)))
}
