//! The coercion engine.
//!
//! Classifies dynamic values into a small closed set of kinds, scores how
//! well a value converts to a target host type (the input to overload
//! resolution), and performs the conversions: numeric narrowing/widening,
//! string marshaling, recursive array marshaling, and scripted-object →
//! host-interface adapters.

use std::sync::Arc;

use stoat_object::{MessageId, ObjectRef, PropertyKey, ScriptError, ScriptResult, Value};
use stoat_object::value::string_to_number;

use crate::host::{ClassId, ClassKind, HostArray, HostError, HostInstance, HostType, HostValue};
use crate::scope::Scope;
use crate::wrap::{HostArrayObject, HostClassObject, HostObject};

/// Best possible weight: the value already has the target's runtime type.
pub const WEIGHT_EXACT: u32 = 0;
/// Fixed weight of a registered custom type-wrapper ("possible,
/// non-trivial").
pub const WEIGHT_WRAPPER: u32 = 9;
/// Reserved worst sentinel: conversion is impossible.
pub const WEIGHT_NONE: u32 = u32::MAX;

/// Closed classification of dynamic values.
///
/// Integers and doubles are distinct kinds so overload scoring can tell an
/// exact `i32` argument from a floating-point one; both present as
/// "number" to scripts.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    /// The undefined value.
    Undefined,
    /// The null value.
    Null,
    /// Boolean.
    Boolean,
    /// 32-bit integer number.
    Int,
    /// Double number.
    Number,
    /// String.
    String,
    /// Symbol.
    Symbol,
    /// Reference to a registered host class.
    HostClass(ClassId),
    /// Wrapped host instance.
    HostObject(ClassId),
    /// Wrapped host array.
    HostArray,
    /// Any other scripted object (including functions).
    ScriptObject,
}

/// Classify a dynamic value.
pub fn classify(value: &Value) -> ValueKind {
    match value {
        Value::Undefined => ValueKind::Undefined,
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Int(_) => ValueKind::Int,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Symbol(_) => ValueKind::Symbol,
        Value::Object(object) => classify_object(object),
    }
}

fn classify_object(object: &ObjectRef) -> ValueKind {
    let any = object.as_any();
    if let Some(host) = any.downcast_ref::<HostObject>() {
        ValueKind::HostObject(host.instance().class)
    } else if let Some(class) = any.downcast_ref::<HostClassObject>() {
        ValueKind::HostClass(class.class_id())
    } else if any.downcast_ref::<HostArrayObject>().is_some() {
        ValueKind::HostArray
    } else {
        ValueKind::ScriptObject
    }
}

/// Conversion weight of `value` to `target` (lower is better).
///
/// Mirrors the fixed "preferred conversion" ranking: exact runtime type
/// first, numeric widening ranked by size distance, narrowing and string
/// parses last. A registered type-wrapper makes otherwise-impossible
/// targets reachable at [`WEIGHT_WRAPPER`].
pub fn weight(scope: &Scope, value: &Value, target: &HostType) -> u32 {
    let table = table_weight(scope, &classify(value), target);
    if table == WEIGHT_NONE && scope.wrappers().for_target(target).is_some() {
        return WEIGHT_WRAPPER;
    }
    table
}

fn numeric_weight(source_rank: u8, target: &HostType) -> u32 {
    match target.numeric_rank() {
        Some(rank) if rank == source_rank => WEIGHT_EXACT,
        // Widening is preferred to narrowing; both rank by size distance.
        Some(rank) if rank > source_rank => 2 + (rank - source_rank) as u32,
        Some(rank) => 6 + (source_rank - rank) as u32,
        None => WEIGHT_NONE,
    }
}

fn table_weight(scope: &Scope, kind: &ValueKind, target: &HostType) -> u32 {
    match kind {
        ValueKind::Undefined => match target {
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::Null => match target {
            HostType::Class(_) | HostType::Array(_) => 2,
            HostType::Any => 3,
            _ => WEIGHT_NONE,
        },
        ValueKind::Boolean => match target {
            HostType::Bool => WEIGHT_EXACT,
            HostType::Str => 7,
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::Int => match target {
            HostType::Str => 7,
            HostType::Any => 8,
            _ => numeric_weight(3, target),
        },
        ValueKind::Number => match target {
            HostType::Str => 7,
            HostType::Any => 8,
            _ => numeric_weight(6, target),
        },
        ValueKind::String => match target {
            HostType::Str => WEIGHT_EXACT,
            HostType::Any => 8,
            // Parsed at conversion time; worst finite preference.
            _ if target.is_numeric() => 10,
            _ => WEIGHT_NONE,
        },
        ValueKind::Symbol => match target {
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::HostClass(_) => match target {
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::HostObject(class) => match target {
            HostType::Class(t) if class == t => WEIGHT_EXACT,
            HostType::Class(t) if scope.host().is_assignable(*class, *t) => 1,
            HostType::Str => 7,
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::HostArray => match target {
            HostType::Array(_) => 1,
            HostType::Any => 8,
            _ => WEIGHT_NONE,
        },
        ValueKind::ScriptObject => match target {
            // Scripted values convert to the root type trivially.
            HostType::Any => 1,
            HostType::Array(_) => 5,
            HostType::Class(id) => match scope.host().get(*id).map(|def| def.kind) {
                Some(ClassKind::Interface) => 6,
                _ => WEIGHT_NONE,
            },
            _ => WEIGHT_NONE,
        },
    }
}

fn conversion_error(scope: &Scope, value: &Value, target: &HostType) -> ScriptError {
    ScriptError::type_error(
        MessageId::CannotConvert,
        [value.display(), target.describe(scope.host())],
    )
}

/// Convert `value` to `target`, raising a typed conversion error on any
/// failure path.
pub fn coerce(scope: &Arc<Scope>, value: &Value, target: &HostType) -> ScriptResult<HostValue> {
    // A registered wrapper for the exact target overrides the table.
    if let Some(factory) = scope.wrappers().for_target(target) {
        if let Some(host) = factory.wrap(value) {
            return Ok(host);
        }
    }
    match try_coerce(scope, value, target)? {
        Some(host) => Ok(host),
        None => Err(conversion_error(scope, value, target)),
    }
}

/// Table-driven conversion; `Ok(None)` means "not convertible here" so the
/// caller can consult the wrapper registry.
fn try_coerce(
    scope: &Arc<Scope>,
    value: &Value,
    target: &HostType,
) -> ScriptResult<Option<HostValue>> {
    match target {
        HostType::Any => Ok(Some(to_any(value))),
        HostType::Bool => Ok(value.as_boolean().map(HostValue::Bool)),
        HostType::Str => Ok(match value {
            Value::String(s) => Some(HostValue::Str(s.to_string())),
            Value::Bool(_) | Value::Int(_) | Value::Number(_) => {
                let mut text = value.display();
                // display() quotes strings but renders primitives bare.
                if text.starts_with('"') {
                    text = text.trim_matches('"').to_string();
                }
                Some(HostValue::Str(text))
            }
            Value::Object(object) => {
                if object.as_any().downcast_ref::<HostObject>().is_some() {
                    Some(HostValue::Str(value.display()))
                } else {
                    None
                }
            }
            _ => None,
        }),
        _ if target.is_numeric() => coerce_numeric(scope, value, target).map(Some),
        HostType::Class(id) => coerce_class(scope, value, *id),
        HostType::Array(component) => coerce_array(scope, value, component),
        HostType::Void => Ok(Some(HostValue::Void)),
        _ => Ok(None),
    }
}

fn to_any(value: &Value) -> HostValue {
    match value {
        Value::Undefined => HostValue::Dynamic(Value::Undefined),
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Int(i) => HostValue::I32(*i),
        Value::Number(n) => HostValue::F64(*n),
        Value::String(s) => HostValue::Str(s.to_string()),
        Value::Object(object) => {
            let any = object.as_any();
            if let Some(host) = any.downcast_ref::<HostObject>() {
                HostValue::Instance(host.instance().clone())
            } else if let Some(array) = any.downcast_ref::<HostArrayObject>() {
                HostValue::Array(array.array().clone())
            } else {
                HostValue::Dynamic(value.clone())
            }
        }
        Value::Symbol(_) => HostValue::Dynamic(value.clone()),
    }
}

fn coerce_numeric(scope: &Arc<Scope>, value: &Value, target: &HostType) -> ScriptResult<HostValue> {
    let n = match value {
        Value::Int(i) => *i as f64,
        Value::Number(n) => *n,
        Value::String(s) => {
            let parsed = string_to_number(s);
            if parsed.is_nan() && s.trim() != "NaN" {
                return Err(conversion_error(scope, value, target));
            }
            parsed
        }
        _ => return Err(conversion_error(scope, value, target)),
    };
    if target.is_integral() {
        if !n.is_finite() || n.trunc() != n {
            return Err(conversion_error(scope, value, target));
        }
        let i = n as i64;
        let in_range = match target {
            HostType::I8 => i64::from(i8::MIN) <= i && i <= i64::from(i8::MAX),
            HostType::I16 => i64::from(i16::MIN) <= i && i <= i64::from(i16::MAX),
            HostType::I32 => i64::from(i32::MIN) <= i && i <= i64::from(i32::MAX),
            HostType::I64 => (i64::MIN as f64..=i64::MAX as f64).contains(&n),
            _ => unreachable!("integral targets only"),
        };
        if !in_range {
            return Err(ScriptError::range_error(
                MessageId::CannotConvert,
                [value.display(), target.describe(scope.host())],
            ));
        }
        Ok(match target {
            HostType::I8 => HostValue::I8(i as i8),
            HostType::I16 => HostValue::I16(i as i16),
            HostType::I32 => HostValue::I32(i as i32),
            HostType::I64 => HostValue::I64(i),
            _ => unreachable!("integral targets only"),
        })
    } else {
        Ok(match target {
            HostType::F32 => HostValue::F32(n as f32),
            HostType::F64 => HostValue::F64(n),
            _ => unreachable!("float targets only"),
        })
    }
}

fn coerce_class(
    scope: &Arc<Scope>,
    value: &Value,
    target: ClassId,
) -> ScriptResult<Option<HostValue>> {
    match value {
        Value::Null => Ok(Some(HostValue::Null)),
        Value::Object(object) => {
            if let Some(host) = object.as_any().downcast_ref::<HostObject>() {
                let class = host.instance().class;
                if scope.host().is_assignable(class, target) {
                    return Ok(Some(HostValue::Instance(host.instance().clone())));
                }
                return Ok(None);
            }
            // Scripted object or function against an interface target:
            // generate (or reuse) an adapter.
            match scope.host().get(target).map(|def| def.kind) {
                Some(ClassKind::Interface) => {
                    Ok(Some(HostValue::Instance(scope.adapter_for(object, target))))
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn coerce_array(
    scope: &Arc<Scope>,
    value: &Value,
    component: &HostType,
) -> ScriptResult<Option<HostValue>> {
    match value {
        Value::Null => Ok(Some(HostValue::Null)),
        Value::Object(object) => {
            if let Some(array) = object.as_any().downcast_ref::<HostArrayObject>() {
                let source = array.array();
                if &source.component == component {
                    return Ok(Some(HostValue::Array(source.clone())));
                }
                // Component mismatch: re-marshal element-wise through the
                // dynamic layer.
            }
            let length_key = PropertyKey::new("length");
            let length = match object.get(&length_key, value)? {
                Some(length) => length.to_number(),
                None => return Ok(None),
            };
            if !length.is_finite() || length < 0.0 {
                return Ok(None);
            }
            let length = length as u32;
            let mut elements = Vec::with_capacity(length as usize);
            for index in 0..length {
                let element = object
                    .get(&PropertyKey::Index(index), value)?
                    .unwrap_or(Value::Undefined);
                elements.push(coerce(scope, &element, component)?);
            }
            Ok(Some(HostValue::Array(HostArray::new(
                component.clone(),
                elements,
            ))))
        }
        _ => Ok(None),
    }
}

/// A generated implementation of a host interface backed by a scripted
/// object or function.
///
/// Host code calls [`ScriptedAdapter::invoke`]; the adapter marshals the
/// arguments back into dynamic values, dispatches to the scripted target,
/// and coerces the result to the interface method's return type.
pub struct ScriptedAdapter {
    interface: ClassId,
    target: ObjectRef,
    scope: Arc<Scope>,
}

impl ScriptedAdapter {
    pub(crate) fn new(interface: ClassId, target: ObjectRef, scope: Arc<Scope>) -> Self {
        Self {
            interface,
            target,
            scope,
        }
    }

    /// The implemented interface.
    pub fn interface(&self) -> ClassId {
        self.interface
    }

    /// The scripted object behind this adapter.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// Invoke an interface method against the scripted target.
    pub fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, HostError> {
        self.dispatch(method, args)
            .map_err(|e| HostError::new(e.to_string()))
    }

    fn dispatch(&self, method: &str, args: &[HostValue]) -> ScriptResult<HostValue> {
        let def = self
            .scope
            .host()
            .get(self.interface)
            .ok_or_else(|| {
                ScriptError::eval_error(
                    MessageId::ClassNotVisible,
                    [format!("<class #{}>", self.interface.0)],
                )
            })?;
        let ret = def
            .methods
            .iter()
            .find(|m| m.name == method)
            .map(|m| m.ret.clone())
            .unwrap_or(HostType::Any);

        let values: Vec<Value> = args.iter().map(|a| self.scope.wrap_host(a.clone())).collect();
        let this = Value::object(self.target.clone());

        // A bare function adapts a single-method interface directly;
        // otherwise the method is looked up as a property.
        let single_method = def.methods.len() == 1;
        let callee: ObjectRef = match self
            .target
            .get(&PropertyKey::new(method), &this)?
        {
            Some(Value::Object(f)) => f,
            _ if single_method => self.target.clone(),
            _ => {
                return Err(ScriptError::type_error(
                    MessageId::MemberNotFound,
                    [def.name.clone(), method.to_string()],
                ));
            }
        };
        let result = callee.call(&this, &values)?;
        if ret == HostType::Void {
            return Ok(HostValue::Void);
        }
        coerce(&self.scope, &result, &ret)
    }
}
