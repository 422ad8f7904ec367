//! Uniform member abstraction over host fields, methods, bean accessors,
//! and overload groups.
//!
//! Every member kind answers the same three questions: read me, write me,
//! invoke me. Kinds that cannot answer report a typed "not supported"
//! condition instead of crashing; hitting one through the protocol is an
//! engine bug, not a script error.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use stoat_object::{
    MessageId, NativeFunction, ObjectRef, PropertyKey, ScriptError, ScriptResult, Value,
};

use crate::coerce::coerce;
use crate::host::{FieldDef, HostInstance, HostType, HostValue, MethodDef};
use crate::overload::{OverloadMemo, resolve_memo};
use crate::scope::Scope;
use crate::signature::Signature;

/// Failure surface of member operations.
#[derive(Debug, Error)]
pub enum MemberError {
    /// The member kind cannot perform this operation at all.
    #[error("member does not support {0}")]
    NotSupported(&'static str),

    /// A script-level failure (coercion, overload, host error).
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl MemberError {
    /// Unwrap into a script error; an unsupported operation escaping to
    /// the protocol layer is a fatal engine bug.
    pub fn into_script(self, member: &str) -> ScriptError {
        match self {
            Self::Script(err) => err,
            Self::NotSupported(op) => {
                panic!("unsupported member operation {op} reached script level on {member}")
            }
        }
    }
}

/// Result type of member operations.
pub type MemberResult<T> = Result<T, MemberError>;

/// A bean-style property: getter/setter method pair under a property
/// name. The underlying methods stay callable in their own right.
pub struct BeanProperty {
    /// Script-visible property name.
    pub name: Arc<str>,
    /// `getX`/`isX` method, if present.
    pub getter: Option<Arc<MethodDef>>,
    /// `setX` method, if present.
    pub setter: Option<Arc<MethodDef>>,
}

/// A merged dispatch unit for one script-visible name on one class:
/// at most one field, one bean pair, and the method overloads.
pub struct MemberGroup {
    /// Script-visible name.
    pub name: Arc<str>,
    /// The field of this name, if any.
    pub field: Option<Arc<FieldDef>>,
    /// Synthesized bean accessors, if any.
    pub bean: Option<BeanProperty>,
    /// Overloaded methods in discovery order.
    pub methods: Vec<Arc<MethodDef>>,
    /// Signature → index into `methods`.
    pub by_signature: FxHashMap<Signature, usize>,
    /// Per-call-site-shape resolution memo.
    pub memo: OverloadMemo,
}

impl MemberGroup {
    /// Create an empty group for a name.
    pub fn new(name: Arc<str>) -> Self {
        Self {
            name,
            field: None,
            bean: None,
            methods: Vec::new(),
            by_signature: FxHashMap::default(),
            memo: OverloadMemo::default(),
        }
    }

    /// Add a method overload (keyed by its signature).
    pub fn push_method(&mut self, def: Arc<MethodDef>) {
        let signature = Signature::from(def.params.clone());
        let index = self.methods.len();
        self.methods.push(def);
        self.by_signature.entry(signature).or_insert(index);
    }

    /// Number of underlying members.
    fn member_count(&self) -> usize {
        self.field.is_some() as usize
            + self.bean.is_some() as usize
            + self.methods.len()
    }
}

/// A member materialized by the engine itself rather than discovered on
/// the host class (e.g. a class object's `name`).
pub struct SyntheticMember {
    /// Script-visible name.
    pub name: Arc<str>,
    provider: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl SyntheticMember {
    /// Create a synthetic member from a value provider.
    pub fn new(name: impl Into<Arc<str>>, provider: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            provider: Arc::new(provider),
        }
    }
}

/// A member that forwards to the same-named property of another dynamic
/// object (used to splice host members onto scripted prototypes).
pub struct DelegatedMember {
    /// Script-visible name.
    pub name: Arc<str>,
    /// The object that actually holds the property.
    pub target: ObjectRef,
}

/// The closed set of member kinds, invoked uniformly.
#[derive(Clone)]
pub enum Member {
    /// A host field.
    Field(Arc<FieldDef>, Arc<str>),
    /// A single host method.
    Method(Arc<MethodDef>, Arc<str>),
    /// A bean getter/setter pair.
    BeanAccessor(Arc<BeanProperty>),
    /// An engine-generated member.
    Synthetic(Arc<SyntheticMember>),
    /// A forward to another object's property.
    Delegated(Arc<DelegatedMember>),
    /// A merged field/bean/overload unit.
    Group(Arc<MemberGroup>),
}

impl Member {
    /// Flatten a group to its bare member when only one exists.
    pub fn from_group(group: MemberGroup) -> Member {
        if group.member_count() == 1 {
            if let Some(field) = group.field {
                return Member::Field(field, group.name);
            }
            if let Some(bean) = group.bean {
                return Member::BeanAccessor(Arc::new(bean));
            }
            if let Some(method) = group.methods.into_iter().next() {
                return Member::Method(method, group.name);
            }
            unreachable!("member_count was 1");
        }
        Member::Group(Arc::new(group))
    }

    /// Script-visible name.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(_, name) | Self::Method(_, name) => name,
            Self::BeanAccessor(bean) => &bean.name,
            Self::Synthetic(synthetic) => &synthetic.name,
            Self::Delegated(delegated) => &delegated.name,
            Self::Group(group) => &group.name,
        }
    }

    /// Read the member's value as seen by scripts.
    ///
    /// Methods and overload groups read as bound callables, so a method
    /// plucked off one instance stays tied to it.
    pub fn get(
        &self,
        scope: &Arc<Scope>,
        instance: Option<&HostInstance>,
        this: &Value,
    ) -> MemberResult<Value> {
        match self {
            Self::Field(field, name) => {
                let host = (field.get)(instance)
                    .map_err(|e| wrap_host_error(scope, name, e))?;
                Ok(scope.wrap_host(host))
            }
            Self::Method(..) => Ok(self.bind(scope, instance)),
            Self::Group(group) => {
                if let Some(bean) = &group.bean {
                    if let Some(getter) = &bean.getter {
                        return Ok(invoke_method(scope, getter, &bean.name, instance, &[])?);
                    }
                }
                if let Some(field) = &group.field {
                    let host = (field.get)(instance)
                        .map_err(|e| wrap_host_error(scope, &group.name, e))?;
                    return Ok(scope.wrap_host(host));
                }
                Ok(self.bind(scope, instance))
            }
            Self::BeanAccessor(bean) => match &bean.getter {
                Some(getter) => {
                    Ok(invoke_method(scope, getter, &bean.name, instance, &[])?)
                }
                None => Err(MemberError::NotSupported("get")),
            },
            Self::Synthetic(synthetic) => Ok((synthetic.provider)()),
            Self::Delegated(delegated) => {
                let key = PropertyKey::new(&delegated.name);
                Ok(delegated
                    .target
                    .get(&key, this)?
                    .unwrap_or(Value::Undefined))
            }
        }
    }

    /// Write the member's value.
    pub fn set(
        &self,
        scope: &Arc<Scope>,
        instance: Option<&HostInstance>,
        value: &Value,
    ) -> MemberResult<()> {
        match self {
            Self::Field(field, name) => set_field(scope, field, name, instance, value),
            Self::BeanAccessor(bean) => set_bean(scope, bean, instance, value),
            Self::Group(group) => {
                if let Some(bean) = &group.bean {
                    if bean.setter.is_some() {
                        return set_bean(scope, bean, instance, value);
                    }
                }
                if let Some(field) = &group.field {
                    return set_field(scope, field, &group.name, instance, value);
                }
                Err(MemberError::NotSupported("set"))
            }
            Self::Delegated(delegated) => {
                let key = PropertyKey::new(&delegated.name);
                delegated.target.put(&key, value.clone(), false)?;
                Ok(())
            }
            Self::Method(..) | Self::Synthetic(_) => Err(MemberError::NotSupported("set")),
        }
    }

    /// Invoke the member with live arguments, resolving overloads.
    pub fn invoke(
        &self,
        scope: &Arc<Scope>,
        instance: Option<&HostInstance>,
        args: &[Value],
    ) -> MemberResult<Value> {
        match self {
            Self::Method(method, name) => {
                Ok(invoke_method(scope, method, name, instance, args)?)
            }
            Self::Group(group) => {
                if group.methods.is_empty() {
                    return Err(MemberError::NotSupported("invoke"));
                }
                let winner = resolve_memo(scope, &group.name, &group.memo, &group.methods, args)?;
                Ok(invoke_method(
                    scope,
                    &group.methods[winner],
                    &group.name,
                    instance,
                    args,
                )?)
            }
            Self::Delegated(delegated) => {
                let this = Value::Undefined;
                let key = PropertyKey::new(&delegated.name);
                match delegated.target.get(&key, &this)? {
                    Some(Value::Object(f)) => Ok(f.call(&this, args)?),
                    _ => Err(MemberError::Script(ScriptError::type_error(
                        MessageId::NotCallable,
                        [delegated.name.to_string()],
                    ))),
                }
            }
            Self::Field(..) | Self::BeanAccessor(_) | Self::Synthetic(_) => {
                Err(MemberError::NotSupported("invoke"))
            }
        }
    }

    /// A callable value that invokes this member against `instance`.
    pub fn bind(&self, scope: &Arc<Scope>, instance: Option<&HostInstance>) -> Value {
        let member = self.clone();
        let scope = scope.clone();
        let instance = instance.cloned();
        NativeFunction::value(self.name(), move |_, args| {
            member
                .invoke(&scope, instance.as_ref(), args)
                .map_err(|e| e.into_script(member.name()))
        })
    }
}

fn set_field(
    scope: &Arc<Scope>,
    field: &Arc<FieldDef>,
    name: &str,
    instance: Option<&HostInstance>,
    value: &Value,
) -> MemberResult<()> {
    let Some(setter) = &field.set else {
        return Err(MemberError::Script(ScriptError::type_error(
            MessageId::ReadOnlyProperty,
            [name.to_string()],
        )));
    };
    if field.readonly {
        return Err(MemberError::Script(ScriptError::type_error(
            MessageId::ReadOnlyProperty,
            [name.to_string()],
        )));
    }
    let host = coerce(scope, value, &field.ty)?;
    setter(instance, host).map_err(|e| wrap_host_error(scope, name, e))?;
    Ok(())
}

fn set_bean(
    scope: &Arc<Scope>,
    bean: &BeanProperty,
    instance: Option<&HostInstance>,
    value: &Value,
) -> MemberResult<()> {
    match &bean.setter {
        Some(setter) => {
            invoke_method(scope, setter, &bean.name, instance, std::slice::from_ref(value))?;
            Ok(())
        }
        None => Err(MemberError::Script(ScriptError::type_error(
            MessageId::ReadOnlyProperty,
            [bean.name.to_string()],
        ))),
    }
}

/// Coerce arguments to a method's signature and invoke it.
///
/// Variadic methods collect the trailing arguments into a host array of
/// the final parameter's component type, unless the caller already passed
/// a matching array.
pub fn invoke_method(
    scope: &Arc<Scope>,
    method: &Arc<MethodDef>,
    name: &str,
    instance: Option<&HostInstance>,
    args: &[Value],
) -> ScriptResult<Value> {
    let host_args = marshal_arguments(scope, name, &method.params, method.variadic, args)?;
    let result = (method.invoke)(instance, &host_args)
        .map_err(|e| wrap_host_error_script(scope, name, e))?;
    Ok(scope.wrap_host(result))
}

/// Coerce live arguments to a parameter list, collecting the variadic
/// tail into a host array when the final parameter asks for one.
///
/// A wrong-arity argument list is an overload failure, even when only
/// one candidate exists; extra or missing arguments are never silently
/// dropped or defaulted.
pub(crate) fn marshal_arguments(
    scope: &Arc<Scope>,
    name: &str,
    params: &[HostType],
    variadic: bool,
    args: &[Value],
) -> ScriptResult<Vec<HostValue>> {
    let arity_ok = if variadic {
        !params.is_empty() && args.len() >= params.len() - 1
    } else {
        args.len() == params.len()
    };
    if !arity_ok {
        let shapes: Vec<String> = args.iter().map(Value::display).collect();
        return Err(ScriptError::eval_error(
            MessageId::NoOverloadMatch,
            [name.to_string(), shapes.join(", ")],
        ));
    }
    if !variadic {
        let mut host_args = Vec::with_capacity(args.len());
        for (arg, target) in args.iter().zip(params) {
            host_args.push(coerce(scope, arg, target)?);
        }
        return Ok(host_args);
    }

    let fixed = params.len() - 1;
    let mut host_args = Vec::with_capacity(params.len());
    for (arg, target) in args[..fixed.min(args.len())].iter().zip(&params[..fixed]) {
        host_args.push(coerce(scope, arg, target)?);
    }
    let array_ty = &params[fixed];
    let HostType::Array(component) = array_ty else {
        return Err(ScriptError::eval_error(
            MessageId::NoOverloadMatch,
            [name.to_string(), "malformed variadic signature".into()],
        ));
    };
    if args.len() == params.len() {
        // A single trailing argument that already is the array passes
        // through unchanged.
        if let Ok(whole) = coerce(scope, &args[fixed], array_ty) {
            host_args.push(whole);
            return Ok(host_args);
        }
    }
    let mut trailing = Vec::with_capacity(args.len().saturating_sub(fixed));
    for arg in &args[fixed..] {
        trailing.push(coerce(scope, arg, component)?);
    }
    host_args.push(HostValue::Array(crate::host::HostArray::new(
        (**component).clone(),
        trailing,
    )));
    Ok(host_args)
}

fn wrap_host_error(scope: &Arc<Scope>, member: &str, error: crate::host::HostError) -> MemberError {
    MemberError::Script(wrap_host_error_script(scope, member, error))
}

/// Unwrap a host failure to its cause and re-raise it as a catchable
/// wrapped error. The cause text is only exposed under enhanced access.
pub fn wrap_host_error_script(
    scope: &Arc<Scope>,
    member: &str,
    error: crate::host::HostError,
) -> ScriptError {
    let cause = if scope.enhanced_access() {
        error.0
    } else {
        "host exception".to_string()
    };
    ScriptError::wrapped(member, cause)
}
