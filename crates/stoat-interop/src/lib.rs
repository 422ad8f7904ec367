//! # Stoat Host Interop
//!
//! Bridges the dynamic object model to host Rust code: a descriptor-based
//! host class registry, cached class metadata, overload resolution with
//! per-call-shape memoization, the coercion engine, host-backed object
//! wrappers, scripted implementations of host interfaces, and the
//! per-scope policy layer (name remapping, access filtering, enhanced
//! access).
//!
//! The flow for a typical member access: a wrapper receives a protocol
//! call, looks the member up in the scope's tables, resolves the overload
//! for the live arguments, coerces each argument to the winning
//! signature, invokes the host closure, and boxes the result back into a
//! dynamic value.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod coerce;
pub mod host;
pub mod member;
pub mod metadata;
pub mod overload;
pub mod scope;
pub mod signature;
pub mod wrap;

pub use coerce::{ScriptedAdapter, ValueKind, classify, coerce, weight};
pub use host::{
    ClassAccessFilter, ClassId, ClassKind, CtorDef, FieldDef, HostArray, HostClassDef,
    HostClassRegistry, HostError, HostInstance, HostType, HostValue, IdentityRemapper,
    IndexedAccess, MethodDef, NameRemapper, TypeWrapperFactory, TypeWrapperRegistry, Visibility,
};
pub use member::{BeanProperty, Member, MemberError, MemberGroup, MemberResult};
pub use metadata::{ClassMembers, ConstructorSet, MetadataCache, StructuralClassInfo};
pub use overload::{ArgShape, Invocable, OverloadMemo, arg_shape, resolve, resolve_memo, score};
pub use scope::{Scope, ScopeBuilder};
pub use signature::{Signature, SignatureMatch};
pub use wrap::{HostArrayObject, HostClassObject, HostObject, class_value, wrap_host};
