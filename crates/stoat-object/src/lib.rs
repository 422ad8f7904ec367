//! # Stoat Object Model
//!
//! Prototype-based dynamic object model for the Stoat embedding core:
//! values, property slots with attributes, ordered property maps, the
//! dynamic-object protocol, and the prototype-id fast path for built-ins.
//!
//! The interpreter drives everything through the [`DynamicObject`] trait;
//! the interop layer implements the same trait for host-backed values.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod object;
pub mod property_map;
pub mod proto_id;
pub mod slot;
pub mod value;

pub use error::{Catalog, Message, MessageId, ScriptError, ScriptResult};
pub use object::{DynamicObject, NativeFn, NativeFunction, ObjectRef, ScriptObject, TypeHint};
pub use property_map::PropertyMap;
pub use proto_id::{PrototypeIdMap, PrototypeObject};
pub use slot::{PropertyDescriptor, Slot, SlotValue, attrib};
pub use value::{PropertyKey, Symbol, Value};
