//! The host reflection surface.
//!
//! Rust has no runtime reflection, so host classes are described to the
//! engine as descriptors: typed field/method/constructor entries with
//! invoke closures over a small `HostValue` ABI. The descriptor registry
//! plays the role a reflection API plays in other embeddings, and the
//! member order inside a descriptor is the engine's documented discovery
//! order.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;

use stoat_object::Value;

/// Identifier of a registered host class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// A host-side type, used in signatures and coercion targets.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HostType {
    /// No value (method return only).
    Void,
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Owned string.
    Str,
    /// Instance of a registered class or interface.
    Class(ClassId),
    /// Array with the given component type.
    Array(Box<HostType>),
    /// The root "any value" type; every dynamic value converts to it.
    Any,
}

impl HostType {
    /// Rank of a numeric type in the widening table (wider = larger).
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            Self::I8 => Some(1),
            Self::I16 => Some(2),
            Self::I32 => Some(3),
            Self::I64 => Some(4),
            Self::F32 => Some(5),
            Self::F64 => Some(6),
            _ => None,
        }
    }

    /// True for the integral numeric types.
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// True for all numeric types.
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// True for types that cannot hold a null reference.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool | Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::F32 | Self::F64
        )
    }

    /// Render this type for error messages, resolving class names through
    /// the registry.
    pub fn describe(&self, registry: &HostClassRegistry) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Bool => "bool".to_string(),
            Self::I8 => "i8".to_string(),
            Self::I16 => "i16".to_string(),
            Self::I32 => "i32".to_string(),
            Self::I64 => "i64".to_string(),
            Self::F32 => "f32".to_string(),
            Self::F64 => "f64".to_string(),
            Self::Str => "string".to_string(),
            Self::Class(id) => registry.class_name(*id),
            Self::Array(component) => format!("{}[]", component.describe(registry)),
            Self::Any => "any".to_string(),
        }
    }
}

/// A host value crossing the interop boundary.
#[derive(Clone)]
pub enum HostValue {
    /// No value (void return).
    Void,
    /// Null reference.
    Null,
    /// Boolean.
    Bool(bool),
    /// 8-bit integer.
    I8(i8),
    /// 16-bit integer.
    I16(i16),
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// String.
    Str(String),
    /// Instance of a registered class.
    Instance(HostInstance),
    /// Host array.
    Array(HostArray),
    /// An unconverted dynamic value (for `any`-typed parameters).
    Dynamic(Value),
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}i8"),
            Self::I16(v) => write!(f, "{v}i16"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::F32(v) => write!(f, "{v}f32"),
            Self::F64(v) => write!(f, "{v}f64"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Instance(i) => write!(f, "<instance of #{}>", i.class.0),
            Self::Array(a) => write!(f, "<array[{}]>", a.len()),
            Self::Dynamic(v) => write!(f, "{v:?}"),
        }
    }
}

/// A live host object: the class it belongs to plus its payload.
///
/// The payload is opaque to the engine; host member closures downcast it.
#[derive(Clone)]
pub struct HostInstance {
    /// The registered class of this instance.
    pub class: ClassId,
    /// The host payload.
    pub data: Arc<dyn Any + Send + Sync>,
}

impl HostInstance {
    /// Create an instance of a registered class.
    pub fn new(class: ClassId, data: impl Any + Send + Sync) -> Self {
        Self {
            class,
            data: Arc::new(data),
        }
    }

    /// Downcast the payload.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Identity comparison (same payload allocation).
    pub fn same_instance(&self, other: &HostInstance) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// A host array: component type plus shared, mutable element storage.
#[derive(Clone)]
pub struct HostArray {
    /// Element type.
    pub component: HostType,
    elements: Arc<RwLock<Vec<HostValue>>>,
}

impl HostArray {
    /// Create an array from elements.
    pub fn new(component: HostType, elements: Vec<HostValue>) -> Self {
        Self {
            component,
            elements: Arc::new(RwLock::new(elements)),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// Clone of the element at `index`.
    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.elements.read().get(index).cloned()
    }

    /// Store an element at `index` (in-bounds only).
    pub fn set(&self, index: usize, value: HostValue) -> bool {
        let mut elements = self.elements.write();
        match elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all elements.
    pub fn to_vec(&self) -> Vec<HostValue> {
        self.elements.read().clone()
    }
}

/// Failure reported by a host member closure.
///
/// These are the "reflection exceptions" of this embedding; the engine
/// unwraps them into script-catchable wrapped errors.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    /// Create a host error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Member visibility in the host language.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Visibility {
    /// Public: always visible to scripts.
    Public,
    /// Non-public: visible only under the scope's enhanced-access flag.
    NonPublic,
}

/// Field getter closure (`None` instance for statics).
pub type FieldGetter =
    Arc<dyn Fn(Option<&HostInstance>) -> Result<HostValue, HostError> + Send + Sync>;
/// Field setter closure.
pub type FieldSetter =
    Arc<dyn Fn(Option<&HostInstance>, HostValue) -> Result<(), HostError> + Send + Sync>;
/// Method invocation closure.
pub type HostFn = Arc<
    dyn Fn(Option<&HostInstance>, &[HostValue]) -> Result<HostValue, HostError> + Send + Sync,
>;
/// Constructor closure.
pub type HostCtor = Arc<dyn Fn(&[HostValue]) -> Result<HostInstance, HostError> + Send + Sync>;

/// One host field.
#[derive(Clone)]
pub struct FieldDef {
    /// Host name of the field.
    pub name: String,
    /// Field type.
    pub ty: HostType,
    /// Visibility.
    pub visibility: Visibility,
    /// Explicitly hidden from scripts.
    pub hidden: bool,
    /// Static (class-level) field.
    pub is_static: bool,
    /// Writes rejected.
    pub readonly: bool,
    /// Read closure.
    pub get: FieldGetter,
    /// Write closure, absent for read-only fields.
    pub set: Option<FieldSetter>,
}

/// One host method.
#[derive(Clone)]
pub struct MethodDef {
    /// Host name of the method.
    pub name: String,
    /// Parameter types.
    pub params: Vec<HostType>,
    /// Return type.
    pub ret: HostType,
    /// Visibility.
    pub visibility: Visibility,
    /// Explicitly hidden from scripts.
    pub hidden: bool,
    /// Static (class-level) method.
    pub is_static: bool,
    /// Trailing parameter accepts any number of arguments.
    pub variadic: bool,
    /// Invocation closure.
    pub invoke: HostFn,
}

/// One host constructor.
#[derive(Clone)]
pub struct CtorDef {
    /// Parameter types.
    pub params: Vec<HostType>,
    /// Visibility.
    pub visibility: Visibility,
    /// Explicitly hidden from scripts.
    pub hidden: bool,
    /// Trailing parameter accepts any number of arguments.
    pub variadic: bool,
    /// Construction closure.
    pub construct: HostCtor,
}

/// What kind of class a descriptor declares.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassKind {
    /// Instantiable class.
    Concrete,
    /// Abstract class: members exist but no direct construction.
    Abstract,
    /// Interface: adapters may implement it from scripted objects.
    Interface,
}

/// Indexed-access declaration for collection-like classes.
///
/// Names three members of the class: an element getter taking one `i32`,
/// an optional element setter, and a zero-argument length accessor. Such
/// classes box into a dedicated indexable wrapper.
#[derive(Clone, Debug)]
pub struct IndexedAccess {
    /// Name of the `fn(i32) -> T` getter method.
    pub get: String,
    /// Name of the `fn(i32, T)` setter method, if mutable.
    pub set: Option<String>,
    /// Name of the `fn() -> i32` length method.
    pub length: String,
}

/// Descriptor of one host class.
pub struct HostClassDef {
    /// Fully qualified class name.
    pub name: String,
    /// Concrete, abstract, or interface.
    pub kind: ClassKind,
    /// Direct superclasses/interfaces, nearest first.
    pub supers: Vec<ClassId>,
    /// Fields in discovery order.
    pub fields: Vec<FieldDef>,
    /// Methods in discovery order.
    pub methods: Vec<MethodDef>,
    /// Constructors in discovery order.
    pub ctors: Vec<CtorDef>,
    /// Collection-style indexed access, if the class supports it.
    pub indexed: Option<IndexedAccess>,
}

impl HostClassDef {
    /// Start a descriptor for a concrete class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Concrete,
            supers: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
            indexed: None,
        }
    }
}

/// Process-global registry of host class descriptors.
///
/// Registration is the embedder's "class loading"; lookups are concurrent
/// and lock-free on the read path.
pub struct HostClassRegistry {
    classes: DashMap<ClassId, Arc<HostClassDef>>,
    by_name: DashMap<String, ClassId>,
    next: AtomicU32,
}

impl HostClassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            by_name: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    /// Register a class descriptor, returning its id.
    pub fn register(&self, def: HostClassDef) -> ClassId {
        let id = ClassId(self.next.fetch_add(1, Ordering::Relaxed));
        self.by_name.insert(def.name.clone(), id);
        self.classes.insert(id, Arc::new(def));
        id
    }

    /// Look up a descriptor by id.
    pub fn get(&self, id: ClassId) -> Option<Arc<HostClassDef>> {
        self.classes.get(&id).map(|entry| entry.clone())
    }

    /// Look up a class id by name.
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).map(|entry| *entry)
    }

    /// The display name of a class (placeholder for unknown ids).
    pub fn class_name(&self, id: ClassId) -> String {
        match self.get(id) {
            Some(def) => def.name.clone(),
            None => format!("<class #{}>", id.0),
        }
    }

    /// Whether `from` is `to` or transitively one of its supers.
    pub fn is_assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }
        let Some(def) = self.get(from) else {
            return false;
        };
        def.supers.iter().any(|s| self.is_assignable(*s, to))
    }
}

impl Default for HostClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pluggable script-visible renaming of host members.
///
/// `None` keeps the host name. Applied in the per-scope metadata layer so
/// differently-configured scopes share one structural walk.
pub trait NameRemapper: Send + Sync {
    /// Script-visible name for `member` of `class`, or `None` to keep it.
    fn remap(&self, class: &str, member: &str) -> Option<String>;
}

/// The default remapper: every name passes through.
pub struct IdentityRemapper;

impl NameRemapper for IdentityRemapper {
    fn remap(&self, _class: &str, _member: &str) -> Option<String> {
        None
    }
}

/// Custom conversion from a dynamic value to one exact host type.
///
/// A registered factory makes its target type reachable in overload
/// scoring (at a fixed non-trivial weight) and performs the conversion
/// when that overload wins.
pub trait TypeWrapperFactory: Send + Sync {
    /// The exact target type this factory serves.
    fn target(&self) -> HostType;

    /// Attempt the conversion; `None` rejects the value.
    fn wrap(&self, value: &Value) -> Option<HostValue>;
}

/// Registry of custom type-wrapper factories.
#[derive(Default)]
pub struct TypeWrapperRegistry {
    factories: RwLock<Vec<Arc<dyn TypeWrapperFactory>>>,
}

impl TypeWrapperRegistry {
    /// Register a factory.
    pub fn register(&self, factory: Arc<dyn TypeWrapperFactory>) {
        self.factories.write().push(factory);
    }

    /// The factory registered for an exact target type, if any.
    pub fn for_target(&self, target: &HostType) -> Option<Arc<dyn TypeWrapperFactory>> {
        self.factories
            .read()
            .iter()
            .find(|f| &f.target() == target)
            .cloned()
    }
}

/// Gate deciding which host classes a scope may touch at all.
///
/// Rejection happens before any metadata for the class is cached.
pub trait ClassAccessFilter: Send + Sync {
    /// Whether the named class is visible to the scope.
    fn visible(&self, class_name: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_round_trip() {
        let registry = HostClassRegistry::new();
        let id = registry.register(HostClassDef::new("demo.Point"));
        assert_eq!(registry.find("demo.Point"), Some(id));
        assert_eq!(registry.class_name(id), "demo.Point");
        assert_eq!(registry.get(id).unwrap().kind, ClassKind::Concrete);
    }

    #[test]
    fn test_assignability_walks_supers() {
        let registry = HostClassRegistry::new();
        let base = registry.register(HostClassDef::new("Base"));
        let mut mid = HostClassDef::new("Mid");
        mid.supers.push(base);
        let mid = registry.register(mid);
        let mut leaf = HostClassDef::new("Leaf");
        leaf.supers.push(mid);
        let leaf = registry.register(leaf);

        assert!(registry.is_assignable(leaf, base));
        assert!(registry.is_assignable(leaf, leaf));
        assert!(!registry.is_assignable(base, leaf));
    }

    #[test]
    fn test_numeric_rank_ordering() {
        assert!(HostType::I8.numeric_rank() < HostType::I64.numeric_rank());
        assert!(HostType::I64.numeric_rank() < HostType::F64.numeric_rank());
        assert_eq!(HostType::Str.numeric_rank(), None);
    }

    #[test]
    fn test_describe_array_type() {
        let registry = HostClassRegistry::new();
        let ty = HostType::Array(Box::new(HostType::I32));
        assert_eq!(ty.describe(&registry), "i32[]");
    }
}
