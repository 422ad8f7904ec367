//! Class metadata, cached in two layers.
//!
//! The structural layer flattens a class and its supers into one member
//! list (subclass first, hidden members dropped) and is shared by every
//! scope. The per-scope layer applies the scope's name remapper,
//! visibility gate, and bean-accessor synthesis, producing the member
//! tables the wrappers dispatch through.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::host::{
    ClassId, ClassKind, CtorDef, FieldDef, HostClassRegistry, HostType, IndexedAccess, MethodDef,
    NameRemapper, Visibility,
};
use crate::member::{BeanProperty, Member, MemberGroup};
use crate::overload::OverloadMemo;
use crate::signature::Signature;

/// Flattened, scope-independent view of one class.
pub struct StructuralClassInfo {
    /// The class this view describes.
    pub id: ClassId,
    /// Fully qualified class name.
    pub name: Arc<str>,
    /// Concrete, abstract, or interface.
    pub kind: ClassKind,
    /// Own and inherited fields, subclass first, shadowed names dropped.
    pub fields: Vec<Arc<FieldDef>>,
    /// Own and inherited methods, subclass first, duplicate signatures
    /// dropped (an override replaces the super's entry).
    pub methods: Vec<Arc<MethodDef>>,
    /// Own constructors only; constructors do not inherit.
    pub ctors: Vec<Arc<CtorDef>>,
    /// Indexed-access declaration, own class or nearest super.
    pub indexed: Option<IndexedAccess>,
}

/// Process-wide cache of structural class views.
#[derive(Default)]
pub struct MetadataCache {
    cache: DashMap<ClassId, Arc<StructuralClassInfo>>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The structural view of `id`, building and caching it on first use.
    pub fn info(
        &self,
        registry: &HostClassRegistry,
        id: ClassId,
    ) -> Option<Arc<StructuralClassInfo>> {
        if let Some(info) = self.cache.get(&id) {
            return Some(info.clone());
        }
        let info = Arc::new(build_structural(registry, id)?);
        self.cache.insert(id, info.clone());
        Some(info)
    }
}

fn build_structural(registry: &HostClassRegistry, id: ClassId) -> Option<StructuralClassInfo> {
    let def = registry.get(id)?;
    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut field_names: FxHashSet<String> = FxHashSet::default();
    let mut method_signatures: FxHashSet<(String, Signature)> = FxHashSet::default();
    let mut visited: FxHashSet<ClassId> = FxHashSet::default();
    let mut indexed = def.indexed.clone();

    // Depth-first, own class before supers, so subclass members shadow.
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let Some(current_def) = registry.get(current) else {
            continue;
        };
        for field in &current_def.fields {
            if field.hidden || !field_names.insert(field.name.clone()) {
                continue;
            }
            fields.push(Arc::new(field.clone()));
        }
        for method in &current_def.methods {
            if method.hidden {
                continue;
            }
            let key = (method.name.clone(), Signature::from(method.params.clone()));
            if !method_signatures.insert(key) {
                continue;
            }
            methods.push(Arc::new(method.clone()));
        }
        if indexed.is_none() {
            indexed = current_def.indexed.clone();
        }
        // Reverse push keeps the declared super order under pop().
        for superclass in current_def.supers.iter().rev() {
            stack.push(*superclass);
        }
    }

    let ctors = def
        .ctors
        .iter()
        .filter(|ctor| !ctor.hidden)
        .cloned()
        .map(Arc::new)
        .collect();

    Some(StructuralClassInfo {
        id,
        name: Arc::from(def.name.as_str()),
        kind: def.kind,
        fields,
        methods,
        ctors,
        indexed,
    })
}

/// The constructors of a class with their overload memo.
pub struct ConstructorSet {
    /// Visible constructors in discovery order.
    pub ctors: Vec<Arc<CtorDef>>,
    /// Per-call-shape resolution memo.
    pub memo: OverloadMemo,
}

/// Scope-specific member tables of one class: what the wrappers actually
/// dispatch through.
pub struct ClassMembers {
    /// The class.
    pub class: ClassId,
    /// Fully qualified class name.
    pub name: Arc<str>,
    /// Concrete, abstract, or interface.
    pub kind: ClassKind,
    /// Instance members by script-visible name.
    pub members: FxHashMap<Arc<str>, Member>,
    /// Static (class-level) members by script-visible name.
    pub statics: FxHashMap<Arc<str>, Member>,
    /// Constructors visible to the scope.
    pub ctors: ConstructorSet,
    /// Indexed-access declaration, if any.
    pub indexed: Option<IndexedAccess>,
}

impl ClassMembers {
    /// A shared empty table, used for unknown classes.
    pub fn empty() -> Arc<ClassMembers> {
        static EMPTY: OnceLock<Arc<ClassMembers>> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Arc::new(ClassMembers {
                    class: ClassId(u32::MAX),
                    name: Arc::from(""),
                    kind: ClassKind::Concrete,
                    members: FxHashMap::default(),
                    statics: FxHashMap::default(),
                    ctors: ConstructorSet {
                        ctors: Vec::new(),
                        memo: OverloadMemo::default(),
                    },
                    indexed: None,
                })
            })
            .clone()
    }

    /// Instance member lookup.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Static member lookup.
    pub fn static_member(&self, name: &str) -> Option<&Member> {
        self.statics.get(name)
    }
}

/// Build the per-scope member tables for a structural view.
///
/// Non-public members are dropped unless `enhanced_access` is set; the
/// remapper renames members before grouping, so synthesized bean names
/// derive from script-visible method names.
pub fn build_members(
    info: &StructuralClassInfo,
    remapper: &dyn NameRemapper,
    enhanced_access: bool,
) -> Arc<ClassMembers> {
    let visible = |visibility: Visibility| visibility == Visibility::Public || enhanced_access;

    let mut instance_groups: FxHashMap<Arc<str>, MemberGroup> = FxHashMap::default();
    let mut static_groups: FxHashMap<Arc<str>, MemberGroup> = FxHashMap::default();
    let mut group_order: Vec<(Arc<str>, bool)> = Vec::new();

    for field in &info.fields {
        if !visible(field.visibility) {
            continue;
        }
        let script_name: Arc<str> = remap(remapper, &info.name, &field.name);
        let groups = if field.is_static {
            &mut static_groups
        } else {
            &mut instance_groups
        };
        let group = group_entry(groups, &mut group_order, script_name, field.is_static);
        if group.field.is_none() {
            group.field = Some(field.clone());
        }
    }

    let mut instance_methods: Vec<(Arc<str>, Arc<MethodDef>)> = Vec::new();
    for method in &info.methods {
        if !visible(method.visibility) {
            continue;
        }
        let script_name: Arc<str> = remap(remapper, &info.name, &method.name);
        let groups = if method.is_static {
            &mut static_groups
        } else {
            &mut instance_groups
        };
        let group = group_entry(groups, &mut group_order, script_name.clone(), method.is_static);
        group.push_method(method.clone());
        if !method.is_static {
            instance_methods.push((script_name, method.clone()));
        }
    }

    synthesize_beans(&mut instance_groups, &mut group_order, &instance_methods);

    let mut members = FxHashMap::default();
    let mut statics = FxHashMap::default();
    for (name, is_static) in group_order {
        let (groups, table) = if is_static {
            (&mut static_groups, &mut statics)
        } else {
            (&mut instance_groups, &mut members)
        };
        if let Some(group) = groups.remove(&name) {
            table.insert(name, Member::from_group(group));
        }
    }

    let ctors = info
        .ctors
        .iter()
        .filter(|ctor| visible(ctor.visibility))
        .cloned()
        .collect();

    Arc::new(ClassMembers {
        class: info.id,
        name: info.name.clone(),
        kind: info.kind,
        members,
        statics,
        ctors: ConstructorSet {
            ctors,
            memo: OverloadMemo::default(),
        },
        indexed: info.indexed.clone(),
    })
}

fn group_entry<'a>(
    groups: &'a mut FxHashMap<Arc<str>, MemberGroup>,
    order: &mut Vec<(Arc<str>, bool)>,
    name: Arc<str>,
    is_static: bool,
) -> &'a mut MemberGroup {
    groups.entry(name.clone()).or_insert_with(|| {
        order.push((name.clone(), is_static));
        MemberGroup::new(name)
    })
}

fn remap(remapper: &dyn NameRemapper, class: &str, member: &str) -> Arc<str> {
    match remapper.remap(class, member) {
        Some(renamed) => Arc::from(renamed.as_str()),
        None => Arc::from(member),
    }
}

/// Synthesize bean properties from accessor-shaped instance methods.
///
/// `getX`/`isX` with no parameters and a non-void return reads property
/// `x`; `setX` with one parameter writes it. The accessor methods stay
/// callable under their own names; only the synthesized property is new.
fn synthesize_beans(
    groups: &mut FxHashMap<Arc<str>, MemberGroup>,
    order: &mut Vec<(Arc<str>, bool)>,
    methods: &[(Arc<str>, Arc<MethodDef>)],
) {
    let mut getters: FxHashMap<String, Arc<MethodDef>> = FxHashMap::default();
    let mut setters: FxHashMap<String, Arc<MethodDef>> = FxHashMap::default();

    for (script_name, method) in methods {
        if let Some(suffix) = script_name.strip_prefix("get") {
            if method.params.is_empty() && method.ret != HostType::Void {
                if let Some(property) = bean_property_name(suffix) {
                    getters.entry(property).or_insert_with(|| method.clone());
                }
            }
        } else if let Some(suffix) = script_name.strip_prefix("is") {
            if method.params.is_empty() && method.ret == HostType::Bool {
                if let Some(property) = bean_property_name(suffix) {
                    getters.entry(property).or_insert_with(|| method.clone());
                }
            }
        }
        if let Some(suffix) = script_name.strip_prefix("set") {
            if method.params.len() == 1 {
                if let Some(property) = bean_property_name(suffix) {
                    setters.entry(property).or_insert_with(|| method.clone());
                }
            }
        }
    }

    let mut properties: Vec<String> = getters.keys().chain(setters.keys()).cloned().collect();
    properties.sort();
    properties.dedup();
    for property in properties {
        let getter = getters.remove(&property);
        let setter = setters.remove(&property);
        let name: Arc<str> = Arc::from(property.as_str());
        let group = groups.entry(name.clone()).or_insert_with(|| {
            order.push((name.clone(), false));
            MemberGroup::new(name.clone())
        });
        if group.bean.is_none() {
            group.bean = Some(BeanProperty {
                name,
                getter,
                setter,
            });
        }
    }
}

/// Decapitalized property name for an accessor suffix.
///
/// `Foo` becomes `foo`; a suffix whose first two characters are both
/// uppercase is kept as-is (`URL` stays `URL`). An empty or
/// lowercase-leading suffix is not accessor-shaped.
fn bean_property_name(suffix: &str) -> Option<String> {
    let mut chars = suffix.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }
    if chars.next().is_some_and(char::is_uppercase) {
        return Some(suffix.to_string());
    }
    let mut name: String = first.to_lowercase().collect();
    name.push_str(&suffix[first.len_utf8()..]);
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        HostClassDef, HostClassRegistry, HostError, HostValue, IdentityRemapper,
    };

    fn field(name: &str, visibility: Visibility) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            ty: HostType::I32,
            visibility,
            hidden: false,
            is_static: false,
            readonly: false,
            get: Arc::new(|_| Ok(HostValue::I32(0))),
            set: Some(Arc::new(|_, _| Ok(()))),
        }
    }

    fn method(name: &str, params: Vec<HostType>, ret: HostType) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            params,
            ret,
            visibility: Visibility::Public,
            hidden: false,
            is_static: false,
            variadic: false,
            invoke: Arc::new(|_, _| Err(HostError::new("unused"))),
        }
    }

    #[test]
    fn test_bean_property_name() {
        assert_eq!(bean_property_name("Foo"), Some("foo".to_string()));
        assert_eq!(bean_property_name("URL"), Some("URL".to_string()));
        assert_eq!(bean_property_name("X"), Some("x".to_string()));
        assert_eq!(bean_property_name(""), None);
        assert_eq!(bean_property_name("foo"), None);
    }

    #[test]
    fn test_subclass_field_shadows_super() {
        let registry = HostClassRegistry::new();
        let mut base = HostClassDef::new("Base");
        base.fields.push(field("x", Visibility::Public));
        let base = registry.register(base);
        let mut leaf = HostClassDef::new("Leaf");
        leaf.supers.push(base);
        leaf.fields.push(field("x", Visibility::Public));
        leaf.fields.push(field("y", Visibility::Public));
        let leaf = registry.register(leaf);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, leaf).unwrap();
        assert_eq!(info.fields.len(), 2);
        assert_eq!(info.fields[0].name, "x");
        assert_eq!(info.fields[1].name, "y");
    }

    #[test]
    fn test_override_replaces_super_method() {
        let registry = HostClassRegistry::new();
        let mut base = HostClassDef::new("Base");
        base.methods.push(method("m", vec![HostType::I32], HostType::Void));
        base.methods.push(method("m", vec![HostType::Str], HostType::Void));
        let base = registry.register(base);
        let mut leaf = HostClassDef::new("Leaf");
        leaf.supers.push(base);
        leaf.methods.push(method("m", vec![HostType::I32], HostType::I32));
        let leaf = registry.register(leaf);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, leaf).unwrap();
        // The subclass override and the inherited (string) overload.
        assert_eq!(info.methods.len(), 2);
        assert_eq!(info.methods[0].ret, HostType::I32);
    }

    #[test]
    fn test_bean_synthesis_keeps_raw_accessors() {
        let registry = HostClassRegistry::new();
        let mut def = HostClassDef::new("Demo");
        def.methods.push(method("getFoo", vec![], HostType::I32));
        def.methods
            .push(method("setFoo", vec![HostType::I32], HostType::Void));
        def.methods.push(method("isOn", vec![], HostType::Bool));
        let id = registry.register(def);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, id).unwrap();
        let members = build_members(&info, &IdentityRemapper, false);

        let foo = members.member("foo").unwrap();
        let Member::BeanAccessor(bean) = foo else {
            panic!("expected bean accessor");
        };
        assert!(bean.getter.is_some());
        assert!(bean.setter.is_some());
        assert!(matches!(members.member("on"), Some(Member::BeanAccessor(_))));
        assert!(matches!(members.member("getFoo"), Some(Member::Method(..))));
        assert!(matches!(members.member("setFoo"), Some(Member::Method(..))));
    }

    #[test]
    fn test_nonpublic_members_gated_by_enhanced_access() {
        let registry = HostClassRegistry::new();
        let mut def = HostClassDef::new("Demo");
        def.fields.push(field("open", Visibility::Public));
        def.fields.push(field("secret", Visibility::NonPublic));
        let id = registry.register(def);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, id).unwrap();
        // Visibility survives the structural layer; the scope layer gates.
        assert_eq!(info.fields.len(), 2);

        let plain = build_members(&info, &IdentityRemapper, false);
        assert!(plain.member("open").is_some());
        assert!(plain.member("secret").is_none());

        let enhanced = build_members(&info, &IdentityRemapper, true);
        assert!(enhanced.member("secret").is_some());
    }

    #[test]
    fn test_remapper_renames_before_grouping() {
        struct Renamer;
        impl NameRemapper for Renamer {
            fn remap(&self, _class: &str, member: &str) -> Option<String> {
                (member == "getValue").then(|| "getCount".to_string())
            }
        }

        let registry = HostClassRegistry::new();
        let mut def = HostClassDef::new("Demo");
        def.methods.push(method("getValue", vec![], HostType::I32));
        let id = registry.register(def);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, id).unwrap();
        let members = build_members(&info, &Renamer, false);
        assert!(members.member("getValue").is_none());
        assert!(members.member("getCount").is_some());
        // The bean derives from the remapped name.
        assert!(members.member("count").is_some());
        assert!(members.member("value").is_none());
    }

    #[test]
    fn test_hidden_members_never_surface() {
        let registry = HostClassRegistry::new();
        let mut def = HostClassDef::new("Demo");
        let mut hidden = field("ghost", Visibility::Public);
        hidden.hidden = true;
        def.fields.push(hidden);
        let id = registry.register(def);

        let cache = MetadataCache::new();
        let info = cache.info(&registry, id).unwrap();
        assert!(info.fields.is_empty());
        let members = build_members(&info, &IdentityRemapper, true);
        assert!(members.member("ghost").is_none());
    }
}
