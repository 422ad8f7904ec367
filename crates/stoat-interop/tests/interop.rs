//! End-to-end interop tests over a registered host class fixture.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use stoat_interop::{
    ClassAccessFilter, ClassId, ClassKind, CtorDef, FieldDef, HostClassDef, HostClassRegistry,
    HostError, HostInstance, HostType, HostValue, IndexedAccess, MethodDef, NameRemapper, Scope,
    ScriptedAdapter, Visibility, coerce,
};
use stoat_object::{
    DynamicObject, NativeFunction, ObjectRef, PropertyKey, ScriptError, ScriptObject, Value,
    attrib,
};

struct PointData {
    x: AtomicI32,
    y: AtomicI32,
    label: Mutex<String>,
}

struct CounterData {
    items: Mutex<Vec<i32>>,
}

fn point_data(instance: Option<&HostInstance>) -> Result<&PointData, HostError> {
    instance
        .and_then(|i| i.payload::<PointData>())
        .ok_or_else(|| HostError::new("expected a Point instance"))
}

fn counter_data(instance: Option<&HostInstance>) -> Result<&CounterData, HostError> {
    instance
        .and_then(|i| i.payload::<CounterData>())
        .ok_or_else(|| HostError::new("expected a Counter instance"))
}

fn int_arg(args: &[HostValue], index: usize) -> Result<i32, HostError> {
    match args.get(index) {
        Some(HostValue::I32(v)) => Ok(*v),
        other => Err(HostError::new(format!("expected i32, got {other:?}"))),
    }
}

fn field(name: &str, get: impl Fn(&PointData) -> i32 + Send + Sync + 'static) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        ty: HostType::I32,
        visibility: Visibility::Public,
        hidden: false,
        is_static: false,
        readonly: false,
        get: Arc::new(move |i| Ok(HostValue::I32(get(point_data(i)?)))),
        set: None,
    }
}

fn register_point(registry: &HostClassRegistry) -> ClassId {
    let id_cell: Arc<OnceLock<ClassId>> = Arc::new(OnceLock::new());

    let mut def = HostClassDef::new("geo.Point");

    let mut x = field("x", |p| p.x.load(Ordering::Relaxed));
    x.set = Some(Arc::new(|i, v| {
        let HostValue::I32(v) = v else {
            return Err(HostError::new("expected i32"));
        };
        point_data(i)?.x.store(v, Ordering::Relaxed);
        Ok(())
    }));
    def.fields.push(x);
    def.fields.push(field("y", |p| p.y.load(Ordering::Relaxed)));

    let mut secret = field("secret", |p| {
        p.x.load(Ordering::Relaxed) ^ p.y.load(Ordering::Relaxed)
    });
    secret.visibility = Visibility::NonPublic;
    def.fields.push(secret);

    def.fields.push(FieldDef {
        name: "axes".to_string(),
        ty: HostType::I32,
        visibility: Visibility::Public,
        hidden: false,
        is_static: true,
        readonly: true,
        get: Arc::new(|_| Ok(HostValue::I32(2))),
        set: None,
    });

    let method = |name: &str, params: Vec<HostType>, ret: HostType| MethodDef {
        name: name.to_string(),
        params,
        ret,
        visibility: Visibility::Public,
        hidden: false,
        is_static: false,
        variadic: false,
        invoke: Arc::new(|_, _| Err(HostError::new("unset"))),
    };

    let mut norm1 = method("norm1", vec![], HostType::I32);
    norm1.invoke = Arc::new(|i, _| {
        let p = point_data(i)?;
        Ok(HostValue::I32(
            p.x.load(Ordering::Relaxed).abs() + p.y.load(Ordering::Relaxed).abs(),
        ))
    });
    def.methods.push(norm1);

    let mut mix_int = method("mix", vec![HostType::I32], HostType::Str);
    mix_int.invoke = Arc::new(|_, _| Ok(HostValue::Str("int".to_string())));
    def.methods.push(mix_int);

    let mut mix_any = method("mix", vec![HostType::Any], HostType::Str);
    mix_any.invoke = Arc::new(|_, _| Ok(HostValue::Str("any".to_string())));
    def.methods.push(mix_any);

    let mut get_label = method("getLabel", vec![], HostType::Str);
    get_label.invoke =
        Arc::new(|i, _| Ok(HostValue::Str(point_data(i)?.label.lock().unwrap().clone())));
    def.methods.push(get_label);

    let mut set_label = method("setLabel", vec![HostType::Str], HostType::Void);
    set_label.invoke = Arc::new(|i, args| {
        let Some(HostValue::Str(s)) = args.first() else {
            return Err(HostError::new("expected string"));
        };
        *point_data(i)?.label.lock().unwrap() = s.clone();
        Ok(HostValue::Void)
    });
    def.methods.push(set_label);

    let mut sum = method(
        "sum",
        vec![HostType::Array(Box::new(HostType::I32))],
        HostType::I32,
    );
    sum.variadic = true;
    sum.invoke = Arc::new(|_, args| {
        let Some(HostValue::Array(values)) = args.first() else {
            return Err(HostError::new("expected array"));
        };
        let mut total = 0;
        for element in values.to_vec() {
            let HostValue::I32(v) = element else {
                return Err(HostError::new("expected i32 element"));
            };
            total += v;
        }
        Ok(HostValue::I32(total))
    });
    def.methods.push(sum);

    let mut coords = method(
        "coords",
        vec![],
        HostType::Array(Box::new(HostType::I32)),
    );
    coords.invoke = Arc::new(|i, _| {
        let p = point_data(i)?;
        Ok(HostValue::Array(stoat_interop::HostArray::new(
            HostType::I32,
            vec![
                HostValue::I32(p.x.load(Ordering::Relaxed)),
                HostValue::I32(p.y.load(Ordering::Relaxed)),
            ],
        )))
    });
    def.methods.push(coords);

    let mut fail = method("fail", vec![], HostType::Void);
    fail.invoke = Arc::new(|_, _| Err(HostError::new("sensor offline")));
    def.methods.push(fail);

    let ctor_cell = id_cell.clone();
    def.ctors.push(CtorDef {
        params: vec![HostType::I32, HostType::I32],
        visibility: Visibility::Public,
        hidden: false,
        variadic: false,
        construct: Arc::new(move |args| {
            let x = int_arg(args, 0)?;
            let y = int_arg(args, 1)?;
            Ok(HostInstance::new(
                *ctor_cell.get().expect("class registered"),
                PointData {
                    x: AtomicI32::new(x),
                    y: AtomicI32::new(y),
                    label: Mutex::new(String::new()),
                },
            ))
        }),
    });

    let id = registry.register(def);
    id_cell.set(id).unwrap();
    id
}

fn register_listener(registry: &HostClassRegistry) -> ClassId {
    let mut def = HostClassDef::new("event.Listener");
    def.kind = ClassKind::Interface;
    def.methods.push(MethodDef {
        name: "onEvent".to_string(),
        params: vec![HostType::I32],
        ret: HostType::I32,
        visibility: Visibility::Public,
        hidden: false,
        is_static: false,
        variadic: false,
        invoke: Arc::new(|_, _| Err(HostError::new("interface method"))),
    });
    registry.register(def)
}

fn register_counter(registry: &HostClassRegistry) -> ClassId {
    let id_cell: Arc<OnceLock<ClassId>> = Arc::new(OnceLock::new());
    let mut def = HostClassDef::new("util.Counter");

    let method = |name: &str, params: Vec<HostType>, ret: HostType| MethodDef {
        name: name.to_string(),
        params,
        ret,
        visibility: Visibility::Public,
        hidden: false,
        is_static: false,
        variadic: false,
        invoke: Arc::new(|_, _| Err(HostError::new("unset"))),
    };

    let mut item_at = method("itemAt", vec![HostType::I32], HostType::I32);
    item_at.invoke = Arc::new(|i, args| {
        let index = int_arg(args, 0)? as usize;
        let items = counter_data(i)?.items.lock().unwrap();
        items
            .get(index)
            .copied()
            .map(HostValue::I32)
            .ok_or_else(|| HostError::new("index out of range"))
    });
    def.methods.push(item_at);

    let mut set_item_at = method(
        "setItemAt",
        vec![HostType::I32, HostType::I32],
        HostType::Void,
    );
    set_item_at.invoke = Arc::new(|i, args| {
        let index = int_arg(args, 0)? as usize;
        let value = int_arg(args, 1)?;
        let mut items = counter_data(i)?.items.lock().unwrap();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(HostValue::Void)
            }
            None => Err(HostError::new("index out of range")),
        }
    });
    def.methods.push(set_item_at);

    let mut size = method("size", vec![], HostType::I32);
    size.invoke = Arc::new(|i, _| {
        Ok(HostValue::I32(
            counter_data(i)?.items.lock().unwrap().len() as i32,
        ))
    });
    def.methods.push(size);

    def.indexed = Some(IndexedAccess {
        get: "itemAt".to_string(),
        set: Some("setItemAt".to_string()),
        length: "size".to_string(),
    });

    let ctor_cell = id_cell.clone();
    def.ctors.push(CtorDef {
        params: vec![HostType::Array(Box::new(HostType::I32))],
        visibility: Visibility::Public,
        hidden: false,
        variadic: false,
        construct: Arc::new(move |args| {
            let Some(HostValue::Array(values)) = args.first() else {
                return Err(HostError::new("expected array"));
            };
            let mut items = Vec::new();
            for element in values.to_vec() {
                let HostValue::I32(v) = element else {
                    return Err(HostError::new("expected i32 element"));
                };
                items.push(v);
            }
            Ok(HostInstance::new(
                *ctor_cell.get().expect("class registered"),
                CounterData {
                    items: Mutex::new(items),
                },
            ))
        }),
    });

    let id = registry.register(def);
    id_cell.set(id).unwrap();
    id
}

fn fixture() -> (Arc<HostClassRegistry>, Arc<Scope>) {
    let registry = Arc::new(HostClassRegistry::new());
    register_point(&registry);
    register_listener(&registry);
    register_counter(&registry);
    let scope = Scope::new(registry.clone());
    (registry, scope)
}

fn construct(scope: &Arc<Scope>, class: &str, args: &[Value]) -> Value {
    let class_object = scope.lookup_class(class).unwrap();
    class_object.as_object().unwrap().construct(args).unwrap()
}

fn get(object: &Value, name: &str) -> Option<Value> {
    object
        .as_object()
        .unwrap()
        .get(&PropertyKey::new(name), object)
        .unwrap()
}

fn call(object: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let Some(Value::Object(f)) = get(object, name) else {
        panic!("{name} is not callable");
    };
    f.call(object, args)
}

#[test]
fn test_construct_and_read_fields() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(3), Value::int32(-4)]);
    assert_eq!(get(&point, "x").unwrap().as_int32(), Some(3));
    assert_eq!(get(&point, "y").unwrap().as_int32(), Some(-4));
    assert_eq!(call(&point, "norm1", &[]).unwrap().as_int32(), Some(7));
}

#[test]
fn test_field_write_coerces_value() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    point
        .as_object()
        .unwrap()
        .put(&PropertyKey::new("x"), Value::number(7.0), false)
        .unwrap();
    assert_eq!(get(&point, "x").unwrap().as_int32(), Some(7));
}

#[test]
fn test_unknown_member_write_is_error() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let err = point
        .as_object()
        .unwrap()
        .put(&PropertyKey::new("nope"), Value::int32(1), false)
        .unwrap_err();
    assert!(matches!(err, ScriptError::Type(_)));
}

#[test]
fn test_wrong_arity_call_is_an_error() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(3), Value::int32(4)]);
    // norm1 takes no parameters; surplus arguments must not be dropped.
    let err = call(
        &point,
        "norm1",
        &[Value::int32(1), Value::int32(2), Value::int32(3)],
    )
    .unwrap_err();
    assert!(matches!(err, ScriptError::Eval(_)));
    // A missing argument is just as much of a mismatch.
    let err = call(&point, "setLabel", &[]).unwrap_err();
    assert!(matches!(err, ScriptError::Eval(_)));
}

#[test]
fn test_wrapper_access_walks_prototype_chain() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(1), Value::int32(2)]);
    let object = point.as_object().unwrap();

    let proto = Arc::new(ScriptObject::new("Object"));
    proto.define_property("inherited", Value::int32(42), attrib::EMPTY);
    object
        .set_prototype(Some(proto.clone() as ObjectRef))
        .unwrap();

    assert!(object.has(&PropertyKey::new("inherited")));
    assert_eq!(get(&point, "inherited").unwrap().as_int32(), Some(42));

    // Own members still win over same-named prototype properties.
    proto.define_property("x", Value::int32(99), attrib::EMPTY);
    assert_eq!(get(&point, "x").unwrap().as_int32(), Some(1));

    // A write to a non-member lands on the prototype chain.
    object
        .put(&PropertyKey::new("inherited"), Value::int32(43), false)
        .unwrap();
    assert_eq!(
        proto
            .get(&PropertyKey::new("inherited"), &point)
            .unwrap()
            .unwrap()
            .as_int32(),
        Some(43)
    );

    // Host array wrappers walk the same way.
    let coords = call(&point, "coords", &[]).unwrap();
    let array_object = coords.as_object().unwrap();
    array_object
        .set_prototype(Some(proto.clone() as ObjectRef))
        .unwrap();
    assert_eq!(get(&coords, "inherited").unwrap().as_int32(), Some(43));

    // And so do class objects.
    let class_object = scope.lookup_class("geo.Point").unwrap();
    class_object
        .as_object()
        .unwrap()
        .set_prototype(Some(proto as ObjectRef))
        .unwrap();
    assert_eq!(get(&class_object, "inherited").unwrap().as_int32(), Some(43));
}

#[test]
fn test_overload_picks_by_argument_kind() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let for_int = call(&point, "mix", &[Value::int32(1)]).unwrap();
    assert_eq!(for_int.as_string().unwrap().as_ref(), "int");
    let for_string = call(&point, "mix", &[Value::string("s")]).unwrap();
    assert_eq!(for_string.as_string().unwrap().as_ref(), "any");
    // Memoized second call resolves identically.
    let again = call(&point, "mix", &[Value::int32(9)]).unwrap();
    assert_eq!(again.as_string().unwrap().as_ref(), "int");
}

#[test]
fn test_variadic_method_collects_arguments() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let total = call(
        &point,
        "sum",
        &[Value::int32(1), Value::int32(2), Value::int32(3)],
    )
    .unwrap();
    assert_eq!(total.as_int32(), Some(6));
    let empty = call(&point, "sum", &[]).unwrap();
    assert_eq!(empty.as_int32(), Some(0));
}

#[test]
fn test_bean_property_and_raw_accessors() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let object = point.as_object().unwrap();

    object
        .put(&PropertyKey::new("label"), Value::string("origin"), false)
        .unwrap();
    assert_eq!(
        get(&point, "label").unwrap().as_string().unwrap().as_ref(),
        "origin"
    );
    // The accessor methods stay callable under their own names.
    assert_eq!(
        call(&point, "getLabel", &[])
            .unwrap()
            .as_string()
            .unwrap()
            .as_ref(),
        "origin"
    );
    call(&point, "setLabel", &[Value::string("renamed")]).unwrap();
    assert_eq!(
        get(&point, "label").unwrap().as_string().unwrap().as_ref(),
        "renamed"
    );
}

#[test]
fn test_static_member_on_class_object() {
    let (_, scope) = fixture();
    let class_object = scope.lookup_class("geo.Point").unwrap();
    assert_eq!(get(&class_object, "axes").unwrap().as_int32(), Some(2));
    assert_eq!(
        get(&class_object, "name").unwrap().as_string().unwrap().as_ref(),
        "geo.Point"
    );
}

#[test]
fn test_enhanced_access_gates_nonpublic_members() {
    let (registry, plain) = fixture();
    let enhanced = Scope::builder(registry).enhanced_access(true).build();

    let point = construct(&plain, "geo.Point", &[Value::int32(5), Value::int32(3)]);
    assert!(get(&point, "secret").is_none());

    let point = construct(&enhanced, "geo.Point", &[Value::int32(5), Value::int32(3)]);
    assert_eq!(get(&point, "secret").unwrap().as_int32(), Some(5 ^ 3));
}

#[test]
fn test_enhanced_access_gates_host_failure_detail() {
    let (registry, plain) = fixture();
    let enhanced = Scope::builder(registry).enhanced_access(true).build();

    let point = construct(&plain, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let err = call(&point, "fail", &[]).unwrap_err();
    assert!(err.to_string().contains("host exception"));
    assert!(!err.to_string().contains("sensor offline"));

    let point = construct(&enhanced, "geo.Point", &[Value::int32(0), Value::int32(0)]);
    let err = call(&point, "fail", &[]).unwrap_err();
    assert!(err.to_string().contains("sensor offline"));
}

#[test]
fn test_remapper_renames_member() {
    struct Renamer;
    impl NameRemapper for Renamer {
        fn remap(&self, class: &str, member: &str) -> Option<String> {
            (class == "geo.Point" && member == "norm1").then(|| "norm".to_string())
        }
    }

    let registry = Arc::new(HostClassRegistry::new());
    register_point(&registry);
    let scope = Scope::builder(registry).remapper(Arc::new(Renamer)).build();

    let point = construct(&scope, "geo.Point", &[Value::int32(3), Value::int32(4)]);
    assert!(get(&point, "norm1").is_none());
    assert_eq!(call(&point, "norm", &[]).unwrap().as_int32(), Some(7));
}

#[test]
fn test_scripted_adapter_is_identity_stable() {
    let (registry, scope) = fixture();
    let listener = registry.find("event.Listener").unwrap();

    let target = Arc::new(ScriptObject::new("Object"));
    target.define_property(
        "onEvent",
        NativeFunction::value("onEvent", |_, args| {
            Ok(Value::int32(args[0].as_int32().unwrap_or(0) * 2))
        }),
        attrib::EMPTY,
    );
    let value = Value::object(target as ObjectRef);

    let first = coerce(&scope, &value, &HostType::Class(listener)).unwrap();
    let second = coerce(&scope, &value, &HostType::Class(listener)).unwrap();
    let (HostValue::Instance(a), HostValue::Instance(b)) = (first, second) else {
        panic!("expected adapter instances");
    };
    assert!(a.same_instance(&b));

    let adapter = a.payload::<ScriptedAdapter>().unwrap();
    let result = adapter.invoke("onEvent", &[HostValue::I32(21)]).unwrap();
    assert!(matches!(result, HostValue::I32(42)));
}

#[test]
fn test_bare_function_adapts_single_method_interface() {
    let (registry, scope) = fixture();
    let listener = registry.find("event.Listener").unwrap();

    let function = NativeFunction::value("handler", |_, args| {
        Ok(Value::int32(args[0].as_int32().unwrap_or(0) + 1))
    });
    let got = coerce(&scope, &function, &HostType::Class(listener)).unwrap();
    let HostValue::Instance(instance) = got else {
        panic!("expected adapter instance");
    };
    let adapter = instance.payload::<ScriptedAdapter>().unwrap();
    let result = adapter.invoke("onEvent", &[HostValue::I32(4)]).unwrap();
    assert!(matches!(result, HostValue::I32(5)));
}

#[test]
fn test_indexed_collection_reads_and_writes_by_index() {
    let (_, scope) = fixture();
    let array = Arc::new(ScriptObject::new("Array"));
    for (i, v) in [10, 20, 30].into_iter().enumerate() {
        array.define_property(i as u32, Value::int32(v), attrib::EMPTY);
    }
    array.define_property("length", Value::int32(3), attrib::DONTENUM);
    let counter = construct(
        &scope,
        "util.Counter",
        &[Value::object(array as ObjectRef)],
    );
    let object = counter.as_object().unwrap();

    assert_eq!(get(&counter, "length").unwrap().as_int32(), Some(3));
    assert_eq!(
        object
            .get(&PropertyKey::Index(1), &counter)
            .unwrap()
            .unwrap()
            .as_int32(),
        Some(20)
    );
    object
        .put(&PropertyKey::Index(1), Value::int32(25), false)
        .unwrap();
    assert_eq!(
        object
            .get(&PropertyKey::Index(1), &counter)
            .unwrap()
            .unwrap()
            .as_int32(),
        Some(25)
    );
}

#[test]
fn test_host_array_wrapper() {
    let (_, scope) = fixture();
    let point = construct(&scope, "geo.Point", &[Value::int32(8), Value::int32(9)]);
    let coords = call(&point, "coords", &[]).unwrap();
    let object = coords.as_object().unwrap();

    assert_eq!(get(&coords, "length").unwrap().as_int32(), Some(2));
    assert_eq!(
        object
            .get(&PropertyKey::Index(0), &coords)
            .unwrap()
            .unwrap()
            .as_int32(),
        Some(8)
    );

    object
        .put(&PropertyKey::Index(0), Value::int32(80), false)
        .unwrap();
    assert_eq!(
        object
            .get(&PropertyKey::Index(0), &coords)
            .unwrap()
            .unwrap()
            .as_int32(),
        Some(80)
    );

    let err = object
        .put(&PropertyKey::Index(9), Value::int32(0), false)
        .unwrap_err();
    assert!(matches!(err, ScriptError::Range(_)));
    let err = object
        .put(&PropertyKey::new("length"), Value::int32(5), false)
        .unwrap_err();
    assert!(matches!(err, ScriptError::Type(_)));
}

#[test]
fn test_interface_cannot_be_constructed() {
    let (_, scope) = fixture();
    let class_object = scope.lookup_class("event.Listener").unwrap();
    let err = class_object
        .as_object()
        .unwrap()
        .construct(&[])
        .unwrap_err();
    assert!(matches!(err, ScriptError::Type(_)));
}

#[test]
fn test_access_filter_blocks_lookup() {
    struct DenyPoint;
    impl ClassAccessFilter for DenyPoint {
        fn visible(&self, class_name: &str) -> bool {
            class_name != "geo.Point"
        }
    }

    let registry = Arc::new(HostClassRegistry::new());
    register_point(&registry);
    register_counter(&registry);
    let scope = Scope::builder(registry)
        .access_filter(Arc::new(DenyPoint))
        .build();

    assert!(scope.lookup_class("geo.Point").is_err());
    assert!(scope.lookup_class("util.Counter").is_ok());
}
