use pykernel::class::{self, Capabilities, NativeClass};
use pykernel::{
    Data, ExceptionKind, RepresentationKind, SpecialMethod, Target, TypeKind, TypeSpec,
    TypeSystem, TypeSystemInfo, Value, abstract_api,
};

fn no_items() -> Vec<(&'static str, Value)> {
    Vec::new()
}

fn system() -> TypeSystem {
    let _ = env_logger::builder().is_test(true).try_init();
    TypeSystem::new(TypeSystemInfo::default()).unwrap()
}

#[test]
fn adopted_index_selects_the_target() {
    let sys = system();
    let boxed = NativeClass::derive("Boxed", &class::OBJECT, Capabilities::empty(), &[]);
    let raw = NativeClass::derive("Raw", &class::OBJECT, Capabilities::empty(), &[]);
    let spare = NativeClass::derive("Spare", &class::OBJECT, Capabilities::empty(), &[]);
    let number = sys
        .factory()
        .from_spec(
            TypeSpec::new("number")
                .primary(&boxed)
                .adopt(&raw)
                .adopt(&spare)
                .base(sys.object())
                .method_for(0, SpecialMethod::Repr, Target::unary(|_, _| Ok(Value::str("boxed"))))
                .method_for(1, SpecialMethod::Repr, Target::unary(|_, _| Ok(Value::str("raw"))))
                .method_for(2, SpecialMethod::Repr, Target::unary(|_, _| Ok(Value::str("spare")))),
        )
        .unwrap();
    assert_eq!(number.kind(), TypeKind::Adoptive);

    for (i, (class, text)) in [(&boxed, "boxed"), (&raw, "raw"), (&spare, "spare")]
        .into_iter()
        .enumerate()
    {
        let rep = sys.representation(class).unwrap();
        assert!(
            matches!(rep.kind(), RepresentationKind::Adopted { .. }),
            "{class} should be adopted, got {rep}"
        );
        assert_eq!(rep.index(), i, "index of {class}");
        assert!(rep.static_type().is_some_and(|t| t.ptr_eq(&number)));

        let v = Value::new(class, Data::None);
        assert!(sys.type_of(&v).unwrap().ptr_eq(&number));
        assert_eq!(&*abstract_api::repr(&sys, &v).unwrap(), text);
    }
}

#[test]
fn float_accepts_both_of_its_classes() {
    let sys = system();
    let boxed = sys.representation(&class::PY_FLOAT).unwrap();
    let plain = sys.representation(&class::F64).unwrap();
    assert_eq!(boxed.index(), 0);
    assert_eq!(plain.index(), 1);
    assert!(matches!(plain.kind(), RepresentationKind::Adopted { .. }));

    let sum = abstract_api::add(&sys, &Value::py_float(1.5), &Value::float(2.0)).unwrap();
    assert_eq!(sum.as_float(), Some(3.5));
    assert!(sys.type_of(&sum).unwrap().ptr_eq(sys.float_type()));
}

#[test]
fn class_assignment_among_shared_types() {
    let sys = system();
    let a = sys.define_class("A", &[], no_items(), None).unwrap();
    let b = sys.define_class("B", &[], no_items(), None).unwrap();
    let slotted = sys
        .define_class("S", &[], no_items(), Some(&["x"][..]))
        .unwrap();
    assert_eq!(a.kind(), TypeKind::Replaceable);

    let rep_a = sys.representation(a.canonical_class()).unwrap();
    assert!(rep_a.is_shared());
    assert!(a.canonical_class().ptr_eq(b.canonical_class()), "A and B share a class");

    let obj = abstract_api::call(&sys, &a.as_value(), &[], &[]).unwrap();
    sys.set_type(&obj, &b).unwrap();
    assert!(sys.type_of(&obj).unwrap().ptr_eq(&b));

    let err = sys.set_type(&obj, &slotted).unwrap_err();
    assert!(err.to_string().contains("layout differs"), "{err}");
    assert!(sys.type_of(&obj).unwrap().ptr_eq(&b), "failed assignment changes nothing");

    let err = sys.set_type(&obj, sys.exception(ExceptionKind::ValueError)).unwrap_err();
    assert!(err.to_string().contains("layout differs"), "{err}");

    let err = sys.set_type(&obj, sys.int_type()).unwrap_err();
    assert!(err.to_string().contains("layout differs"), "{err}");

    let err = sys.set_type(&Value::int(3), &b).unwrap_err();
    assert!(err.is_raised(ExceptionKind::TypeError));
}

#[test]
fn class_assignment_through_attribute() {
    let sys = system();
    let a = sys.define_class("A", &[], no_items(), None).unwrap();
    let b = sys
        .define_class("B", &[a.clone()], no_items(), None)
        .unwrap();
    let obj = abstract_api::call(&sys, &a.as_value(), &[], &[]).unwrap();
    abstract_api::setattr(&sys, &obj, "__class__", &b.as_value()).unwrap();
    let cls = abstract_api::getattr(&sys, &obj, "__class__").unwrap();
    assert!(cls.as_type().is_some_and(|t| t.ptr_eq(&b)));
}

#[test]
fn unregistered_classes_are_discovered() {
    let sys = system();
    let found = NativeClass::root("Foreign", Capabilities::empty());
    let v = Value::new(&found, Data::Int(1));
    let ty = sys.type_of(&v).unwrap();
    assert_eq!(&**ty.name(), "Foreign");
    let mro = ty.mro();
    let names: Vec<&str> = mro.iter().map(|t| &**t.name()).collect();
    assert_eq!(names, ["Foreign", "object"]);
    assert!(matches!(
        sys.representation(&found).unwrap().kind(),
        RepresentationKind::Simple(_)
    ));
    assert_eq!(&*abstract_api::repr(&sys, &v).unwrap(), "<Foreign object>");
}

#[test]
fn discovered_classes_inherit_object_behaviour() {
    let sys = system();
    let found = NativeClass::root("Foreign", Capabilities::empty());
    let v = Value::new(&found, Data::Int(1));
    let ty = sys.type_of(&v).unwrap();
    for op in [
        SpecialMethod::GetAttribute,
        SpecialMethod::SetAttr,
        SpecialMethod::Hash,
        SpecialMethod::Init,
        SpecialMethod::Repr,
    ] {
        assert!(op.is_defined_for(&ty, 0), "{op} inherited from object");
    }

    let cls = abstract_api::getattr(&sys, &v, "__class__").unwrap();
    assert!(cls.as_type().is_some_and(|t| t.ptr_eq(&ty)));
    let hash = abstract_api::hash(&sys, &v).unwrap();
    assert_eq!(hash, abstract_api::hash(&sys, &v).unwrap());

    let object_hash = abstract_api::getattr(&sys, &sys.object().as_value(), "__hash__").unwrap();
    let direct = abstract_api::call(&sys, &object_hash, &[v.clone()], &[]).unwrap();
    assert_eq!(direct.as_int(), Some(hash as i64));
}
