use std::sync::Arc;

use pykernel::class::{self, Capabilities, NativeClass};
use pykernel::{Data, TypeSpec, TypeSystem, TypeSystemInfo, Value, abstract_api};

fn system() -> TypeSystem {
    let _ = env_logger::builder().is_test(true).try_init();
    TypeSystem::new(TypeSystemInfo::default()).unwrap()
}

fn no_items() -> Vec<(&'static str, Value)> {
    Vec::new()
}

#[test]
fn dynamic_classes_are_reclaimed_with_their_last_use() {
    let sys = system();
    sys.registry().prune();
    let registered = sys.registry().len();
    let synthesized = sys.subclass_factory().len();

    let temp = sys
        .define_class("Temp", &[], no_items(), Some(&["only_here"][..]))
        .unwrap();
    let obj = abstract_api::call(&sys, &temp.as_value(), &[], &[]).unwrap();
    abstract_api::setattr(&sys, &obj, "only_here", &Value::int(1)).unwrap();
    assert_eq!(sys.registry().len(), registered + 1);
    assert_eq!(sys.subclass_factory().len(), synthesized + 1);

    let weak = Arc::downgrade(&temp);
    drop(temp);
    assert!(weak.upgrade().is_some(), "the instance still names its type");
    assert_eq!(sys.registry().prune(), 0);

    drop(obj);
    assert!(weak.upgrade().is_none());
    assert_eq!(sys.subclass_factory().len(), synthesized);
    assert_eq!(sys.registry().prune(), 1, "the synthesized class is gone");
    assert_eq!(sys.registry().len(), registered);
}

#[test]
fn native_classes_keep_their_type_while_the_registry_lives() {
    let sys = system();
    let temp_class = NativeClass::derive("Temp", &class::OBJECT, Capabilities::empty(), &[]);
    let temp = sys
        .factory()
        .from_spec(TypeSpec::new("Temp").primary(&temp_class).base(sys.object()))
        .unwrap();
    let weak = Arc::downgrade(&temp);
    drop(temp);

    let v = Value::new(&temp_class, Data::None);
    let found = sys.type_of(&v).unwrap();
    assert!(weak.upgrade().is_some_and(|t| t.ptr_eq(&found)), "instances find the same type");
    drop((v, found));
    assert_eq!(sys.registry().prune(), 0);

    drop(sys);
    assert!(weak.upgrade().is_none(), "dropped with the type system");
}
