use std::sync::Barrier;
use std::thread;

use pykernel::{ExceptionKind, Function, TypeSystem, TypeSystemInfo, Value, abstract_api};

fn system() -> TypeSystem {
    let _ = env_logger::builder().is_test(true).try_init();
    TypeSystem::new(TypeSystemInfo::default()).unwrap()
}

fn no_items() -> Vec<(&'static str, Value)> {
    Vec::new()
}

fn len_of(n: i64) -> Value {
    Value::function(Function::new("__len__", move |_, _, _| Ok(Value::int(n))))
}

#[test]
fn subtype_keeps_its_own_definition_when_base_changes_concurrently() {
    let sys = system();
    for round in 0..200 {
        let base = sys.define_class("Base", &[], no_items(), None).unwrap();
        let sub = sys
            .define_class("Sub", &[base.clone()], no_items(), None)
            .unwrap();
        let obj = abstract_api::call(&sys, &sub.as_value(), &[], &[]).unwrap();

        let barrier = Barrier::new(2);
        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                base.set_attr("__len__", len_of(1));
            });
            s.spawn(|| {
                barrier.wait();
                sub.set_attr("__len__", len_of(2));
            });
        });
        assert_eq!(abstract_api::len(&sys, &obj).unwrap(), 2, "round {round}");
        let base_obj = abstract_api::call(&sys, &base.as_value(), &[], &[]).unwrap();
        assert_eq!(abstract_api::len(&sys, &base_obj).unwrap(), 1, "round {round}");
    }
}

#[test]
fn dispatch_sees_only_installed_targets_while_attributes_change() {
    let sys = system();
    let sized = sys.define_class("Sized", &[], no_items(), None).unwrap();
    let obj = abstract_api::call(&sys, &sized.as_value(), &[], &[]).unwrap();
    let one = len_of(1);
    let two = len_of(2);

    let barrier = Barrier::new(6);
    thread::scope(|s| {
        for writer in [&one, &two] {
            let (sized, barrier) = (&sized, &barrier);
            s.spawn(move || {
                barrier.wait();
                for i in 0..500 {
                    if i % 3 == 2 {
                        sized.del_attr("__len__");
                    } else {
                        sized.set_attr("__len__", writer.clone());
                    }
                }
            });
        }
        for _ in 0..4 {
            let (sys, obj, barrier) = (&sys, &obj, &barrier);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..2000 {
                    match abstract_api::len(sys, obj) {
                        Ok(n) => assert!(n == 1 || n == 2, "len {n} was never installed"),
                        Err(err) => assert!(err.is_raised(ExceptionKind::TypeError), "{err}"),
                    }
                }
            });
        }
    });

    sized.set_attr("__len__", two.clone());
    assert_eq!(abstract_api::len(&sys, &obj).unwrap(), 2);
    sized.del_attr("__len__");
    let err = abstract_api::len(&sys, &obj).unwrap_err();
    assert!(err.is_raised(ExceptionKind::TypeError));
}
