use std::sync::Arc;

use crate::abstract_api::{self, no_attribute};
use crate::class;
use crate::{
    Data, Feature, GetSetDescriptor, InterpreterError, KernelFlags, PyError, PyResult,
    SpecialMethod, Target, TypeRef, TypeSpec, TypeSystem, Value,
};

// ── object ──────────────────────────────────────────────────────────

/// The attribute found on the type of `obj`, if it is a descriptor, with
/// whether it is a data descriptor.
fn descriptor(sys: &TypeSystem, attr: &Value) -> PyResult<Option<(TypeRef, usize, bool)>> {
    let (ty, index) = sys.type_and_index(attr)?;
    let flags = ty.kernel_flags();
    if !flags.contains(KernelFlags::HAS_GET) || !SpecialMethod::Get.is_defined_for(&ty, index) {
        return Ok(None);
    }
    let data = SpecialMethod::Set.is_defined_for(&ty, index)
        || SpecialMethod::Delete.is_defined_for(&ty, index);
    Ok(Some((ty, index, data)))
}

/// Attribute lookup on an instance: data descriptors on the type, then
/// the instance dictionary, then anything else on the type.
pub fn generic_getattr(sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<Value> {
    let ty = sys.type_of(obj)?;
    let found = ty.lookup_value(name);
    let mut get = None;
    if let Some(attr) = &found {
        if let Some((dt, index, data)) = descriptor(sys, attr)? {
            if data {
                return SpecialMethod::Get.call_descr_get(sys, &dt, index, attr, Some(obj), Some(&ty));
            }
            get = Some((dt, index));
        }
    }
    if let Some(value) = obj.instance_dict().and_then(|dict| dict.get(name)) {
        return Ok(value);
    }
    match (found, get) {
        (Some(attr), Some((dt, index))) => {
            SpecialMethod::Get.call_descr_get(sys, &dt, index, &attr, Some(obj), Some(&ty))
        }
        (Some(attr), None) => Ok(attr),
        (None, _) => Err(no_attribute(&ty, name)),
    }
}

pub fn generic_setattr(sys: &TypeSystem, obj: &Value, name: &str, value: &Value) -> PyResult<()> {
    let ty = sys.type_of(obj)?;
    let found = ty.lookup_value(name);
    if let Some(attr) = &found {
        let (dt, index) = sys.type_and_index(attr)?;
        if SpecialMethod::Set.is_defined_for(&dt, index) {
            return SpecialMethod::Set.call_set_item(sys, &dt, index, attr, obj, value);
        }
    }
    match obj.instance_dict() {
        Some(dict) => {
            dict.insert(name, value.clone());
            Ok(())
        }
        None if found.is_some() => Err(PyError::attribute_error(format!(
            "'{}' object attribute '{}' is read-only",
            ty.name(),
            name
        ))),
        None => Err(no_attribute(&ty, name)),
    }
}

pub fn generic_delattr(sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<()> {
    let ty = sys.type_of(obj)?;
    if let Some(attr) = ty.lookup_value(name) {
        let (dt, index) = sys.type_and_index(&attr)?;
        if SpecialMethod::Delete.is_defined_for(&dt, index) {
            return SpecialMethod::Delete.call_del_item(sys, &dt, index, &attr, obj);
        }
    }
    match obj.instance_dict().and_then(|dict| dict.remove(name)) {
        Some(_) => Ok(()),
        None => Err(no_attribute(&ty, name)),
    }
}

/// True if `ty` takes `__init__` from `object`.
fn inherits_object_init(sys: &TypeSystem, ty: &TypeRef) -> bool {
    ty.lookup("__init__")
        .is_none_or(|(_, owner)| owner.ptr_eq(sys.object()))
}

fn object_new(sys: &TypeSystem, ty: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    if (!args.is_empty() || !kwnames.is_empty()) && inherits_object_init(sys, ty) {
        return Err(PyError::type_error(format!("{}() takes no arguments", ty.name())));
    }
    Ok(Value::for_type(ty, Data::None))
}

fn object_init(sys: &TypeSystem, obj: &Value, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<()> {
    if args.is_empty() && kwnames.is_empty() {
        return Ok(());
    }
    let ty = sys.type_of(obj)?;
    let own_constructor = ty
        .find_constructor()
        .is_some_and(|(_, owner)| !owner.ptr_eq(sys.object()));
    if own_constructor {
        Ok(())
    } else {
        Err(PyError::type_error(format!(
            "{}.__init__() takes exactly one argument (the instance to initialize)",
            ty.name()
        )))
    }
}

fn get_class(sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
    Ok(sys.type_of(obj)?.as_value())
}

fn set_class(sys: &TypeSystem, obj: &Value, value: &Value) -> PyResult<()> {
    match value.as_type() {
        Some(ty) => sys.set_type(obj, ty),
        None => Err(PyError::type_error(format!(
            "__class__ must be set to a class, not '{}' object",
            sys.type_name(value)
        ))),
    }
}

fn get_dict(sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
    match obj.instance_dict() {
        Some(dict) => Ok(Value::dict(dict)),
        None => Err(PyError::attribute_error(format!(
            "'{}' object has no attribute '__dict__'",
            sys.type_name(obj)
        ))),
    }
}

fn set_dict(sys: &TypeSystem, obj: &Value, value: &Value) -> PyResult<()> {
    match value.as_dict() {
        Some(dict) => sys.set_dict(obj, dict.clone()),
        None => Err(PyError::type_error(format!(
            "__dict__ must be set to a dictionary, not a '{}'",
            sys.type_name(value)
        ))),
    }
}

pub(crate) fn object_spec() -> TypeSpec {
    TypeSpec::new("object")
        .primary(&class::OBJECT)
        .feature(Feature::BASETYPE | Feature::INSTANTIABLE)
        .doc("The base class of the class hierarchy.")
        .method(SpecialMethod::GetAttribute, Target::getattr(generic_getattr))
        .method(SpecialMethod::SetAttr, Target::setattr(generic_setattr))
        .method(SpecialMethod::DelAttr, Target::delattr(generic_delattr))
        .method(
            SpecialMethod::Repr,
            Target::unary(|sys, v| Ok(Value::str(&format!("<{} object>", sys.type_name(v))))),
        )
        .method(
            SpecialMethod::Str,
            Target::unary(|sys, v| abstract_api::repr(sys, v).map(|s| Value::str(&s))),
        )
        .method(SpecialMethod::Hash, Target::len(|_, v| Ok(v.identity() & i64::MAX as usize)))
        .method(
            SpecialMethod::Eq,
            Target::binary(|_, v, w| {
                Ok(if v.is(w) {
                    Value::bool(true)
                } else {
                    Value::not_implemented()
                })
            }),
        )
        .method(
            SpecialMethod::Ne,
            Target::binary(|_, v, w| {
                Ok(if v.is(w) {
                    Value::bool(false)
                } else {
                    Value::not_implemented()
                })
            }),
        )
        .method(SpecialMethod::Init, Target::init(object_init))
        .constructor(Arc::new(object_new))
        .attr(
            "__class__",
            GetSetDescriptor::new("object", "__class__", get_class)
                .with_setter(set_class)
                .into_value(),
        )
        .attr(
            "__dict__",
            GetSetDescriptor::new("object", "__dict__", get_dict)
                .with_setter(set_dict)
                .into_value(),
        )
}

// ── type ────────────────────────────────────────────────────────────

fn type_of_self(v: &Value) -> PyResult<&TypeRef> {
    v.as_type()
        .ok_or_else(|| InterpreterError::Internal("slot of type called on another object".into()).into())
}

fn no_type_attribute(ty: &TypeRef, name: &str) -> PyError {
    PyError::attribute_error(format!(
        "type object '{}' has no attribute '{}'",
        ty.name(),
        name
    ))
}

/// Attribute lookup on a type: data descriptors on the metatype, then the
/// type's own MRO, then anything else on the metatype.
fn type_getattr(sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<Value> {
    let ty = type_of_self(obj)?;
    let meta = sys.type_of(obj)?;
    let meta_attr = meta.lookup_value(name);
    let mut meta_get = None;
    if let Some(attr) = &meta_attr {
        if let Some((dt, index, data)) = descriptor(sys, attr)? {
            if data {
                return SpecialMethod::Get.call_descr_get(sys, &dt, index, attr, Some(obj), Some(&meta));
            }
            meta_get = Some((dt, index));
        }
    }
    if let Some(attr) = ty.lookup_value(name) {
        return match descriptor(sys, &attr)? {
            Some((dt, index, _)) => {
                SpecialMethod::Get.call_descr_get(sys, &dt, index, &attr, None, Some(ty))
            }
            None => Ok(attr),
        };
    }
    match (meta_attr, meta_get) {
        (Some(attr), Some((dt, index))) => {
            SpecialMethod::Get.call_descr_get(sys, &dt, index, &attr, Some(obj), Some(&meta))
        }
        (Some(attr), None) => Ok(attr),
        (None, _) => Err(no_type_attribute(ty, name)),
    }
}

fn check_mutable(ty: &TypeRef, name: &str) -> PyResult<()> {
    if ty.features().contains(Feature::IMMUTABLE) {
        Err(PyError::type_error(format!(
            "cannot set '{}' attribute of immutable type '{}'",
            name,
            ty.name()
        )))
    } else {
        Ok(())
    }
}

fn type_setattr(sys: &TypeSystem, obj: &Value, name: &str, value: &Value) -> PyResult<()> {
    let ty = type_of_self(obj)?;
    check_mutable(ty, name)?;
    let meta = sys.type_of(obj)?;
    if let Some(attr) = meta.lookup_value(name) {
        let (dt, index) = sys.type_and_index(&attr)?;
        if SpecialMethod::Set.is_defined_for(&dt, index) {
            return SpecialMethod::Set.call_set_item(sys, &dt, index, &attr, obj, value);
        }
    }
    ty.set_attr(name, value.clone());
    Ok(())
}

fn type_delattr(_sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<()> {
    let ty = type_of_self(obj)?;
    check_mutable(ty, name)?;
    if ty.del_attr(name) {
        Ok(())
    } else {
        Err(no_type_attribute(ty, name))
    }
}

/// `type(x)`, `type(name, bases, dict)`, or a call on any other type.
fn type_call(sys: &TypeSystem, obj: &Value, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let ty = type_of_self(obj)?;
    if !ty.ptr_eq(sys.type_type()) {
        return ty.call(sys, args, kwnames);
    }
    match args {
        [x] => Ok(sys.type_of(x)?.as_value()),
        [name, bases, namespace] => {
            let (Some(name), Some(bases), Some(namespace)) =
                (name.as_str(), bases.as_tuple(), namespace.as_dict())
            else {
                return Err(PyError::type_error(
                    "type.__new__() argument types must be (str, tuple, dict)",
                ));
            };
            let bases = bases
                .iter()
                .map(|b| {
                    b.as_type().cloned().ok_or_else(|| {
                        PyError::type_error(format!(
                            "bases must be types, not '{}'",
                            sys.type_name(b)
                        ))
                    })
                })
                .collect::<PyResult<Vec<_>>>()?;
            let slots: Option<Vec<Arc<str>>> = match namespace.get("__slots__") {
                None => None,
                Some(v) if v.as_str().is_some() => v.as_str().map(|s| vec![s.clone()]),
                Some(v) => match v.as_tuple() {
                    Some(items) => Some(
                        items
                            .iter()
                            .map(|s| {
                                s.as_str()
                                    .cloned()
                                    .ok_or_else(|| PyError::type_error("__slots__ items must be strings"))
                            })
                            .collect::<PyResult<_>>()?,
                    ),
                    None => return Err(PyError::type_error("__slots__ must be a str or tuple")),
                },
            };
            let slot_names: Option<Vec<&str>> =
                slots.as_ref().map(|s| s.iter().map(|n| &**n).collect());
            let ty = sys.define_class(name, &bases, namespace.items(), slot_names.as_deref())?;
            Ok(ty.as_value())
        }
        _ => Err(PyError::type_error("type() takes 1 or 3 arguments")),
    }
}

fn type_name(_sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
    Ok(Value::str(type_of_self(obj)?.name()))
}

fn type_mro(_sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
    let ty = type_of_self(obj)?;
    Ok(Value::tuple(ty.mro().iter().map(|t| t.as_value()).collect()))
}

fn type_doc(_sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
    Ok(type_of_self(obj)?
        .doc()
        .map(|doc| Value::str(doc))
        .unwrap_or_else(Value::none))
}

pub(crate) fn type_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("type")
        .primary(&class::TYPE)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .doc("type(object) -> the object's type\ntype(name, bases, dict) -> a new type")
        .method(SpecialMethod::Call, Target::call(type_call))
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, v| Ok(Value::str(&format!("<class '{}'>", type_of_self(v)?.name())))),
        )
        .method(SpecialMethod::GetAttribute, Target::getattr(type_getattr))
        .method(SpecialMethod::SetAttr, Target::setattr(type_setattr))
        .method(SpecialMethod::DelAttr, Target::delattr(type_delattr))
        .attr("__name__", GetSetDescriptor::new("type", "__name__", type_name).into_value())
        .attr("__mro__", GetSetDescriptor::new("type", "__mro__", type_mro).into_value())
        .attr("__doc__", GetSetDescriptor::new("type", "__doc__", type_doc).into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExceptionKind, Function, TypeSystemInfo};

    fn system() -> TypeSystem {
        TypeSystem::new(TypeSystemInfo::default()).unwrap()
    }

    #[test]
    fn instance_dict_shadows_plain_type_attribute() {
        let sys = system();
        let point = sys
            .define_class("Point", &[], [("kind", Value::str("class"))], None)
            .unwrap();
        let p = abstract_api::call(&sys, &point.as_value(), &[], &[]).unwrap();
        let kind = abstract_api::getattr(&sys, &p, "kind").unwrap();
        assert_eq!(kind.as_str().map(|s| &**s), Some("class"));

        abstract_api::setattr(&sys, &p, "kind", &Value::str("instance")).unwrap();
        let kind = abstract_api::getattr(&sys, &p, "kind").unwrap();
        assert_eq!(kind.as_str().map(|s| &**s), Some("instance"));
        abstract_api::delattr(&sys, &p, "kind").unwrap();
        let err = abstract_api::delattr(&sys, &p, "kind").unwrap_err();
        assert!(err.is_raised(ExceptionKind::AttributeError), "{err}");
    }

    #[test]
    fn class_attribute_reads_type() {
        let sys = system();
        let x = Value::int(3);
        let class = abstract_api::getattr(&sys, &x, "__class__").unwrap();
        assert!(class.as_type().unwrap().ptr_eq(sys.int_type()));
    }

    #[test]
    fn functions_bind_as_methods() {
        let sys = system();
        let greet = Value::function(Function::new("greet", |sys, args, _| {
            Ok(Value::str(&format!("hello from {}", sys.type_name(&args[0]))))
        }));
        let greeter = sys.define_class("Greeter", &[], [("greet", greet)], None).unwrap();
        let g = abstract_api::call(&sys, &greeter.as_value(), &[], &[]).unwrap();
        let bound = abstract_api::getattr(&sys, &g, "greet").unwrap();
        let r = abstract_api::call(&sys, &bound, &[], &[]).unwrap();
        assert_eq!(r.as_str().map(|s| &**s), Some("hello from Greeter"));
    }

    #[test]
    fn object_takes_no_arguments() {
        let sys = system();
        let object = sys.object().as_value();
        let err = abstract_api::call(&sys, &object, &[Value::int(1)], &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: object() takes no arguments");
    }

    #[test]
    fn builtin_types_are_immutable() {
        let sys = system();
        let float = sys.float_type().as_value();
        let err = abstract_api::setattr(&sys, &float, "x", &Value::int(1)).unwrap_err();
        assert!(err.to_string().contains("immutable type 'float'"), "{err}");
    }

    #[test]
    fn type_repr_and_name() {
        let sys = system();
        let t = sys.type_type().as_value();
        assert_eq!(&*abstract_api::repr(&sys, &t).unwrap(), "<class 'type'>");
        let name = abstract_api::getattr(&sys, &sys.int_type().as_value(), "__name__").unwrap();
        assert_eq!(name.as_str().map(|s| &**s), Some("int"));
    }

    #[test]
    fn type_with_three_arguments_defines_a_class() {
        let sys = system();
        let namespace = Arc::new(crate::Dict::new());
        namespace.insert("answer", Value::int(42));
        let made = abstract_api::call(
            &sys,
            &sys.type_type().as_value(),
            &[
                Value::str("Made"),
                Value::tuple(vec![]),
                Value::dict(namespace),
            ],
            &[],
        )
        .unwrap();
        let made = made.as_type().unwrap();
        assert_eq!(&**made.name(), "Made");
        assert_eq!(made.lookup_value("answer").and_then(|v| v.as_int()), Some(42));
    }
}
