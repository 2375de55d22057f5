use std::sync::Arc;

use ahash::AHashMap;

use crate::class;
use crate::{
    Data, ExceptionKind, Feature, GetSetDescriptor, InterpreterError, PyError, PyException,
    PyResult, SpecialMethod, Target, TypeFactory, TypeRef, TypeSpec, TypeSystem, Value,
    abstract_api,
};

fn args_of(v: &Value) -> &[Value] {
    match v.data() {
        Data::Tuple(args) => args,
        _ => &[],
    }
}

fn exception_new(_sys: &TypeSystem, ty: &TypeRef, args: &[Value], _kw: &[Arc<str>]) -> PyResult<Value> {
    Ok(Value::for_type(ty, Data::Tuple(args.into())))
}

fn exception_str(sys: &TypeSystem, v: &Value) -> PyResult<Value> {
    match args_of(v) {
        [] => Ok(Value::str("")),
        [arg] => abstract_api::str(sys, arg).map(|s| Value::str(&s)),
        args => tuple_repr(sys, args).map(|s| Value::str(&s)),
    }
}

fn tuple_repr(sys: &TypeSystem, args: &[Value]) -> PyResult<String> {
    let parts = args
        .iter()
        .map(|a| abstract_api::repr(sys, a))
        .collect::<PyResult<Vec<_>>>()?;
    Ok(match parts.as_slice() {
        [one] => format!("({one},)"),
        _ => format!("({})", parts.join(", ")),
    })
}

fn exception_repr(sys: &TypeSystem, v: &Value) -> PyResult<Value> {
    let parts = args_of(v)
        .iter()
        .map(|a| abstract_api::repr(sys, a))
        .collect::<PyResult<Vec<_>>>()?;
    Ok(Value::str(&format!("{}({})", sys.type_name(v), parts.join(", "))))
}

fn get_args(_sys: &TypeSystem, v: &Value) -> PyResult<Value> {
    Ok(Value::tuple(args_of(v).to_vec()))
}

fn base_exception_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("BaseException")
        .primary(&class::BASE_EXCEPTION)
        .base(object)
        .feature(Feature::REPLACEABLE | Feature::BASETYPE | Feature::INSTANTIABLE)
        .doc("Common base class for all exceptions")
        .constructor(Arc::new(exception_new))
        .method(SpecialMethod::Init, Target::init(|_, _, _, _| Ok(())))
        .method(SpecialMethod::Str, Target::unary(exception_str))
        .method(SpecialMethod::Repr, Target::unary(exception_repr))
        .attr(
            "args",
            GetSetDescriptor::new("BaseException", "args", get_args).into_value(),
        )
}

fn parent(kind: ExceptionKind) -> Option<ExceptionKind> {
    match kind {
        ExceptionKind::BaseException => None,
        ExceptionKind::Exception => Some(ExceptionKind::BaseException),
        _ => Some(ExceptionKind::Exception),
    }
}

/// The exception types the kernel raises, all sharing the native class of
/// `BaseException`. Made after bootstrap, one published type at a time.
pub(crate) fn create_all(
    factory: &TypeFactory,
    object: &TypeRef,
) -> Result<AHashMap<ExceptionKind, TypeRef>, InterpreterError> {
    let mut types: AHashMap<ExceptionKind, TypeRef> = AHashMap::with_capacity(ExceptionKind::ALL.len());
    for kind in ExceptionKind::ALL {
        let spec = match parent(kind).and_then(|p| types.get(&p)) {
            None => base_exception_spec(object),
            Some(base) => TypeSpec::new(kind.name())
                .primary(&class::BASE_EXCEPTION)
                .base(base)
                .feature(Feature::REPLACEABLE | Feature::BASETYPE | Feature::INSTANTIABLE),
        };
        types.insert(kind, factory.from_spec(spec)?);
    }
    Ok(types)
}

impl TypeSystem {
    /// A new exception instance of the given kind.
    pub fn new_exception(&self, kind: ExceptionKind, message: &str) -> Value {
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(message)]
        };
        Value::for_type(self.exception(kind), Data::Tuple(args.into_boxed_slice()))
    }

    /// An error carrying a new exception instance.
    pub fn raise(&self, kind: ExceptionKind, message: &str) -> PyError {
        let mut exc = PyException::new(kind, message);
        exc.value = Some(self.new_exception(kind, message));
        PyError::Raised(exc)
    }

    /// The exception instance behind `err`, made now if it has none yet.
    pub fn exception_value(&self, err: &PyError) -> Option<Value> {
        match err {
            PyError::Raised(exc) => exc.value.clone().or_else(|| {
                exc.kind()
                    .map(|kind| self.new_exception(kind, &exc.message))
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{ExceptionKind, RepresentationKind, TypeKind, TypeSystem, TypeSystemInfo, abstract_api};

    #[test]
    fn hierarchy_shares_one_representation() {
        let sys = TypeSystem::new(TypeSystemInfo::default()).unwrap();
        let base = sys.exception(ExceptionKind::BaseException);
        let type_error = sys.exception(ExceptionKind::TypeError);
        assert_eq!(type_error.kind(), TypeKind::Replaceable);
        let mro = type_error.mro();
        let names: Vec<&str> = mro.iter().map(|t| &**t.name()).collect();
        assert_eq!(names, ["TypeError", "Exception", "BaseException", "object"]);
        let rep = sys.representation(base.canonical_class()).unwrap();
        assert!(matches!(rep.kind(), RepresentationKind::Shared));
    }

    #[test]
    fn raised_exception_knows_its_type() {
        let sys = TypeSystem::new(TypeSystemInfo::default()).unwrap();
        let err = sys.raise(ExceptionKind::ValueError, "bad value");
        let exc = sys.exception_value(&err).unwrap();
        let ty = sys.type_of(&exc).unwrap();
        assert!(ty.ptr_eq(sys.exception(ExceptionKind::ValueError)));
        assert_eq!(&*abstract_api::str(&sys, &exc).unwrap(), "bad value");
        assert_eq!(&*abstract_api::repr(&sys, &exc).unwrap(), "ValueError('bad value')");
    }

    #[test]
    fn exception_class_can_be_reassigned_within_hierarchy() {
        let sys = TypeSystem::new(TypeSystemInfo::default()).unwrap();
        let exc = sys.new_exception(ExceptionKind::KeyError, "k");
        let index_error = sys.exception(ExceptionKind::IndexError);
        sys.set_type(&exc, index_error).unwrap();
        assert!(sys.type_of(&exc).unwrap().ptr_eq(index_error));
    }
}
