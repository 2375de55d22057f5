use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;

use crate::class;
use crate::{
    ArgumentError, Data, Dict, Feature, PyError, PyResult, SpecialMethod, Target, TypeRef,
    TypeSpec, TypeSystem, Value, abstract_api,
};

fn at_most_one<'a>(name: &str, args: &'a [Value], kwnames: &[Arc<str>]) -> PyResult<Option<&'a Value>> {
    if !kwnames.is_empty() {
        return Err(ArgumentError::NoKeywords.attribute(name, "__new__"));
    }
    match args {
        [] => Ok(None),
        [x] => Ok(Some(x)),
        _ => Err(PyError::type_error(format!(
            "{name} expected at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn str_hash(s: &str) -> usize {
    let mut hasher = AHasher::default();
    s.hash(&mut hasher);
    hasher.finish() as usize
}

// ── float ───────────────────────────────────────────────────────────

/// Either form of float, or an int widened to one.
fn to_f64(v: &Value) -> Option<f64> {
    match v.data() {
        Data::Float(x) => Some(*x),
        Data::Int(i) => Some(*i as f64),
        Data::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn float_repr(x: f64) -> String {
    if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        if x > 0.0 { "inf".into() } else { "-inf".into() }
    } else {
        format!("{x:?}")
    }
}

fn float_hash(x: f64) -> usize {
    if x.fract() == 0.0 && x.is_finite() {
        x as i64 as usize
    } else {
        x.to_bits() as usize
    }
}

fn float_arith(f: fn(f64, f64) -> f64) -> Target {
    Target::binary(move |_, v, w| match (to_f64(v), to_f64(w)) {
        (Some(a), Some(b)) => Ok(Value::float(f(a, b))),
        _ => Ok(Value::not_implemented()),
    })
}

fn float_compare(f: fn(f64, f64) -> bool) -> Target {
    Target::binary(move |_, v, w| match (to_f64(v), to_f64(w)) {
        (Some(a), Some(b)) => Ok(Value::bool(f(a, b))),
        _ => Ok(Value::not_implemented()),
    })
}

fn float_new(sys: &TypeSystem, ty: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let x = match at_most_one("float", args, kwnames)? {
        None => 0.0,
        Some(v) => match (to_f64(v), v.as_str()) {
            (Some(x), _) => x,
            (None, Some(s)) => s.trim().parse::<f64>().map_err(|_| {
                PyError::value_error(format!("could not convert string to float: '{s}'"))
            })?,
            (None, None) => {
                return Err(PyError::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    sys.type_name(v)
                )));
            }
        },
    };
    if ty.ptr_eq(sys.float_type()) {
        Ok(Value::py_float(x))
    } else {
        Ok(Value::for_type(ty, Data::Float(x)))
    }
}

/// `float` accepts its boxed class (index 0) and plain `f64` (index 1),
/// with separate targets for each.
pub(crate) fn float_spec(object: &TypeRef) -> TypeSpec {
    let mut spec = TypeSpec::new("float")
        .primary(&class::PY_FLOAT)
        .adopt(&class::F64)
        .base(object)
        .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .doc("Convert a string or number to a floating point number, if possible.")
        .constructor(Arc::new(float_new));
    for index in 0..2 {
        spec = spec
            .method_for(index, SpecialMethod::Add, float_arith(|a, b| a + b))
            .method_for(index, SpecialMethod::Radd, float_arith(|a, b| b + a))
            .method_for(index, SpecialMethod::Sub, float_arith(|a, b| a - b))
            .method_for(index, SpecialMethod::Rsub, float_arith(|a, b| b - a))
            .method_for(index, SpecialMethod::Mul, float_arith(|a, b| a * b))
            .method_for(index, SpecialMethod::Rmul, float_arith(|a, b| b * a))
            .method_for(index, SpecialMethod::Eq, float_compare(|a, b| a == b))
            .method_for(index, SpecialMethod::Lt, float_compare(|a, b| a < b))
            .method_for(index, SpecialMethod::Gt, float_compare(|a, b| a > b))
            .method_for(
                index,
                SpecialMethod::Neg,
                Target::unary(|_, v| Ok(Value::float(-to_f64(v).unwrap_or(f64::NAN)))),
            )
            .method_for(
                index,
                SpecialMethod::Repr,
                Target::unary(|_, v| Ok(Value::str(&float_repr(to_f64(v).unwrap_or(f64::NAN))))),
            )
            .method_for(
                index,
                SpecialMethod::Hash,
                Target::len(|_, v| Ok(float_hash(to_f64(v).unwrap_or(0.0)))),
            )
            .method_for(
                index,
                SpecialMethod::Bool,
                Target::predicate(|_, v| Ok(to_f64(v).is_some_and(|x| x != 0.0))),
            );
    }
    spec
}

// ── int and bool ────────────────────────────────────────────────────

fn overflow() -> PyError {
    PyError::value_error("integer overflow")
}

fn int_arith(f: fn(i64, i64) -> Option<i64>) -> Target {
    Target::binary(move |_, v, w| match (v.as_int(), w.as_int()) {
        (Some(a), Some(b)) => f(a, b).map(Value::int).ok_or_else(overflow),
        _ => Ok(Value::not_implemented()),
    })
}

fn int_compare(f: fn(i64, i64) -> bool) -> Target {
    Target::binary(move |_, v, w| match (v.as_int(), w.as_int()) {
        (Some(a), Some(b)) => Ok(Value::bool(f(a, b))),
        _ => Ok(Value::not_implemented()),
    })
}

fn int_new(sys: &TypeSystem, ty: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let n = match at_most_one("int", args, kwnames)? {
        None => 0,
        Some(v) => match v.data() {
            Data::Int(_) | Data::Bool(_) => v.as_int().unwrap_or(0),
            Data::Float(x) => x.trunc() as i64,
            Data::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                PyError::value_error(format!("invalid literal for int() with base 10: '{s}'"))
            })?,
            _ => {
                return Err(PyError::type_error(format!(
                    "int() argument must be a string or a real number, not '{}'",
                    sys.type_name(v)
                )));
            }
        },
    };
    if ty.ptr_eq(sys.int_type()) {
        Ok(Value::int(n))
    } else {
        Ok(Value::for_type(ty, Data::Int(n)))
    }
}

pub(crate) fn int_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("int")
        .primary(&class::INT)
        .base(object)
        .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .constructor(Arc::new(int_new))
        .method(SpecialMethod::Add, int_arith(i64::checked_add))
        .method(SpecialMethod::Radd, int_arith(|a, b| b.checked_add(a)))
        .method(SpecialMethod::Sub, int_arith(i64::checked_sub))
        .method(SpecialMethod::Rsub, int_arith(|a, b| b.checked_sub(a)))
        .method(SpecialMethod::Mul, int_arith(i64::checked_mul))
        .method(SpecialMethod::Rmul, int_arith(|a, b| b.checked_mul(a)))
        .method(SpecialMethod::Eq, int_compare(|a, b| a == b))
        .method(SpecialMethod::Lt, int_compare(|a, b| a < b))
        .method(SpecialMethod::Gt, int_compare(|a, b| a > b))
        .method(
            SpecialMethod::Neg,
            Target::unary(|_, v| {
                v.as_int()
                    .and_then(i64::checked_neg)
                    .map(Value::int)
                    .ok_or_else(overflow)
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, v| Ok(Value::str(&v.as_int().unwrap_or(0).to_string()))),
        )
        .method(
            SpecialMethod::Hash,
            Target::len(|_, v| Ok(v.as_int().unwrap_or(0) as usize)),
        )
        .method(
            SpecialMethod::Bool,
            Target::predicate(|_, v| Ok(v.as_int().is_some_and(|n| n != 0))),
        )
        .method(SpecialMethod::Index, Target::unary(|_, v| Ok(Value::int(v.as_int().unwrap_or(0)))))
}

fn bool_new(sys: &TypeSystem, _: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    match at_most_one("bool", args, kwnames)? {
        None => Ok(Value::bool(false)),
        Some(v) => abstract_api::is_true(sys, v).map(Value::bool),
    }
}

pub(crate) fn bool_spec(int: &TypeRef) -> TypeSpec {
    TypeSpec::new("bool")
        .primary(&class::BOOL)
        .base(int)
        .feature(Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .constructor(Arc::new(bool_new))
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, v| {
                Ok(Value::str(if v.as_bool() == Some(true) { "True" } else { "False" }))
            }),
        )
}

// ── str ─────────────────────────────────────────────────────────────

fn str_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn as_text(v: &Value) -> &str {
    v.as_str().map(|s| &**s).unwrap_or("")
}

fn str_new(sys: &TypeSystem, ty: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let text: Arc<str> = match at_most_one("str", args, kwnames)? {
        None => Arc::from(""),
        Some(v) => abstract_api::str(sys, v)?,
    };
    if ty.ptr_eq(sys.str_type()) {
        Ok(Value::str(&text))
    } else {
        Ok(Value::for_type(ty, Data::Str(text)))
    }
}

pub(crate) fn str_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("str")
        .primary(&class::STR)
        .base(object)
        .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .constructor(Arc::new(str_new))
        .method(
            SpecialMethod::Add,
            Target::binary(|_, v, w| match w.as_str() {
                Some(w) => Ok(Value::str(&format!("{}{}", as_text(v), w))),
                None => Ok(Value::not_implemented()),
            }),
        )
        .method(
            SpecialMethod::Mul,
            Target::binary(|_, v, w| match w.as_int() {
                Some(n) => Ok(Value::str(&as_text(v).repeat(n.max(0) as usize))),
                None => Ok(Value::not_implemented()),
            }),
        )
        .method(
            SpecialMethod::Eq,
            Target::binary(|_, v, w| match w.as_str() {
                Some(w) => Ok(Value::bool(as_text(v) == &**w)),
                None => Ok(Value::not_implemented()),
            }),
        )
        .method(
            SpecialMethod::Lt,
            Target::binary(|_, v, w| match w.as_str() {
                Some(w) => Ok(Value::bool(as_text(v) < &**w)),
                None => Ok(Value::not_implemented()),
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, v| Ok(Value::str(&str_repr(as_text(v))))),
        )
        .method(
            SpecialMethod::Str,
            Target::unary(|_, v| Ok(Value::str(as_text(v)))),
        )
        .method(SpecialMethod::Len, Target::len(|_, v| Ok(as_text(v).chars().count())))
        .method(SpecialMethod::Hash, Target::len(|_, v| Ok(str_hash(as_text(v)))))
        .method(
            SpecialMethod::Bool,
            Target::predicate(|_, v| Ok(!as_text(v).is_empty())),
        )
        .method(
            SpecialMethod::Contains,
            Target::binary_predicate(|sys, v, w| match w.as_str() {
                Some(w) => Ok(as_text(v).contains(&**w)),
                None => Err(PyError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    sys.type_name(w)
                ))),
            }),
        )
}

// ── tuple ───────────────────────────────────────────────────────────

fn items(v: &Value) -> &[Value] {
    v.as_tuple().unwrap_or(&[])
}

fn tuple_new(sys: &TypeSystem, _: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    match at_most_one("tuple", args, kwnames)? {
        None => Ok(Value::tuple(Vec::new())),
        Some(v) => match v.as_tuple() {
            Some(items) => Ok(Value::tuple(items.to_vec())),
            None => Err(PyError::type_error(format!(
                "'{}' object is not iterable",
                sys.type_name(v)
            ))),
        },
    }
}

pub(crate) fn tuple_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("tuple")
        .primary(&class::TUPLE)
        .base(object)
        .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .constructor(Arc::new(tuple_new))
        .method(SpecialMethod::Len, Target::len(|_, v| Ok(items(v).len())))
        .method(
            SpecialMethod::GetItem,
            Target::binary(|sys, v, i| {
                let items = items(v);
                let Some(i) = i.as_int() else {
                    return Err(PyError::type_error(format!(
                        "tuple indices must be integers, not '{}'",
                        sys.type_name(i)
                    )));
                };
                let index = if i < 0 { i + items.len() as i64 } else { i };
                usize::try_from(index)
                    .ok()
                    .and_then(|index| items.get(index))
                    .cloned()
                    .ok_or_else(|| PyError::index_error("tuple index out of range"))
            }),
        )
        .method(
            SpecialMethod::Contains,
            Target::binary_predicate(|sys, v, x| {
                for item in items(v) {
                    let eq = abstract_api::rich_compare(sys, SpecialMethod::Eq, item, x)?;
                    if abstract_api::is_true(sys, &eq)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|sys, v| {
                let parts = items(v)
                    .iter()
                    .map(|item| abstract_api::repr(sys, item))
                    .collect::<PyResult<Vec<_>>>()?;
                Ok(Value::str(&match parts.as_slice() {
                    [one] => format!("({one},)"),
                    _ => format!("({})", parts.join(", ")),
                }))
            }),
        )
        .method(
            SpecialMethod::Hash,
            Target::len(|sys, v| {
                let mut hasher = AHasher::default();
                for item in items(v) {
                    abstract_api::hash(sys, item)?.hash(&mut hasher);
                }
                Ok(hasher.finish() as usize)
            }),
        )
}

// ── dict ────────────────────────────────────────────────────────────

fn dict_of(v: &Value) -> PyResult<&Arc<Dict>> {
    v.as_dict()
        .ok_or_else(|| PyError::type_error("descriptor requires a 'dict' object"))
}

fn key_of<'a>(sys: &TypeSystem, k: &'a Value) -> PyResult<&'a Arc<str>> {
    k.as_str().ok_or_else(|| {
        PyError::type_error(format!("dict keys must be str, not '{}'", sys.type_name(k)))
    })
}

fn dict_new(sys: &TypeSystem, _: &TypeRef, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let dict = Arc::new(Dict::new());
    if let Some(source) = at_most_one("dict", args, kwnames)? {
        let Some(source) = source.as_dict() else {
            return Err(PyError::type_error(format!(
                "'{}' object is not a mapping",
                sys.type_name(source)
            )));
        };
        for (k, v) in source.items() {
            dict.insert(k, v);
        }
    }
    Ok(Value::dict(dict))
}

pub(crate) fn dict_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("dict")
        .primary(&class::DICT)
        .base(object)
        .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE)
        .constructor(Arc::new(dict_new))
        .method(SpecialMethod::Len, Target::len(|_, v| Ok(dict_of(v)?.len())))
        .method(
            SpecialMethod::GetItem,
            Target::binary(|sys, v, k| {
                let key = key_of(sys, k)?;
                dict_of(v)?
                    .get(key)
                    .ok_or_else(|| PyError::key_error(str_repr(key)))
            }),
        )
        .method(
            SpecialMethod::SetItem,
            Target::set_item(|sys, v, k, x| {
                dict_of(v)?.insert(key_of(sys, k)?.clone(), x.clone());
                Ok(())
            }),
        )
        .method(
            SpecialMethod::DelItem,
            Target::del_item(|sys, v, k| {
                let key = key_of(sys, k)?;
                match dict_of(v)?.remove(key) {
                    Some(_) => Ok(()),
                    None => Err(PyError::key_error(str_repr(key))),
                }
            }),
        )
        .method(
            SpecialMethod::Contains,
            Target::binary_predicate(|_, v, k| {
                Ok(k.as_str().is_some_and(|key| dict_of(v).is_ok_and(|d| d.contains(key))))
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|sys, v| {
                let parts = dict_of(v)?
                    .items()
                    .iter()
                    .map(|(k, x)| -> PyResult<String> {
                        Ok(format!("{}: {}", str_repr(k), abstract_api::repr(sys, x)?))
                    })
                    .collect::<PyResult<Vec<_>>>()?;
                Ok(Value::str(&format!("{{{}}}", parts.join(", "))))
            }),
        )
        .attr("__hash__", Value::none())
}

// ── singletons ──────────────────────────────────────────────────────

pub(crate) fn none_type_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("NoneType")
        .primary(&class::NONE_TYPE)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(SpecialMethod::Repr, Target::unary(|_, _| Ok(Value::str("None"))))
        .method(SpecialMethod::Bool, Target::predicate(|_, _| Ok(false)))
}

pub(crate) fn not_implemented_type_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("NotImplementedType")
        .primary(&class::NOT_IMPLEMENTED_TYPE)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, _| Ok(Value::str("NotImplemented"))),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExceptionKind, RepresentationKind, TypeKind, TypeSystemInfo};

    fn system() -> TypeSystem {
        TypeSystem::new(TypeSystemInfo::default()).unwrap()
    }

    #[test]
    fn float_adopts_f64() {
        let sys = system();
        let float = sys.float_type();
        assert_eq!(float.kind(), TypeKind::Adoptive);
        let boxed = sys.representation(&class::PY_FLOAT).unwrap();
        let plain = sys.representation(&class::F64).unwrap();
        assert!(matches!(boxed.kind(), RepresentationKind::Adopted { index: 0, .. }));
        assert!(matches!(plain.kind(), RepresentationKind::Adopted { index: 1, .. }));

        let add0 = float.slots().get(SpecialMethod::Add, 0).unwrap();
        let add1 = float.slots().get(SpecialMethod::Add, 1).unwrap();
        assert!(!add0.same_as(&add1), "each class has its own target");
    }

    #[test]
    fn mixed_arithmetic_uses_reflected_operation() {
        let sys = system();
        let r = abstract_api::add(&sys, &Value::int(1), &Value::py_float(0.5)).unwrap();
        assert_eq!(r.as_float(), Some(1.5));
        let r = abstract_api::mul(&sys, &Value::float(2.0), &Value::int(3)).unwrap();
        assert_eq!(r.as_float(), Some(6.0));
        let r = abstract_api::sub(&sys, &Value::int(10), &Value::float(0.5)).unwrap();
        assert_eq!(r.as_float(), Some(9.5));
    }

    #[test]
    fn unsupported_operands_name_both_types() {
        let sys = system();
        let err = abstract_api::add(&sys, &Value::int(1), &Value::none()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for +: 'int' and 'NoneType'"
        );
        let err = abstract_api::neg(&sys, &Value::str("x")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad operand type for unary -: 'str'");
    }

    #[test]
    fn bool_inherits_int_arithmetic() {
        let sys = system();
        let r = abstract_api::add(&sys, &Value::bool(true), &Value::int(2)).unwrap();
        assert_eq!(r.as_int(), Some(3));
        assert_eq!(&*abstract_api::repr(&sys, &Value::bool(true)).unwrap(), "True");
        let ty = sys.type_of(&Value::bool(false)).unwrap();
        assert!(ty.is_subtype_of(sys.int_type()));
    }

    #[test]
    fn reprs() {
        let sys = system();
        let t = Value::tuple(vec![Value::int(1), Value::str("a'b"), Value::py_float(2.5)]);
        assert_eq!(&*abstract_api::repr(&sys, &t).unwrap(), r"(1, 'a\'b', 2.5)");
        let one = Value::tuple(vec![Value::none()]);
        assert_eq!(&*abstract_api::repr(&sys, &one).unwrap(), "(None,)");
    }

    #[test]
    fn dict_items_and_errors() {
        let sys = system();
        let d = Value::dict(Arc::new(Dict::new()));
        abstract_api::setitem(&sys, &d, &Value::str("a"), &Value::int(1)).unwrap();
        assert_eq!(abstract_api::len(&sys, &d).unwrap(), 1);
        assert!(abstract_api::contains(&sys, &d, &Value::str("a")).unwrap());
        let a = abstract_api::getitem(&sys, &d, &Value::str("a")).unwrap();
        assert_eq!(a.as_int(), Some(1));
        abstract_api::delitem(&sys, &d, &Value::str("a")).unwrap();
        let err = abstract_api::getitem(&sys, &d, &Value::str("a")).unwrap_err();
        assert!(err.is_raised(ExceptionKind::KeyError));
        let err = abstract_api::hash(&sys, &d).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'dict'");
    }

    #[test]
    fn truth_values() {
        let sys = system();
        assert!(!abstract_api::is_true(&sys, &Value::int(0)).unwrap());
        assert!(abstract_api::is_true(&sys, &Value::float(0.1)).unwrap());
        assert!(!abstract_api::is_true(&sys, &Value::str("")).unwrap());
        assert!(!abstract_api::is_true(&sys, &Value::tuple(vec![])).unwrap());
        assert!(abstract_api::is_true(&sys, &sys.object().as_value()).unwrap());
    }

    #[test]
    fn constructors() {
        let sys = system();
        let f = abstract_api::call(&sys, &sys.float_type().as_value(), &[Value::str(" 2.5 ")], &[])
            .unwrap();
        assert_eq!(f.as_float(), Some(2.5));
        assert!(f.class().ptr_eq(&class::PY_FLOAT));
        let err = abstract_api::call(&sys, &sys.int_type().as_value(), &[Value::str("x")], &[])
            .unwrap_err();
        assert!(err.is_raised(ExceptionKind::ValueError));
        let s = abstract_api::call(&sys, &sys.str_type().as_value(), &[Value::int(7)], &[]).unwrap();
        assert_eq!(s.as_str().map(|s| &**s), Some("7"));
    }

    #[test]
    fn tuple_indexing() {
        let sys = system();
        let t = Value::tuple(vec![Value::int(1), Value::int(2)]);
        let last = abstract_api::getitem(&sys, &t, &Value::int(-1)).unwrap();
        assert_eq!(last.as_int(), Some(2));
        let err = abstract_api::getitem(&sys, &t, &Value::int(2)).unwrap_err();
        assert!(err.is_raised(ExceptionKind::IndexError));
        assert!(abstract_api::contains(&sys, &t, &Value::int(1)).unwrap());
    }
}
