//! Operations on values of any type, dispatched through the slots of the
//! value's type. These are what an interpreter calls.

use std::sync::Arc;

use crate::{ExceptionKind, PyError, PyResult, Signature, SpecialMethod, TypeRef, TypeSystem, Value};

/// `Ok(None)` when the slot is empty or answered `NotImplemented`.
fn try_binary(
    sys: &TypeSystem,
    op: SpecialMethod,
    ty: &TypeRef,
    index: usize,
    v: &Value,
    w: &Value,
) -> PyResult<Option<Value>> {
    match op.call_binary(sys, ty, index, v, w) {
        Ok(r) if r.is_not_implemented() => Ok(None),
        Ok(r) => Ok(Some(r)),
        Err(PyError::Empty(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Try `v op w`, then the reflected operation on `w`. A subtype of the
/// left operand's type that overrides the reflected operation goes first.
fn binary_or_reflected(
    sys: &TypeSystem,
    op: SpecialMethod,
    v: &Value,
    w: &Value,
) -> PyResult<Option<Value>> {
    if op.signature() != Signature::Binary {
        return Err(crate::InterpreterError::Internal(format!("{op} is not a binary operation")).into());
    }
    let (vt, vi) = sys.type_and_index(v)?;
    let (wt, wi) = sys.type_and_index(w)?;
    let same = vt.ptr_eq(&wt);
    let alt = op.alt().filter(|_| !same);

    if let Some(alt) = alt {
        let overrides = match (wt.slots().get(alt, wi), vt.slots().get(alt, vi)) {
            (Some(mine), Some(theirs)) => !mine.same_as(&theirs),
            (Some(_), None) => true,
            _ => false,
        };
        if overrides && wt.is_subtype_of(&vt) {
            if let Some(r) = try_binary(sys, alt, &wt, wi, w, v)? {
                return Ok(Some(r));
            }
            return try_binary(sys, op, &vt, vi, v, w);
        }
    }

    if let Some(r) = try_binary(sys, op, &vt, vi, v, w)? {
        return Ok(Some(r));
    }
    match alt {
        Some(alt) => try_binary(sys, alt, &wt, wi, w, v),
        None => Ok(None),
    }
}

/// `v op w` for a binary operator.
pub fn binary_op(sys: &TypeSystem, op: SpecialMethod, v: &Value, w: &Value) -> PyResult<Value> {
    match binary_or_reflected(sys, op, v, w)? {
        Some(r) => Ok(r),
        None => Err(op.operand_error(&sys.type_name(v), &sys.type_name(w))),
    }
}

pub fn add(sys: &TypeSystem, v: &Value, w: &Value) -> PyResult<Value> {
    binary_op(sys, SpecialMethod::Add, v, w)
}

pub fn sub(sys: &TypeSystem, v: &Value, w: &Value) -> PyResult<Value> {
    binary_op(sys, SpecialMethod::Sub, v, w)
}

pub fn mul(sys: &TypeSystem, v: &Value, w: &Value) -> PyResult<Value> {
    binary_op(sys, SpecialMethod::Mul, v, w)
}

/// `op v` for a unary operator.
pub fn unary_op(sys: &TypeSystem, op: SpecialMethod, v: &Value) -> PyResult<Value> {
    let (ty, index) = sys.type_and_index(v)?;
    match op.call_unary(sys, &ty, index, v) {
        Err(PyError::Empty(_)) => Err(op.unary_operand_error(&sys.type_name(v))),
        result => result,
    }
}

pub fn neg(sys: &TypeSystem, v: &Value) -> PyResult<Value> {
    unary_op(sys, SpecialMethod::Neg, v)
}

/// Compare with one of the six rich comparison operators. `==` and `!=`
/// fall back to identity.
pub fn rich_compare(sys: &TypeSystem, op: SpecialMethod, v: &Value, w: &Value) -> PyResult<Value> {
    if let Some(r) = binary_or_reflected(sys, op, v, w)? {
        return Ok(r);
    }
    match op {
        SpecialMethod::Eq => Ok(Value::bool(v.is(w))),
        SpecialMethod::Ne => Ok(Value::bool(!v.is(w))),
        _ => Err(PyError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.operator().unwrap_or(op.method_name()),
            sys.type_name(v),
            sys.type_name(w)
        ))),
    }
}

fn text(sys: &TypeSystem, op: SpecialMethod, r: Value) -> PyResult<Arc<str>> {
    match r.as_str() {
        Some(s) => Ok(s.clone()),
        None => Err(PyError::type_error(format!(
            "{}() returned non-string (type {})",
            op.method_name(),
            sys.type_name(&r)
        ))),
    }
}

pub fn repr(sys: &TypeSystem, v: &Value) -> PyResult<Arc<str>> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::Repr.call_unary(sys, &ty, index, v) {
        Ok(r) => text(sys, SpecialMethod::Repr, r),
        Err(PyError::Empty(_)) => Ok(Arc::from(format!("<{} object>", ty.name()))),
        Err(e) => Err(e),
    }
}

pub fn str(sys: &TypeSystem, v: &Value) -> PyResult<Arc<str>> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::Str.call_unary(sys, &ty, index, v) {
        Ok(r) => text(sys, SpecialMethod::Str, r),
        Err(PyError::Empty(_)) => repr(sys, v),
        Err(e) => Err(e),
    }
}

pub fn hash(sys: &TypeSystem, v: &Value) -> PyResult<usize> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::Hash.call_len(sys, &ty, index, v) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "unhashable type: '{}'",
            ty.name()
        ))),
        result => result,
    }
}

pub fn len(sys: &TypeSystem, v: &Value) -> PyResult<usize> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::Len.call_len(sys, &ty, index, v) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "object of type '{}' has no len()",
            ty.name()
        ))),
        result => result,
    }
}

/// Truth value: `__bool__`, else `__len__`, else true.
pub fn is_true(sys: &TypeSystem, v: &Value) -> PyResult<bool> {
    if let Some(b) = v.as_bool() {
        return Ok(b);
    }
    if v.is_none() {
        return Ok(false);
    }
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::Bool.call_predicate(sys, &ty, index, v) {
        Err(PyError::Empty(_)) => {}
        result => return result,
    }
    match SpecialMethod::Len.call_len(sys, &ty, index, v) {
        Ok(n) => Ok(n != 0),
        Err(PyError::Empty(_)) => Ok(true),
        Err(e) => Err(e),
    }
}

pub fn getitem(sys: &TypeSystem, v: &Value, key: &Value) -> PyResult<Value> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::GetItem.call_binary(sys, &ty, index, v, key) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "'{}' object is not subscriptable",
            ty.name()
        ))),
        result => result,
    }
}

pub fn setitem(sys: &TypeSystem, v: &Value, key: &Value, value: &Value) -> PyResult<()> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::SetItem.call_set_item(sys, &ty, index, v, key, value) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "'{}' object does not support item assignment",
            ty.name()
        ))),
        result => result,
    }
}

pub fn delitem(sys: &TypeSystem, v: &Value, key: &Value) -> PyResult<()> {
    let (ty, index) = sys.type_and_index(v)?;
    match SpecialMethod::DelItem.call_del_item(sys, &ty, index, v, key) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "'{}' object doesn't support item deletion",
            ty.name()
        ))),
        result => result,
    }
}

/// `item in container`
pub fn contains(sys: &TypeSystem, container: &Value, item: &Value) -> PyResult<bool> {
    let (ty, index) = sys.type_and_index(container)?;
    match SpecialMethod::Contains.call_binary_predicate(sys, &ty, index, container, item) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "argument of type '{}' is not iterable",
            ty.name()
        ))),
        result => result,
    }
}

pub fn call(sys: &TypeSystem, callable: &Value, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
    let (ty, index) = sys.type_and_index(callable)?;
    match SpecialMethod::Call.call_call(sys, &ty, index, callable, args, kwnames) {
        Err(PyError::Empty(_)) => Err(PyError::type_error(format!(
            "'{}' object is not callable",
            ty.name()
        ))),
        result => result,
    }
}

/// `obj.name`, falling back to `__getattr__` when the normal lookup
/// raises `AttributeError`.
pub fn getattr(sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<Value> {
    let (ty, index) = sys.type_and_index(obj)?;
    let err = match SpecialMethod::GetAttribute.call_getattr(sys, &ty, index, obj, name) {
        Err(PyError::Empty(_)) => no_attribute(&ty, name),
        Err(e) if e.is_raised(ExceptionKind::AttributeError) => e,
        result => return result,
    };
    match SpecialMethod::GetAttr.call_getattr(sys, &ty, index, obj, name) {
        Err(PyError::Empty(_)) => Err(err),
        result => result,
    }
}

pub fn setattr(sys: &TypeSystem, obj: &Value, name: &str, value: &Value) -> PyResult<()> {
    let (ty, index) = sys.type_and_index(obj)?;
    match SpecialMethod::SetAttr.call_setattr(sys, &ty, index, obj, name, value) {
        Err(PyError::Empty(_)) => Err(no_attribute(&ty, name)),
        result => result,
    }
}

pub fn delattr(sys: &TypeSystem, obj: &Value, name: &str) -> PyResult<()> {
    let (ty, index) = sys.type_and_index(obj)?;
    match SpecialMethod::DelAttr.call_delattr(sys, &ty, index, obj, name) {
        Err(PyError::Empty(_)) => Err(no_attribute(&ty, name)),
        result => result,
    }
}

pub(crate) fn no_attribute(ty: &TypeRef, name: &str) -> PyError {
    PyError::attribute_error(format!("'{}' object has no attribute '{}'", ty.name(), name))
}
