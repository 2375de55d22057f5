use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::class::{self, NativeClass};
use crate::{
    Dict, Function, GetSetDescriptor, MemberDescriptor, MethodDescriptor, Type, TypeRef,
};

/// The native payload of an instance. Immutable once created.
pub enum Data {
    None,
    NotImplemented,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Box<[Value]>),
    Dict(Arc<Dict>),
    Type(TypeRef),
    Method(Arc<MethodDescriptor>),
    Member(Arc<MemberDescriptor>),
    GetSet(Arc<GetSetDescriptor>),
    Function(Arc<Function>),
    Bound { func: Value, this: Value },
}

pub struct Instance {
    class: NativeClass,
    type_pointer: Option<ArcSwap<Type>>,
    dict: Option<ArcSwap<Dict>>,
    slots: Box<[RwLock<Option<Value>>]>,
    data: Data,
}

/// Handle to one object of the dynamic language.
#[derive(Clone)]
pub struct Value(Arc<Instance>);

/// A [`Value`] that is not kept alive by this handle.
pub(crate) struct WeakValue(Weak<Instance>);

impl WeakValue {
    pub(crate) fn new() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn upgrade(&self) -> Option<Value> {
        self.0.upgrade().map(Value)
    }
}

static NONE: LazyLock<Value> = LazyLock::new(|| Value::new(&class::NONE_TYPE, Data::None));
static NOT_IMPLEMENTED: LazyLock<Value> =
    LazyLock::new(|| Value::new(&class::NOT_IMPLEMENTED_TYPE, Data::NotImplemented));
static TRUE: LazyLock<Value> = LazyLock::new(|| Value::new(&class::BOOL, Data::Bool(true)));
static FALSE: LazyLock<Value> = LazyLock::new(|| Value::new(&class::BOOL, Data::Bool(false)));

impl Value {
    /// An instance of `class` with storage laid out by the class. A type
    /// pointer, if the layout has one, must be set by the caller through
    /// [`Value::for_type`] instead.
    pub fn new(class: &NativeClass, data: Data) -> Self {
        Self::with_layout(class, None, data)
    }

    /// An instance of the canonical class of `ty`, its type pointer (if
    /// any) naming `ty`.
    pub fn for_type(ty: &TypeRef, data: Data) -> Self {
        Self::with_layout(ty.canonical_class(), Some(ty), data)
    }

    fn with_layout(class: &NativeClass, ty: Option<&TypeRef>, data: Data) -> Self {
        let layout = class.layout();
        let type_pointer = match (layout.type_pointer, ty) {
            (true, Some(ty)) => Some(ArcSwap::new(ty.clone())),
            _ => None,
        };
        let dict = layout.dict.then(|| ArcSwap::from_pointee(Dict::new()));
        let slots = layout.slots.iter().map(|_| RwLock::new(None)).collect();
        Self(Arc::new(Instance {
            class: class.clone(),
            type_pointer,
            dict,
            slots,
            data,
        }))
    }

    pub fn none() -> Self {
        NONE.clone()
    }

    pub fn not_implemented() -> Self {
        NOT_IMPLEMENTED.clone()
    }

    pub fn bool(value: bool) -> Self {
        if value { TRUE.clone() } else { FALSE.clone() }
    }

    pub fn int(value: i64) -> Self {
        Self::new(&class::INT, Data::Int(value))
    }

    /// A float in its unboxed form.
    pub fn float(value: f64) -> Self {
        Self::new(&class::F64, Data::Float(value))
    }

    /// A float in its primary (boxed) form.
    pub fn py_float(value: f64) -> Self {
        Self::new(&class::PY_FLOAT, Data::Float(value))
    }

    pub fn str(value: &str) -> Self {
        Self::new(&class::STR, Data::Str(Arc::from(value)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::new(&class::TUPLE, Data::Tuple(items.into_boxed_slice()))
    }

    pub fn dict(dict: Arc<Dict>) -> Self {
        Self::new(&class::DICT, Data::Dict(dict))
    }

    pub fn function(function: Function) -> Self {
        Self::new(&class::FUNCTION, Data::Function(Arc::new(function)))
    }

    pub fn bound(func: Value, this: Value) -> Self {
        Self::new(&class::BOUND_METHOD, Data::Bound { func, this })
    }

    #[inline]
    pub fn class(&self) -> &NativeClass {
        &self.0.class
    }

    #[inline]
    pub fn data(&self) -> &Data {
        &self.0.data
    }

    /// Identity comparison.
    #[inline]
    pub fn is(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakValue {
        WeakValue(Arc::downgrade(&self.0))
    }

    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn is_none(&self) -> bool {
        matches!(self.data(), Data::None) && self.class().ptr_eq(&class::NONE_TYPE)
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self.data(), Data::NotImplemented)
    }

    // ── Instance storage ────────────────────────────────────────────

    /// The type named by the instance's type pointer, if it has one.
    pub fn type_pointer(&self) -> Option<TypeRef> {
        self.0.type_pointer.as_ref().map(|cell| cell.load_full())
    }

    pub fn has_type_pointer(&self) -> bool {
        self.0.type_pointer.is_some()
    }

    /// Replace the type pointer. Returns false if the instance has none.
    /// Callers check that the new type is compatible.
    pub(crate) fn store_type_pointer(&self, ty: TypeRef) -> bool {
        match &self.0.type_pointer {
            Some(cell) => {
                cell.store(ty);
                true
            }
            None => false,
        }
    }

    pub fn instance_dict(&self) -> Option<Arc<Dict>> {
        self.0.dict.as_ref().map(|cell| cell.load_full())
    }

    pub(crate) fn store_instance_dict(&self, dict: Arc<Dict>) -> bool {
        match &self.0.dict {
            Some(cell) => {
                cell.store(dict);
                true
            }
            None => false,
        }
    }

    pub fn slot(&self, index: usize) -> Option<Value> {
        self.0.slots.get(index).and_then(|cell| cell.read().clone())
    }

    /// Write (or with `None`, clear) a slot. Returns the previous contents,
    /// or `None` if the index is outside the layout.
    pub fn set_slot_value(&self, index: usize, value: Option<Value>) -> Option<Option<Value>> {
        let cell = self.0.slots.get(index)?;
        Some(std::mem::replace(&mut *cell.write(), value))
    }

    // ── Payload accessors ───────────────────────────────────────────

    pub fn as_int(&self) -> Option<i64> {
        match self.data() {
            Data::Int(i) => Some(*i),
            Data::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.data() {
            Data::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data() {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&Arc<str>> {
        match self.data() {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self.data() {
            Data::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self.data() {
            Data::Tuple(items) => Some(&items[..]),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Arc<Dict>> {
        match self.data() {
            Data::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            Data::None if self.is_none() => f.write_str("None"),
            Data::NotImplemented => f.write_str("NotImplemented"),
            Data::Bool(b) => write!(f, "{b}"),
            Data::Int(i) => write!(f, "{i}"),
            Data::Float(x) => write!(f, "{x:?}"),
            Data::Str(s) => write!(f, "{s:?}"),
            Data::Type(ty) => write!(f, "<class '{}'>", ty.name()),
            _ => write!(f, "<{} at {:#x}>", self.class(), self.identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Capabilities, INSTANCE};

    #[test]
    fn singletons_are_identical() {
        assert!(Value::none().is(&Value::none()));
        assert!(Value::bool(true).is(&Value::bool(true)));
        assert!(!Value::bool(true).is(&Value::bool(false)));
        assert!(Value::none().is_none());
        assert!(Value::not_implemented().is_not_implemented());
    }

    #[test]
    fn instance_storage_follows_layout() {
        let x: Arc<str> = Arc::from("x");
        let class = NativeClass::derive(
            "Point",
            &INSTANCE,
            Capabilities::CRAFTED | Capabilities::SLOTS,
            &[x],
        );
        let v = Value::new(&class, Data::None);
        assert!(v.instance_dict().is_none());
        assert!(v.slot(0).is_none());
        assert!(v.set_slot_value(0, Some(Value::int(7))).is_some());
        assert_eq!(v.slot(0).and_then(|s| s.as_int()), Some(7));
        assert!(v.set_slot_value(1, None).is_none(), "only one slot laid out");
    }

    #[test]
    fn float_forms_differ_by_class() {
        let unboxed = Value::float(1.5);
        let boxed = Value::py_float(1.5);
        assert_eq!(unboxed.as_float(), boxed.as_float());
        assert!(unboxed.class().ptr_eq(&class::F64));
        assert!(boxed.class().ptr_eq(&class::PY_FLOAT));
    }
}
