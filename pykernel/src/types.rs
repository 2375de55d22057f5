use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::class::{self, NativeClass};
use crate::value::WeakValue;
use crate::{
    Data, Dict, Feature, PyError, PyResult, SlotTable, SpecialMethod, Target, TypeSystem, Value,
};

pub type TypeRef = Arc<Type>;

/// How a type creates an instance when called.
pub type NewFn =
    Arc<dyn Fn(&TypeSystem, &TypeRef, &[Value], &[Arc<str>]) -> PyResult<Value> + Send + Sync>;

/// Relation between a type and its native classes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// One type, one class.
    Simple,
    /// One type accepting several classes.
    Adoptive,
    /// One of possibly several types sharing a class.
    Replaceable,
}

/// Construction progress of a type. Only ever moves forward.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeState {
    Unbuilt = 0,
    /// Exists with its immutable fields but no attributes. Only the
    /// bootstrap types pass through this state.
    Shell = 1,
    /// Attributes and slots are filled in; not yet published.
    Complete = 2,
    /// Registered and visible to every thread.
    Published = 3,
}

impl TypeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unbuilt,
            1 => Self::Shell,
            2 => Self::Complete,
            _ => Self::Published,
        }
    }
}

bitflags::bitflags! {
    /// Summary of slot contents the kernel checks often.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct KernelFlags: u32 {
        const HAS_GETITEM = 1 << 0;
        const HAS_ITER = 1 << 1;
        const HAS_NEXT = 1 << 2;
        const HAS_INDEX = 1 << 3;
        const HAS_GET = 1 << 4;
        const HAS_SET = 1 << 5;
        const HAS_DELETE = 1 << 6;
    }
}

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

/// A type of the dynamic language.
///
/// The name, classes, bases and MRO are fixed once the type is published.
/// The dictionary may change at any time; each change to a special method
/// recomputes the matching slot here and in every subtype.
///
/// A type holds no strong reference to itself, so it is dropped with the
/// last holder: a subtype, an instance naming it, its representation in a
/// registry, or a caller.
pub struct Type {
    id: u32,
    me: Weak<Type>,
    name: Arc<str>,
    kind: TypeKind,
    classes: Box<[NativeClass]>,
    bases: Box<[TypeRef]>,
    /// The MRO after this type.
    mro_tail: OnceLock<Box<[TypeRef]>>,
    state: AtomicU8,
    features: AtomicU32,
    kernel: AtomicU32,
    dict: Dict,
    slots: SlotTable,
    doc: OnceLock<Arc<str>>,
    constructor: OnceLock<NewFn>,
    subclasses: Mutex<Vec<Weak<Type>>>,
    /// Pairs a dictionary write with its slot update.
    update: Mutex<()>,
    value: Mutex<WeakValue>,
}

impl Type {
    /// A new type in the `Unbuilt` state. Its MRO is set separately by
    /// [`Type::init_mro`].
    pub fn new(name: &str, kind: TypeKind, classes: Vec<NativeClass>, bases: Vec<TypeRef>) -> TypeRef {
        let width = classes.len().max(1);
        let ty = Arc::new_cyclic(|me| Self {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            me: me.clone(),
            name: Arc::from(name),
            kind,
            classes: classes.into_boxed_slice(),
            bases: bases.into_boxed_slice(),
            mro_tail: OnceLock::new(),
            state: AtomicU8::new(TypeState::Unbuilt as u8),
            features: AtomicU32::new(0),
            kernel: AtomicU32::new(0),
            dict: Dict::new(),
            slots: SlotTable::new(width),
            doc: OnceLock::new(),
            constructor: OnceLock::new(),
            subclasses: Mutex::new(Vec::new()),
            update: Mutex::new(()),
            value: Mutex::new(WeakValue::new()),
        });
        for base in ty.bases.iter() {
            base.subclasses.lock().push(Arc::downgrade(&ty));
        }
        ty
    }

    /// Set the MRO to this type followed by `tail`. Has no effect the
    /// second time.
    pub(crate) fn init_mro(&self, tail: Vec<TypeRef>) {
        let _ = self.mro_tail.set(tail.into_boxed_slice());
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Classes whose instances are of this type, indexed by representation
    /// index.
    #[inline]
    pub fn classes(&self) -> &[NativeClass] {
        &self.classes
    }

    /// The class new instances are made of.
    pub fn canonical_class(&self) -> &NativeClass {
        self.classes.first().unwrap_or(&class::OBJECT)
    }

    pub fn bases(&self) -> &[TypeRef] {
        &self.bases
    }

    pub fn base(&self) -> Option<&TypeRef> {
        self.bases.first()
    }

    /// This type followed by [`Type::mro_tail`].
    pub fn mro(&self) -> Vec<TypeRef> {
        let tail = self.mro_tail();
        let mut mro = Vec::with_capacity(tail.len() + 1);
        mro.extend(self.me.upgrade());
        mro.extend(tail.iter().cloned());
        mro
    }

    /// The MRO without this type, empty until it is set.
    pub fn mro_tail(&self) -> &[TypeRef] {
        self.mro_tail.get().map(|tail| &tail[..]).unwrap_or(&[])
    }

    pub fn state(&self) -> TypeState {
        TypeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn advance(&self, state: TypeState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    pub fn features(&self) -> Feature {
        Feature::from_bits_truncate(self.features.load(Ordering::Acquire))
    }

    pub(crate) fn add_features(&self, features: Feature) {
        self.features.fetch_or(features.bits(), Ordering::AcqRel);
    }

    pub fn kernel_flags(&self) -> KernelFlags {
        KernelFlags::from_bits_truncate(self.kernel.load(Ordering::Acquire))
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn doc(&self) -> Option<&Arc<str>> {
        self.doc.get()
    }

    pub(crate) fn set_doc(&self, doc: Arc<str>) {
        let _ = self.doc.set(doc);
    }

    pub(crate) fn set_constructor(&self, new: NewFn) {
        let _ = self.constructor.set(new);
    }

    /// The nearest constructor along the MRO, with the type defining it.
    pub fn find_constructor(&self) -> Option<(NewFn, TypeRef)> {
        if let Some(new) = self.constructor.get() {
            return self.me.upgrade().map(|me| (new.clone(), me));
        }
        self.mro_tail()
            .iter()
            .find_map(|t| t.constructor.get().map(|new| (new.clone(), t.clone())))
    }

    /// The value standing for this type. Every call returns the same value
    /// for as long as anything holds it.
    pub fn as_value(self: &Arc<Self>) -> Value {
        let mut cached = self.value.lock();
        if let Some(value) = cached.upgrade() {
            return value;
        }
        let value = Value::new(&class::TYPE, Data::Type(self.clone()));
        *cached = value.downgrade();
        value
    }

    pub fn ptr_eq(&self, other: &Type) -> bool {
        std::ptr::eq(self, other)
    }

    /// True if `other` is on this type's MRO.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        self.ptr_eq(other) || self.mro_tail().iter().any(|t| t.ptr_eq(other))
    }

    /// Live direct subtypes.
    pub fn subclasses(&self) -> Vec<TypeRef> {
        let mut subclasses = self.subclasses.lock();
        subclasses.retain(|w| w.strong_count() > 0);
        subclasses.iter().filter_map(Weak::upgrade).collect()
    }

    // ── Attributes ──────────────────────────────────────────────────

    /// Find `name` along the MRO, returning the value and the type whose
    /// dictionary holds it.
    pub fn lookup(&self, name: &str) -> Option<(Value, TypeRef)> {
        if let Some(v) = self.dict.get(name) {
            return self.me.upgrade().map(|me| (v, me));
        }
        self.mro_tail()
            .iter()
            .find_map(|t| t.dict.get(name).map(|v| (v, t.clone())))
    }

    pub fn lookup_value(&self, name: &str) -> Option<Value> {
        self.lookup(name).map(|(v, _)| v)
    }

    /// Bind `name` in this type's dictionary, recomputing the matching slot
    /// if `name` is a special method.
    pub fn set_attr(&self, name: &str, value: Value) {
        let _guard = self.update.lock();
        self.dict.insert(name, value);
        self.after_attr_change(name);
    }

    /// Remove `name`, returning whether it was present.
    pub fn del_attr(&self, name: &str) -> bool {
        let _guard = self.update.lock();
        let removed = self.dict.remove(name).is_some();
        if removed {
            self.after_attr_change(name);
        }
        removed
    }

    /// Called holding this type's `update` lock. Each subtype's lock is
    /// taken in turn while its slot is recomputed, so locks are always
    /// acquired base before subtype.
    fn after_attr_change(&self, name: &str) {
        if let Some(op) = SpecialMethod::for_method_name(name) {
            self.update_slot(op);
            for sub in self.all_subclasses() {
                let _guard = sub.update.lock();
                sub.update_slot(op);
            }
        }
    }

    /// Recompute every slot while holding the update lock.
    pub(crate) fn refresh_all_slots(&self) {
        let _guard = self.update.lock();
        self.update_all_slots();
    }

    /// Remove this type from the subclass lists of its bases.
    pub(crate) fn unlink(&self) {
        for base in self.bases.iter() {
            base.subclasses
                .lock()
                .retain(|w| w.strong_count() > 0 && !std::ptr::eq(w.as_ptr(), self));
        }
    }

    pub(crate) fn all_subclasses(&self) -> Vec<TypeRef> {
        let mut out: Vec<TypeRef> = Vec::new();
        let mut pending = self.subclasses();
        while let Some(t) = pending.pop() {
            if out.iter().any(|seen| Arc::ptr_eq(seen, &t)) {
                continue;
            }
            pending.extend(t.subclasses());
            out.push(t);
        }
        out
    }

    /// Recompute every slot from the dictionaries along the MRO.
    pub fn update_all_slots(&self) {
        for &op in SpecialMethod::ALL {
            self.update_slot(op);
        }
    }

    /// Recompute the slot for `op` from the dictionaries along the MRO.
    ///
    /// A method descriptor supplies its target for each class of this type
    /// it is compatible with. Any other definition is called through a
    /// generic wrapper, except `None`, which leaves the slot empty.
    pub fn update_slot(&self, op: SpecialMethod) {
        let width = self.slots.width();
        let targets: Vec<Option<Target>> = match self.lookup(op.method_name()) {
            None => vec![None; width],
            Some((attr, _)) if attr.is_none() => vec![None; width],
            Some((attr, _)) => match attr.data() {
                Data::Method(descr) if descr.op() == Some(op) => (0..width)
                    .map(|i| descr.target_for(self.classes.get(i).unwrap_or(&class::OBJECT)))
                    .collect(),
                _ => vec![Some(Target::wrapping(op, attr.clone())); width],
            },
        };
        let defined = targets.iter().any(Option::is_some);
        self.slots.store(op, targets);
        if let Some(flag) = op.kernel_flag() {
            if defined {
                self.kernel.fetch_or(flag.bits(), Ordering::AcqRel);
            } else {
                self.kernel.fetch_and(!flag.bits(), Ordering::AcqRel);
            }
        }
    }

    // ── Instances ───────────────────────────────────────────────────

    /// Call the type: create an instance and initialise it.
    pub fn call(
        self: &Arc<Self>,
        sys: &TypeSystem,
        args: &[Value],
        kwnames: &[Arc<str>],
    ) -> PyResult<Value> {
        if !self.features().contains(Feature::INSTANTIABLE) {
            return Err(PyError::type_error(format!(
                "cannot create '{}' instances",
                self.name
            )));
        }
        let Some((new, _)) = self.find_constructor() else {
            return Err(PyError::type_error(format!(
                "cannot create '{}' instances",
                self.name
            )));
        };
        let obj = new(sys, self, args, kwnames)?;
        let (obj_type, index) = sys.type_and_index(&obj)?;
        if obj_type.is_subtype_of(self) && SpecialMethod::Init.is_defined_for(&obj_type, index) {
            SpecialMethod::Init.call_init(sys, &obj_type, index, &obj, args, kwnames)?;
        }
        Ok(obj)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.name)
    }
}
