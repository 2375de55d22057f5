use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, Weak};

bitflags::bitflags! {
    /// What a native class declares about itself.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Synthesized for a class defined in the dynamic language.
        const CRAFTED = 1 << 0;
        /// Open for extension by classes defined in the dynamic language;
        /// instances carry their own type.
        const EXTENSION_POINT = 1 << 1;
        /// Instances carry a replaceable type pointer.
        const TYPE_ASSIGNMENT = 1 << 2;
        /// Instances carry an instance dictionary.
        const DICT = 1 << 3;
        /// The instance dictionary may be replaced.
        const DICT_ASSIGNMENT = 1 << 4;
        /// Instances carry named slot fields.
        const SLOTS = 1 << 5;
    }
}

/// Process-unique identity of a native class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

impl ClassId {
    fn next() -> Self {
        Self(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The storage an instance of a class carries, cumulative over the base
/// chain. Slot names keep the order in which the classes added them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub type_pointer: bool,
    pub dict: bool,
    pub slots: Box<[Arc<str>]>,
}

impl Layout {
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| &**slot == name)
    }
}

pub struct ClassInfo {
    id: ClassId,
    name: Arc<str>,
    base: Option<NativeClass>,
    capabilities: Capabilities,
    layout: Layout,
}

/// Handle to a native implementation class. Identity is reference identity.
#[derive(Clone)]
pub struct NativeClass(Arc<ClassInfo>);

impl NativeClass {
    /// A root class with no base.
    pub fn root(name: &str, capabilities: Capabilities) -> Self {
        Self(Arc::new(ClassInfo {
            id: ClassId::next(),
            name: Arc::from(name),
            base: None,
            capabilities,
            layout: Layout::default(),
        }))
    }

    /// A class extending `base`. The layout is inherited and extended by
    /// whatever `capabilities` and `slots` ask for.
    pub fn derive(
        name: &str,
        base: &NativeClass,
        capabilities: Capabilities,
        slots: &[Arc<str>],
    ) -> Self {
        let inherited = base.layout();
        let mut all_slots = inherited.slots.to_vec();
        all_slots.extend(slots.iter().cloned());
        let layout = Layout {
            type_pointer: inherited.type_pointer
                || capabilities.intersects(
                    Capabilities::TYPE_ASSIGNMENT | Capabilities::EXTENSION_POINT,
                ),
            dict: inherited.dict || capabilities.contains(Capabilities::DICT),
            slots: all_slots.into_boxed_slice(),
        };
        Self(Arc::new(ClassInfo {
            id: ClassId::next(),
            name: Arc::from(name),
            base: Some(base.clone()),
            capabilities,
            layout,
        }))
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.0.id
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.0.name
    }

    #[inline]
    pub fn base(&self) -> Option<&NativeClass> {
        self.0.base.as_ref()
    }

    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.0.capabilities
    }

    /// Capabilities declared by this class or any of its bases.
    pub fn all_capabilities(&self) -> Capabilities {
        self.ancestors()
            .fold(Capabilities::empty(), |acc, class| acc | class.capabilities())
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.0.layout
    }

    pub fn ptr_eq(&self, other: &NativeClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This class followed by its bases, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = NativeClass> + '_ {
        std::iter::successors(Some(self.clone()), |class| class.base().cloned())
    }

    /// True if `other` is this class or one of its bases.
    pub fn is_subclass_of(&self, other: &NativeClass) -> bool {
        self.ancestors().any(|class| class.ptr_eq(other))
    }

    pub(crate) fn downgrade(&self) -> WeakClass {
        WeakClass(Arc::downgrade(&self.0))
    }
}

/// A [`NativeClass`] that is not kept alive by this handle.
#[derive(Clone)]
pub(crate) struct WeakClass(Weak<ClassInfo>);

impl WeakClass {
    pub(crate) fn upgrade(&self) -> Option<NativeClass> {
        self.0.upgrade().map(NativeClass)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl PartialEq for NativeClass {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NativeClass {}

impl Hash for NativeClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeClass({}#{})", self.name(), self.id().raw())
    }
}

impl fmt::Display for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Built-in native classes ─────────────────────────────────────────
//
// Every built-in class derives from `OBJECT`, so a definition on `object`
// applies to all of them.

pub static OBJECT: LazyLock<NativeClass> =
    LazyLock::new(|| NativeClass::root("Object", Capabilities::empty()));

fn builtin(name: &str, capabilities: Capabilities) -> NativeClass {
    NativeClass::derive(name, &OBJECT, capabilities, &[])
}

/// Native class of every type object.
pub static TYPE: LazyLock<NativeClass> = LazyLock::new(|| builtin("PyType", Capabilities::empty()));

/// Native base of classes defined in the dynamic language on top of `object`.
pub static INSTANCE: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("Instance", Capabilities::EXTENSION_POINT));

pub static METHOD_DESCRIPTOR: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyMethodDescr", Capabilities::empty()));

pub static MEMBER_DESCRIPTOR: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyMemberDescr", Capabilities::empty()));

pub static GETSET_DESCRIPTOR: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyGetSetDescr", Capabilities::empty()));

pub static FUNCTION: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyFunction", Capabilities::empty()));

pub static BOUND_METHOD: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyMethod", Capabilities::empty()));

pub static NONE_TYPE: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyNone", Capabilities::empty()));

pub static NOT_IMPLEMENTED_TYPE: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyNotImplemented", Capabilities::empty()));

pub static DICT: LazyLock<NativeClass> = LazyLock::new(|| builtin("PyDict", Capabilities::empty()));

pub static TUPLE: LazyLock<NativeClass> = LazyLock::new(|| builtin("PyTuple", Capabilities::empty()));

/// Primary class of `float`.
pub static PY_FLOAT: LazyLock<NativeClass> =
    LazyLock::new(|| builtin("PyFloat", Capabilities::empty()));

/// The unboxed form of a float, adopted by `float`.
pub static F64: LazyLock<NativeClass> = LazyLock::new(|| builtin("f64", Capabilities::empty()));

pub static INT: LazyLock<NativeClass> = LazyLock::new(|| builtin("PyLong", Capabilities::empty()));

pub static BOOL: LazyLock<NativeClass> =
    LazyLock::new(|| NativeClass::derive("PyBool", &INT, Capabilities::empty(), &[]));

pub static STR: LazyLock<NativeClass> = LazyLock::new(|| builtin("PyUnicode", Capabilities::empty()));

/// Shared by every exception type.
pub static BASE_EXCEPTION: LazyLock<NativeClass> = LazyLock::new(|| {
    builtin(
        "PyBaseException",
        Capabilities::TYPE_ASSIGNMENT | Capabilities::DICT,
    )
});
