use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};
use parking_lot::Mutex;

use crate::class::{self, Capabilities, NativeClass, WeakClass};
use crate::{PyError, PyResult, TypeRef};

/// The shape of native class needed to back a class defined in the
/// dynamic language. Two equal specifications are backed by the same
/// native class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubclassSpec {
    base: NativeClass,
    dict: bool,
    slots: Vec<Arc<str>>,
    manage_dict: bool,
    manage_type: bool,
}

impl SubclassSpec {
    pub fn new(base: &NativeClass) -> Self {
        Self {
            base: base.clone(),
            dict: false,
            slots: Vec::new(),
            manage_dict: false,
            manage_type: false,
        }
    }

    /// Ask for an instance dictionary.
    pub fn dict(mut self, dict: bool) -> Self {
        self.dict = dict;
        self
    }

    /// Ask for named slot fields. `__dict__` among them asks for a
    /// dictionary instead.
    pub fn slots<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.slots.extend(names.into_iter().map(|n| Arc::from(n.as_ref())));
        self
    }

    /// Normalise: slot order and repeats do not matter, and storage the
    /// base already has is not added again.
    pub fn freeze(mut self) -> Self {
        if self.slots.iter().any(|s| &**s == "__dict__") {
            self.dict = true;
            self.slots.retain(|s| &**s != "__dict__");
        }
        self.slots.sort();
        self.slots.dedup();
        let layout = self.base.layout();
        self.manage_dict = self.dict && !layout.dict;
        self.manage_type = !layout.type_pointer;
        self
    }

    pub fn base(&self) -> &NativeClass {
        &self.base
    }

    pub fn slot_names(&self) -> &[Arc<str>] {
        &self.slots
    }

    pub fn manages_dict(&self) -> bool {
        self.manage_dict
    }

    pub fn manages_type(&self) -> bool {
        self.manage_type
    }

    /// True if a class made from this would have the layout of its base.
    pub fn adds_nothing(&self) -> bool {
        !self.manage_dict && !self.manage_type && self.slots.is_empty()
    }

    /// What the synthesized class declares.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::CRAFTED;
        if self.manage_type {
            caps |= Capabilities::TYPE_ASSIGNMENT;
        }
        if self.manage_dict {
            caps |= Capabilities::DICT | Capabilities::DICT_ASSIGNMENT;
        }
        if !self.slots.is_empty() {
            caps |= Capabilities::SLOTS;
        }
        caps
    }
}

/// Synthesizes and caches the native classes behind dynamically defined
/// classes. The cache does not keep a class alive: one that no type or
/// instance uses any more is reclaimed, and an equal specification later
/// gets a fresh class.
pub struct SubclassFactory {
    template: Arc<str>,
    cache: Mutex<AHashMap<SubclassSpec, WeakClass>>,
    counters: Mutex<AHashMap<Arc<str>, usize>>,
}

impl SubclassFactory {
    /// `template` names new classes: `{base}` is replaced by the base
    /// class name and `{n}` by a count unique for that base name.
    pub fn new(template: &str) -> Self {
        info!("Subclass factory created, naming classes '{template}'");
        Self {
            template: Arc::from(template),
            cache: Mutex::new(AHashMap::new()),
            counters: Mutex::new(AHashMap::new()),
        }
    }

    /// The native class for `spec`: the identical class for equal
    /// specifications.
    pub fn find_or_create(&self, spec: SubclassSpec) -> NativeClass {
        let spec = spec.freeze();
        if spec.adds_nothing() && spec.base.capabilities().contains(Capabilities::CRAFTED) {
            return spec.base.clone();
        }

        let mut cache = self.cache.lock();
        if let Some(class) = cache.get(&spec).and_then(WeakClass::upgrade) {
            return class;
        }
        cache.retain(|_, class| class.is_live());
        let name = self.next_name(spec.base.name());
        let class = NativeClass::derive(&name, &spec.base, spec.capabilities(), &spec.slots);
        debug!(
            "Synthesized '{}' extending '{}' (dict: {}, type: {}, slots: {:?})",
            name,
            spec.base.name(),
            spec.manage_dict,
            spec.manage_type,
            spec.slots
        );
        cache.insert(spec, class.downgrade());
        class
    }

    /// Number of synthesized classes still alive.
    pub fn len(&self) -> usize {
        self.cache.lock().values().filter(|class| class.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_name(&self, base: &Arc<str>) -> String {
        let n = {
            let mut counters = self.counters.lock();
            let n = counters.entry(base.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.template
            .replace("{base}", base)
            .replace("{n}", &n.to_string())
    }
}

/// The native class a new class with these bases must extend: the one
/// among the bases' classes that extends all the others. `object` stands
/// for the extension point every plain class grows from.
pub fn most_derived_base(bases: &[TypeRef]) -> PyResult<NativeClass> {
    let classes: Vec<NativeClass> = bases
        .iter()
        .map(|base| {
            let class = base.canonical_class();
            if class.ptr_eq(&class::OBJECT) {
                class::INSTANCE.clone()
            } else {
                class.clone()
            }
        })
        .collect();

    let Some(first) = classes.first() else {
        return Ok(class::INSTANCE.clone());
    };
    let mut best = first.clone();
    for class in &classes[1..] {
        if best.is_subclass_of(class) {
            continue;
        }
        if class.is_subclass_of(&best) {
            best = class.clone();
        } else {
            return Err(PyError::type_error(
                "multiple bases have instance lay-out conflict",
            ));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SubclassFactory {
        SubclassFactory::new("{base}$py{n}")
    }

    #[test]
    fn slot_order_does_not_matter() {
        let f = factory();
        let one = f.find_or_create(SubclassSpec::new(&class::PY_FLOAT).slots(["a", "b", "c"]));
        let two = f.find_or_create(SubclassSpec::new(&class::PY_FLOAT).slots(["c", "a", "b", "a"]));
        assert!(one.ptr_eq(&two), "equal specifications share a class");
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn unused_classes_are_not_kept() {
        let f = factory();
        let kept = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["kept"]));
        {
            let gone = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["gone"]));
            assert_eq!(&**gone.name(), "Instance$py2");
            assert_eq!(f.len(), 2);
        }
        assert_eq!(f.len(), 1);
        let again = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["gone"]));
        assert_eq!(&**again.name(), "Instance$py3", "a fresh class");
        let same = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["kept"]));
        assert!(same.ptr_eq(&kept));
    }

    #[test]
    fn different_shapes_get_different_classes() {
        let f = factory();
        let slotted = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["x"]));
        let with_dict = f.find_or_create(SubclassSpec::new(&class::INSTANCE).dict(true));
        assert!(!slotted.ptr_eq(&with_dict));
        assert!(!slotted.layout().dict);
        assert!(with_dict.layout().dict);
    }

    #[test]
    fn type_pointer_added_only_when_missing() {
        let on_float = SubclassSpec::new(&class::PY_FLOAT).freeze();
        assert!(on_float.manages_type());
        let on_instance = SubclassSpec::new(&class::INSTANCE).freeze();
        assert!(!on_instance.manages_type(), "extension point already has one");
        let on_exception = SubclassSpec::new(&class::BASE_EXCEPTION).dict(true).freeze();
        assert!(on_exception.adds_nothing());
    }

    #[test]
    fn dunder_dict_in_slots_asks_for_dict() {
        let spec = SubclassSpec::new(&class::INSTANCE)
            .slots(["__dict__", "x"])
            .freeze();
        assert!(spec.manages_dict());
        assert_eq!(spec.slot_names().len(), 1);
    }

    #[test]
    fn crafted_base_reused_when_nothing_added() {
        let f = factory();
        let base = f.find_or_create(SubclassSpec::new(&class::INSTANCE).dict(true));
        let again = f.find_or_create(SubclassSpec::new(&base).dict(true));
        assert!(again.ptr_eq(&base));
    }

    #[test]
    fn names_follow_template_per_base() {
        let f = factory();
        let a = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["a"]));
        let b = f.find_or_create(SubclassSpec::new(&class::INSTANCE).slots(["b"]));
        let c = f.find_or_create(SubclassSpec::new(&class::STR));
        assert_eq!(&**a.name(), "Instance$py1");
        assert_eq!(&**b.name(), "Instance$py2");
        assert_eq!(&**c.name(), "PyUnicode$py1");
        assert!(c.capabilities().contains(Capabilities::CRAFTED));
    }
}
