use std::sync::Arc;

use crate::class::NativeClass;
use crate::{InterpreterError, NewFn, SpecialMethod, Target, TypeRef, Value};

bitflags::bitflags! {
    /// Behaviour a type declares in its specification.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Feature: u32 {
        /// The type may be used as a base.
        const BASETYPE = 1 << 0;
        /// Attributes may not be set or deleted once the type is published.
        const IMMUTABLE = 1 << 1;
        /// The type shares its representation with other types.
        const REPLACEABLE = 1 << 2;
        /// Calling the type creates instances.
        const INSTANTIABLE = 1 << 3;
    }
}

/// A description of a type to be made by the factory.
///
/// ```ignore
/// let spec = TypeSpec::new("float")
///     .primary(&class::PY_FLOAT)
///     .adopt(&class::F64)
///     .base(object)
///     .feature(Feature::BASETYPE | Feature::IMMUTABLE | Feature::INSTANTIABLE);
/// ```
pub struct TypeSpec {
    pub(crate) name: Arc<str>,
    pub(crate) primary: Option<NativeClass>,
    pub(crate) adopted: Vec<NativeClass>,
    pub(crate) bases: Vec<TypeRef>,
    pub(crate) features: Feature,
    pub(crate) doc: Option<Arc<str>>,
    pub(crate) methods: Vec<(SpecialMethod, usize, Target)>,
    pub(crate) attrs: Vec<(Arc<str>, Value)>,
    pub(crate) members: Vec<Arc<str>>,
    pub(crate) constructor: Option<NewFn>,
}

impl TypeSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            primary: None,
            adopted: Vec::new(),
            bases: Vec::new(),
            features: Feature::empty(),
            doc: None,
            methods: Vec::new(),
            attrs: Vec::new(),
            members: Vec::new(),
            constructor: None,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The class that instances of the type are normally made of.
    pub fn primary(mut self, class: &NativeClass) -> Self {
        self.primary = Some(class.clone());
        self
    }

    /// A further class accepted as an instance of the type.
    pub fn adopt(mut self, class: &NativeClass) -> Self {
        self.adopted.push(class.clone());
        self
    }

    pub fn base(mut self, base: &TypeRef) -> Self {
        self.bases.push(base.clone());
        self
    }

    pub fn bases(mut self, bases: &[TypeRef]) -> Self {
        self.bases.extend(bases.iter().cloned());
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.features |= feature;
        self
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(Arc::from(doc));
        self
    }

    /// Implement `op` for the primary class.
    pub fn method(self, op: SpecialMethod, target: Target) -> Self {
        self.method_for(0, op, target)
    }

    /// Implement `op` for the class at representation `index` (0 is the
    /// primary, then adopted classes in order).
    pub fn method_for(mut self, index: usize, op: SpecialMethod, target: Target) -> Self {
        self.methods.push((op, index, target));
        self
    }

    pub fn attr(mut self, name: &str, value: Value) -> Self {
        self.attrs.push((Arc::from(name), value));
        self
    }

    /// Expose the named slot field of the primary class.
    pub fn member(mut self, slot: &str) -> Self {
        self.members.push(Arc::from(slot));
        self
    }

    /// How calling the type creates an instance.
    pub fn constructor(mut self, new: NewFn) -> Self {
        self.constructor = Some(new);
        self
    }

    pub fn features(&self) -> Feature {
        self.features
    }

    /// All classes of the type, primary first.
    pub fn classes(&self) -> Vec<NativeClass> {
        self.primary
            .iter()
            .chain(self.adopted.iter())
            .cloned()
            .collect()
    }

    /// Check the specification is complete and consistent.
    pub fn freeze(self) -> Result<Self, InterpreterError> {
        let bad = |reason: String| InterpreterError::Spec {
            spec: self.name.clone(),
            reason,
        };
        let Some(primary) = &self.primary else {
            return Err(bad("no primary class".into()));
        };
        for (i, class) in self.adopted.iter().enumerate() {
            if class.ptr_eq(primary) || self.adopted[..i].iter().any(|c| c.ptr_eq(class)) {
                return Err(bad(format!("class {class} adopted twice")));
            }
        }
        if self.features.contains(Feature::REPLACEABLE) && !self.adopted.is_empty() {
            return Err(bad("a replaceable type cannot adopt classes".into()));
        }
        let width = 1 + self.adopted.len();
        for (op, index, target) in &self.methods {
            if *index >= width {
                return Err(bad(format!("{op} defined for unknown class index {index}")));
            }
            op.check_target(target)?;
        }
        let layout = primary.layout();
        for member in &self.members {
            if layout.slot_index(member).is_none() {
                return Err(bad(format!("class {primary} has no slot '{member}'")));
            }
        }
        Ok(self)
    }
}
