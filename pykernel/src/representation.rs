use std::fmt;
use std::sync::Arc;

use crate::class::{ClassId, NativeClass};
use crate::{InterpreterError, TypeRef, Value};

/// How instances of a native class find their type.
#[derive(Clone)]
pub enum RepresentationKind {
    /// The class backs exactly one type.
    Simple(TypeRef),
    /// The class is one of several accepted by an adoptive type; `index`
    /// selects its dispatch targets.
    Adopted { index: usize, ty: TypeRef },
    /// The class may back several types. Each instance names its type
    /// through its type pointer.
    Shared,
}

/// What the kernel knows about one native class. The kind never changes
/// after creation.
pub struct Representation {
    class_id: ClassId,
    class_name: Arc<str>,
    kind: RepresentationKind,
}

impl Representation {
    pub fn simple(class: &NativeClass, ty: TypeRef) -> Self {
        Self::new(class, RepresentationKind::Simple(ty))
    }

    pub fn adopted(class: &NativeClass, index: usize, ty: TypeRef) -> Self {
        Self::new(class, RepresentationKind::Adopted { index, ty })
    }

    pub fn shared(class: &NativeClass) -> Self {
        Self::new(class, RepresentationKind::Shared)
    }

    fn new(class: &NativeClass, kind: RepresentationKind) -> Self {
        Self {
            class_id: class.id(),
            class_name: class.name().clone(),
            kind,
        }
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn class_name(&self) -> &Arc<str> {
        &self.class_name
    }

    pub fn kind(&self) -> &RepresentationKind {
        &self.kind
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, RepresentationKind::Shared)
    }

    /// Index of the class among the classes its type accepts.
    pub fn index(&self) -> usize {
        match self.kind {
            RepresentationKind::Adopted { index, .. } => index,
            _ => 0,
        }
    }

    /// The type fixed by this representation, if it is not shared.
    pub fn static_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            RepresentationKind::Simple(ty) | RepresentationKind::Adopted { ty, .. } => Some(ty),
            RepresentationKind::Shared => None,
        }
    }

    /// The type of `value`, an instance of the class this describes.
    pub fn python_type(&self, value: &Value) -> Result<TypeRef, InterpreterError> {
        match &self.kind {
            RepresentationKind::Simple(ty) | RepresentationKind::Adopted { ty, .. } => {
                Ok(ty.clone())
            }
            RepresentationKind::Shared => value.type_pointer().ok_or_else(|| {
                InterpreterError::Internal(format!(
                    "instance of shared class {} has no type",
                    self.class_name
                ))
            }),
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RepresentationKind::Simple(ty) => write!(f, "Simple[{}]", ty.name()),
            RepresentationKind::Adopted { index, ty } => {
                write!(f, "Adopted[{}, {index}]", ty.name())
            }
            RepresentationKind::Shared => write!(f, "Shared[{}]", self.class_name),
        }
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} for {}", self.class_name)
    }
}
