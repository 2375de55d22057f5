use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::{SpecialMethod, Value};

pub type PyResult<T> = Result<T, PyError>;

/// How a specification collided with what the registry already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClashMode {
    /// The class is already bound to a representation.
    Existing,
    /// A shared representation was required but the class is bound to a
    /// representation that cannot be shared.
    NotSharable,
    /// No representation could be found for the class.
    Missing,
}

/// Two specifications disagree about the representation of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clash {
    pub spec: Option<Arc<str>>,
    pub mode: ClashMode,
    pub class: Arc<str>,
    pub existing: Option<String>,
}

impl Clash {
    pub fn new(mode: ClashMode, class: Arc<str>, existing: Option<String>) -> Self {
        Self {
            spec: None,
            mode,
            class,
            existing,
        }
    }

    /// Attribute the clash to the specification being interpreted.
    pub fn in_spec(mut self, spec: &Arc<str>) -> Self {
        if self.spec.is_none() {
            self.spec = Some(spec.clone());
        }
        self
    }
}

impl fmt::Display for Clash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(spec) = &self.spec {
            write!(f, "Interpreting specification {spec}, the type system found ")?;
        }
        let existing = self.existing.as_deref().unwrap_or("?");
        match self.mode {
            ClashMode::Existing => {
                write!(f, "class {} was already bound to {existing}", self.class)
            }
            ClashMode::NotSharable => {
                write!(f, "class {} was bound to non-shared {existing}", self.class)
            }
            ClashMode::Missing => write!(f, "no representation for class {}", self.class),
        }
    }
}

/// Fatal violations of kernel invariants. These indicate a bug in a
/// collaborator, not an error in the dynamic program.
#[derive(Debug, Clone, Error)]
pub enum InterpreterError {
    #[error("{target} not of required type {required} for slot {slot}")]
    SlotShape {
        slot: SpecialMethod,
        required: crate::Signature,
        target: crate::Signature,
    },

    #[error("{0}")]
    Clash(Clash),

    #[error("invalid specification '{spec}': {reason}")]
    Spec { spec: Arc<str>, reason: String },

    #[error("type system bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("class {0} does not have a shared representation")]
    NotShared(Arc<str>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Clash> for InterpreterError {
    fn from(clash: Clash) -> Self {
        Self::Clash(clash)
    }
}

/// A mismatch between the arguments supplied and the calling shape of the
/// target. Callers attribute it to the operation that was being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("takes no arguments ({0} given)")]
    NoArguments(usize),

    #[error("expected {expected} arguments, got {given}")]
    Count { expected: usize, given: usize },

    #[error("takes no keyword arguments")]
    NoKeywords,

    #[error("argument {index} must be {expected}, not '{given}'")]
    Kind {
        index: usize,
        expected: &'static str,
        given: Arc<str>,
    },
}

impl ArgumentError {
    pub fn check_count(given: usize, expected: usize) -> Result<(), Self> {
        match (expected, given) {
            (e, g) if e == g => Ok(()),
            (0, g) => Err(Self::NoArguments(g)),
            (e, g) => Err(Self::Count {
                expected: e,
                given: g,
            }),
        }
    }

    pub fn check_no_keywords(kwnames: &[Arc<str>]) -> Result<(), Self> {
        if kwnames.is_empty() {
            Ok(())
        } else {
            Err(Self::NoKeywords)
        }
    }

    /// Turn the mismatch into the user-visible error, naming the declaring
    /// type and the method.
    pub fn attribute(self, owner: &str, name: &str) -> PyError {
        PyError::type_error(format!("{owner}.{name}() {self}"))
    }
}

/// Built-in exception kinds the kernel raises itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    BaseException,
    Exception,
    TypeError,
    AttributeError,
    ValueError,
    KeyError,
    IndexError,
    NameError,
    StopIteration,
    OverflowError,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 10] = [
        Self::BaseException,
        Self::Exception,
        Self::TypeError,
        Self::AttributeError,
        Self::ValueError,
        Self::KeyError,
        Self::IndexError,
        Self::NameError,
        Self::StopIteration,
        Self::OverflowError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BaseException => "BaseException",
            Self::Exception => "Exception",
            Self::TypeError => "TypeError",
            Self::AttributeError => "AttributeError",
            Self::ValueError => "ValueError",
            Self::KeyError => "KeyError",
            Self::IndexError => "IndexError",
            Self::NameError => "NameError",
            Self::StopIteration => "StopIteration",
            Self::OverflowError => "OverflowError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// A user-visible exception travelling as a Rust error.
#[derive(Clone)]
pub struct PyException {
    pub type_name: Arc<str>,
    pub message: String,
    /// The exception instance, once one has been created.
    pub value: Option<Value>,
}

impl PyException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            type_name: Arc::from(kind.name()),
            message: message.into(),
            value: None,
        }
    }

    pub fn kind(&self) -> Option<ExceptionKind> {
        ExceptionKind::from_name(&self.type_name)
    }
}

impl fmt::Debug for PyException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyException")
            .field("type_name", &self.type_name)
            .field("message", &self.message)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

impl fmt::Display for PyException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

/// Recoverable conditions of the dynamic language.
#[derive(Debug, Clone, Error)]
pub enum PyError {
    /// The slot for this operation is empty.
    #[error("slot {0} is empty")]
    Empty(SpecialMethod),

    #[error("{0}")]
    Argument(#[from] ArgumentError),

    #[error("{0}")]
    Raised(PyException),

    #[error(transparent)]
    Interpreter(#[from] InterpreterError),
}

impl PyError {
    pub fn raise(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self::Raised(PyException::new(kind, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::TypeError, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::AttributeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::ValueError, message)
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::KeyError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raise(ExceptionKind::IndexError, message)
    }

    pub fn is_empty_slot(&self) -> bool {
        matches!(self, Self::Empty(_))
    }

    /// Whether this is a raised exception of the given kind.
    pub fn is_raised(&self, kind: ExceptionKind) -> bool {
        match self {
            Self::Raised(exc) => exc.kind() == Some(kind),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clash_message_names_the_spec() {
        let clash = Clash::new(
            ClashMode::Existing,
            Arc::from("PyFloat"),
            Some("float".to_string()),
        )
        .in_spec(&Arc::from("myfloat"));
        assert_eq!(
            clash.to_string(),
            "Interpreting specification myfloat, the type system found \
             class PyFloat was already bound to float"
        );
    }

    #[test]
    fn argument_error_is_attributed_to_owner() {
        let err = ArgumentError::check_count(2, 1).unwrap_err();
        match err.attribute("float", "__neg__") {
            PyError::Raised(exc) => {
                assert_eq!(&*exc.type_name, "TypeError");
                assert_eq!(exc.message, "float.__neg__() expected 1 arguments, got 2");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            ArgumentError::check_count(3, 0),
            Err(ArgumentError::NoArguments(3))
        );
    }

    #[test]
    fn raised_kind_round_trips_through_name() {
        let err = PyError::key_error("'x'");
        assert!(err.is_raised(ExceptionKind::KeyError));
        assert!(!err.is_raised(ExceptionKind::TypeError));
        assert!(!err.is_empty_slot());
    }
}
