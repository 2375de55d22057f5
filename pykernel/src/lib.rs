//! The type system of a dynamic, class-based language hosted on native
//! Rust classes: types, their special-method slots, and the registry that
//! maps every native class to the type of its instances.

pub mod abstract_api;
pub mod class;
mod descr;
mod dict;
mod error;
mod factory;
pub mod mro;
mod registry;
mod representation;
mod spec;
mod special;
mod subclass;
mod system;
mod types;
mod value;

mod builtins;
mod exceptions;
mod objects;

pub use descr::*;
pub use dict::Dict;
pub use error::*;
pub use factory::TypeFactory;
pub use objects::{generic_delattr, generic_getattr, generic_setattr};
pub use registry::TypeRegistry;
pub use representation::*;
pub use spec::*;
pub use special::*;
pub use subclass::*;
pub use system::*;
pub use types::*;
pub use value::*;
