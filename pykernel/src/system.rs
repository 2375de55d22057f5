use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use ahash::AHashMap;
use log::{debug, info};

use crate::class::{Capabilities, NativeClass};
use crate::subclass::{self, SubclassFactory, SubclassSpec};
use crate::{
    Dict, ExceptionKind, Feature, InterpreterError, PyError, PyResult, Representation, TypeFactory,
    TypeKind, TypeRef, TypeRegistry, TypeSpec, Value, builtins, descr, exceptions, objects,
};

pub struct TypeSystemInfo {
    /// Names synthesized native classes. `{base}` is the base class name,
    /// `{n}` a count per base name.
    pub subclass_name_template: String,
    pub registry_capacity: usize,
    /// List the bootstrap types and their states once they are published.
    pub trace_bootstrap: bool,
}

impl Default for TypeSystemInfo {
    fn default() -> Self {
        Self {
            subclass_name_template: "{base}$py{n}".into(),
            registry_capacity: 256,
            trace_bootstrap: false,
        }
    }
}

/// The types made during bootstrap.
pub struct BootstrapTypes {
    // ── Core ───────────────────────────────────────────────────────
    pub object: TypeRef,
    pub type_type: TypeRef,

    // ── Descriptors and callables ──────────────────────────────────
    pub method_descriptor: TypeRef,
    pub member_descriptor: TypeRef,
    pub getset_descriptor: TypeRef,
    pub function: TypeRef,
    pub method: TypeRef,

    // ── Singletons ─────────────────────────────────────────────────
    pub none_type: TypeRef,
    pub not_implemented_type: TypeRef,

    // ── Values ─────────────────────────────────────────────────────
    pub dict: TypeRef,
    pub tuple: TypeRef,
    pub float: TypeRef,
    pub int: TypeRef,
    pub bool: TypeRef,
    pub str: TypeRef,
}

impl BootstrapTypes {
    fn all(&self) -> [&TypeRef; 15] {
        [
            &self.object,
            &self.type_type,
            &self.method_descriptor,
            &self.member_descriptor,
            &self.getset_descriptor,
            &self.function,
            &self.method,
            &self.none_type,
            &self.not_implemented_type,
            &self.dict,
            &self.tuple,
            &self.float,
            &self.int,
            &self.bool,
            &self.str,
        ]
    }
}

/// One complete, independent type system: the registry, the factory, and
/// the types made at bootstrap.
pub struct TypeSystem {
    info: TypeSystemInfo,
    registry: Arc<TypeRegistry>,
    factory: TypeFactory,
    subclasses: SubclassFactory,
    types: BootstrapTypes,
    exceptions: AHashMap<ExceptionKind, TypeRef>,
    bootstrap_at: Instant,
    ready_at: Instant,
}

static GLOBAL: OnceLock<Result<TypeSystem, InterpreterError>> = OnceLock::new();
static GLOBAL_BOOTSTRAPS: AtomicUsize = AtomicUsize::new(0);

/// Run `init` in `cell` on the first touch, counting the run in `runs`.
/// Every caller, then and later, gets what that one run returned, so a
/// failure poisons the cell for good.
fn first_touch<'a, T, E: Clone>(
    cell: &'a OnceLock<Result<T, E>>,
    runs: &AtomicUsize,
    init: impl FnOnce() -> Result<T, E>,
) -> Result<&'a T, E> {
    cell.get_or_init(|| {
        runs.fetch_add(1, Ordering::SeqCst);
        init()
    })
    .as_ref()
    .map_err(Clone::clone)
}

impl TypeSystem {
    /// Bootstrap a type system. Nothing made here is visible in the
    /// registry until every bootstrap type is complete.
    pub fn new(info: TypeSystemInfo) -> Result<Self, InterpreterError> {
        let bootstrap_at = Instant::now();
        info!("Type system is waking up.");

        let registry = Arc::new(TypeRegistry::new(info.registry_capacity));
        let factory = TypeFactory::new(registry.clone());
        let object = factory.object().clone();

        let name: Arc<str> = Arc::from("bootstrap");
        let types = factory
            .batch(&name, || {
                factory.from_spec(objects::object_spec())?;
                factory.from_spec(objects::type_spec(&object))?;
                let int = factory.from_spec(builtins::int_spec(&object))?;
                Ok(BootstrapTypes {
                    object: object.clone(),
                    type_type: factory.type_type().clone(),
                    method_descriptor: factory.from_spec(descr::method_descriptor_spec(&object))?,
                    member_descriptor: factory.from_spec(descr::member_descriptor_spec(&object))?,
                    getset_descriptor: factory.from_spec(descr::getset_descriptor_spec(&object))?,
                    function: factory.from_spec(descr::function_spec(&object))?,
                    method: factory.from_spec(descr::bound_method_spec(&object))?,
                    none_type: factory.from_spec(builtins::none_type_spec(&object))?,
                    not_implemented_type: factory
                        .from_spec(builtins::not_implemented_type_spec(&object))?,
                    dict: factory.from_spec(builtins::dict_spec(&object))?,
                    tuple: factory.from_spec(builtins::tuple_spec(&object))?,
                    float: factory.from_spec(builtins::float_spec(&object))?,
                    bool: factory.from_spec(builtins::bool_spec(&int))?,
                    int,
                    str: factory.from_spec(builtins::str_spec(&object))?,
                })
            })
            .map_err(|e| InterpreterError::BootstrapFailed(e.to_string()))?;

        if info.trace_bootstrap {
            for ty in types.all() {
                debug!("Bootstrap type '{}' is {:?}", ty.name(), ty.state());
            }
        }

        let exceptions = exceptions::create_all(&factory, &object)
            .map_err(|e| InterpreterError::BootstrapFailed(e.to_string()))?;
        let subclasses = SubclassFactory::new(&info.subclass_name_template);

        let ready_at = Instant::now();
        info!(
            "Type system is ready after {:.3} seconds",
            (ready_at - bootstrap_at).as_secs_f64()
        );
        Ok(Self {
            info,
            registry,
            factory,
            subclasses,
            types,
            exceptions,
            bootstrap_at,
            ready_at,
        })
    }

    /// The process-wide type system, bootstrapped by whichever thread gets
    /// here first while every other thread waits. A failed bootstrap is
    /// returned to every caller from then on.
    pub fn global() -> Result<&'static TypeSystem, InterpreterError> {
        first_touch(&GLOBAL, &GLOBAL_BOOTSTRAPS, || {
            TypeSystem::new(TypeSystemInfo::default())
        })
    }

    /// How many times the global type system has been bootstrapped.
    pub fn global_bootstraps() -> usize {
        GLOBAL_BOOTSTRAPS.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> &TypeSystemInfo {
        &self.info
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &TypeFactory {
        &self.factory
    }

    pub fn subclass_factory(&self) -> &SubclassFactory {
        &self.subclasses
    }

    pub fn bootstrap_types(&self) -> &BootstrapTypes {
        &self.types
    }

    /// When bootstrap began.
    pub fn bootstrap_at(&self) -> Instant {
        self.bootstrap_at
    }

    /// When every bootstrap type had been published.
    pub fn ready_at(&self) -> Instant {
        self.ready_at
    }

    // ── Types of values ─────────────────────────────────────────────

    pub fn representation(&self, class: &NativeClass) -> Result<Arc<Representation>, InterpreterError> {
        self.registry.get(class, &self.factory)
    }

    pub fn type_of(&self, v: &Value) -> PyResult<TypeRef> {
        Ok(self.representation(v.class())?.python_type(v)?)
    }

    /// The type of `v` and the index selecting its slot targets.
    pub fn type_and_index(&self, v: &Value) -> PyResult<(TypeRef, usize)> {
        let rep = self.representation(v.class())?;
        Ok((rep.python_type(v)?, rep.index()))
    }

    /// Name of the type of `v` for messages, falling back to its class.
    pub fn type_name(&self, v: &Value) -> Arc<str> {
        match self.type_of(v) {
            Ok(ty) => ty.name().clone(),
            Err(_) => v.class().name().clone(),
        }
    }

    pub fn object(&self) -> &TypeRef {
        &self.types.object
    }

    pub fn type_type(&self) -> &TypeRef {
        &self.types.type_type
    }

    pub fn float_type(&self) -> &TypeRef {
        &self.types.float
    }

    pub fn int_type(&self) -> &TypeRef {
        &self.types.int
    }

    pub fn bool_type(&self) -> &TypeRef {
        &self.types.bool
    }

    pub fn str_type(&self) -> &TypeRef {
        &self.types.str
    }

    pub fn tuple_type(&self) -> &TypeRef {
        &self.types.tuple
    }

    pub fn dict_type(&self) -> &TypeRef {
        &self.types.dict
    }

    pub fn exception(&self, kind: ExceptionKind) -> &TypeRef {
        // every kind is made in `new`
        &self.exceptions[&kind]
    }

    // ── Classes defined in the dynamic language ─────────────────────

    /// Define a class as a class statement would. Without `slots` its
    /// instances get a dictionary; with them, only the named fields
    /// (and a dictionary if `__dict__` is among them).
    pub fn define_class<K: AsRef<str>>(
        &self,
        name: &str,
        bases: &[TypeRef],
        namespace: impl IntoIterator<Item = (K, Value)>,
        slots: Option<&[&str]>,
    ) -> PyResult<TypeRef> {
        let bases: Vec<TypeRef> = if bases.is_empty() {
            vec![self.object().clone()]
        } else {
            bases.to_vec()
        };
        for base in &bases {
            if !base.features().contains(Feature::BASETYPE) {
                return Err(PyError::type_error(format!(
                    "type '{}' is not an acceptable base type",
                    base.name()
                )));
            }
        }

        let native = subclass::most_derived_base(&bases)?;
        let spec = match slots {
            None => SubclassSpec::new(&native).dict(true),
            Some(names) => {
                if let Some(bad) = names.iter().find(|n| !is_identifier(n)) {
                    return Err(PyError::type_error(format!(
                        "__slots__ must be identifiers, not '{bad}'"
                    )));
                }
                SubclassSpec::new(&native).slots(names.iter().copied())
            }
        }
        .freeze();
        let members = spec.slot_names().to_vec();
        let class = self.subclasses.find_or_create(spec);

        let mut spec = TypeSpec::new(name)
            .primary(&class)
            .bases(&bases)
            .feature(Feature::REPLACEABLE | Feature::BASETYPE | Feature::INSTANTIABLE);
        for member in &members {
            spec = spec.member(member);
        }
        for (key, value) in namespace {
            spec = spec.attr(key.as_ref(), value);
        }
        Ok(self.factory.from_spec(spec)?)
    }

    /// Assign `obj.__class__`. Both types must share the representation
    /// of the instance's class.
    pub fn set_type(&self, obj: &Value, new_type: &TypeRef) -> PyResult<()> {
        let current = self.type_of(obj)?;
        if !obj.has_type_pointer() {
            return Err(PyError::type_error(format!(
                "__class__ assignment only supported for mutable types, not '{}'",
                current.name()
            )));
        }
        let layout_differs = || {
            PyError::type_error(format!(
                "__class__ assignment: '{}' object layout differs from '{}'",
                new_type.name(),
                current.name()
            ))
        };
        if current.kind() != TypeKind::Replaceable || new_type.kind() != TypeKind::Replaceable {
            return Err(layout_differs());
        }
        let mine = self.representation(obj.class())?;
        let theirs = self.representation(new_type.canonical_class())?;
        if !Arc::ptr_eq(&mine, &theirs) {
            return Err(layout_differs());
        }
        if !obj.store_type_pointer(new_type.clone()) {
            return Err(InterpreterError::NotShared(obj.class().name().clone()).into());
        }
        Ok(())
    }

    /// Assign `obj.__dict__`.
    pub fn set_dict(&self, obj: &Value, dict: Arc<Dict>) -> PyResult<()> {
        if !obj
            .class()
            .all_capabilities()
            .contains(Capabilities::DICT_ASSIGNMENT)
            || !obj.store_instance_dict(dict)
        {
            return Err(PyError::type_error(format!(
                "__dict__ assignment not supported for '{}' objects",
                self.type_name(obj)
            )));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SpecialMethod, TypeState, abstract_api};

    fn system() -> TypeSystem {
        TypeSystem::new(TypeSystemInfo::default()).unwrap()
    }

    #[test]
    fn bootstrap_types_are_published() {
        let sys = system();
        for ty in sys.bootstrap_types().all() {
            assert_eq!(ty.state(), TypeState::Published, "{} not published", ty.name());
        }
        assert!(sys.ready_at() >= sys.bootstrap_at());
    }

    #[test]
    fn failed_bootstrap_poisons_every_later_caller() {
        let cell: OnceLock<Result<TypeSystem, InterpreterError>> = OnceLock::new();
        let runs = AtomicUsize::new(0);
        let first = first_touch(&cell, &runs, || {
            Err(InterpreterError::BootstrapFailed("no object".into()))
        })
        .map(drop)
        .unwrap_err();
        assert!(matches!(&first, InterpreterError::BootstrapFailed(msg) if msg == "no object"));

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let later = first_touch(&cell, &runs, system_or_err).map(drop).unwrap_err();
                    assert!(
                        matches!(&later, InterpreterError::BootstrapFailed(msg) if msg == "no object"),
                        "{later}"
                    );
                });
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1, "bootstrap runs once");
    }

    fn system_or_err() -> Result<TypeSystem, InterpreterError> {
        TypeSystem::new(TypeSystemInfo::default())
    }

    #[test]
    fn type_of_type_is_type() {
        let sys = system();
        let t = sys.type_type().as_value();
        assert!(sys.type_of(&t).unwrap().ptr_eq(sys.type_type()));
        let o = sys.object().as_value();
        assert!(sys.type_of(&o).unwrap().ptr_eq(sys.type_type()));
    }

    #[test]
    fn independent_systems_do_not_share_types() {
        let one = system();
        let two = system();
        assert!(!one.float_type().ptr_eq(two.float_type()));
        let x = Value::float(1.0);
        assert!(one.type_of(&x).unwrap().ptr_eq(one.float_type()));
        assert!(two.type_of(&x).unwrap().ptr_eq(two.float_type()));
    }

    #[test]
    fn slotted_class_exposes_members() {
        let sys = system();
        let point = sys
            .define_class("Point", &[], Vec::<(&str, Value)>::new(), Some(&["y", "x"][..]))
            .unwrap();
        let p = abstract_api::call(&sys, &point.as_value(), &[], &[]).unwrap();
        assert!(p.instance_dict().is_none(), "slots without __dict__");
        abstract_api::setattr(&sys, &p, "x", &Value::int(3)).unwrap();
        let x = abstract_api::getattr(&sys, &p, "x").unwrap();
        assert_eq!(x.as_int(), Some(3));
        let err = abstract_api::getattr(&sys, &p, "y").unwrap_err();
        assert!(err.is_raised(ExceptionKind::AttributeError));
        let err = abstract_api::setattr(&sys, &p, "z", &Value::int(1)).unwrap_err();
        assert!(err.is_raised(ExceptionKind::AttributeError));
    }

    #[test]
    fn bad_bases_are_type_errors() {
        let sys = system();
        let err = sys
            .define_class("B", &[sys.bool_type().clone()], Vec::<(&str, Value)>::new(), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: type 'bool' is not an acceptable base type");
        let err = sys
            .define_class(
                "C",
                &[sys.int_type().clone(), sys.str_type().clone()],
                Vec::<(&str, Value)>::new(),
                None,
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: multiple bases have instance lay-out conflict"
        );
        let err = sys
            .define_class("D", &[], Vec::<(&str, Value)>::new(), Some(&["1x"][..]))
            .unwrap_err();
        assert!(err.to_string().contains("__slots__ must be identifiers"));
    }

    #[test]
    fn special_method_in_namespace_fills_slot() {
        let sys = system();
        let len = Value::function(crate::Function::new("__len__", |_, _, _| Ok(Value::int(4))));
        let sized = sys.define_class("Sized", &[], [("__len__", len)], None).unwrap();
        assert!(SpecialMethod::Len.is_defined_for(&sized, 0));
        let s = abstract_api::call(&sys, &sized.as_value(), &[], &[]).unwrap();
        assert_eq!(abstract_api::len(&sys, &s).unwrap(), 4);
        assert!(abstract_api::is_true(&sys, &s).unwrap());
    }

    #[test]
    fn dict_assignment() {
        let sys = system();
        let plain = sys
            .define_class("Plain", &[], Vec::<(&str, Value)>::new(), None)
            .unwrap();
        let obj = abstract_api::call(&sys, &plain.as_value(), &[], &[]).unwrap();
        let fresh = Arc::new(Dict::new());
        fresh.insert("k", Value::int(1));
        sys.set_dict(&obj, fresh).unwrap();
        let k = abstract_api::getattr(&sys, &obj, "k").unwrap();
        assert_eq!(k.as_int(), Some(1));

        let err = sys.set_dict(&Value::int(1), Arc::new(Dict::new())).unwrap_err();
        assert!(err.to_string().contains("not supported for 'int' objects"));
    }
}
