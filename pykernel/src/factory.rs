use std::cell::RefCell;
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::ReentrantMutex;

use crate::class::{self, Capabilities, NativeClass};
use crate::{
    Clash, ClashMode, Data, Feature, InterpreterError, MemberDescriptor, MethodDescriptor,
    Representation, SpecialMethod, Target, Type, TypeKind, TypeRef, TypeRegistry, TypeSpec,
    TypeState, Value, mro,
};

/// A type the factory has made but not yet published.
struct Task {
    ty: TypeRef,
    /// `None` for a shell whose specification has not arrived yet.
    spec: Option<TypeSpec>,
    bindings: Vec<(NativeClass, Arc<Representation>)>,
    shell: bool,
    exposed: bool,
}

#[derive(Default)]
struct Workshop {
    depth: usize,
    /// The outermost specification being interpreted.
    outer: Option<Arc<str>>,
    tasks: Vec<Task>,
    /// Bindings found for classes that have no type of their own.
    loose: Vec<(NativeClass, Arc<Representation>)>,
}

impl Workshop {
    fn pending(&self, class: &NativeClass) -> Option<Arc<Representation>> {
        self.tasks
            .iter()
            .flat_map(|task| task.bindings.iter())
            .chain(self.loose.iter())
            .find(|(c, _)| c.ptr_eq(class))
            .map(|(_, rep)| rep.clone())
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth.saturating_sub(1))
    }
}

/// The single authority turning specifications into published types.
///
/// Calls may nest on one thread (a specification may need the
/// representation of a class not yet known). Only the outermost call
/// exposes and publishes what the nested calls made, so a batch of types
/// becomes visible to other threads all at once, or not at all.
pub struct TypeFactory {
    registry: Arc<TypeRegistry>,
    workshop: ReentrantMutex<RefCell<Workshop>>,
    object: TypeRef,
    type_type: TypeRef,
}

impl TypeFactory {
    /// A factory holding unpublished shells of `object` and `type`. Their
    /// specifications complete them later.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let object = Type::new("object", TypeKind::Simple, vec![class::OBJECT.clone()], vec![]);
        object.init_mro(Vec::new());
        object.advance(TypeState::Shell);

        let type_type = Type::new(
            "type",
            TypeKind::Simple,
            vec![class::TYPE.clone()],
            vec![object.clone()],
        );
        type_type.init_mro(vec![object.clone()]);
        type_type.advance(TypeState::Shell);

        let shell = |ty: &TypeRef| {
            let class = ty.canonical_class().clone();
            let rep = Arc::new(Representation::simple(&class, ty.clone()));
            Task {
                ty: ty.clone(),
                spec: None,
                bindings: vec![(class, rep)],
                shell: true,
                exposed: false,
            }
        };
        let workshop = Workshop {
            tasks: vec![shell(&object), shell(&type_type)],
            ..Default::default()
        };

        Self {
            registry,
            workshop: ReentrantMutex::new(RefCell::new(workshop)),
            object,
            type_type,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// `object`, possibly still a shell.
    pub fn object(&self) -> &TypeRef {
        &self.object
    }

    /// `type`, possibly still a shell.
    pub fn type_type(&self) -> &TypeRef {
        &self.type_type
    }

    /// Number of nested factory calls on the current thread.
    pub fn reentrancy(&self) -> usize {
        self.workshop.lock().borrow().depth
    }

    /// Make a type from `spec`. Published on return unless this call is
    /// nested inside another factory call on the same thread.
    pub fn from_spec(&self, spec: TypeSpec) -> Result<TypeRef, InterpreterError> {
        let spec = spec.freeze()?;
        let name = spec.name.clone();
        self.batch(&name, || self.add_partial(spec))
    }

    /// Run `work` as one factory call. The outermost call exposes every
    /// type made inside it and publishes them together; if anything fails
    /// the unpublished work is discarded.
    pub(crate) fn batch<T>(
        &self,
        name: &Arc<str>,
        work: impl FnOnce() -> Result<T, InterpreterError>,
    ) -> Result<T, InterpreterError> {
        let guard = self.workshop.lock();
        let ws: &RefCell<Workshop> = &guard;
        let outermost = {
            let mut w = ws.borrow_mut();
            w.depth += 1;
            if w.depth == 1 {
                w.outer = Some(name.clone());
            }
            w.depth == 1
        };

        let result = work();
        ws.borrow_mut().depth -= 1;
        if !outermost {
            return result;
        }

        let result = result.and_then(|value| {
            self.expose_waiting(ws)?;
            self.publish_all(ws, name)?;
            Ok(value)
        });
        if let Err(err) = &result {
            if let InterpreterError::Clash(clash) = err {
                error!("{clash}");
            }
            Self::discard(ws);
        }
        ws.borrow_mut().outer = None;
        result
    }

    /// Find the representation of a class the registry does not know,
    /// waiting for any other thread's factory work to finish first.
    pub fn find_or_create(&self, class: &NativeClass) -> Result<Arc<Representation>, InterpreterError> {
        let guard = self.workshop.lock();
        let ws: &RefCell<Workshop> = &guard;
        if let Some(rep) = self.registry.lookup(class) {
            return Ok(rep);
        }
        if let Some(rep) = ws.borrow().pending(class) {
            return Ok(rep);
        }
        debug!("{}Finding representation for '{}'", ws.borrow().indent(), class.name());

        let capabilities = class.capabilities();
        if capabilities.contains(Capabilities::EXTENSION_POINT) {
            let rep = Arc::new(Representation::shared(class));
            self.bind(ws, vec![(class.clone(), rep.clone())])?;
            return Ok(rep);
        }

        if capabilities.contains(Capabilities::CRAFTED) {
            let mut between = vec![class.clone()];
            for ancestor in class.ancestors().skip(1) {
                let found = self
                    .registry
                    .lookup(&ancestor)
                    .or_else(|| ws.borrow().pending(&ancestor));
                if let Some(rep) = found {
                    let bindings = between.into_iter().map(|c| (c, rep.clone())).collect();
                    self.bind(ws, bindings)?;
                    return Ok(rep);
                }
                between.push(ancestor);
            }
            return Err(Clash::new(ClashMode::Missing, class.name().clone(), None).into());
        }

        // A native class never registered: it gets a type of its own.
        let spec = TypeSpec::new(class.name())
            .primary(class)
            .base(&self.object);
        self.from_spec(spec)?;
        self.registry
            .lookup(class)
            .or_else(|| ws.borrow().pending(class))
            .ok_or_else(|| {
                InterpreterError::Internal(format!("no representation made for {class}"))
            })
    }

    /// Bindings without a type of their own: published at once outside a
    /// factory call, else with the current batch.
    fn bind(
        &self,
        ws: &RefCell<Workshop>,
        bindings: Vec<(NativeClass, Arc<Representation>)>,
    ) -> Result<(), InterpreterError> {
        let mut w = ws.borrow_mut();
        if w.depth == 0 {
            drop(w);
            self.registry.register_all(&bindings)?;
            for (class, rep) in &bindings {
                debug!("Publishing '{}' -> '{}'", class.name(), rep);
            }
        } else {
            w.loose.extend(bindings);
        }
        Ok(())
    }

    fn add_partial(&self, spec: TypeSpec) -> Result<TypeRef, InterpreterError> {
        let guard = self.workshop.lock();
        let ws: &RefCell<Workshop> = &guard;
        let outer = ws
            .borrow()
            .outer
            .clone()
            .unwrap_or_else(|| spec.name.clone());
        debug!("{}Creating partial type for '{}'", ws.borrow().indent(), spec.name);

        let Some(primary) = spec.primary.clone() else {
            return Err(InterpreterError::Spec {
                spec: spec.name.clone(),
                reason: "no primary class".into(),
            });
        };

        // The specification of a shell completes it.
        {
            let mut w = ws.borrow_mut();
            if let Some(task) = w
                .tasks
                .iter_mut()
                .find(|t| t.spec.is_none() && !t.exposed && t.ty.canonical_class().ptr_eq(&primary))
            {
                task.ty.add_features(spec.features);
                let ty = task.ty.clone();
                task.spec = Some(spec);
                return Ok(ty);
            }
        }

        let bases = if spec.bases.is_empty() {
            vec![self.object.clone()]
        } else {
            spec.bases.clone()
        };
        let tail = mro::calculate(&bases).map_err(|e| InterpreterError::Spec {
            spec: spec.name.clone(),
            reason: e.to_string(),
        })?;
        let bound = |class: &NativeClass| {
            self.registry
                .lookup(class)
                .or_else(|| ws.borrow().pending(class))
        };

        let classes = spec.classes();
        let ty;
        let bindings;
        if spec.features.contains(Feature::REPLACEABLE) {
            let shared = match bound(&primary) {
                Some(rep) if rep.is_shared() => None,
                Some(rep) => {
                    return Err(Clash::new(
                        ClashMode::NotSharable,
                        primary.name().clone(),
                        Some(rep.to_string()),
                    )
                    .in_spec(&outer)
                    .into());
                }
                None => Some(Arc::new(Representation::shared(&primary))),
            };
            ty = Type::new(&spec.name, TypeKind::Replaceable, classes, bases);
            bindings = shared.into_iter().map(|rep| (primary.clone(), rep)).collect();
        } else {
            for class in &classes {
                if let Some(rep) = bound(class) {
                    return Err(Clash::new(
                        ClashMode::Existing,
                        class.name().clone(),
                        Some(rep.to_string()),
                    )
                    .in_spec(&outer)
                    .into());
                }
            }
            let kind = if classes.len() > 1 {
                TypeKind::Adoptive
            } else {
                TypeKind::Simple
            };
            ty = Type::new(&spec.name, kind, classes.clone(), bases);
            bindings = classes
                .iter()
                .enumerate()
                .map(|(index, class)| {
                    let rep = match kind {
                        TypeKind::Adoptive => Representation::adopted(class, index, ty.clone()),
                        _ => Representation::simple(class, ty.clone()),
                    };
                    (class.clone(), Arc::new(rep))
                })
                .collect();
        }
        ty.init_mro(tail);
        ty.add_features(spec.features);

        ws.borrow_mut().tasks.push(Task {
            ty: ty.clone(),
            spec: Some(spec),
            bindings,
            shell: false,
            exposed: false,
        });
        Ok(ty)
    }

    /// Complete every type whose specification has arrived, in the order
    /// the types were made.
    fn expose_waiting(&self, ws: &RefCell<Workshop>) -> Result<(), InterpreterError> {
        loop {
            let next = {
                let mut w = ws.borrow_mut();
                w.tasks
                    .iter_mut()
                    .find(|t| !t.exposed && t.spec.is_some())
                    .map(|t| {
                        t.exposed = true;
                        (t.ty.clone(), t.spec.take())
                    })
            };
            match next {
                Some((ty, Some(spec))) => Self::expose(&ty, spec)?,
                _ => return Ok(()),
            }
        }
    }

    /// Fill the dictionary of `ty` from `spec` and compute its slots.
    fn expose(ty: &TypeRef, spec: TypeSpec) -> Result<(), InterpreterError> {
        if let Some(doc) = spec.doc {
            ty.set_doc(doc);
        }
        if let Some(new) = spec.constructor {
            ty.set_constructor(new);
        }

        let width = ty.classes().len();
        let mut grouped: Vec<(SpecialMethod, Vec<Option<Target>>)> = Vec::new();
        for (op, index, target) in spec.methods {
            match grouped.iter_mut().find(|(o, _)| *o == op) {
                Some((_, targets)) => targets[index] = Some(target),
                None => {
                    let mut targets = vec![None; width];
                    targets[index] = Some(target);
                    grouped.push((op, targets));
                }
            }
        }
        for (op, targets) in grouped {
            let descr = MethodDescriptor::new(ty, op, targets);
            ty.dict().insert(
                op.method_name(),
                Value::new(&class::METHOD_DESCRIPTOR, Data::Method(Arc::new(descr))),
            );
        }

        let layout = ty.canonical_class().layout();
        for member in spec.members {
            let index = layout.slot_index(&member).ok_or_else(|| InterpreterError::Spec {
                spec: spec.name.clone(),
                reason: format!("no slot '{member}'"),
            })?;
            let descr = MemberDescriptor::new(ty.name(), &member, index);
            ty.dict().insert(
                member,
                Value::new(&class::MEMBER_DESCRIPTOR, Data::Member(Arc::new(descr))),
            );
        }

        for (name, value) in spec.attrs {
            ty.dict().insert(name, value);
        }

        ty.update_all_slots();
        ty.advance(TypeState::Complete);
        // Subtypes completed before this type saw an empty dictionary here.
        for sub in ty.all_subclasses() {
            if sub.state() >= TypeState::Complete {
                sub.refresh_all_slots();
            }
        }
        Ok(())
    }

    /// Register everything exposed so far in one step.
    fn publish_all(&self, ws: &RefCell<Workshop>, outer: &Arc<str>) -> Result<(), InterpreterError> {
        let (bindings, types, remaining) = {
            let mut w = ws.borrow_mut();
            let mut bindings = std::mem::take(&mut w.loose);
            let mut types = Vec::new();
            w.tasks.retain(|task| {
                if task.exposed {
                    bindings.extend(task.bindings.iter().cloned());
                    types.push(task.ty.clone());
                    false
                } else {
                    true
                }
            });
            (bindings, types, w.tasks.len())
        };

        self.registry
            .register_all(&bindings)
            .map_err(|clash| clash.in_spec(outer))?;
        for ty in &types {
            ty.advance(TypeState::Published);
        }
        for (class, rep) in &bindings {
            debug!("Publishing '{}' -> '{}'", class.name(), rep);
        }
        if remaining > 0 {
            warn!("Type '{outer}' finished but {remaining} tasks in factory.");
        }
        Ok(())
    }

    /// Drop unpublished work. Discarded types are unlinked from their
    /// bases so no later change to a base reaches them.
    fn discard(ws: &RefCell<Workshop>) {
        let mut w = ws.borrow_mut();
        w.loose.clear();
        w.tasks.retain(|task| {
            let keep = task.shell && !task.exposed;
            if !keep {
                debug!("Discarding unpublished type '{}'", task.ty.name());
                task.ty.unlink();
            }
            keep
        });
        for task in &mut w.tasks {
            task.spec = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClashMode, SpecialMethod};

    fn factory() -> TypeFactory {
        TypeFactory::new(Arc::new(TypeRegistry::new(16)))
    }

    #[test]
    fn greeter_on_bare_object_has_empty_slots() {
        let factory = factory();
        let greeter_class =
            NativeClass::derive("Greeter", &class::OBJECT, Capabilities::empty(), &[]);
        let greeter = factory
            .from_spec(TypeSpec::new("Greeter").primary(&greeter_class).base(factory.object()))
            .unwrap();

        let mro = greeter.mro();
        let names: Vec<&str> = mro.iter().map(|t| &**t.name()).collect();
        assert_eq!(names, ["Greeter", "object"]);
        for &op in SpecialMethod::ALL {
            assert!(greeter.slots().is_empty(op), "{op} should be empty");
        }
        assert_eq!(greeter.state(), TypeState::Published);
        assert_eq!(factory.object().state(), TypeState::Shell, "shell not completed yet");
        assert!(factory.registry().lookup(&greeter_class).is_some());
        assert!(
            factory.registry().lookup(&class::OBJECT).is_none(),
            "shells are not published before their specification arrives"
        );
    }

    #[test]
    fn nested_calls_publish_together() {
        let factory = factory();
        let a = NativeClass::root("A", Capabilities::empty());
        let b = NativeClass::root("B", Capabilities::empty());
        let name: Arc<str> = Arc::from("batch");
        factory
            .batch(&name, || {
                let ta = factory.from_spec(TypeSpec::new("A").primary(&a))?;
                assert_eq!(factory.reentrancy(), 1);
                assert_ne!(ta.state(), TypeState::Published, "nested call must not publish");
                assert!(factory.registry().lookup(&a).is_none());
                assert!(factory.find_or_create(&a).is_ok(), "pending work is visible here");
                factory.from_spec(TypeSpec::new("B").primary(&b).base(&ta))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(factory.reentrancy(), 0);
        assert!(factory.registry().lookup(&a).is_some());
        assert!(factory.registry().lookup(&b).is_some());
    }

    #[test]
    fn clash_discards_the_batch() {
        let factory = factory();
        let a = NativeClass::root("A", Capabilities::empty());
        let b = NativeClass::root("B", Capabilities::empty());
        let name: Arc<str> = Arc::from("outer");
        let err = factory
            .batch(&name, || {
                factory.from_spec(TypeSpec::new("B").primary(&b))?;
                factory.from_spec(TypeSpec::new("A1").primary(&a))?;
                factory.from_spec(TypeSpec::new("A2").primary(&a))
            })
            .unwrap_err();
        match err {
            InterpreterError::Clash(clash) => {
                assert_eq!(clash.mode, ClashMode::Existing);
                assert_eq!(clash.spec.as_deref(), Some("outer"));
            }
            other => panic!("expected clash, got {other}"),
        }
        assert!(factory.registry().lookup(&b).is_none(), "B discarded with the batch");
    }

    #[test]
    fn discarded_types_leave_their_bases() {
        let factory = factory();
        let base_class = NativeClass::root("Base", Capabilities::empty());
        let base = factory.from_spec(TypeSpec::new("Base").primary(&base_class)).unwrap();
        let sub_class = NativeClass::derive("Sub", &base_class, Capabilities::empty(), &[]);
        let a = NativeClass::root("A", Capabilities::empty());
        let name: Arc<str> = Arc::from("outer");
        let err = factory.batch(&name, || {
            let sub = factory.from_spec(TypeSpec::new("Sub").primary(&sub_class).base(&base))?;
            assert_eq!(base.subclasses().len(), 1);
            assert!(base.subclasses()[0].ptr_eq(&sub));
            factory.from_spec(TypeSpec::new("A1").primary(&a))?;
            factory.from_spec(TypeSpec::new("A2").primary(&a))
        });
        assert!(err.is_err());
        assert!(base.subclasses().is_empty(), "no subtype left behind by the clash");

        let sub = factory
            .from_spec(TypeSpec::new("Sub").primary(&sub_class).base(&base))
            .unwrap();
        assert_eq!(base.subclasses().len(), 1);
        assert!(base.subclasses()[0].ptr_eq(&sub));
    }

    #[test]
    fn replaceable_needs_shareable_class() {
        let factory = factory();
        let simple = NativeClass::root("S", Capabilities::empty());
        factory.from_spec(TypeSpec::new("S").primary(&simple)).unwrap();
        let err = factory
            .from_spec(
                TypeSpec::new("R")
                    .primary(&simple)
                    .feature(Feature::REPLACEABLE),
            )
            .unwrap_err();
        assert!(
            matches!(&err, InterpreterError::Clash(c) if c.mode == ClashMode::NotSharable),
            "{err}"
        );
    }

    #[test]
    fn replaceable_types_share_one_representation() {
        let factory = factory();
        let shared = NativeClass::root("Shared", Capabilities::TYPE_ASSIGNMENT);
        let one = factory
            .from_spec(TypeSpec::new("One").primary(&shared).feature(Feature::REPLACEABLE))
            .unwrap();
        let first = factory.registry().lookup(&shared).unwrap();
        let two = factory
            .from_spec(
                TypeSpec::new("Two")
                    .primary(&shared)
                    .base(&one)
                    .feature(Feature::REPLACEABLE),
            )
            .unwrap();
        let second = factory.registry().lookup(&shared).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_shared());
        assert_eq!(two.kind(), TypeKind::Replaceable);
    }

    #[test]
    fn discovery_follows_capabilities() {
        let factory = factory();
        let point = NativeClass::root("Point", Capabilities::empty());
        let rep = factory.find_or_create(&point).unwrap();
        let ty = rep.static_type().unwrap();
        assert_eq!(&**ty.name(), "Point");
        assert_eq!(ty.kind(), TypeKind::Simple);

        let ext = NativeClass::root("Ext", Capabilities::EXTENSION_POINT);
        assert!(factory.find_or_create(&ext).unwrap().is_shared());

        let crafted = NativeClass::derive("Ext$1", &ext, Capabilities::CRAFTED, &[]);
        let deeper = NativeClass::derive("Ext$2", &crafted, Capabilities::CRAFTED, &[]);
        let found = factory.find_or_create(&deeper).unwrap();
        assert!(Arc::ptr_eq(&found, &factory.registry().lookup(&ext).unwrap()));
        assert!(factory.registry().lookup(&crafted).is_some(), "intermediate cached");

        let orphan = NativeClass::root("Orphan", Capabilities::CRAFTED);
        let err = factory.find_or_create(&orphan).unwrap_err();
        assert!(matches!(err, InterpreterError::Clash(c) if c.mode == ClashMode::Missing));
    }
}
