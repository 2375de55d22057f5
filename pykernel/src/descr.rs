use std::fmt;
use std::sync::Arc;

use crate::class::{self, NativeClass};
use crate::{
    Data, Feature, InterpreterError, PyError, PyResult, SpecialMethod, Target, Type, TypeRef,
    TypeSpec, TypeSystem, Value, abstract_api,
};

// ── method_descriptor ───────────────────────────────────────────────

/// A special method of a type: one target per class of its owning type.
pub struct MethodDescriptor {
    name: Arc<str>,
    op: Option<SpecialMethod>,
    owner_name: Arc<str>,
    owner_classes: Box<[NativeClass]>,
    targets: Box<[Option<Target>]>,
}

impl MethodDescriptor {
    pub fn new(owner: &Type, op: SpecialMethod, targets: Vec<Option<Target>>) -> Self {
        Self {
            name: Arc::from(op.method_name()),
            op: Some(op),
            owner_name: owner.name().clone(),
            owner_classes: owner.classes().into(),
            targets: targets.into_boxed_slice(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn op(&self) -> Option<SpecialMethod> {
        self.op
    }

    pub fn owner_name(&self) -> &Arc<str> {
        &self.owner_name
    }

    /// Index of the owner's class that `class` is, or else extends.
    /// Methods of `object` apply to every class, including root classes
    /// that do not extend `OBJECT`.
    fn index_for(&self, class: &NativeClass) -> Option<usize> {
        self.owner_classes
            .iter()
            .position(|c| c.ptr_eq(class))
            .or_else(|| self.owner_classes.iter().position(|c| class.is_subclass_of(c)))
            .or_else(|| self.owner_classes.iter().position(|c| c.ptr_eq(&class::OBJECT)))
    }

    /// The target to use for instances of `class`, which may be a class of
    /// a subtype of the owner.
    pub fn target_for(&self, class: &NativeClass) -> Option<Target> {
        self.index_for(class)
            .and_then(|i| self.targets.get(i).cloned().flatten())
    }

    /// Call with `args[0]` as `self`.
    pub fn call(&self, sys: &TypeSystem, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
        let Some(this) = args.first() else {
            return Err(PyError::type_error(format!(
                "descriptor '{}' of '{}' object needs an argument",
                self.name, self.owner_name
            )));
        };
        let target = self.target_for(this.class()).ok_or_else(|| {
            PyError::type_error(format!(
                "descriptor '{}' for '{}' objects doesn't apply to a '{}' object",
                self.name,
                self.owner_name,
                sys.type_name(this)
            ))
        })?;
        target.invoke(sys, args, kwnames).map_err(|e| match e {
            PyError::Argument(arg) => arg.attribute(&self.owner_name, &self.name),
            other => other,
        })
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<method '{}' of '{}' objects>", self.name, self.owner_name)
    }
}

fn method_of(v: &Value) -> PyResult<&Arc<MethodDescriptor>> {
    match v.data() {
        Data::Method(descr) => Ok(descr),
        _ => Err(wrong_self("method_descriptor")),
    }
}

fn wrong_self(expected: &str) -> PyError {
    InterpreterError::Internal(format!("slot of {expected} called on another object")).into()
}

pub(crate) fn method_descriptor_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("method_descriptor")
        .primary(&class::METHOD_DESCRIPTOR)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Get,
            Target::descr_get(|_, descr, instance, _| {
                Ok(match instance {
                    None => descr.clone(),
                    Some(obj) => Value::bound(descr.clone(), obj.clone()),
                })
            }),
        )
        .method(
            SpecialMethod::Call,
            Target::call(|sys, descr, args, kwnames| method_of(descr)?.call(sys, args, kwnames)),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, descr| Ok(Value::str(&format!("{:?}", method_of(descr)?)))),
        )
}

// ── member_descriptor ───────────────────────────────────────────────

/// Access to one named slot field of instances.
pub struct MemberDescriptor {
    name: Arc<str>,
    index: usize,
    owner_name: Arc<str>,
}

impl MemberDescriptor {
    pub fn new(owner: &str, name: &str, index: usize) -> Self {
        Self {
            name: Arc::from(name),
            index,
            owner_name: Arc::from(owner),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    fn check(&self, sys: &TypeSystem, obj: &Value) -> PyResult<()> {
        let layout = obj.class().layout();
        match layout.slots.get(self.index) {
            Some(slot) if *slot == self.name => Ok(()),
            _ => Err(PyError::type_error(format!(
                "descriptor '{}' for '{}' objects doesn't apply to a '{}' object",
                self.name,
                self.owner_name,
                sys.type_name(obj)
            ))),
        }
    }

    pub fn get(&self, sys: &TypeSystem, obj: &Value) -> PyResult<Value> {
        self.check(sys, obj)?;
        obj.slot(self.index).ok_or_else(|| {
            PyError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                sys.type_name(obj),
                self.name
            ))
        })
    }

    pub fn set(&self, sys: &TypeSystem, obj: &Value, value: Option<Value>) -> PyResult<()> {
        self.check(sys, obj)?;
        let deleting = value.is_none();
        let previous = obj
            .set_slot_value(self.index, value)
            .ok_or_else(|| InterpreterError::Internal("slot outside layout".into()))?;
        if deleting && previous.is_none() {
            return Err(PyError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                sys.type_name(obj),
                self.name
            )));
        }
        Ok(())
    }
}

fn member_of(v: &Value) -> PyResult<&Arc<MemberDescriptor>> {
    match v.data() {
        Data::Member(descr) => Ok(descr),
        _ => Err(wrong_self("member_descriptor")),
    }
}

pub(crate) fn member_descriptor_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("member_descriptor")
        .primary(&class::MEMBER_DESCRIPTOR)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Get,
            Target::descr_get(|sys, descr, instance, _| match instance {
                None => Ok(descr.clone()),
                Some(obj) => member_of(descr)?.get(sys, obj),
            }),
        )
        .method(
            SpecialMethod::Set,
            Target::set_item(|sys, descr, obj, value| {
                member_of(descr)?.set(sys, obj, Some(value.clone()))
            }),
        )
        .method(
            SpecialMethod::Delete,
            Target::del_item(|sys, descr, obj| member_of(descr)?.set(sys, obj, None)),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, descr| {
                let m = member_of(descr)?;
                Ok(Value::str(&format!(
                    "<member '{}' of '{}' objects>",
                    m.name, m.owner_name
                )))
            }),
        )
}

// ── getset_descriptor ───────────────────────────────────────────────

pub type Getter = fn(&TypeSystem, &Value) -> PyResult<Value>;
pub type Setter = fn(&TypeSystem, &Value, &Value) -> PyResult<()>;
pub type Deleter = fn(&TypeSystem, &Value) -> PyResult<()>;

/// A computed attribute.
pub struct GetSetDescriptor {
    name: Arc<str>,
    owner_name: Arc<str>,
    getter: Getter,
    setter: Option<Setter>,
    deleter: Option<Deleter>,
}

impl GetSetDescriptor {
    pub fn new(owner: &str, name: &str, getter: Getter) -> Self {
        Self {
            name: Arc::from(name),
            owner_name: Arc::from(owner),
            getter,
            setter: None,
            deleter: None,
        }
    }

    pub fn with_setter(mut self, setter: Setter) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn with_deleter(mut self, deleter: Deleter) -> Self {
        self.deleter = Some(deleter);
        self
    }

    pub fn into_value(self) -> Value {
        Value::new(&class::GETSET_DESCRIPTOR, Data::GetSet(Arc::new(self)))
    }

    fn read_only(&self) -> PyError {
        PyError::attribute_error(format!(
            "attribute '{}' of '{}' objects is not writable",
            self.name, self.owner_name
        ))
    }
}

fn getset_of(v: &Value) -> PyResult<&Arc<GetSetDescriptor>> {
    match v.data() {
        Data::GetSet(descr) => Ok(descr),
        _ => Err(wrong_self("getset_descriptor")),
    }
}

pub(crate) fn getset_descriptor_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("getset_descriptor")
        .primary(&class::GETSET_DESCRIPTOR)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Get,
            Target::descr_get(|sys, descr, instance, _| match instance {
                None => Ok(descr.clone()),
                Some(obj) => (getset_of(descr)?.getter)(sys, obj),
            }),
        )
        .method(
            SpecialMethod::Set,
            Target::set_item(|sys, descr, obj, value| {
                let gs = getset_of(descr)?;
                match gs.setter {
                    Some(set) => set(sys, obj, value),
                    None => Err(gs.read_only()),
                }
            }),
        )
        .method(
            SpecialMethod::Delete,
            Target::del_item(|sys, descr, obj| {
                let gs = getset_of(descr)?;
                match gs.deleter {
                    Some(del) => del(sys, obj),
                    None => Err(gs.read_only()),
                }
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, descr| {
                let gs = getset_of(descr)?;
                Ok(Value::str(&format!(
                    "<attribute '{}' of '{}' objects>",
                    gs.name, gs.owner_name
                )))
            }),
        )
}

// ── functions and bound methods ─────────────────────────────────────

pub type FunctionBody =
    Arc<dyn Fn(&TypeSystem, &[Value], &[Arc<str>]) -> PyResult<Value> + Send + Sync>;

/// A plain callable defined outside any type's specification, such as
/// a method supplied in the namespace of a class statement.
pub struct Function {
    name: Arc<str>,
    body: FunctionBody,
}

impl Function {
    pub fn new(
        name: &str,
        body: impl Fn(&TypeSystem, &[Value], &[Arc<str>]) -> PyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn call(&self, sys: &TypeSystem, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
        (self.body)(sys, args, kwnames)
    }
}

fn function_of(v: &Value) -> PyResult<&Arc<Function>> {
    match v.data() {
        Data::Function(f) => Ok(f),
        _ => Err(wrong_self("function")),
    }
}

pub(crate) fn function_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("function")
        .primary(&class::FUNCTION)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Get,
            Target::descr_get(|_, func, instance, _| {
                Ok(match instance {
                    None => func.clone(),
                    Some(obj) => Value::bound(func.clone(), obj.clone()),
                })
            }),
        )
        .method(
            SpecialMethod::Call,
            Target::call(|sys, func, args, kwnames| function_of(func)?.call(sys, args, kwnames)),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|_, func| {
                Ok(Value::str(&format!("<function {}>", function_of(func)?.name)))
            }),
        )
}

pub(crate) fn bound_method_spec(object: &TypeRef) -> TypeSpec {
    TypeSpec::new("method")
        .primary(&class::BOUND_METHOD)
        .base(object)
        .feature(Feature::IMMUTABLE)
        .method(
            SpecialMethod::Call,
            Target::call(|sys, bound, args, kwnames| {
                let Data::Bound { func, this } = bound.data() else {
                    return Err(wrong_self("method"));
                };
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(this.clone());
                all.extend_from_slice(args);
                abstract_api::call(sys, func, &all, kwnames)
            }),
        )
        .method(
            SpecialMethod::Repr,
            Target::unary(|sys, bound| {
                let Data::Bound { func, this } = bound.data() else {
                    return Err(wrong_self("method"));
                };
                let name = match func.data() {
                    Data::Function(f) => f.name().clone(),
                    Data::Method(m) => m.name().clone(),
                    _ => Arc::from("?"),
                };
                Ok(Value::str(&format!(
                    "<bound method {name} of {}>",
                    abstract_api::repr(sys, this)?
                )))
            }),
        )
}
