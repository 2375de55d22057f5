use std::fmt;
use std::sync::{Arc, LazyLock};

use ahash::AHashMap;
use arc_swap::ArcSwap;

use crate::{
    ArgumentError, InterpreterError, KernelFlags, PyError, PyResult, Type, TypeRef, TypeSystem,
    Value, abstract_api,
};

/// The calling shape a slot target must have.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    /// `(self) -> object`
    Unary,
    /// `(self, other) -> object`
    Binary,
    /// `(self, other, modulo) -> object`
    Ternary,
    /// `(self, *args, **kwargs) -> object`
    Call,
    /// `(self) -> bool`
    Predicate,
    /// `(self, other) -> bool`
    BinaryPredicate,
    /// `(self) -> usize`
    Len,
    /// `(self, key, value)`
    SetItem,
    /// `(self, key)`
    DelItem,
    /// `(self, name) -> object`
    GetAttr,
    /// `(self, name, value)`
    SetAttr,
    /// `(self, name)`
    DelAttr,
    /// `(self, instance, owner) -> object`
    DescrGet,
    /// `(self, *args, **kwargs)`
    Init,
}

impl Signature {
    /// Number of positional arguments, including `self`, or `None` when
    /// variadic.
    pub fn arity(self) -> Option<usize> {
        match self {
            Self::Unary | Self::Predicate | Self::Len => Some(1),
            Self::Binary
            | Self::BinaryPredicate
            | Self::DelItem
            | Self::GetAttr
            | Self::DelAttr => Some(2),
            Self::Ternary | Self::SetItem | Self::SetAttr | Self::DescrGet => Some(3),
            Self::Call | Self::Init => None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unary => "UNARY",
            Self::Binary => "BINARY",
            Self::Ternary => "TERNARY",
            Self::Call => "CALL",
            Self::Predicate => "PREDICATE",
            Self::BinaryPredicate => "BINARY_PREDICATE",
            Self::Len => "LEN",
            Self::SetItem => "SETITEM",
            Self::DelItem => "DELITEM",
            Self::GetAttr => "GETATTR",
            Self::SetAttr => "SETATTR",
            Self::DelAttr => "DELATTR",
            Self::DescrGet => "DESCRGET",
            Self::Init => "INIT",
        };
        f.write_str(name)
    }
}

macro_rules! special_methods {
    ($($variant:ident($dunder:literal, $sig:ident $(, op = $op:literal)? $(, alt = $alt:ident)?);)*) => {
        /// The operations of the data model that a type implements through
        /// dispatch slots.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum SpecialMethod {
            $($variant,)*
        }

        impl SpecialMethod {
            pub const ALL: &'static [SpecialMethod] = &[$(SpecialMethod::$variant,)*];

            pub const COUNT: usize = Self::ALL.len();

            /// The attribute name under which the operation is defined.
            pub fn method_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $dunder,)*
                }
            }

            pub fn signature(self) -> Signature {
                match self {
                    $(Self::$variant => Signature::$sig,)*
                }
            }

            /// The operator symbol used in error messages.
            pub fn operator(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => special_methods!(@opt $($op)?),)*
                }
            }

            /// The reflected form of a binary operation.
            pub fn alt(self) -> Option<SpecialMethod> {
                match self {
                    $(Self::$variant => special_methods!(@alt $($alt)?),)*
                }
            }
        }
    };
    (@opt) => { None };
    (@opt $op:literal) => { Some($op) };
    (@alt) => { None };
    (@alt $alt:ident) => { Some(SpecialMethod::$alt) };
}

special_methods! {
    Repr("__repr__", Unary);
    Hash("__hash__", Len);
    Call("__call__", Call);
    Str("__str__", Unary);

    GetAttribute("__getattribute__", GetAttr);
    GetAttr("__getattr__", GetAttr);
    SetAttr("__setattr__", SetAttr);
    DelAttr("__delattr__", DelAttr);

    Lt("__lt__", Binary, op = "<", alt = Gt);
    Le("__le__", Binary, op = "<=", alt = Ge);
    Eq("__eq__", Binary, op = "==", alt = Eq);
    Ne("__ne__", Binary, op = "!=", alt = Ne);
    Gt("__gt__", Binary, op = ">", alt = Lt);
    Ge("__ge__", Binary, op = ">=", alt = Le);

    Iter("__iter__", Unary);
    Next("__next__", Unary);

    Get("__get__", DescrGet);
    Set("__set__", SetItem);
    Delete("__delete__", DelItem);

    Init("__init__", Init);

    Radd("__radd__", Binary, op = "+", alt = Add);
    Rsub("__rsub__", Binary, op = "-", alt = Sub);
    Rmul("__rmul__", Binary, op = "*", alt = Mul);
    Rmod("__rmod__", Binary, op = "%", alt = Mod);
    Rdivmod("__rdivmod__", Binary, op = "divmod()", alt = Divmod);
    Rpow("__rpow__", Binary, op = "**", alt = Pow);
    Rlshift("__rlshift__", Binary, op = "<<", alt = Lshift);
    Rrshift("__rrshift__", Binary, op = ">>", alt = Rshift);
    Rand("__rand__", Binary, op = "&", alt = And);
    Rxor("__rxor__", Binary, op = "^", alt = Xor);
    Ror("__ror__", Binary, op = "|", alt = Or);
    Rfloordiv("__rfloordiv__", Binary, op = "//", alt = Floordiv);
    Rtruediv("__rtruediv__", Binary, op = "/", alt = Truediv);
    Rmatmul("__rmatmul__", Binary, op = "@", alt = Matmul);

    Add("__add__", Binary, op = "+", alt = Radd);
    Sub("__sub__", Binary, op = "-", alt = Rsub);
    Mul("__mul__", Binary, op = "*", alt = Rmul);
    Mod("__mod__", Binary, op = "%", alt = Rmod);
    Divmod("__divmod__", Binary, op = "divmod()", alt = Rdivmod);
    Pow("__pow__", Ternary, op = "**", alt = Rpow);
    Lshift("__lshift__", Binary, op = "<<", alt = Rlshift);
    Rshift("__rshift__", Binary, op = ">>", alt = Rrshift);
    And("__and__", Binary, op = "&", alt = Rand);
    Xor("__xor__", Binary, op = "^", alt = Rxor);
    Or("__or__", Binary, op = "|", alt = Ror);
    Floordiv("__floordiv__", Binary, op = "//", alt = Rfloordiv);
    Truediv("__truediv__", Binary, op = "/", alt = Rtruediv);
    Matmul("__matmul__", Binary, op = "@", alt = Rmatmul);

    Neg("__neg__", Unary, op = "unary -");
    Pos("__pos__", Unary, op = "unary +");
    Abs("__abs__", Unary, op = "abs()");
    Bool("__bool__", Predicate);
    Invert("__invert__", Unary, op = "unary ~");
    Int("__int__", Unary);
    Float("__float__", Unary);
    Index("__index__", Unary);

    Iadd("__iadd__", Binary, op = "+=");
    Isub("__isub__", Binary, op = "-=");
    Imul("__imul__", Binary, op = "*=");
    Imod("__imod__", Binary, op = "%=");
    Iand("__iand__", Binary, op = "&=");
    Ixor("__ixor__", Binary, op = "^=");
    Ior("__ior__", Binary, op = "|=");
    Ifloordiv("__ifloordiv__", Binary, op = "//=");
    Itruediv("__itruediv__", Binary, op = "/=");
    Imatmul("__imatmul__", Binary, op = "@=");

    Len("__len__", Len);
    GetItem("__getitem__", Binary);
    SetItem("__setitem__", SetItem);
    DelItem("__delitem__", DelItem);
    Contains("__contains__", BinaryPredicate);
}

static BY_NAME: LazyLock<AHashMap<&'static str, SpecialMethod>> = LazyLock::new(|| {
    SpecialMethod::ALL
        .iter()
        .map(|&op| (op.method_name(), op))
        .collect()
});

impl SpecialMethod {
    /// The operation defined by an attribute of this name, if any.
    pub fn for_method_name(name: &str) -> Option<SpecialMethod> {
        BY_NAME.get(name).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kernel flag kept in step with this slot.
    pub fn kernel_flag(self) -> Option<KernelFlags> {
        match self {
            Self::GetItem => Some(KernelFlags::HAS_GETITEM),
            Self::Iter => Some(KernelFlags::HAS_ITER),
            Self::Next => Some(KernelFlags::HAS_NEXT),
            Self::Index => Some(KernelFlags::HAS_INDEX),
            Self::Get => Some(KernelFlags::HAS_GET),
            Self::Set => Some(KernelFlags::HAS_SET),
            Self::Delete => Some(KernelFlags::HAS_DELETE),
            _ => None,
        }
    }

    /// Reject `target` unless its calling shape is exactly this slot's.
    pub fn check_target(self, target: &Target) -> Result<(), InterpreterError> {
        if target.signature() == self.signature() {
            Ok(())
        } else {
            Err(self.shape_error(target))
        }
    }

    fn shape_error(self, target: &Target) -> InterpreterError {
        InterpreterError::SlotShape {
            slot: self,
            required: self.signature(),
            target: target.signature(),
        }
    }

    /// Whether `ty` has a target in this slot for representation `index`.
    pub fn is_defined_for(self, ty: &Type, index: usize) -> bool {
        ty.slots().get(self, index).is_some()
    }

    /// The target in this slot, or the empty-slot signal.
    pub fn handle(self, ty: &Type, index: usize) -> PyResult<Target> {
        ty.slots().get(self, index).ok_or(PyError::Empty(self))
    }

    /// `unsupported operand type(s)` error for a binary operation.
    pub fn operand_error(self, v: &str, w: &str) -> PyError {
        let op = self.operator().unwrap_or(self.method_name());
        PyError::type_error(format!(
            "unsupported operand type(s) for {op}: '{:.100}' and '{:.100}'",
            v, w
        ))
    }

    /// `bad operand type` error for a unary operation.
    pub fn unary_operand_error(self, v: &str) -> PyError {
        let op = self.operator().unwrap_or(self.method_name());
        PyError::type_error(format!("bad operand type for {op}: '{v:.200}'"))
    }

    // ── Invocation by calling shape ────────────────────────────────

    pub fn call_unary(self, sys: &TypeSystem, ty: &Type, index: usize, v: &Value) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::Unary(f) => f(sys, v),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_binary(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        w: &Value,
    ) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::Binary(f) => f(sys, v, w),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_ternary(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        w: &Value,
        z: &Value,
    ) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::Ternary(f) => f(sys, v, w, z),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_predicate(self, sys: &TypeSystem, ty: &Type, index: usize, v: &Value) -> PyResult<bool> {
        match self.handle(ty, index)? {
            Target::Predicate(f) => f(sys, v),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_binary_predicate(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        w: &Value,
    ) -> PyResult<bool> {
        match self.handle(ty, index)? {
            Target::BinaryPredicate(f) => f(sys, v, w),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_len(self, sys: &TypeSystem, ty: &Type, index: usize, v: &Value) -> PyResult<usize> {
        match self.handle(ty, index)? {
            Target::Len(f) => f(sys, v),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_set_item(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        key: &Value,
        value: &Value,
    ) -> PyResult<()> {
        match self.handle(ty, index)? {
            Target::SetItem(f) => f(sys, v, key, value),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_del_item(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        key: &Value,
    ) -> PyResult<()> {
        match self.handle(ty, index)? {
            Target::DelItem(f) => f(sys, v, key),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_getattr(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        name: &str,
    ) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::GetAttr(f) => f(sys, v, name),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_setattr(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        name: &str,
        value: &Value,
    ) -> PyResult<()> {
        match self.handle(ty, index)? {
            Target::SetAttr(f) => f(sys, v, name, value),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_delattr(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        name: &str,
    ) -> PyResult<()> {
        match self.handle(ty, index)? {
            Target::DelAttr(f) => f(sys, v, name),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_descr_get(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        descr: &Value,
        instance: Option<&Value>,
        owner: Option<&TypeRef>,
    ) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::DescrGet(f) => f(sys, descr, instance, owner),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_call(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        args: &[Value],
        kwnames: &[Arc<str>],
    ) -> PyResult<Value> {
        match self.handle(ty, index)? {
            Target::Call(f) => f(sys, v, args, kwnames),
            other => Err(self.shape_error(&other).into()),
        }
    }

    pub fn call_init(
        self,
        sys: &TypeSystem,
        ty: &Type,
        index: usize,
        v: &Value,
        args: &[Value],
        kwnames: &[Arc<str>],
    ) -> PyResult<()> {
        match self.handle(ty, index)? {
            Target::Init(f) => f(sys, v, args, kwnames),
            other => Err(self.shape_error(&other).into()),
        }
    }
}

impl fmt::Display for SpecialMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

// ── Targets ─────────────────────────────────────────────────────────

pub type UnaryFn = Arc<dyn Fn(&TypeSystem, &Value) -> PyResult<Value> + Send + Sync>;
pub type BinaryFn = Arc<dyn Fn(&TypeSystem, &Value, &Value) -> PyResult<Value> + Send + Sync>;
pub type TernaryFn =
    Arc<dyn Fn(&TypeSystem, &Value, &Value, &Value) -> PyResult<Value> + Send + Sync>;
pub type CallFn =
    Arc<dyn Fn(&TypeSystem, &Value, &[Value], &[Arc<str>]) -> PyResult<Value> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&TypeSystem, &Value) -> PyResult<bool> + Send + Sync>;
pub type BinaryPredicateFn =
    Arc<dyn Fn(&TypeSystem, &Value, &Value) -> PyResult<bool> + Send + Sync>;
pub type LenFn = Arc<dyn Fn(&TypeSystem, &Value) -> PyResult<usize> + Send + Sync>;
pub type SetItemFn = Arc<dyn Fn(&TypeSystem, &Value, &Value, &Value) -> PyResult<()> + Send + Sync>;
pub type DelItemFn = Arc<dyn Fn(&TypeSystem, &Value, &Value) -> PyResult<()> + Send + Sync>;
pub type GetAttrFn = Arc<dyn Fn(&TypeSystem, &Value, &str) -> PyResult<Value> + Send + Sync>;
pub type SetAttrFn = Arc<dyn Fn(&TypeSystem, &Value, &str, &Value) -> PyResult<()> + Send + Sync>;
pub type DelAttrFn = Arc<dyn Fn(&TypeSystem, &Value, &str) -> PyResult<()> + Send + Sync>;
pub type DescrGetFn = Arc<
    dyn Fn(&TypeSystem, &Value, Option<&Value>, Option<&TypeRef>) -> PyResult<Value> + Send + Sync,
>;
pub type InitFn =
    Arc<dyn Fn(&TypeSystem, &Value, &[Value], &[Arc<str>]) -> PyResult<()> + Send + Sync>;

/// A directly invokable implementation of one operation, tagged with its
/// calling shape.
#[derive(Clone)]
pub enum Target {
    Unary(UnaryFn),
    Binary(BinaryFn),
    Ternary(TernaryFn),
    Call(CallFn),
    Predicate(PredicateFn),
    BinaryPredicate(BinaryPredicateFn),
    Len(LenFn),
    SetItem(SetItemFn),
    DelItem(DelItemFn),
    GetAttr(GetAttrFn),
    SetAttr(SetAttrFn),
    DelAttr(DelAttrFn),
    DescrGet(DescrGetFn),
    Init(InitFn),
}

impl Target {
    pub fn unary(f: impl Fn(&TypeSystem, &Value) -> PyResult<Value> + Send + Sync + 'static) -> Self {
        Self::Unary(Arc::new(f))
    }

    pub fn binary(
        f: impl Fn(&TypeSystem, &Value, &Value) -> PyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::Binary(Arc::new(f))
    }

    pub fn ternary(
        f: impl Fn(&TypeSystem, &Value, &Value, &Value) -> PyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::Ternary(Arc::new(f))
    }

    pub fn call(
        f: impl Fn(&TypeSystem, &Value, &[Value], &[Arc<str>]) -> PyResult<Value>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Call(Arc::new(f))
    }

    pub fn predicate(
        f: impl Fn(&TypeSystem, &Value) -> PyResult<bool> + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn binary_predicate(
        f: impl Fn(&TypeSystem, &Value, &Value) -> PyResult<bool> + Send + Sync + 'static,
    ) -> Self {
        Self::BinaryPredicate(Arc::new(f))
    }

    pub fn len(f: impl Fn(&TypeSystem, &Value) -> PyResult<usize> + Send + Sync + 'static) -> Self {
        Self::Len(Arc::new(f))
    }

    pub fn set_item(
        f: impl Fn(&TypeSystem, &Value, &Value, &Value) -> PyResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::SetItem(Arc::new(f))
    }

    pub fn del_item(
        f: impl Fn(&TypeSystem, &Value, &Value) -> PyResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::DelItem(Arc::new(f))
    }

    pub fn getattr(
        f: impl Fn(&TypeSystem, &Value, &str) -> PyResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::GetAttr(Arc::new(f))
    }

    pub fn setattr(
        f: impl Fn(&TypeSystem, &Value, &str, &Value) -> PyResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::SetAttr(Arc::new(f))
    }

    pub fn delattr(
        f: impl Fn(&TypeSystem, &Value, &str) -> PyResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self::DelAttr(Arc::new(f))
    }

    pub fn descr_get(
        f: impl Fn(&TypeSystem, &Value, Option<&Value>, Option<&TypeRef>) -> PyResult<Value>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::DescrGet(Arc::new(f))
    }

    pub fn init(
        f: impl Fn(&TypeSystem, &Value, &[Value], &[Arc<str>]) -> PyResult<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Init(Arc::new(f))
    }

    pub fn signature(&self) -> Signature {
        match self {
            Self::Unary(_) => Signature::Unary,
            Self::Binary(_) => Signature::Binary,
            Self::Ternary(_) => Signature::Ternary,
            Self::Call(_) => Signature::Call,
            Self::Predicate(_) => Signature::Predicate,
            Self::BinaryPredicate(_) => Signature::BinaryPredicate,
            Self::Len(_) => Signature::Len,
            Self::SetItem(_) => Signature::SetItem,
            Self::DelItem(_) => Signature::DelItem,
            Self::GetAttr(_) => Signature::GetAttr,
            Self::SetAttr(_) => Signature::SetAttr,
            Self::DelAttr(_) => Signature::DelAttr,
            Self::DescrGet(_) => Signature::DescrGet,
            Self::Init(_) => Signature::Init,
        }
    }

    /// True if both are the same implementation.
    pub fn same_as(&self, other: &Target) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        let (a, b) = match (self, other) {
            (Self::Unary(a), Self::Unary(b)) => (addr(a), addr(b)),
            (Self::Binary(a), Self::Binary(b)) => (addr(a), addr(b)),
            (Self::Ternary(a), Self::Ternary(b)) => (addr(a), addr(b)),
            (Self::Call(a), Self::Call(b)) => (addr(a), addr(b)),
            (Self::Predicate(a), Self::Predicate(b)) => (addr(a), addr(b)),
            (Self::BinaryPredicate(a), Self::BinaryPredicate(b)) => (addr(a), addr(b)),
            (Self::Len(a), Self::Len(b)) => (addr(a), addr(b)),
            (Self::SetItem(a), Self::SetItem(b)) => (addr(a), addr(b)),
            (Self::DelItem(a), Self::DelItem(b)) => (addr(a), addr(b)),
            (Self::GetAttr(a), Self::GetAttr(b)) => (addr(a), addr(b)),
            (Self::SetAttr(a), Self::SetAttr(b)) => (addr(a), addr(b)),
            (Self::DelAttr(a), Self::DelAttr(b)) => (addr(a), addr(b)),
            (Self::DescrGet(a), Self::DescrGet(b)) => (addr(a), addr(b)),
            (Self::Init(a), Self::Init(b)) => (addr(a), addr(b)),
            _ => return false,
        };
        std::ptr::eq(a, b)
    }

    /// Invoke with a flat argument vector (`args[0]` is `self`), checking
    /// the vector against the calling shape first.
    pub fn invoke(&self, sys: &TypeSystem, args: &[Value], kwnames: &[Arc<str>]) -> PyResult<Value> {
        let signature = self.signature();
        if args.is_empty() {
            return Err(ArgumentError::Count {
                expected: signature.arity().unwrap_or(1),
                given: 0,
            }
            .into());
        }
        if let Some(arity) = signature.arity() {
            ArgumentError::check_no_keywords(kwnames)?;
            // `self` is not counted in the message
            ArgumentError::check_count(args.len() - 1, arity - 1)?;
        }
        let none = Value::none();
        match self {
            Self::Unary(f) => f(sys, &args[0]),
            Self::Binary(f) => f(sys, &args[0], &args[1]),
            Self::Ternary(f) => f(sys, &args[0], &args[1], &args[2]),
            Self::Call(f) => f(sys, &args[0], &args[1..], kwnames),
            Self::Predicate(f) => f(sys, &args[0]).map(Value::bool),
            Self::BinaryPredicate(f) => f(sys, &args[0], &args[1]).map(Value::bool),
            Self::Len(f) => f(sys, &args[0]).and_then(int_value),
            Self::SetItem(f) => f(sys, &args[0], &args[1], &args[2]).map(|()| none),
            Self::DelItem(f) => f(sys, &args[0], &args[1]).map(|()| none),
            Self::GetAttr(f) => f(sys, &args[0], name_arg(sys, args, 1)?),
            Self::SetAttr(f) => f(sys, &args[0], name_arg(sys, args, 1)?, &args[2]).map(|()| none),
            Self::DelAttr(f) => f(sys, &args[0], name_arg(sys, args, 1)?).map(|()| none),
            Self::DescrGet(f) => {
                let instance = (!args[1].is_none()).then_some(&args[1]);
                let owner = args[2].as_type();
                f(sys, &args[0], instance, owner)
            }
            Self::Init(f) => f(sys, &args[0], &args[1..], kwnames).map(|()| none),
        }
    }

    /// A target of the shape `op` requires that calls `callable` with the
    /// slot's arguments. Used when a type defines the operation by a plain
    /// attribute rather than a method descriptor.
    pub fn wrapping(op: SpecialMethod, callable: Value) -> Self {
        let f = callable;
        match op.signature() {
            Signature::Unary => Self::unary(move |sys, v| abstract_api::call(sys, &f, &[v.clone()], &[])),
            Signature::Binary => Self::binary(move |sys, v, w| {
                abstract_api::call(sys, &f, &[v.clone(), w.clone()], &[])
            }),
            Signature::Ternary => Self::ternary(move |sys, v, w, z| {
                abstract_api::call(sys, &f, &[v.clone(), w.clone(), z.clone()], &[])
            }),
            Signature::Call => Self::call(move |sys, v, args, kwnames| {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(v.clone());
                all.extend_from_slice(args);
                abstract_api::call(sys, &f, &all, kwnames)
            }),
            Signature::Predicate => Self::predicate(move |sys, v| {
                let r = abstract_api::call(sys, &f, &[v.clone()], &[])?;
                abstract_api::is_true(sys, &r)
            }),
            Signature::BinaryPredicate => Self::binary_predicate(move |sys, v, w| {
                let r = abstract_api::call(sys, &f, &[v.clone(), w.clone()], &[])?;
                abstract_api::is_true(sys, &r)
            }),
            Signature::Len => Self::len(move |sys, v| {
                let r = abstract_api::call(sys, &f, &[v.clone()], &[])?;
                match r.as_int() {
                    Some(n) if n >= 0 => Ok(n as usize),
                    Some(_) => Err(PyError::value_error("__len__() should return >= 0")),
                    None => Err(PyError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        sys.type_name(&r)
                    ))),
                }
            }),
            Signature::SetItem => Self::set_item(move |sys, v, k, x| {
                abstract_api::call(sys, &f, &[v.clone(), k.clone(), x.clone()], &[]).map(drop)
            }),
            Signature::DelItem => Self::del_item(move |sys, v, k| {
                abstract_api::call(sys, &f, &[v.clone(), k.clone()], &[]).map(drop)
            }),
            Signature::GetAttr => Self::getattr(move |sys, v, name| {
                abstract_api::call(sys, &f, &[v.clone(), Value::str(name)], &[])
            }),
            Signature::SetAttr => Self::setattr(move |sys, v, name, x| {
                abstract_api::call(sys, &f, &[v.clone(), Value::str(name), x.clone()], &[]).map(drop)
            }),
            Signature::DelAttr => Self::delattr(move |sys, v, name| {
                abstract_api::call(sys, &f, &[v.clone(), Value::str(name)], &[]).map(drop)
            }),
            Signature::DescrGet => Self::descr_get(move |sys, descr, instance, owner| {
                let instance = instance.cloned().unwrap_or_else(Value::none);
                let owner = owner.map(|t| t.as_value()).unwrap_or_else(Value::none);
                abstract_api::call(sys, &f, &[descr.clone(), instance, owner], &[])
            }),
            Signature::Init => Self::init(move |sys, v, args, kwnames| {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(v.clone());
                all.extend_from_slice(args);
                let r = abstract_api::call(sys, &f, &all, kwnames)?;
                if r.is_none() {
                    Ok(())
                } else {
                    Err(PyError::type_error(format!(
                        "__init__() should return None, not '{}'",
                        sys.type_name(&r)
                    )))
                }
            }),
        }
    }
}

fn int_value(n: usize) -> PyResult<Value> {
    i64::try_from(n).map(Value::int).map_err(|_| {
        PyError::raise(
            crate::ExceptionKind::OverflowError,
            format!("{n} does not fit in an int"),
        )
    })
}

fn name_arg<'a>(sys: &TypeSystem, args: &'a [Value], index: usize) -> PyResult<&'a str> {
    match args[index].as_str() {
        Some(name) => Ok(name),
        None => Err(ArgumentError::Kind {
            index,
            expected: "str",
            given: sys.type_name(&args[index]),
        }
        .into()),
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.signature())
    }
}

// ── Per-type slot table ─────────────────────────────────────────────

/// The targets of one slot, indexed by representation index.
pub struct SlotTargets(Box<[Option<Target>]>);

impl SlotTargets {
    fn empty(width: usize) -> Self {
        Self(vec![None; width].into_boxed_slice())
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.0.get(index).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// One atomically replaceable entry per [`SpecialMethod`]. Readers never
/// block and always see a whole entry.
pub struct SlotTable {
    width: usize,
    slots: Box<[ArcSwap<SlotTargets>]>,
}

impl SlotTable {
    /// A table in which every slot is empty, for a type with `width`
    /// representations.
    pub fn new(width: usize) -> Self {
        let slots = SpecialMethod::ALL
            .iter()
            .map(|_| ArcSwap::from_pointee(SlotTargets::empty(width)))
            .collect();
        Self { width, slots }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, op: SpecialMethod, index: usize) -> Option<Target> {
        self.slots[op.index()].load().get(index).cloned()
    }

    pub fn is_empty(&self, op: SpecialMethod) -> bool {
        self.slots[op.index()].load().is_empty()
    }

    /// True if every slot of the table is empty.
    pub fn all_empty(&self) -> bool {
        SpecialMethod::ALL.iter().all(|&op| self.is_empty(op))
    }

    /// Install `target` for representation `index`. A target of the wrong
    /// calling shape is rejected and the slot is left as it was.
    pub fn set(&self, op: SpecialMethod, index: usize, target: Target) -> Result<(), InterpreterError> {
        op.check_target(&target)?;
        if index >= self.width {
            return Err(InterpreterError::Internal(format!(
                "representation index {index} out of range for slot {op}"
            )));
        }
        self.slots[op.index()].rcu(|current| {
            let mut targets = current.0.to_vec();
            targets[index] = Some(target.clone());
            SlotTargets(targets.into_boxed_slice())
        });
        Ok(())
    }

    /// Replace the whole entry. Targets must already have been checked.
    pub(crate) fn store(&self, op: SpecialMethod, targets: Vec<Option<Target>>) {
        debug_assert_eq!(targets.len(), self.width);
        debug_assert!(
            targets
                .iter()
                .flatten()
                .all(|t| t.signature() == op.signature())
        );
        self.slots[op.index()].store(Arc::new(SlotTargets(targets.into_boxed_slice())));
    }

    pub fn clear(&self, op: SpecialMethod) {
        self.slots[op.index()].store(Arc::new(SlotTargets::empty(self.width)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unary_target() -> Target {
        Target::unary(|_, v| Ok(v.clone()))
    }

    #[test]
    fn table_is_consistent() {
        assert_eq!(SpecialMethod::COUNT, SpecialMethod::ALL.len());
        for (i, op) in SpecialMethod::ALL.iter().enumerate() {
            assert_eq!(op.index(), i, "{op} out of place");
            assert_eq!(SpecialMethod::for_method_name(op.method_name()), Some(*op));
            let name = op.method_name();
            assert!(name.starts_with("__") && name.ends_with("__"), "{name}");
        }
        assert_eq!(SpecialMethod::for_method_name("__nothing__"), None);
    }

    #[test]
    fn reflected_pairs_point_at_each_other() {
        for op in SpecialMethod::ALL {
            if let Some(alt) = op.alt() {
                assert_eq!(alt.alt(), Some(*op), "{op} <-> {alt}");
            }
        }
        assert_eq!(SpecialMethod::Add.alt(), Some(SpecialMethod::Radd));
        assert_eq!(SpecialMethod::Lt.alt(), Some(SpecialMethod::Gt));
        assert_eq!(SpecialMethod::Neg.alt(), None);
    }

    #[test]
    fn set_rejects_wrong_shape_and_keeps_slot() {
        let table = SlotTable::new(1);
        assert!(table.all_empty());
        table.set(SpecialMethod::Neg, 0, unary_target()).unwrap();
        let before = table.get(SpecialMethod::Neg, 0).unwrap();

        let err = table
            .set(SpecialMethod::Neg, 0, Target::binary(|_, v, _| Ok(v.clone())))
            .unwrap_err();
        assert!(matches!(err, InterpreterError::SlotShape { .. }));
        assert_eq!(
            err.to_string(),
            "BINARY not of required type UNARY for slot __neg__"
        );

        let after = table.get(SpecialMethod::Neg, 0).unwrap();
        assert!(after.same_as(&before), "rejected target must not replace the slot");
    }

    #[test]
    fn adoptive_width_keeps_targets_apart() {
        let table = SlotTable::new(2);
        let first = unary_target();
        table.set(SpecialMethod::Repr, 1, first.clone()).unwrap();
        assert!(table.get(SpecialMethod::Repr, 0).is_none());
        assert!(table.get(SpecialMethod::Repr, 1).unwrap().same_as(&first));
        assert!(!table.is_empty(SpecialMethod::Repr));
        assert!(table.set(SpecialMethod::Repr, 2, unary_target()).is_err());
        table.clear(SpecialMethod::Repr);
        assert!(table.is_empty(SpecialMethod::Repr));
    }

    #[test]
    fn invoke_without_self_is_a_count_error() {
        let sys = TypeSystem::new(crate::TypeSystemInfo::default()).unwrap();
        let targets = [
            (unary_target(), 1),
            (Target::predicate(|_, _| Ok(true)), 1),
            (Target::len(|_, _| Ok(0)), 1),
            (Target::binary(|_, v, _| Ok(v.clone())), 2),
            (Target::call(|_, v, _, _| Ok(v.clone())), 1),
        ];
        for (target, arity) in targets {
            let err = target.invoke(&sys, &[], &[]).unwrap_err();
            assert!(
                matches!(
                    err,
                    PyError::Argument(ArgumentError::Count { expected, given: 0 }) if expected == arity
                ),
                "{target:?}: {err:?}"
            );
        }
    }

    #[test]
    fn len_beyond_int_range_overflows() {
        let sys = TypeSystem::new(crate::TypeSystemInfo::default()).unwrap();
        let huge = Target::len(|_, _| Ok(usize::MAX));
        let err = huge.invoke(&sys, &[Value::none()], &[]).unwrap_err();
        assert!(err.is_raised(crate::ExceptionKind::OverflowError), "{err:?}");

        let fits = Target::len(|_, _| Ok(i64::MAX as usize));
        let n = fits.invoke(&sys, &[Value::none()], &[]).unwrap();
        assert_eq!(n.as_int(), Some(i64::MAX));
    }

    #[test]
    fn operand_errors_use_the_operator() {
        let msg = |e: PyError| match e {
            PyError::Raised(exc) => exc.message,
            other => panic!("{other:?}"),
        };
        assert_eq!(
            msg(SpecialMethod::Add.operand_error("str", "int")),
            "unsupported operand type(s) for +: 'str' and 'int'"
        );
        assert_eq!(
            msg(SpecialMethod::Neg.unary_operand_error("str")),
            "bad operand type for unary -: 'str'"
        );
    }
}
