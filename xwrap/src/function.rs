//! Native functions visible from the foreign side and overload dispatch.

use std::{
    any::Any,
    cell::{Ref, RefMut},
    fmt,
    rc::Rc,
};

use log::{debug, trace};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    convert::{unwrap_arg, wrap_return, ArgSlot},
    exception::{CallResult, ExceptionKind, ForeignError},
    native::NativeCell,
    runtime::Runtime,
    typemap::ArgType,
    value::Value,
};

/// Implementation of one overload, bound with [`crate::Bindings::bind_fn`]
pub type NativeImpl = Rc<dyn Fn(&mut CallFrame) -> CallResult<NativeReturn>>;

/// What native implementation gives back, wrapped according to declared return type
pub enum NativeReturn {
    Unit,
    Value(Box<dyn Any>),
    /// Reference to storage of argument (or other live storage)
    Alias {
        cell: NativeCell,
        origin: Option<Value>,
    },
    /// Foreign object as is, for `Object` return type
    Object(Value),
}

impl NativeReturn {
    pub fn value<T: Any>(x: T) -> NativeReturn {
        NativeReturn::Value(Box::new(x))
    }
    pub fn alias(cell: NativeCell) -> NativeReturn {
        NativeReturn::Alias { cell, origin: None }
    }
}

impl From<Value> for NativeReturn {
    fn from(x: Value) -> Self {
        NativeReturn::Object(x)
    }
}

impl fmt::Debug for NativeReturn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NativeReturn::Unit => f.write_str("Unit"),
            NativeReturn::Value(_) => f.write_str("Value(..)"),
            NativeReturn::Alias { cell, .. } => write!(f, "Alias({})", cell.type_name()),
            NativeReturn::Object(v) => write!(f, "Object({})", v.type_name()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub(crate) name: SmolStr,
    pub(crate) ty: ArgType,
}

#[derive(Debug, Clone)]
pub(crate) struct Signature {
    pub(crate) rust_path: SmolStr,
    pub(crate) params: SmallVec<[Param; 4]>,
    pub(crate) ret: ArgType,
}

impl Signature {
    fn display<'a>(&'a self, name: &'a str) -> SignatureDisplay<'a> {
        SignatureDisplay { name, sig: self }
    }
}

struct SignatureDisplay<'a> {
    name: &'a str,
    sig: &'a Signature,
}

impl fmt::Display for SignatureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.sig.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
        }
        f.write_str(")")?;
        if !self.sig.ret.is_unit() {
            write!(f, " -> {}", self.sig.ret)?;
        }
        Ok(())
    }
}

pub(crate) struct Overload {
    pub(crate) sig: Signature,
    pub(crate) imp: NativeImpl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    /// free function or static method, never bound to instance
    Function,
    /// first parameter is receiver
    Method,
    /// fills native part of instance passed as first argument
    Init,
}

pub struct Function {
    name: SmolStr,
    kind: FunctionKind,
    overloads: Vec<Overload>,
    doc: Option<String>,
}

impl Function {
    pub(crate) fn new(name: SmolStr, kind: FunctionKind, doc: Option<String>) -> Function {
        Function {
            name,
            kind,
            overloads: Vec::new(),
            doc,
        }
    }

    pub(crate) fn add_overload(&mut self, sig: Signature, imp: NativeImpl) {
        self.overloads.push(Overload { sig, imp });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub(crate) fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Functions taking receiver are bound on instance attribute access
    pub(crate) fn binds_to_instance(&self) -> bool {
        matches!(self.kind, FunctionKind::Method | FunctionKind::Init)
    }

    pub(crate) fn signatures(&self) -> Vec<String> {
        self.overloads
            .iter()
            .map(|x| x.sig.display(&self.name).to_string())
            .collect()
    }

    pub(crate) fn call(&self, rt: &Runtime, args: &[Value]) -> CallResult<Value> {
        let (target, args) = if self.kind == FunctionKind::Init {
            match args.split_first() {
                Some((Value::Instance(inst), rest)) => (Some(inst.clone()), rest),
                Some((other, _)) => {
                    return Err(ForeignError::type_error(format!(
                        "{}() should be called with instance as first argument, got {}",
                        self.name,
                        other.type_name()
                    )));
                }
                None => {
                    return Err(ForeignError::type_error(format!(
                        "{}() should be called with instance as first argument",
                        self.name
                    )));
                }
            }
        } else {
            (None, args)
        };
        let candidates: SmallVec<[&Overload; 4]> = self
            .overloads
            .iter()
            .filter(|x| x.sig.params.len() == args.len())
            .collect();
        trace!(
            "call {}: {} args, {} candidates",
            self.name,
            args.len(),
            candidates.len()
        );
        if candidates.is_empty() {
            return Err(self.arity_error(args.len()));
        }
        let single = candidates.len() == 1;
        for overload in &candidates {
            let slots = match self.unwrap_args(rt, overload, args) {
                Ok(slots) => slots,
                Err(err) if single => return Err(err),
                Err(err) => {
                    trace!("{}: skip overload {}: {}", self.name, overload.sig.rust_path, err);
                    continue;
                }
            };
            debug!("{}: selected {}", self.name, overload.sig.rust_path);
            let mut frame = CallFrame { rt, args, slots };
            let ret = (overload.imp)(&mut frame)?;
            return match target {
                Some(inst) => {
                    rt.fill_instance(&inst, &overload.sig.ret, ret)?;
                    Ok(Value::None)
                }
                None => wrap_return(rt.type_map(), ret, &overload.sig.ret),
            };
        }
        let given = args
            .iter()
            .map(|x| x.type_name().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut msg = format!(
            "no overload of {}() matches arguments ({}), tried:",
            self.name, given
        );
        for overload in &candidates {
            msg.push_str(&format!("\n    {}", overload.sig.display(&self.name)));
        }
        Err(ForeignError::type_error(msg))
    }

    fn unwrap_args(
        &self,
        rt: &Runtime,
        overload: &Overload,
        args: &[Value],
    ) -> CallResult<SmallVec<[ArgSlot; 4]>> {
        let mut slots = SmallVec::with_capacity(args.len());
        for (i, (arg, param)) in args.iter().zip(overload.sig.params.iter()).enumerate() {
            let slot = unwrap_arg(rt.type_map(), arg, &param.ty).map_err(|err| {
                if err.kind == ExceptionKind::TypeError {
                    ForeignError::type_error(format!(
                        "{}() argument {} ({}): {}",
                        self.name,
                        i + 1,
                        param.name,
                        err.message
                    ))
                } else {
                    err
                }
            })?;
            slots.push(slot);
        }
        Ok(slots)
    }

    fn arity_error(&self, given: usize) -> ForeignError {
        let mut arities: SmallVec<[usize; 4]> =
            self.overloads.iter().map(|x| x.sig.params.len()).collect();
        arities.sort_unstable();
        arities.dedup();
        let expected = arities
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        let plural = if arities.as_slice() == [1] { "" } else { "s" };
        ForeignError::type_error(format!(
            "{}() takes {} argument{} ({} given)",
            self.name, expected, plural, given
        ))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("overloads", &self.signatures())
            .finish()
    }
}

/// Function or lambda bound to receiver
pub struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) func: Value,
}

impl BoundMethod {
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }
    pub fn func(&self) -> &Value {
        &self.func
    }
}

/// Arguments of native call, already unwrapped according to declared types
pub struct CallFrame<'a> {
    rt: &'a Runtime,
    args: &'a [Value],
    slots: SmallVec<[ArgSlot; 4]>,
}

impl<'a> CallFrame<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.rt
    }

    fn slot(&self, i: usize) -> CallResult<&ArgSlot> {
        self.slots.get(i).ok_or_else(|| {
            ForeignError::runtime_error(format!(
                "argument index {} out of range, there are {} arguments",
                i,
                self.slots.len()
            ))
        })
    }

    /// Take argument declared as passed by value
    pub fn value<T: Any + Clone>(&mut self, i: usize) -> CallResult<T> {
        self.slot(i)?;
        match &mut self.slots[i] {
            ArgSlot::Owned(x) => {
                let b = x.take().ok_or_else(|| {
                    ForeignError::runtime_error(format!("argument {} already taken", i))
                })?;
                b.downcast::<T>().map(|x| *x).map_err(|_| {
                    ForeignError::type_error(format!(
                        "argument {} is not {}",
                        i,
                        std::any::type_name::<T>()
                    ))
                })
            }
            ArgSlot::Shared(cell) | ArgSlot::Exclusive(cell) => {
                cell.borrow::<T>().map(|x| x.clone())
            }
            ArgSlot::Object(v) => (&*v as &dyn Any)
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| {
                    ForeignError::type_error(format!(
                        "argument {} is foreign object, not {}",
                        i,
                        std::any::type_name::<T>()
                    ))
                }),
        }
    }

    /// Shared access to argument declared as `&T` or `&mut T`
    pub fn borrow<T: Any>(&self, i: usize) -> CallResult<Ref<'_, T>> {
        match self.slot(i)? {
            ArgSlot::Shared(cell) | ArgSlot::Exclusive(cell) => cell.borrow::<T>(),
            _ => Err(ForeignError::type_error(format!(
                "argument {} is not passed by reference",
                i
            ))),
        }
    }

    /// Exclusive access to argument declared as `&mut T`
    pub fn borrow_mut<T: Any>(&self, i: usize) -> CallResult<RefMut<'_, T>> {
        match self.slot(i)? {
            ArgSlot::Exclusive(cell) => cell.borrow_mut::<T>(),
            _ => Err(ForeignError::type_error(format!(
                "argument {} is not passed by mutable reference",
                i
            ))),
        }
    }

    /// Foreign object as it was passed
    pub fn object(&self, i: usize) -> CallResult<Value> {
        self.slot(i)?;
        Ok(self.args[i].clone())
    }

    /// Return storage of argument `i` as reference
    pub fn alias(&self, i: usize) -> CallResult<NativeReturn> {
        match self.slot(i)? {
            ArgSlot::Shared(cell) | ArgSlot::Exclusive(cell) => Ok(NativeReturn::Alias {
                cell: cell.clone(),
                origin: Some(self.args[i].clone()),
            }),
            _ => Err(ForeignError::type_error(format!(
                "argument {} has no storage to reference",
                i
            ))),
        }
    }

    /// `args[i].name(*call_args)`, resolved dynamically so foreign overrides are used
    pub fn call_method(&self, i: usize, name: &str, call_args: &[Value]) -> CallResult<Value> {
        let obj = self.object(i)?;
        self.rt.call_method(&obj, name, call_args)
    }
}
