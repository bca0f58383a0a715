//! Unwrap foreign values into native arguments and wrap native results.

use std::any::Any;

use log::trace;

use crate::{
    class::{Holder, Instance},
    exception::{CallResult, ForeignError},
    function::NativeReturn,
    native::NativeCell,
    typemap::{
        ty::{NativeKind, NativeType},
        ArgType, TypeMap,
    },
    types::Discipline,
    value::Value,
};

/// Argument prepared for native implementation
pub(crate) enum ArgSlot {
    /// Copy of value, `None` after implementation took it
    Owned(Option<Box<dyn Any>>),
    Shared(NativeCell),
    Exclusive(NativeCell),
    Object(Value),
}

fn find_type<'a>(tm: &'a TypeMap, arg: &ArgType) -> CallResult<&'a NativeType> {
    tm.find(&arg.base).ok_or_else(|| {
        ForeignError::runtime_error(format!("type {} is not registered", arg.base))
    })
}

pub(crate) fn unwrap_arg(tm: &TypeMap, val: &Value, arg: &ArgType) -> CallResult<ArgSlot> {
    let ty = find_type(tm, arg)?;
    if ty.kind == NativeKind::Object {
        return Ok(ArgSlot::Object(val.clone()));
    }
    if let Some(cell) = val.native_cell() {
        if cell.holds_type_id(ty.type_id) {
            trace!("unwrap_arg: {} from native cell {}", arg, cell.type_name());
            return match arg.discipline {
                Discipline::Value => copy_cell(ty, &cell).map(|x| ArgSlot::Owned(Some(x))),
                Discipline::ConstRef => Ok(ArgSlot::Shared(cell)),
                Discipline::MutRef => Ok(ArgSlot::Exclusive(cell)),
            };
        }
    } else if let Value::Instance(inst) = val {
        if inst.class().native_type().is_some() {
            return Err(ForeignError::type_error(format!(
                "{} object has no native value, its __init__ was not called",
                val.type_name()
            )));
        }
    }
    if arg.class_name.is_none() {
        if let Some(boxed) = builtin_from_foreign(ty, val) {
            if arg.discipline == Discipline::MutRef {
                return Err(ForeignError::invalid_reference(format!(
                    "Can't get a non-const reference to a built-in {} object",
                    val.type_name()
                )));
            }
            let boxed = boxed?;
            return Ok(match arg.discipline {
                Discipline::ConstRef => {
                    ArgSlot::Shared(NativeCell::temporary(ty.name.clone(), boxed))
                }
                _ => ArgSlot::Owned(Some(boxed)),
            });
        }
    }
    Err(ForeignError::type_error(format!(
        "expected {} {}, got {}",
        arg.class_name.as_ref().unwrap_or(&arg.base),
        arg.discipline,
        val.type_name()
    )))
}

fn builtin_from_foreign(ty: &NativeType, val: &Value) -> Option<CallResult<Box<dyn Any>>> {
    match ty.kind {
        NativeKind::Scalar(kind) => kind.from_foreign(val),
        NativeKind::String => match val {
            Value::Str(s) => Some(Ok(Box::new(s.to_string()))),
            _ => None,
        },
        NativeKind::Unit | NativeKind::Object | NativeKind::Bound => None,
    }
}

fn copy_cell(ty: &NativeType, cell: &NativeCell) -> CallResult<Box<dyn Any>> {
    let clone_fn = ty.clone_fn.ok_or_else(|| {
        ForeignError::type_error(format!(
            "{} can not be copied, pass it by reference",
            ty.name
        ))
    })?;
    let guard = cell.borrow_any()?;
    clone_fn(&**guard).ok_or_else(|| {
        ForeignError::type_error(format!("native storage does not hold {}", ty.name))
    })
}

pub(crate) fn wrap_return(tm: &TypeMap, ret: NativeReturn, arg: &ArgType) -> CallResult<Value> {
    if arg.is_unit() {
        return match ret {
            NativeReturn::Unit => Ok(Value::None),
            other => Err(ForeignError::runtime_error(format!(
                "declared without return value, but implementation returned {:?}",
                other
            ))),
        };
    }
    let ty = find_type(tm, arg)?;
    match (ret, arg.discipline) {
        (NativeReturn::Unit, _) => Err(ForeignError::runtime_error(format!(
            "declared as returning {}, but implementation returned nothing",
            arg
        ))),
        (NativeReturn::Object(v), _) if ty.kind == NativeKind::Object => Ok(v),
        (NativeReturn::Object(v), _) => Err(ForeignError::runtime_error(format!(
            "declared as returning {}, but implementation returned foreign {}",
            arg,
            v.type_name()
        ))),
        (NativeReturn::Value(boxed), Discipline::Value | Discipline::ConstRef) => {
            to_foreign(tm, ty, arg, boxed)
        }
        (NativeReturn::Alias { cell, .. }, Discipline::Value | Discipline::ConstRef) => {
            let boxed = copy_cell(ty, &cell)?;
            to_foreign(tm, ty, arg, boxed)
        }
        (NativeReturn::Value(_), Discipline::MutRef) => Err(ForeignError::invalid_reference(
            format!("Can't return a non-const reference to a temporary {}", ty.name),
        )),
        (NativeReturn::Alias { cell, origin }, Discipline::MutRef) => {
            if cell.is_temporary() {
                return Err(ForeignError::invalid_reference(format!(
                    "Can't return a non-const reference to a temporary {}",
                    ty.name
                )));
            }
            let class = tm.wrapping_class(arg).ok_or_else(|| {
                ForeignError::type_error(format!(
                    "no class holds {}, can't return it by mutable reference",
                    ty.name
                ))
            })?;
            if let Some(origin) = origin {
                if origin
                    .native_cell()
                    .map_or(false, |origin_cell| origin_cell.ptr_eq(&cell))
                {
                    return Ok(origin);
                }
            }
            trace!("wrap_return: reference to {} in {}", ty.name, class.name());
            Ok(Value::Instance(Instance::with_native(
                class.clone(),
                cell,
                Holder::Reference,
            )))
        }
    }
}

fn to_foreign(
    tm: &TypeMap,
    ty: &NativeType,
    arg: &ArgType,
    boxed: Box<dyn Any>,
) -> CallResult<Value> {
    let mismatch = || {
        ForeignError::runtime_error(format!(
            "implementation returned value of wrong type, expected {}",
            ty.name
        ))
    };
    if (*boxed).type_id() != ty.type_id {
        return Err(mismatch());
    }
    if arg.class_name.is_some() || ty.kind == NativeKind::Bound {
        let class = tm.wrapping_class(arg).ok_or_else(|| {
            ForeignError::type_error(format!("no class holds {}, can't wrap it", ty.name))
        })?;
        let cell = NativeCell::from_boxed(ty.name.clone(), boxed);
        return Ok(Value::Instance(Instance::with_native(
            class.clone(),
            cell,
            Holder::Value,
        )));
    }
    match ty.kind {
        NativeKind::Scalar(kind) => kind.to_foreign(&*boxed).ok_or_else(mismatch),
        NativeKind::String => boxed
            .downcast::<String>()
            .map(|s| Value::Str((*s).into()))
            .map_err(|_| mismatch()),
        NativeKind::Object => boxed
            .downcast::<Value>()
            .map(|v| *v)
            .map_err(|_| mismatch()),
        NativeKind::Unit => Ok(Value::None),
        NativeKind::Bound => Err(mismatch()),
    }
}
