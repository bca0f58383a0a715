use std::any::{Any, TypeId};

use smol_str::SmolStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    exception::{CallResult, ExceptionKind, ForeignError},
    value::Value,
};

pub(crate) type CloneFn = fn(&dyn Any) -> Option<Box<dyn Any>>;

pub(crate) fn clone_any<T: Any + Clone>(x: &dyn Any) -> Option<Box<dyn Any>> {
    x.downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as Box<dyn Any>)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeKind {
    /// `()`
    Unit,
    Scalar(ScalarKind),
    /// `String`, also `str` behind reference
    String,
    /// Foreign object passed as is
    Object,
    /// Rust type registered by user
    Bound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

macro_rules! int_from_foreign {
    ($val:expr, $t:ty, $kind:expr) => {{
        let x = $val.as_int()?;
        let ret: $t = <$t>::try_from(x).map_err(|_| {
            ForeignError::new(
                ExceptionKind::OverflowError,
                format!("value {} does not fit into {}", x, $kind),
            )
        })?;
        Box::new(ret) as Box<dyn Any>
    }};
}

impl ScalarKind {
    pub(crate) fn all() -> impl Iterator<Item = ScalarKind> {
        ScalarKind::iter()
    }

    pub(crate) fn rust_type_id(self) -> TypeId {
        use ScalarKind::*;
        match self {
            Bool => TypeId::of::<bool>(),
            I8 => TypeId::of::<i8>(),
            I16 => TypeId::of::<i16>(),
            I32 => TypeId::of::<i32>(),
            I64 => TypeId::of::<i64>(),
            U8 => TypeId::of::<u8>(),
            U16 => TypeId::of::<u16>(),
            U32 => TypeId::of::<u32>(),
            U64 => TypeId::of::<u64>(),
            F32 => TypeId::of::<f32>(),
            F64 => TypeId::of::<f64>(),
        }
    }

    pub(crate) fn clone_fn(self) -> CloneFn {
        use ScalarKind::*;
        match self {
            Bool => clone_any::<bool>,
            I8 => clone_any::<i8>,
            I16 => clone_any::<i16>,
            I32 => clone_any::<i32>,
            I64 => clone_any::<i64>,
            U8 => clone_any::<u8>,
            U16 => clone_any::<u16>,
            U32 => clone_any::<u32>,
            U64 => clone_any::<u64>,
            F32 => clone_any::<f32>,
            F64 => clone_any::<f64>,
        }
    }

    /// `None` if foreign value is not a builtin number,
    /// so caller can report type mismatch
    pub(crate) fn from_foreign(self, val: &Value) -> Option<CallResult<Box<dyn Any>>> {
        use ScalarKind::*;
        let is_number = matches!(val, Value::Int(_) | Value::Bool(_) | Value::Float(_));
        if !is_number {
            return None;
        }
        let conv = || -> CallResult<Box<dyn Any>> {
            let ret: Box<dyn Any> = match self {
                Bool => Box::new(val.is_truthy()),
                I8 => int_from_foreign!(val, i8, self),
                I16 => int_from_foreign!(val, i16, self),
                I32 => int_from_foreign!(val, i32, self),
                I64 => int_from_foreign!(val, i64, self),
                U8 => int_from_foreign!(val, u8, self),
                U16 => int_from_foreign!(val, u16, self),
                U32 => int_from_foreign!(val, u32, self),
                U64 => int_from_foreign!(val, u64, self),
                F32 => Box::new(float_from_foreign(val) as f32),
                F64 => Box::new(float_from_foreign(val)),
            };
            Ok(ret)
        };
        if matches!(val, Value::Float(_)) && !matches!(self, F32 | F64) {
            return Some(Err(ForeignError::type_error(format!(
                "integer argument expected, got float for {}",
                self
            ))));
        }
        Some(conv())
    }

    pub(crate) fn to_foreign(self, x: &dyn Any) -> Option<Value> {
        use ScalarKind::*;
        Some(match self {
            Bool => Value::Bool(*x.downcast_ref::<bool>()?),
            I8 => Value::Int(i64::from(*x.downcast_ref::<i8>()?)),
            I16 => Value::Int(i64::from(*x.downcast_ref::<i16>()?)),
            I32 => Value::Int(i64::from(*x.downcast_ref::<i32>()?)),
            I64 => Value::Int(*x.downcast_ref::<i64>()?),
            U8 => Value::Int(i64::from(*x.downcast_ref::<u8>()?)),
            U16 => Value::Int(i64::from(*x.downcast_ref::<u16>()?)),
            U32 => Value::Int(i64::from(*x.downcast_ref::<u32>()?)),
            U64 => {
                let v = *x.downcast_ref::<u64>()?;
                match i64::try_from(v) {
                    Ok(v) => Value::Int(v),
                    Err(_) => Value::Float(v as f64),
                }
            }
            F32 => Value::Float(f64::from(*x.downcast_ref::<f32>()?)),
            F64 => Value::Float(*x.downcast_ref::<f64>()?),
        })
    }
}

fn float_from_foreign(val: &Value) -> f64 {
    match val {
        Value::Float(x) => *x,
        Value::Int(x) => *x as f64,
        Value::Bool(x) => f64::from(u8::from(*x)),
        _ => f64::NAN,
    }
}

/// Rust type that can cross the boundary
#[derive(Debug, Clone)]
pub(crate) struct NativeType {
    pub name: SmolStr,
    pub kind: NativeKind,
    pub type_id: TypeId,
    pub clone_fn: Option<CloneFn>,
}

impl NativeType {
    pub(crate) fn new(name: SmolStr, kind: NativeKind, type_id: TypeId) -> NativeType {
        NativeType {
            name,
            kind,
            type_id,
            clone_fn: None,
        }
    }
    pub(crate) fn with_clone(mut self, clone_fn: CloneFn) -> NativeType {
        self.clone_fn = Some(clone_fn);
        self
    }
    pub(crate) fn is_builtin(&self) -> bool {
        !matches!(self.kind, NativeKind::Bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_scalar_names() {
        assert_eq!("i32", ScalarKind::I32.to_string());
        assert_eq!(ScalarKind::U64, ScalarKind::from_str("u64").unwrap());
        assert_eq!(11, ScalarKind::all().count());
    }

    #[test]
    fn test_scalar_from_foreign() {
        let x = ScalarKind::I32.from_foreign(&Value::Int(42)).unwrap().unwrap();
        assert_eq!(Some(&42_i32), x.downcast_ref::<i32>());

        let err = ScalarKind::U8
            .from_foreign(&Value::Int(256))
            .unwrap()
            .unwrap_err();
        assert_eq!(ExceptionKind::OverflowError, err.kind);

        let err = ScalarKind::I32
            .from_foreign(&Value::Float(1.5))
            .unwrap()
            .unwrap_err();
        assert_eq!(ExceptionKind::TypeError, err.kind);

        assert!(ScalarKind::I32.from_foreign(&Value::str("1")).is_none());

        let x = ScalarKind::F64.from_foreign(&Value::Int(2)).unwrap().unwrap();
        assert_eq!(Some(&2.0_f64), x.downcast_ref::<f64>());
    }

    #[test]
    fn test_scalar_to_foreign() {
        assert!(ScalarKind::I32
            .to_foreign(&7_i32)
            .unwrap()
            .equals(&Value::Int(7)));
        assert!(ScalarKind::Bool
            .to_foreign(&true)
            .unwrap()
            .equals(&Value::Bool(true)));
        assert!(ScalarKind::I32.to_foreign(&7_i64).is_none());
        let cloned = (ScalarKind::I16.clone_fn())(&5_i16).unwrap();
        assert_eq!(Some(&5_i16), cloned.downcast_ref::<i16>());
    }
}
