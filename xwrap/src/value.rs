//! Objects of the foreign side.

use std::{
    cell::RefCell,
    fmt::{self, Write},
    rc::Rc,
};

use smol_str::SmolStr;

use crate::{
    class::{Class, Instance},
    exception::{CallResult, ForeignError},
    function::{BoundMethod, Function},
    module::Module,
    native::NativeCell,
    script::Lambda,
};

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Vec<(SmolStr, Value)>>>),
    Module(Rc<Module>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Lambda(Rc<Lambda>),
}

impl Value {
    pub fn str<S: Into<SmolStr>>(s: S) -> Value {
        Value::Str(s.into())
    }

    pub fn tuple<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn dict<I: IntoIterator<Item = (SmolStr, Value)>>(items: I) -> Value {
        Value::Dict(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Name of the foreign type, as used in error messages
    pub fn type_name(&self) -> SmolStr {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Module(_) => "module".into(),
            Value::Class(_) => "class".into(),
            Value::Instance(inst) => inst.class().name().into(),
            Value::Function(_) => "builtin_function".into(),
            Value::BoundMethod(_) => "instancemethod".into(),
            Value::Lambda(_) => "function".into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> CallResult<i64> {
        match self {
            Value::Int(x) => Ok(*x),
            Value::Bool(x) => Ok(i64::from(*x)),
            _ => Err(ForeignError::type_error(format!(
                "an integer is required, got {}",
                self.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> CallResult<&str> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            _ => Err(ForeignError::type_error(format!(
                "expected str, got {}",
                self.type_name()
            ))),
        }
    }

    /// Native storage behind a boundary wrapper, if any
    pub fn native_cell(&self) -> Option<NativeCell> {
        match self {
            Value::Instance(inst) => inst.native(),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(x) => *x,
            Value::Int(x) => *x != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    /// Identity comparison, `a is b`
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality for builtin values, identity for everything else
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => {
                i64::from(*a) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k2 == k)
                            .map_or(false, |(_, v2)| v.equals(v2))
                    })
            }
            (Value::Instance(a), Value::Instance(b)) => match (a.native(), b.native()) {
                (Some(x), Some(y)) if x.ptr_eq(&y) => true,
                _ => Rc::ptr_eq(a, b),
            },
            _ => self.is_same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(x) => write!(f, "Bool({})", x),
            Value::Int(x) => write!(f, "Int({})", x),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(x) => write!(f, "Str({:?})", x),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(&&items[..]).finish(),
            Value::Dict(items) => f.debug_tuple("Dict").field(&*items.borrow()).finish(),
            Value::Module(m) => write!(f, "Module({})", m.name()),
            Value::Class(c) => write!(f, "Class({})", c.qualified_name()),
            Value::Instance(inst) => write!(f, "Instance({})", inst.class().qualified_name()),
            Value::Function(func) => write!(f, "Function({})", func.name()),
            Value::BoundMethod(_) => f.write_str("BoundMethod"),
            Value::Lambda(l) => write!(f, "Lambda(arity {})", l.arity()),
        }
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Str(x.into())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Str(x.into())
    }
}

/// Quote string the way the interactive prompt shows it
pub(crate) fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut ret = String::with_capacity(s.len() + 2);
    ret.push(quote);
    for c in s.chars() {
        match c {
            '\\' => ret.push_str("\\\\"),
            '\n' => ret.push_str("\\n"),
            '\t' => ret.push_str("\\t"),
            '\r' => ret.push_str("\\r"),
            _ if c == quote => {
                ret.push('\\');
                ret.push(c);
            }
            _ if c.is_control() => {
                write!(&mut ret, "\\x{:02x}", c as u32).expect(crate::WRITE_TO_MEM_FAILED_MSG);
            }
            _ => ret.push(c),
        }
    }
    ret.push(quote);
    ret
}

pub(crate) fn repr_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        (if x > 0.0 { "inf" } else { "-inf" }).into()
    } else {
        format!("{}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_str() {
        assert_eq!("'hello, world'", repr_str("hello, world"));
        assert_eq!("\"it's\"", repr_str("it's"));
        assert_eq!("'a\\nb'", repr_str("a\nb"));
        assert_eq!("'\\'\"'", repr_str("'\""));
    }

    #[test]
    fn test_repr_float() {
        assert_eq!("1.0", repr_float(1.0));
        assert_eq!("0.5", repr_float(0.5));
        assert_eq!("-inf", repr_float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_debug() {
        assert_eq!(
            r#"Tuple([Int(1), Str("a"), None])"#,
            format!("{:?}", Value::tuple([Value::Int(1), Value::str("a"), Value::None]))
        );
        assert_eq!(
            r#"Dict([("k", Bool(true))])"#,
            format!("{:?}", Value::dict([("k".into(), Value::Bool(true))]))
        );
    }

    #[test]
    fn test_equality() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(Value::Bool(true).equals(&Value::Int(1)));
        assert!(Value::tuple([Value::Int(1), Value::str("a")])
            .equals(&Value::tuple([Value::Int(1), Value::str("a")])));
        assert!(!Value::str("a").equals(&Value::Int(1)));
        let d1 = Value::dict([("a".into(), Value::Int(1))]);
        let d2 = Value::dict([("a".into(), Value::Int(1))]);
        assert!(d1.equals(&d2));
        assert!(!d1.is_same(&d2));
        assert!(Value::None.is_same(&Value::None));
    }
}
