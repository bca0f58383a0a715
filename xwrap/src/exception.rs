//! Exceptions raised inside the foreign object model.

use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ExceptionKind {
    Exception,
    TypeError,
    /// Mutable reference requested for a value without addressable storage
    InvalidReferenceError,
    AttributeError,
    NameError,
    ImportError,
    ValueError,
    OverflowError,
    RuntimeError,
    /// Too deep nesting of calls
    RecursionError,
    SyntaxError,
}

impl ExceptionKind {
    pub fn parent(self) -> Option<ExceptionKind> {
        use ExceptionKind::*;
        match self {
            Exception => None,
            InvalidReferenceError => Some(TypeError),
            TypeError | AttributeError | NameError | ImportError | ValueError | RuntimeError
            | SyntaxError => Some(Exception),
            OverflowError => Some(ValueError),
            RecursionError => Some(RuntimeError),
        }
    }

    /// `except <name>:` catches this kind
    pub fn is_caught_by(self, handler: ExceptionKind) -> bool {
        let mut cur = Some(self);
        while let Some(kind) = cur {
            if kind == handler {
                return true;
            }
            cur = kind.parent();
        }
        false
    }

    pub fn from_name(name: &str) -> Option<ExceptionKind> {
        ExceptionKind::from_str(name).ok()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ForeignError {
    pub kind: ExceptionKind,
    pub message: String,
}

impl ForeignError {
    pub fn new<S: Into<String>>(kind: ExceptionKind, message: S) -> Self {
        ForeignError {
            kind,
            message: message.into(),
        }
    }
    pub fn type_error<S: Into<String>>(message: S) -> Self {
        ForeignError::new(ExceptionKind::TypeError, message)
    }
    pub fn invalid_reference<S: Into<String>>(message: S) -> Self {
        ForeignError::new(ExceptionKind::InvalidReferenceError, message)
    }
    pub fn attribute_error<S: Into<String>>(message: S) -> Self {
        ForeignError::new(ExceptionKind::AttributeError, message)
    }
    pub fn runtime_error<S: Into<String>>(message: S) -> Self {
        ForeignError::new(ExceptionKind::RuntimeError, message)
    }
}

pub type CallResult<T> = std::result::Result<T, ForeignError>;
