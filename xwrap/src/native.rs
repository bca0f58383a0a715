//! Storage for native values handed to the foreign side.

use std::{
    any::Any,
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

use smol_str::SmolStr;

use crate::exception::{CallResult, ForeignError};

/// Shared, addressable storage for one native value.
///
/// Every clone of a cell refers to the same value, so a mutation through one
/// handle is visible through all of them. Borrows are checked at run time.
#[derive(Clone)]
pub struct NativeCell {
    inner: Rc<RefCell<Box<dyn Any>>>,
    type_name: SmolStr,
    temporary: bool,
}

impl NativeCell {
    pub fn new<T: Any>(type_name: &str, value: T) -> NativeCell {
        NativeCell::from_boxed(type_name.into(), Box::new(value))
    }

    pub(crate) fn from_boxed(type_name: SmolStr, value: Box<dyn Any>) -> NativeCell {
        NativeCell {
            inner: Rc::new(RefCell::new(value)),
            type_name,
            temporary: false,
        }
    }

    /// Storage created only to bind a const reference to a converted value
    pub(crate) fn temporary(type_name: SmolStr, value: Box<dyn Any>) -> NativeCell {
        NativeCell {
            temporary: true,
            ..NativeCell::from_boxed(type_name, value)
        }
    }

    pub fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    pub(crate) fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn holds<T: Any>(&self) -> bool {
        match self.inner.try_borrow() {
            Ok(x) => x.is::<T>(),
            Err(_) => false,
        }
    }

    pub(crate) fn holds_type_id(&self, id: std::any::TypeId) -> bool {
        match self.inner.try_borrow() {
            Ok(x) => (**x).type_id() == id,
            Err(_) => false,
        }
    }

    pub fn borrow<T: Any>(&self) -> CallResult<Ref<'_, T>> {
        let guard = self.inner.try_borrow().map_err(|_| {
            ForeignError::runtime_error(format!(
                "{} is already borrowed as mutable",
                self.type_name
            ))
        })?;
        Ref::filter_map(guard, |x| x.downcast_ref::<T>()).map_err(|_| self.type_mismatch::<T>())
    }

    pub fn borrow_mut<T: Any>(&self) -> CallResult<RefMut<'_, T>> {
        let guard = self.inner.try_borrow_mut().map_err(|_| {
            ForeignError::runtime_error(format!("{} is already borrowed", self.type_name))
        })?;
        RefMut::filter_map(guard, |x| x.downcast_mut::<T>())
            .map_err(|_| self.type_mismatch::<T>())
    }

    pub(crate) fn borrow_any(&self) -> CallResult<Ref<'_, Box<dyn Any>>> {
        self.inner.try_borrow().map_err(|_| {
            ForeignError::runtime_error(format!(
                "{} is already borrowed as mutable",
                self.type_name
            ))
        })
    }

    pub fn ptr_eq(&self, other: &NativeCell) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn type_mismatch<T: Any>(&self) -> ForeignError {
        ForeignError::type_error(format!(
            "native storage holds {}, not {}",
            self.type_name,
            std::any::type_name::<T>()
        ))
    }
}

impl fmt::Debug for NativeCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeCell")
            .field("type_name", &self.type_name)
            .field("temporary", &self.temporary)
            .finish()
    }
}
