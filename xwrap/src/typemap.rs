pub(crate) mod ast;
pub(crate) mod ty;

use std::{
    any::{Any, TypeId},
    fmt,
    rc::Rc,
};

use log::{debug, trace};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use syn::spanned::Spanned;

use crate::{
    class::Class,
    error::{DiagnosticError, Result},
    source_registry::SourceId,
    typemap::{
        ast::{normalize_type, split_reference, type_base_name, DisplayToTokens},
        ty::{clone_any, CloneFn, NativeKind, NativeType, ScalarKind},
    },
    types::Discipline,
    value::Value,
};

pub(crate) const UNIT_TYPE: &str = "()";
pub(crate) const STRING_TYPE: &str = "String";
pub(crate) const STR_TYPE: &str = "str";
pub(crate) const OBJECT_TYPE: &str = "Object";

/// Type of argument or return value, as declared
#[derive(Debug, Clone)]
pub(crate) struct ArgType {
    /// name of Rust type in `TypeMap`
    pub base: SmolStr,
    pub discipline: Discipline,
    /// declared with name of class instead of Rust type
    pub class_name: Option<SmolStr>,
    pub display: SmolStr,
}

impl ArgType {
    pub(crate) fn is_unit(&self) -> bool {
        self.base == UNIT_TYPE
    }
    pub(crate) fn unit() -> ArgType {
        ArgType {
            base: UNIT_TYPE.into(),
            discipline: Discipline::Value,
            class_name: None,
            display: UNIT_TYPE.into(),
        }
    }
    pub(crate) fn object() -> ArgType {
        ArgType {
            base: OBJECT_TYPE.into(),
            discipline: Discipline::Value,
            class_name: None,
            display: OBJECT_TYPE.into(),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.display.as_str())
    }
}

pub(crate) struct TypeMap {
    types: FxHashMap<SmolStr, NativeType>,
    by_type_id: FxHashMap<TypeId, SmolStr>,
    /// foreign class name -> self type
    class_types: FxHashMap<SmolStr, SmolStr>,
    /// self type -> class
    classes: FxHashMap<SmolStr, Rc<Class>>,
}

impl Default for TypeMap {
    fn default() -> Self {
        let mut ret = TypeMap {
            types: FxHashMap::default(),
            by_type_id: FxHashMap::default(),
            class_types: FxHashMap::default(),
            classes: FxHashMap::default(),
        };
        ret.add(NativeType::new(
            UNIT_TYPE.into(),
            NativeKind::Unit,
            TypeId::of::<()>(),
        ));
        for kind in ScalarKind::all() {
            ret.add(
                NativeType::new(
                    kind.to_string().into(),
                    NativeKind::Scalar(kind),
                    kind.rust_type_id(),
                )
                .with_clone(kind.clone_fn()),
            );
        }
        ret.add(
            NativeType::new(
                STRING_TYPE.into(),
                NativeKind::String,
                TypeId::of::<String>(),
            )
            .with_clone(clone_any::<String>),
        );
        // `str` has the same storage as `String`
        ret.types.insert(
            STR_TYPE.into(),
            NativeType::new(STR_TYPE.into(), NativeKind::String, TypeId::of::<String>())
                .with_clone(clone_any::<String>),
        );
        ret.add(
            NativeType::new(OBJECT_TYPE.into(), NativeKind::Object, TypeId::of::<Value>())
                .with_clone(clone_any::<Value>),
        );
        ret
    }
}

impl TypeMap {
    fn add(&mut self, ty: NativeType) {
        self.by_type_id.insert(ty.type_id, ty.name.clone());
        self.types.insert(ty.name.clone(), ty);
    }

    pub(crate) fn bind_type<T: Any>(
        &mut self,
        name: &str,
        clone_fn: Option<CloneFn>,
    ) -> std::result::Result<(), String> {
        if let Some(prev) = self.types.get(name) {
            return Err(format!("type {} already bound ({:?})", name, prev.kind));
        }
        if let Some(prev) = self.by_type_id.get(&TypeId::of::<T>()) {
            return Err(format!(
                "Rust type {} already bound with name {}",
                std::any::type_name::<T>(),
                prev
            ));
        }
        debug!("bind_type: {} -> {}", name, std::any::type_name::<T>());
        let mut ty = NativeType::new(name.into(), NativeKind::Bound, TypeId::of::<T>());
        ty.clone_fn = clone_fn;
        self.add(ty);
        Ok(())
    }

    pub(crate) fn find(&self, name: &str) -> Option<&NativeType> {
        self.types.get(name)
    }

    /// Remember that foreign class `class_name` holds values of `self_type`
    pub(crate) fn register_class_type(
        &mut self,
        src_id: SourceId,
        class_name: &syn::Ident,
        self_type: &syn::Type,
    ) -> Result<()> {
        let arg = self.resolve(src_id, self_type)?;
        if arg.discipline != Discipline::Value || arg.class_name.is_some() {
            return Err(DiagnosticError::new(
                src_id,
                self_type.span(),
                format!(
                    "self_type of class {} should be plain Rust type, got {}",
                    class_name,
                    DisplayToTokens(self_type)
                ),
            ));
        }
        let ty = self.types.get(&arg.base).ok_or_else(|| {
            DiagnosticError::new(src_id, self_type.span(), "self_type not bound")
        })?;
        if matches!(ty.kind, NativeKind::Unit | NativeKind::Object) {
            return Err(DiagnosticError::new(
                src_id,
                self_type.span(),
                format!("{} can not be used as self_type", arg.base),
            ));
        }
        let class_name: SmolStr = class_name.to_string().into();
        if self.types.contains_key(&class_name) && class_name != arg.base {
            return Err(DiagnosticError::new(
                src_id,
                self_type.span(),
                format!(
                    "class name {} conflicts with name of bound Rust type",
                    class_name
                ),
            ));
        }
        if let Some((other, _)) = self
            .class_types
            .iter()
            .find(|(name, ty)| **ty == arg.base && **name != class_name)
        {
            return Err(DiagnosticError::new(
                src_id,
                self_type.span(),
                format!(
                    "type {} is already self_type of class {}",
                    arg.base, other
                ),
            ));
        }
        trace!("register_class_type: {} -> {}", class_name, arg.base);
        self.class_types.insert(class_name, arg.base);
        Ok(())
    }

    pub(crate) fn bind_class(&mut self, self_type: &str, class: Rc<Class>) {
        self.classes.insert(self_type.into(), class);
    }

    pub(crate) fn class_for_type(&self, self_type: &str) -> Option<&Rc<Class>> {
        self.classes.get(self_type)
    }

    pub(crate) fn resolve(&self, src_id: SourceId, ty: &syn::Type) -> Result<ArgType> {
        let (discipline, inner) = split_reference(ty);
        let display = normalize_type(ty);
        let name = type_base_name(inner).ok_or_else(|| {
            DiagnosticError::new(
                src_id,
                ty.span(),
                format!("type {} can not cross the boundary", display),
            )
        })?;
        let (base, class_name) = if let Some(self_type) = self.class_types.get(&name) {
            (self_type.clone(), Some(name))
        } else if self.types.contains_key(&name) {
            (name, None)
        } else {
            return Err(DiagnosticError::new(
                src_id,
                ty.span(),
                format!(
                    "unknown type {}, it is not builtin, not bound with bind_type \
                     and not name of foreign class",
                    name
                ),
            ));
        };
        let invalid = match (base.as_str(), discipline) {
            (STR_TYPE, Discipline::Value) => Some("str can be passed only as &str"),
            (STR_TYPE, Discipline::MutRef) => Some("&mut str is not supported"),
            (UNIT_TYPE, Discipline::MutRef | Discipline::ConstRef) => {
                Some("reference to () is meaningless")
            }
            (OBJECT_TYPE, Discipline::MutRef) => Some("Object can not be borrowed mutably"),
            _ => None,
        };
        if let Some(msg) = invalid {
            return Err(DiagnosticError::new(src_id, ty.span(), msg));
        }
        Ok(ArgType {
            base,
            discipline,
            class_name,
            display,
        })
    }

    pub(crate) fn resolve_ret(&self, src_id: SourceId, ret: &syn::ReturnType) -> Result<ArgType> {
        match ret {
            syn::ReturnType::Default => Ok(ArgType::unit()),
            syn::ReturnType::Type(_, ty) => self.resolve(src_id, ty),
        }
    }

    /// Class used to wrap values of `arg`
    pub(crate) fn wrapping_class(&self, arg: &ArgType) -> Option<&Rc<Class>> {
        self.class_for_type(&arg.base)
    }
}
