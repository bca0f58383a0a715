use proc_macro2::{Ident, Span};
use smol_str::SmolStr;
use strum::Display;
use syn::{spanned::Spanned, Type};

use crate::{
    error::{DiagnosticError, Result, SourceIdSpan},
    source_registry::SourceId,
};

/// How value crosses the boundary
#[derive(PartialEq, Eq, Clone, Copy, Debug, Display)]
pub enum Discipline {
    #[strum(serialize = "by value")]
    Value,
    #[strum(serialize = "by mutable reference")]
    MutRef,
    #[strum(serialize = "by const reference")]
    ConstRef,
}

#[derive(Debug, Clone)]
pub(crate) struct ForeignClassInfo {
    pub(crate) src_id: SourceId,
    pub(crate) name: Ident,
    pub(crate) methods: Vec<ForeignMethod>,
    pub(crate) self_type: Option<Type>,
    /// For example if we have `fn new(x: X) -> Y`, then Y
    pub(crate) constructor_ret_type: Option<Type>,
    pub(crate) doc_comments: Vec<String>,
}

impl ForeignClassInfo {
    pub(crate) fn span(&self) -> Span {
        self.name.span()
    }
    pub(crate) fn src_id_span(&self) -> SourceIdSpan {
        (self.src_id, self.name.span())
    }
    /// common checks, not related to type resolution
    pub(crate) fn validate_class(&self) -> Result<()> {
        let mut has_constructor = false;
        let mut has_methods = false;
        for x in &self.methods {
            match x.variant {
                MethodVariant::Constructor => has_constructor = true,
                MethodVariant::Method(_) => has_methods = true,
                _ => {}
            }
        }
        if self.self_type.is_none() && has_constructor {
            Err(DiagnosticError::new(
                self.src_id,
                self.span(),
                format!(
                    "class {} has constructor, but no self_type defined",
                    self.name
                ),
            ))
        } else if self.self_type.is_none() && has_methods {
            Err(DiagnosticError::new(
                self.src_id,
                self.span(),
                format!("class {} has methods, but no self_type defined", self.name),
            ))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ForeignModuleInfo {
    pub(crate) src_id: SourceId,
    pub(crate) name: Ident,
    pub(crate) items: Vec<ForeignMethod>,
    pub(crate) doc_comments: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ForeignMethod {
    pub(crate) variant: MethodVariant,
    pub(crate) rust_id: syn::Path,
    pub(crate) fn_decl: FnDecl,
    pub(crate) name_alias: Option<Ident>,
    pub(crate) doc_comments: Vec<String>,
}

impl ForeignMethod {
    /// Name visible from foreign side
    pub(crate) fn short_name(&self) -> SmolStr {
        if let Some(ref name) = self.name_alias {
            name.to_string().into()
        } else {
            match self.rust_id.segments.len() {
                0 => SmolStr::default(),
                n => self.rust_id.segments[n - 1].ident.to_string().into(),
            }
        }
    }

    pub(crate) fn span(&self) -> Span {
        self.rust_id.span()
    }

    pub(crate) fn rust_path(&self) -> SmolStr {
        self.rust_id
            .segments
            .iter()
            .map(|x| x.ident.to_string())
            .collect::<Vec<_>>()
            .join("::")
            .into()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FnDecl {
    pub(crate) inputs: Vec<FnArg>,
    pub(crate) output: syn::ReturnType,
}

#[derive(Debug, Clone)]
pub(crate) enum FnArg {
    Default(NamedArg),
    SelfArg(Span, SelfTypeVariant),
}

#[derive(Debug, Clone)]
pub(crate) struct NamedArg {
    pub(crate) name: SmolStr,
    pub(crate) ty: Type,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub(crate) enum MethodVariant {
    Constructor,
    Method(SelfTypeVariant),
    StaticMethod,
    /// `init` in `foreign_module!`, fill native part of existing instance
    Init,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub(crate) enum SelfTypeVariant {
    RptrMut,
    Rptr,
    Mut,
    Default,
}

impl SelfTypeVariant {
    pub(crate) fn discipline(self) -> Discipline {
        match self {
            SelfTypeVariant::RptrMut => Discipline::MutRef,
            SelfTypeVariant::Rptr => Discipline::ConstRef,
            SelfTypeVariant::Mut | SelfTypeVariant::Default => Discipline::Value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_short_name_and_path() {
        let method = ForeignMethod {
            variant: MethodVariant::StaticMethod,
            rust_id: parse_quote! { Complicated::new },
            fn_decl: FnDecl {
                inputs: vec![],
                output: syn::ReturnType::Default,
            },
            name_alias: None,
            doc_comments: vec![],
        };
        assert_eq!("new", method.short_name());
        assert_eq!("Complicated::new", method.rust_path());
        let method = ForeignMethod {
            name_alias: Some(parse_quote! { init1 }),
            ..method
        };
        assert_eq!("init1", method.short_name());
    }

    #[test]
    fn test_self_discipline() {
        assert_eq!(Discipline::MutRef, SelfTypeVariant::RptrMut.discipline());
        assert_eq!(Discipline::ConstRef, SelfTypeVariant::Rptr.discipline());
        assert_eq!(Discipline::Value, SelfTypeVariant::Default.discipline());
        assert_eq!("by const reference", Discipline::ConstRef.to_string());
    }
}
