use std::fmt::Display;

use quote::ToTokens;
use smol_str::SmolStr;
use syn::visit_mut::{
    visit_angle_bracketed_generic_arguments_mut, visit_type_reference_mut, VisitMut,
};

use crate::types::Discipline;

pub(crate) struct DisplayToTokens<'a, T: ToTokens>(pub &'a T);

impl<T> Display for DisplayToTokens<'_, T>
where
    T: ToTokens,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(f, "{}", self.0.into_token_stream())
    }
}

struct StripLifetime;
impl VisitMut for StripLifetime {
    fn visit_type_reference_mut(&mut self, i: &mut syn::TypeReference) {
        i.lifetime = None;
        visit_type_reference_mut(self, i)
    }
    fn visit_angle_bracketed_generic_arguments_mut(
        &mut self,
        i: &mut syn::AngleBracketedGenericArguments,
    ) {
        let args = std::mem::take(&mut i.args);
        i.args = args
            .into_iter()
            .filter(|x| !matches!(x, syn::GenericArgument::Lifetime(_)))
            .collect();
        visit_angle_bracketed_generic_arguments_mut(self, i);
    }
    fn visit_path_arguments_mut(&mut self, i: &mut syn::PathArguments) {
        if let syn::PathArguments::AngleBracketed(ref mut b) = *i {
            self.visit_angle_bracketed_generic_arguments_mut(b);
            if b.args.is_empty() {
                *i = syn::PathArguments::None;
            }
        }
    }
}

/// Type as text without lifetimes, `&'a Foo` -> `& Foo`
pub(crate) fn normalize_type(ty: &syn::Type) -> SmolStr {
    let mut new_ty = ty.clone();
    StripLifetime.visit_type_mut(&mut new_ty);
    DisplayToTokens(&new_ty).to_string().into()
}

/// Split `&T`/`&mut T`/`T` into the passing discipline and `T`
pub(crate) fn split_reference(ty: &syn::Type) -> (Discipline, &syn::Type) {
    match ty {
        syn::Type::Reference(r) => {
            let discipline = if r.mutability.is_some() {
                Discipline::MutRef
            } else {
                Discipline::ConstRef
            };
            (discipline, &*r.elem)
        }
        syn::Type::Paren(p) => split_reference(&p.elem),
        _ => (Discipline::Value, ty),
    }
}

/// Name of type without references, `None` for type forms that
/// can not cross the boundary (generics, slices, pointers and so on)
pub(crate) fn type_base_name(ty: &syn::Type) -> Option<SmolStr> {
    match ty {
        syn::Type::Tuple(t) if t.elems.is_empty() => Some("()".into()),
        syn::Type::Paren(p) => type_base_name(&p.elem),
        syn::Type::Path(p) if p.qself.is_none() => {
            let last = p.path.segments.last()?;
            match last.arguments {
                syn::PathArguments::None => Some(last.ident.to_string().into()),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! parse_type {
        ($($tt:tt)*) => {{
            let ty: syn::Type = syn::parse_quote! { $($tt)* };
            ty
        }}
    }

    #[test]
    fn test_normalize_ty() {
        assert_eq!("& str", normalize_type(&parse_type! { &'a str }));
        assert_eq!("& mut i32", normalize_type(&parse_type! { &mut i32 }));
        assert_eq!("Foo < T >", normalize_type(&parse_type! { Foo<'a, T> }));
        assert_eq!("Foo", normalize_type(&parse_type! { Foo<'a> }));
        assert_eq!("()", normalize_type(&parse_type! { () }));
    }

    #[test]
    fn test_split_reference() {
        let ty = parse_type! { &mut Simple };
        let (d, inner) = split_reference(&ty);
        assert_eq!(Discipline::MutRef, d);
        assert_eq!(Some("Simple".into()), type_base_name(inner));

        let ty = parse_type! { &'a str };
        let (d, inner) = split_reference(&ty);
        assert_eq!(Discipline::ConstRef, d);
        assert_eq!(Some("str".into()), type_base_name(inner));

        let ty = parse_type! { std::string::String };
        assert_eq!((Discipline::Value, &ty), split_reference(&ty));
        assert_eq!(Some("String".into()), type_base_name(&ty));
    }

    #[test]
    fn test_unsupported_type_forms() {
        assert_eq!(None, type_base_name(&parse_type! { Vec<i32> }));
        assert_eq!(None, type_base_name(&parse_type! { [u8] }));
        assert_eq!(None, type_base_name(&parse_type! { *const u8 }));
        assert_eq!(None, type_base_name(&parse_type! { (i32, i32) }));
    }
}
