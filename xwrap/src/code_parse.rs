use bitflags::bitflags;
use heck::ToLowerCamelCase;
use log::debug;
use proc_macro2::{Ident, Span};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use syn::{
    braced, parenthesized,
    parse::{Parse, ParseStream, Parser},
    punctuated::Punctuated,
    spanned::Spanned,
    Token, Type,
};

use crate::{
    error::{DiagnosticError, Result},
    source_registry::SourceId,
    typemap::ast::{normalize_type, DisplayToTokens},
    types::{
        FnArg, FnDecl, ForeignClassInfo, ForeignMethod, ForeignModuleInfo, MethodVariant,
        NamedArg, SelfTypeVariant,
    },
    CAMEL_CASE_ALIASES, FOREIGN_CLASS, FOREIGN_MODULE,
};

#[derive(Debug)]
pub(crate) enum DeclItem {
    Class(ForeignClassInfo),
    Module(ForeignModuleInfo),
}

/// Parse whole declaration source, it should contain only
/// `foreign_class!` and `foreign_module!` invocations
pub(crate) fn parse_declarations(src_id: SourceId, code: &str) -> Result<Vec<DeclItem>> {
    let file = syn::parse_file(code).map_err(|err| DiagnosticError::from_syn_err(src_id, err))?;
    let mut ret = Vec::with_capacity(file.items.len());
    for item in file.items {
        let (attrs, mac) = match item {
            syn::Item::Macro(syn::ItemMacro { attrs, mac, .. }) => (attrs, mac),
            _ => {
                return Err(DiagnosticError::new(
                    src_id,
                    item.span(),
                    format!("expect {}! or {}! here", FOREIGN_CLASS, FOREIGN_MODULE),
                ));
            }
        };
        let to_diag = |err| DiagnosticError::from_syn_err(src_id, err);
        if mac.path.is_ident(FOREIGN_CLASS) {
            let outer = attrs_from_list(attrs, ParseAttrsFlags::DOC | ParseAttrsFlags::DERIVE)
                .map_err(to_diag)?;
            ret.push(DeclItem::Class(parse_foreign_class(
                src_id, outer, mac.tokens,
            )?));
        } else if mac.path.is_ident(FOREIGN_MODULE) {
            let outer = attrs_from_list(attrs, ParseAttrsFlags::DOC).map_err(to_diag)?;
            ret.push(DeclItem::Module(parse_foreign_module(
                src_id, outer, mac.tokens,
            )?));
        } else {
            return Err(DiagnosticError::new(
                src_id,
                mac.path.span(),
                format!(
                    "unknown macro {}!, expect {}! or {}!",
                    DisplayToTokens(&mac.path),
                    FOREIGN_CLASS,
                    FOREIGN_MODULE
                ),
            ));
        }
    }
    Ok(ret)
}

/// `outer` are attributes written before `foreign_class!`,
/// they go before the ones inside the macro
fn parse_foreign_class(
    src_id: SourceId,
    outer: Attrs,
    tokens: proc_macro2::TokenStream,
) -> Result<ForeignClassInfo> {
    let parser = |input: ParseStream| do_parse_foreign_class(input, outer);
    let mut class = parser
        .parse2(tokens)
        .map_err(|err| DiagnosticError::from_syn_err(src_id, err))?;
    class.src_id = src_id;
    Ok(class)
}

fn parse_foreign_module(
    src_id: SourceId,
    outer: Attrs,
    tokens: proc_macro2::TokenStream,
) -> Result<ForeignModuleInfo> {
    let parser = |input: ParseStream| do_parse_foreign_module(input, outer);
    let mut module = parser
        .parse2(tokens)
        .map_err(|err| DiagnosticError::from_syn_err(src_id, err))?;
    module.src_id = src_id;
    Ok(module)
}

mod kw {
    use syn::custom_keyword;

    custom_keyword!(class);
    custom_keyword!(module);
    custom_keyword!(alias);
    custom_keyword!(init);
    custom_keyword!(constructor);
    custom_keyword!(self_type);
}

#[derive(Default)]
struct Attrs {
    doc_comments: Vec<String>,
    derive_list: Vec<String>,
}

bitflags! {
    struct ParseAttrsFlags: u8 {
        const DOC = 1;
        const DERIVE = 2;
    }
}

fn parse_attrs(input: ParseStream, flags: ParseAttrsFlags) -> syn::Result<Attrs> {
    if input.fork().call(syn::Attribute::parse_outer).is_ok() {
        let attrs = input.call(syn::Attribute::parse_outer)?;
        attrs_from_list(attrs, flags)
    } else {
        Ok(Attrs::default())
    }
}

fn attrs_from_list(attrs: Vec<syn::Attribute>, flags: ParseAttrsFlags) -> syn::Result<Attrs> {
    let mut doc_comments = vec![];
    let mut derive_list = vec![];
    for a in attrs {
        match a.meta {
            syn::Meta::NameValue(syn::MetaNameValue {
                ref path,
                value:
                    syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Str(ref lit_str),
                        ..
                    }),
                ..
            }) if path.is_ident("doc") && flags.contains(ParseAttrsFlags::DOC) => {
                doc_comments.push(lit_str.value());
            }
            syn::Meta::List(ref list)
                if list.path.is_ident("derive") && flags.contains(ParseAttrsFlags::DERIVE) =>
            {
                let args =
                    list.parse_args_with(Punctuated::<Ident, Token![,]>::parse_terminated)?;
                for arg in args {
                    derive_list.push(arg.to_string());
                }
            }
            _ => {
                return Err(syn::Error::new(
                    a.span(),
                    format!(
                        "Expect doc attribute or doc comment or derive here, got '{}'",
                        DisplayToTokens(&a.meta)
                    ),
                ));
            }
        }
    }
    Ok(Attrs {
        doc_comments,
        derive_list,
    })
}

fn do_parse_foreign_class(input: ParseStream, outer: Attrs) -> syn::Result<ForeignClassInfo> {
    let Attrs {
        doc_comments: mut class_doc_comments,
        mut derive_list,
    } = outer;
    let inner = parse_attrs(input, ParseAttrsFlags::DOC | ParseAttrsFlags::DERIVE)?;
    class_doc_comments.extend(inner.doc_comments);
    derive_list.extend(inner.derive_list);
    debug!("parse_foreign_class: class comment {class_doc_comments:?}");

    input.parse::<kw::class>()?;
    let class_name: Ident = input.parse()?;
    debug!("class_name {class_name:?}");
    let content;
    braced!(content in input);

    let mut rust_self_type: Option<Type> = None;
    let mut constructor_ret_type: Option<Type> = None;
    let mut methods = Vec::with_capacity(10);

    while !content.is_empty() {
        let Attrs {
            doc_comments: method_doc_comments,
            ..
        } = parse_attrs(&content, ParseAttrsFlags::DOC)?;

        if content.peek(kw::self_type) {
            let kw_tok = content.parse::<kw::self_type>()?;
            if rust_self_type.is_some() {
                return Err(syn::Error::new(kw_tok.span, "self_type defined twice"));
            }
            let ty: Type = content.parse()?;
            debug!("self_type: {}", DisplayToTokens(&ty));
            content.parse::<Token![;]>()?;
            rust_self_type = Some(ty);
            continue;
        }

        let variant = if content.peek(kw::constructor) {
            content.parse::<kw::constructor>()?;
            MethodVariant::Constructor
        } else if content.peek(Token![fn]) {
            content.parse::<Token![fn]>()?;
            // real variant known after arguments parsing
            MethodVariant::StaticMethod
        } else {
            return Err(content.error("expect 'self_type', 'constructor' or 'fn' here"));
        };
        let mut method = parse_fn_item(&content, variant, method_doc_comments)?;
        if method.variant == MethodVariant::StaticMethod {
            method.variant = fn_variant_by_args(&method.fn_decl);
        }

        if method.variant == MethodVariant::Constructor {
            if method.name_alias.is_some() {
                return Err(syn::Error::new(
                    method.span(),
                    "alias not supported for 'constructor'",
                ));
            }
            let ret_type = match method.fn_decl.output {
                syn::ReturnType::Type(_, ref ty) => (**ty).clone(),
                syn::ReturnType::Default => {
                    return Err(syn::Error::new(
                        method.span(),
                        format!("{}: constructor should return value", class_name),
                    ));
                }
            };
            if let Some(ref constructor_ret_type) = constructor_ret_type {
                debug!(
                    "second constructor, ret type: {}",
                    DisplayToTokens(constructor_ret_type)
                );
                if normalize_type(constructor_ret_type) != normalize_type(&ret_type) {
                    return Err(syn::Error::new(
                        ret_type.span(),
                        format!(
                            "mismatched types of constructors: got {} expect {}",
                            DisplayToTokens(&ret_type),
                            DisplayToTokens(constructor_ret_type)
                        ),
                    ));
                }
            } else {
                debug!(
                    "first constructor for {}, ret type {}",
                    class_name,
                    DisplayToTokens(&ret_type)
                );
                constructor_ret_type = Some(ret_type);
            }
        }
        methods.push(method);
    }

    if let (Some(self_type), Some(ret_type)) = (&rust_self_type, &constructor_ret_type) {
        if normalize_type(self_type) != normalize_type(ret_type) {
            return Err(syn::Error::new(
                ret_type.span(),
                format!(
                    "constructor should return self_type {}, got {}",
                    DisplayToTokens(self_type),
                    DisplayToTokens(ret_type)
                ),
            ));
        }
    }

    if let Some(pos) = derive_list.iter().position(|x| x == CAMEL_CASE_ALIASES) {
        derive_list.remove(pos);
        for m in &mut methods {
            if m.name_alias.is_none() && m.variant != MethodVariant::Constructor {
                let short_name = m.short_name();
                m.name_alias = Some(Ident::new(
                    &short_name.to_lower_camel_case(),
                    m.rust_id.span(),
                ));
            }
        }
    }
    if let Some(unknown) = derive_list.first() {
        return Err(syn::Error::new(
            class_name.span(),
            format!("class {}: has unknown derive attribute {}", class_name, unknown),
        ));
    }

    Ok(ForeignClassInfo {
        src_id: SourceId::none(),
        name: class_name,
        methods,
        self_type: rust_self_type,
        constructor_ret_type,
        doc_comments: class_doc_comments,
    })
}

fn do_parse_foreign_module(input: ParseStream, outer: Attrs) -> syn::Result<ForeignModuleInfo> {
    let mut module_doc_comments = outer.doc_comments;
    module_doc_comments.extend(parse_attrs(input, ParseAttrsFlags::DOC)?.doc_comments);
    input.parse::<kw::module>()?;
    let module_name: Ident = input.parse()?;
    debug!("module_name {module_name:?}");
    let content;
    braced!(content in input);

    let mut items = Vec::with_capacity(10);
    while !content.is_empty() {
        let Attrs {
            doc_comments: item_doc_comments,
            ..
        } = parse_attrs(&content, ParseAttrsFlags::DOC)?;
        let mut item = if content.peek(kw::init) {
            content.parse::<kw::init>()?;
            let item = parse_fn_item(&content, MethodVariant::Init, item_doc_comments)?;
            match item.fn_decl.output {
                syn::ReturnType::Type(_, ref ty) if !matches!(**ty, Type::Reference(_)) => {}
                _ => {
                    return Err(syn::Error::new(
                        item.span(),
                        "init should return native value by value",
                    ));
                }
            }
            item
        } else if content.peek(Token![fn]) {
            content.parse::<Token![fn]>()?;
            parse_fn_item(&content, MethodVariant::StaticMethod, item_doc_comments)?
        } else {
            return Err(content.error("expect 'fn' or 'init' here"));
        };
        if item.variant == MethodVariant::StaticMethod {
            item.variant = fn_variant_by_args(&item.fn_decl);
        }
        items.push(item);
    }
    Ok(ForeignModuleInfo {
        src_id: SourceId::none(),
        name: module_name,
        items,
        doc_comments: module_doc_comments,
    })
}

fn fn_variant_by_args(fn_decl: &FnDecl) -> MethodVariant {
    match fn_decl.inputs.first() {
        Some(FnArg::SelfArg(_, self_variant)) => MethodVariant::Method(*self_variant),
        _ => MethodVariant::StaticMethod,
    }
}

/// `Path(args) -> Ret; [alias name;]`
fn parse_fn_item(
    content: ParseStream,
    variant: MethodVariant,
    doc_comments: Vec<String>,
) -> syn::Result<ForeignMethod> {
    let func_name: syn::Path = content.call(syn::Path::parse_mod_style)?;
    debug!("func_name {}", DisplayToTokens(&func_name));
    let args_parser;
    parenthesized!(args_parser in content);
    let args_in: Punctuated<syn::FnArg, Token![,]> =
        args_parser.parse_terminated(syn::FnArg::parse, Token![,])?;
    let inputs = parse_fn_args(args_in)?;
    match variant {
        MethodVariant::Constructor | MethodVariant::Init => {
            if inputs.iter().any(|x| matches!(x, FnArg::SelfArg(..))) {
                return Err(syn::Error::new(
                    func_name.span(),
                    "constructor or init should not contain self argument",
                ));
            }
        }
        MethodVariant::Method(_) | MethodVariant::StaticMethod => {
            if let Some(pos) = inputs.iter().position(|x| matches!(x, FnArg::SelfArg(..))) {
                if pos != 0 {
                    return Err(syn::Error::new(
                        func_name.span(),
                        "self argument should be the first one",
                    ));
                }
            }
        }
    }
    let output: syn::ReturnType = content.parse()?;
    debug!("out_type {}", DisplayToTokens(&output));
    content.parse::<Token![;]>()?;

    let mut name_alias = None;
    if content.peek(kw::alias) {
        content.parse::<kw::alias>()?;
        name_alias = Some(content.parse::<Ident>()?);
        debug!("we have ALIAS `{:?}`", name_alias);
        content.parse::<Token![;]>()?;
    }
    if func_name.segments.is_empty() {
        return Err(syn::Error::new(func_name.span(), "function name is empty"));
    }
    Ok(ForeignMethod {
        variant,
        rust_id: func_name,
        fn_decl: FnDecl { inputs, output },
        name_alias,
        doc_comments,
    })
}

pub(crate) fn parse_fn_args(args: Punctuated<syn::FnArg, Token![,]>) -> syn::Result<Vec<FnArg>> {
    let mut ret = Vec::with_capacity(args.len());
    let mut args_names = FxHashSet::<SmolStr>::default();
    for arg in args {
        use syn::FnArg::*;
        let fn_arg = match arg {
            Receiver(syn::Receiver {
                self_token,
                reference: Some(_),
                ref mutability,
                ..
            }) => FnArg::SelfArg(
                self_token.span(),
                if mutability.is_some() {
                    SelfTypeVariant::RptrMut
                } else {
                    SelfTypeVariant::Rptr
                },
            ),
            Receiver(syn::Receiver {
                self_token,
                reference: None,
                ref mutability,
                ..
            }) => FnArg::SelfArg(
                self_token.span(),
                if mutability.is_some() {
                    SelfTypeVariant::Mut
                } else {
                    SelfTypeVariant::Default
                },
            ),
            Typed(typed_arg) => {
                let (name, span): (SmolStr, Span) = match *typed_arg.pat {
                    syn::Pat::Ident(pat_ident) => {
                        (pat_ident.ident.to_string().into(), pat_ident.ident.span())
                    }
                    syn::Pat::Wild(w) => ("_".into(), w.span()),
                    ref pat => {
                        return Err(syn::Error::new(
                            pat.span(),
                            "Invalid function argument, should be 'name: type' or '_: type'",
                        ));
                    }
                };
                if name != "_" {
                    if args_names.contains(name.as_str()) {
                        return Err(syn::Error::new(
                            span,
                            format!("duplicate argument name '{}'", name),
                        ));
                    }
                    args_names.insert(name.clone());
                }
                FnArg::Default(NamedArg {
                    name,
                    ty: *typed_arg.ty,
                })
            }
        };
        ret.push(fn_arg);
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Result<Vec<DeclItem>> {
        let _ = env_logger::try_init();
        parse_declarations(SourceId::none(), code)
    }

    #[test]
    fn test_parse_class() {
        let items = parse(
            r#"
foreign_class!(
/// Record with one string
class Simple {
    self_type Simple;
    constructor Simple::new(s: &str) -> Simple;
    /// content of record
    fn Simple::content(&self) -> String;
    fn Simple::set_content(&mut self, _: &str);
    fn Simple::default_text() -> String; alias default_content;
});
"#,
        )
        .unwrap();
        assert_eq!(1, items.len());
        let class = match &items[0] {
            DeclItem::Class(x) => x,
            DeclItem::Module(_) => panic!("expect class"),
        };
        assert_eq!("Simple", class.name.to_string());
        assert_eq!(vec![" Record with one string".to_string()], class.doc_comments);
        assert_eq!(4, class.methods.len());
        assert_eq!(MethodVariant::Constructor, class.methods[0].variant);
        assert_eq!(
            MethodVariant::Method(SelfTypeVariant::Rptr),
            class.methods[1].variant
        );
        assert_eq!(1, class.methods[1].doc_comments.len());
        assert_eq!(
            MethodVariant::Method(SelfTypeVariant::RptrMut),
            class.methods[2].variant
        );
        assert_eq!(MethodVariant::StaticMethod, class.methods[3].variant);
        assert_eq!("default_content", class.methods[3].short_name());
        class.validate_class().unwrap();
    }

    #[test]
    fn test_parse_module() {
        let items = parse(
            r#"
foreign_module!(module m2 {
    init Complicated::new(s: &Simple) -> Complicated;
    alias init1;
    init Complicated::with_n(s: &Simple, n: i32) -> Complicated;
    alias init1;
    fn Complicated::get_n(&self) -> i32;
    fn wrap_int_ref(x: &mut i32) -> &mut i32;
});
"#,
        )
        .unwrap();
        let module = match &items[0] {
            DeclItem::Module(x) => x,
            DeclItem::Class(_) => panic!("expect module"),
        };
        assert_eq!("m2", module.name.to_string());
        assert_eq!(4, module.items.len());
        assert_eq!(MethodVariant::Init, module.items[0].variant);
        assert_eq!("init1", module.items[0].short_name());
        assert_eq!("init1", module.items[1].short_name());
        assert_eq!(
            MethodVariant::Method(SelfTypeVariant::Rptr),
            module.items[2].variant
        );
        assert_eq!("get_n", module.items[2].short_name());
        assert_eq!(MethodVariant::StaticMethod, module.items[3].variant);
    }

    #[test]
    fn test_camel_case_aliases() {
        let items = parse(
            r#"
foreign_class!(
#[derive(camelCaseAliases)]
class Foo {
    self_type Foo;
    constructor Foo::new() -> Foo;
    fn Foo::get_n(&self) -> i32;
    fn Foo::set_n(&mut self, n: i32); alias put;
});
"#,
        )
        .unwrap();
        let class = match &items[0] {
            DeclItem::Class(x) => x,
            DeclItem::Module(_) => panic!("expect class"),
        };
        assert!(class.methods[0].name_alias.is_none());
        assert_eq!("getN", class.methods[1].short_name());
        assert_eq!("put", class.methods[2].short_name());
    }

    #[test]
    fn test_attrs_before_macro() {
        let items = parse(
            r#"
/// Module doc
foreign_module!(
/// more
module m {
    fn f() -> i32;
});

/// Outer
#[derive(camelCaseAliases)]
foreign_class!(
/// inner
class Foo {
    self_type Foo;
    fn Foo::get_n(&self) -> i32;
});
"#,
        )
        .unwrap();
        assert_eq!(2, items.len());
        match &items[0] {
            DeclItem::Module(module) => assert_eq!(
                vec![" Module doc".to_string(), " more".to_string()],
                module.doc_comments
            ),
            DeclItem::Class(_) => panic!("expect module"),
        }
        match &items[1] {
            DeclItem::Class(class) => {
                assert_eq!(
                    vec![" Outer".to_string(), " inner".to_string()],
                    class.doc_comments
                );
                assert_eq!("getN", class.methods[0].short_name());
            }
            DeclItem::Module(_) => panic!("expect class"),
        }
        assert!(parse("#[derive(camelCaseAliases)]\nforeign_module!(module m {});").is_err());
        assert!(parse("#[inline]\nforeign_class!(class Foo {});").is_err());
    }

    #[test]
    fn test_parse_errors() {
        let bad = [
            "struct Foo;",
            "other_macro!(class Foo {});",
            "foreign_class!(class Foo { constructor Foo::new(&self) -> Foo; });",
            "foreign_class!(class Foo { self_type Foo; constructor Foo::new(); });",
            "foreign_class!(class Foo { self_type Foo; constructor Foo::new() -> Boo; });",
            "foreign_class!(class Foo { self_type Foo; constructor Foo::new() -> Foo; alias x; });",
            "foreign_class!(#[derive(Unknown)] class Foo { });",
            "foreign_class!(class Foo { fn Foo::f(x: i32, x: i32); });",
            "foreign_class!(class Foo { fn Foo::f(x: i32, &self); });",
            "foreign_module!(module m { init new() -> &Foo; });",
            "foreign_module!(module m { method f(); });",
        ];
        for code in &bad {
            assert!(parse(code).is_err(), "no error for: {}", code);
        }
    }

    #[test]
    fn test_validate_class_without_self_type() {
        let items = parse("foreign_class!(class Foo { fn Foo::f(&self) -> i32; });").unwrap();
        match &items[0] {
            DeclItem::Class(class) => assert!(class.validate_class().is_err()),
            DeclItem::Module(_) => panic!("expect class"),
        }
    }
}
