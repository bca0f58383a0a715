//! xwrap exposes native Rust values to a small dynamic object model.
//!
//! Native surfaces are declared with `foreign_class!` and `foreign_module!`
//! in Rust syntax, implementations are bound with [`Bindings::bind_fn`],
//! and the resulting [`Runtime`] lets foreign code create, pass and derive
//! from wrapped values under by-value, `&mut` and `&` disciplines.
//!
//! ```
//! use xwrap::{Bindings, NativeReturn, Session};
//!
//! #[derive(Clone)]
//! struct Counter(i64);
//!
//! let rt = Bindings::new()
//!     .bind_type::<Counter>("Counter")
//!     .declare(
//!         "counter.rs.in",
//!         r#"
//! foreign_class!(class Counter {
//!     self_type Counter;
//!     constructor Counter::new(start: i64) -> Counter;
//!     fn Counter::incr(&mut self) -> i64;
//! });
//! foreign_module!(module counter {});
//! "#,
//!     )
//!     .bind_fn("Counter::new", |frame| {
//!         let start: i64 = frame.value(0)?;
//!         Ok(NativeReturn::value(Counter(start)))
//!     })
//!     .bind_fn("Counter::incr", |frame| {
//!         let mut counter = frame.borrow_mut::<Counter>(0)?;
//!         counter.0 += 1;
//!         Ok(NativeReturn::value(counter.0))
//!     })
//!     .build()?;
//! let mut session = Session::new(&rt);
//! session.run("from counter import Counter\nc = Counter(41)\nc.incr()\n")?;
//! assert_eq!("42\n", session.take_output());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod class;
mod code_parse;
mod comments;
mod convert;
mod doctest;
mod error;
mod exception;
mod function;
mod module;
mod namegen;
mod native;
mod runtime;
mod script;
mod source_registry;
#[cfg(test)]
mod test_helper;
mod typemap;
mod types;
mod value;

use std::{any::Any, rc::Rc};

use log::{debug, warn};
use proc_macro2::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use smol_str::SmolStr;
use syn::parse_quote;

pub use crate::{
    class::{Class, Holder, Instance},
    doctest::{
        check_output, parse_examples, DocTestRunner, DoctestConfig, DoctestError, DoctestFlags,
        Example, TestResults,
    },
    error::BuildError,
    exception::{CallResult, ExceptionKind, ForeignError},
    function::{BoundMethod, CallFrame, Function, NativeImpl, NativeReturn},
    module::Module,
    native::NativeCell,
    runtime::Runtime,
    script::{Lambda, Session},
    types::Discipline,
    value::Value,
};
use crate::{
    class::ClassDef,
    code_parse::DeclItem,
    error::{DiagnosticError, Result, SourceIdSpan},
    function::{FunctionKind, Param, Signature},
    source_registry::{SourceId, SourceRegistry},
    typemap::{ty::clone_any, ArgType, TypeMap},
    types::{ForeignClassInfo, ForeignMethod, ForeignModuleInfo, FnArg, MethodVariant, SelfTypeVariant},
};

pub(crate) const FOREIGN_CLASS: &str = "foreign_class";
pub(crate) const FOREIGN_MODULE: &str = "foreign_module";
/// `#[derive(camelCaseAliases)]` on class renames methods to lowerCamelCase
pub(crate) const CAMEL_CASE_ALIASES: &str = "camelCaseAliases";
pub(crate) const WRITE_TO_MEM_FAILED_MSG: &str = "Write to memory buffer failed, no free mem?";

/// Declarations source, `id_of_code` is used in error messages
#[derive(Debug, Clone)]
pub struct SourceCode {
    pub id_of_code: String,
    pub code: String,
}

/// Collect declarations, types and implementations, then `build` runtime
pub struct Bindings {
    sources: SourceRegistry,
    type_map: TypeMap,
    impls: FxHashMap<SmolStr, NativeImpl>,
    /// reported by `build`, to keep builder chainable
    errors: Vec<DiagnosticError>,
}

impl Default for Bindings {
    fn default() -> Self {
        Bindings::new()
    }
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings {
            sources: SourceRegistry::default(),
            type_map: TypeMap::default(),
            impls: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Add source with `foreign_class!`/`foreign_module!` declarations.
    /// Each source defines at most one module, classes of source belong to it.
    pub fn declare<S1: Into<String>, S2: Into<String>>(mut self, id_of_code: S1, code: S2) -> Self {
        let src = SourceCode {
            id_of_code: id_of_code.into(),
            code: code.into(),
        };
        debug!("Bindings::declare {}", src.id_of_code);
        let id = src.id_of_code.clone();
        if self.sources.register(src).is_none() {
            self.errors.push(DiagnosticError::without_span(format!(
                "source {} declared twice",
                id
            )));
        }
        self
    }

    /// Make Rust type usable in declarations under `name`, values can be copied
    pub fn bind_type<T: Any + Clone>(self, name: &str) -> Self {
        self.do_bind_type::<T>(name, Some(clone_any::<T>))
    }

    /// Like `bind_type`, but value can not be passed by value from foreign side
    pub fn bind_opaque_type<T: Any>(self, name: &str) -> Self {
        self.do_bind_type::<T>(name, None)
    }

    fn do_bind_type<T: Any>(mut self, name: &str, clone_fn: Option<typemap::ty::CloneFn>) -> Self {
        if let Err(msg) = self.type_map.bind_type::<T>(name, clone_fn) {
            self.errors.push(DiagnosticError::without_span(msg));
        }
        self
    }

    /// Implementation of declared function, `rust_path` as written in declaration,
    /// for example `Simple::new` or `unwrap_int`
    pub fn bind_fn<F>(mut self, rust_path: &str, imp: F) -> Self
    where
        F: Fn(&mut CallFrame) -> CallResult<NativeReturn> + 'static,
    {
        let path: SmolStr = rust_path.split_whitespace().collect::<String>().into();
        if self.impls.insert(path.clone(), Rc::new(imp)).is_some() {
            self.errors.push(DiagnosticError::without_span(format!(
                "implementation of {} bound twice",
                path
            )));
        }
        self
    }

    pub fn build(self) -> std::result::Result<Runtime, BuildError> {
        let Bindings {
            sources,
            type_map,
            impls,
            errors,
        } = self;
        if let Some(err) = errors.into_iter().next() {
            return Err(BuildError::new(&err, &sources));
        }
        build_runtime(&sources, type_map, &impls).map_err(|err| BuildError::new(&err, &sources))
    }
}

struct SourceDecls {
    module: ForeignModuleInfo,
    classes: Vec<ForeignClassInfo>,
}

fn build_runtime(
    sources: &SourceRegistry,
    mut type_map: TypeMap,
    impls: &FxHashMap<SmolStr, NativeImpl>,
) -> Result<Runtime> {
    let decls = collect_declarations(sources)?;
    for src in &decls {
        for class in &src.classes {
            if let Some(ref self_type) = class.self_type {
                type_map.register_class_type(class.src_id, &class.name, self_type)?;
            }
        }
    }

    let mut rt = Runtime::new(type_map);
    let mut fn_builder = FnBuilder {
        impls,
        used: FxHashSet::default(),
    };
    for src in &decls {
        let module_name: SmolStr = src.module.name.to_string().into();
        let module = Rc::new(Module::new(
            module_name.clone(),
            comments::doc_text(&src.module.doc_comments),
        ));
        for class_info in &src.classes {
            let class = build_class(&mut rt, &mut fn_builder, &module_name, class_info)?;
            module.set(class.name().into(), Value::Class(class));
        }
        let funcs = fn_builder.build_functions(rt.type_map(), src.module.src_id, None, &src.module.items)?;
        for (name, func, span) in funcs {
            if module.contains(&name) {
                return Err(DiagnosticError::new(
                    src.module.src_id,
                    span,
                    format!("module {} already has item with name {}", module_name, name),
                ));
            }
            module.set(name, Value::Function(Rc::new(func)));
        }
        debug!("module {} ready: {:?}", module_name, module.public_names());
        rt.add_module(module);
    }

    let mut unused: Vec<&SmolStr> = impls
        .keys()
        .filter(|x| !fn_builder.used.contains(*x))
        .collect();
    unused.sort();
    for path in unused {
        warn!("implementation of {} bound, but no declaration uses it", path);
    }
    Ok(rt)
}

fn collect_declarations(sources: &SourceRegistry) -> Result<Vec<SourceDecls>> {
    let mut ret = Vec::new();
    let mut class_names = FxHashMap::<SmolStr, SourceIdSpan>::default();
    let mut module_names = FxHashMap::<SmolStr, SourceIdSpan>::default();
    for src_id in sources.ids() {
        let items = code_parse::parse_declarations(src_id, sources.src(src_id))?;
        let mut module: Option<ForeignModuleInfo> = None;
        let mut classes = Vec::new();
        for item in items {
            match item {
                DeclItem::Class(class) => {
                    class.validate_class()?;
                    let name: SmolStr = class.name.to_string().into();
                    if let Some(prev) = class_names.insert(name.clone(), class.src_id_span()) {
                        return Err(DiagnosticError::new2(
                            class.src_id_span(),
                            format!("class {} defined twice", name),
                        )
                        .add_span_note(prev, "previous definition here"));
                    }
                    classes.push(class);
                }
                DeclItem::Module(m) => {
                    let m_span = (m.src_id, m.name.span());
                    if let Some(ref prev) = module {
                        return Err(DiagnosticError::new2(
                            m_span,
                            "only one foreign_module! allowed per source",
                        )
                        .add_span_note((prev.src_id, prev.name.span()), "first module here"));
                    }
                    let name: SmolStr = m.name.to_string().into();
                    if name == runtime::BUILTINS_MODULE || name == runtime::MAIN_MODULE {
                        return Err(DiagnosticError::new2(
                            m_span,
                            format!("module name {} is reserved", name),
                        ));
                    }
                    if let Some(prev) = module_names.insert(name.clone(), m_span) {
                        return Err(DiagnosticError::new2(
                            m_span,
                            format!("module {} defined twice", name),
                        )
                        .add_span_note(prev, "previous definition here"));
                    }
                    module = Some(m);
                }
            }
        }
        match module {
            Some(module) => ret.push(SourceDecls { module, classes }),
            None => {
                if let Some(class) = classes.first() {
                    return Err(DiagnosticError::new2(
                        class.src_id_span(),
                        format!(
                            "class {} has no module, add {}! to the same source",
                            class.name, FOREIGN_MODULE
                        ),
                    ));
                }
            }
        }
    }
    Ok(ret)
}

fn build_class(
    rt: &mut Runtime,
    fn_builder: &mut FnBuilder,
    module_name: &SmolStr,
    class_info: &ForeignClassInfo,
) -> Result<Rc<Class>> {
    let src_id = class_info.src_id;
    let class_name: SmolStr = class_info.name.to_string().into();
    let self_type = match class_info.self_type {
        Some(ref ty) => Some(rt.type_map().resolve(src_id, ty)?),
        None => None,
    };
    let owner = self_type.as_ref().map(|x| ClassOwner {
        name: class_name.clone(),
        self_base: x.base.clone(),
    });
    let funcs =
        fn_builder.build_functions(rt.type_map(), src_id, owner.as_ref(), &class_info.methods)?;
    let dict = funcs
        .into_iter()
        .map(|(name, func, _)| (name, Value::Function(Rc::new(func))))
        .collect();
    let native_type = self_type.map(|x| x.base);
    let class = rt
        .add_class(ClassDef {
            name: class_name,
            module: module_name.clone(),
            bases: Vec::new(),
            dict,
            native_type: native_type.clone(),
            doc: comments::doc_text(&class_info.doc_comments),
        })
        .map_err(|err| DiagnosticError::new2(class_info.src_id_span(), err.message))?;
    if let Some(native_type) = native_type {
        rt.type_map_mut().bind_class(&native_type, class.clone());
    }
    Ok(class)
}

struct ClassOwner {
    name: SmolStr,
    self_base: SmolStr,
}

struct FnBuilder<'a> {
    impls: &'a FxHashMap<SmolStr, NativeImpl>,
    used: FxHashSet<SmolStr>,
}

impl FnBuilder<'_> {
    /// Group items into overload sets by foreign name, keeping declaration order
    fn build_functions(
        &mut self,
        type_map: &TypeMap,
        src_id: SourceId,
        owner: Option<&ClassOwner>,
        items: &[ForeignMethod],
    ) -> Result<Vec<(SmolStr, Function, Span)>> {
        let mut ret: Vec<(SmolStr, Function, Span)> = Vec::with_capacity(items.len());
        for item in items {
            let (name, kind) = match item.variant {
                MethodVariant::Constructor => (SmolStr::from("__init__"), FunctionKind::Init),
                MethodVariant::Init => (item.short_name(), FunctionKind::Init),
                MethodVariant::Method(_) => (item.short_name(), FunctionKind::Method),
                MethodVariant::StaticMethod => (item.short_name(), FunctionKind::Function),
            };
            let sig = self.signature(type_map, src_id, owner, item)?;
            let rust_path = item.rust_path();
            let imp = self.impls.get(&rust_path).cloned().ok_or_else(|| {
                DiagnosticError::new(
                    src_id,
                    item.span(),
                    format!(
                        "no implementation for {}, bind it with Bindings::bind_fn",
                        rust_path
                    ),
                )
            })?;
            self.used.insert(rust_path);
            match ret.iter_mut().find(|x| x.0 == name) {
                Some((_, func, first_span)) => {
                    if func.kind() != kind {
                        return Err(DiagnosticError::new(
                            src_id,
                            item.span(),
                            format!("overloads of {} are of different kinds", name),
                        )
                        .add_span_note((src_id, *first_span), "first overload here"));
                    }
                    debug!("{}: add overload {}", name, sig.rust_path);
                    func.add_overload(sig, imp);
                }
                None => {
                    let mut func =
                        Function::new(name.clone(), kind, comments::doc_text(&item.doc_comments));
                    func.add_overload(sig, imp);
                    ret.push((name, func, item.span()));
                }
            }
        }
        Ok(ret)
    }

    fn signature(
        &self,
        type_map: &TypeMap,
        src_id: SourceId,
        owner: Option<&ClassOwner>,
        item: &ForeignMethod,
    ) -> Result<Signature> {
        let mut params = SmallVec::<[Param; 4]>::new();
        for arg in &item.fn_decl.inputs {
            match arg {
                FnArg::SelfArg(_, variant) => params.push(Param {
                    name: "self".into(),
                    ty: receiver_type(type_map, src_id, owner, item, *variant)?,
                }),
                FnArg::Default(named) => params.push(Param {
                    name: named.name.clone(),
                    ty: type_map.resolve(src_id, &named.ty)?,
                }),
            }
        }
        let ret = type_map.resolve_ret(src_id, &item.fn_decl.output)?;
        if matches!(item.variant, MethodVariant::Constructor | MethodVariant::Init)
            && type_map.find(&ret.base).map_or(true, |x| x.is_builtin())
        {
            return Err(DiagnosticError::new(
                src_id,
                item.span(),
                format!(
                    "{} should create value of type bound with Bindings::bind_type, got {}",
                    item.rust_path(),
                    ret
                ),
            ));
        }
        Ok(Signature {
            rust_path: item.rust_path(),
            params,
            ret,
        })
    }
}

/// Type of `self`: class self type, or for module items type named by path,
/// `Complicated::get_n` means `Complicated`
fn receiver_type(
    type_map: &TypeMap,
    src_id: SourceId,
    owner: Option<&ClassOwner>,
    item: &ForeignMethod,
    variant: SelfTypeVariant,
) -> Result<ArgType> {
    let mut arg = match owner {
        Some(owner) => ArgType {
            base: owner.self_base.clone(),
            discipline: Discipline::Value,
            class_name: Some(owner.name.clone()),
            display: owner.name.clone(),
        },
        None => {
            let n = item.rust_id.segments.len();
            if n < 2 {
                return Err(DiagnosticError::new(
                    src_id,
                    item.span(),
                    format!(
                        "can not find type of self for {}, write it as Type::method",
                        item.rust_path()
                    ),
                ));
            }
            let type_ident = &item.rust_id.segments[n - 2].ident;
            let ty: syn::Type = parse_quote!(#type_ident);
            type_map.resolve(src_id, &ty)?
        }
    };
    arg.discipline = variant.discipline();
    arg.display = match arg.discipline {
        Discipline::Value => arg.display.clone(),
        Discipline::ConstRef => format!("&{}", arg.display).into(),
        Discipline::MutRef => format!("&mut {}", arg.display).into(),
    };
    Ok(arg)
}
