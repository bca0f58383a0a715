//! Object model operations: attribute lookup, calls, instantiation, repr.

use std::{
    cell::{Cell, RefCell},
    fmt::Write,
    rc::Rc,
};

use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use smol_str::SmolStr;

use crate::{
    class::{Class, ClassDef, ClassRegistry, Instance},
    exception::{CallResult, ExceptionKind, ForeignError},
    function::{BoundMethod, CallFrame, Function, FunctionKind, NativeReturn, Param, Signature},
    module::Module,
    native::NativeCell,
    typemap::{ArgType, TypeMap},
    value::{repr_float, repr_str, Value},
    WRITE_TO_MEM_FAILED_MSG,
};

pub(crate) const BUILTINS_MODULE: &str = "builtins";
pub(crate) const MAIN_MODULE: &str = "__main__";
/// Nesting of `Runtime::call`, deeper calls raise `RecursionError`
pub(crate) const MAX_CALL_DEPTH: usize = 64;

/// Everything created from binding declarations, ready to be used from foreign code
pub struct Runtime {
    type_map: TypeMap,
    modules: FxHashMap<SmolStr, Rc<Module>>,
    builtins: Rc<Module>,
    classes: RefCell<ClassRegistry>,
    call_depth: Cell<usize>,
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl Runtime {
    pub(crate) fn new(type_map: TypeMap) -> Runtime {
        Runtime {
            type_map,
            modules: FxHashMap::default(),
            builtins: builtins_module(),
            classes: RefCell::new(ClassRegistry::default()),
            call_depth: Cell::new(0),
        }
    }

    pub(crate) fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    pub(crate) fn type_map_mut(&mut self) -> &mut TypeMap {
        &mut self.type_map
    }

    pub(crate) fn add_module(&mut self, module: Rc<Module>) {
        self.modules.insert(module.name().into(), module);
    }

    pub(crate) fn add_class(&self, def: ClassDef) -> CallResult<Rc<Class>> {
        self.classes.borrow_mut().add(def)
    }

    pub fn import(&self, name: &str) -> CallResult<Rc<Module>> {
        if name == BUILTINS_MODULE {
            return Ok(self.builtins.clone());
        }
        self.modules.get(name).cloned().ok_or_else(|| {
            ForeignError::new(
                ExceptionKind::ImportError,
                format!("No module named {}", name),
            )
        })
    }

    pub fn builtins(&self) -> &Rc<Module> {
        &self.builtins
    }

    pub fn module_names(&self) -> Vec<SmolStr> {
        let mut names: Vec<SmolStr> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    fn enter_call(&self) -> CallResult<DepthGuard<'_>> {
        let depth = self.call_depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(ForeignError::new(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.call_depth.set(depth + 1);
        Ok(DepthGuard(&self.call_depth))
    }

    pub fn call(&self, callee: &Value, args: &[Value]) -> CallResult<Value> {
        let _guard = self.enter_call()?;
        match callee {
            Value::Function(f) => f.call(self, args),
            Value::BoundMethod(m) => {
                let mut full_args: SmallVec<[Value; 4]> = smallvec![m.receiver.clone()];
                full_args.extend(args.iter().cloned());
                self.call(&m.func, &full_args)
            }
            Value::Lambda(l) => l.call(self, args),
            Value::Class(c) => self.instantiate(c, args),
            _ => Err(ForeignError::type_error(format!(
                "'{}' object is not callable",
                callee.type_name()
            ))),
        }
    }

    pub fn call_method(&self, obj: &Value, name: &str, args: &[Value]) -> CallResult<Value> {
        let method = self.get_attr(obj, name)?;
        self.call(&method, args)
    }

    fn instantiate(&self, class: &Rc<Class>, args: &[Value]) -> CallResult<Value> {
        trace!("instantiate {} with {} args", class.name(), args.len());
        let inst = Instance::new(class.clone());
        let obj = Value::Instance(inst.clone());
        match class.lookup("__init__") {
            Some(init) => {
                let mut full_args: SmallVec<[Value; 4]> = smallvec![obj.clone()];
                full_args.extend(args.iter().cloned());
                self.call(&init, &full_args)?;
            }
            None if class.native_type().is_some() => {
                return Err(ForeignError::type_error(format!(
                    "{} cannot be instantiated from foreign code, it has no constructor",
                    class.qualified_name()
                )));
            }
            None if !args.is_empty() => {
                return Err(ForeignError::type_error(format!(
                    "{}() takes no arguments ({} given)",
                    class.name(),
                    args.len()
                )));
            }
            None => {}
        }
        if let Some(native_type) = class.native_type() {
            if inst.native().is_none() {
                return Err(ForeignError::type_error(format!(
                    "{}.__init__ did not create native {} value",
                    class.name(),
                    native_type
                )));
            }
        }
        Ok(obj)
    }

    /// Store result of native init function into instance being created
    pub(crate) fn fill_instance(
        &self,
        inst: &Rc<Instance>,
        ret_ty: &ArgType,
        ret: NativeReturn,
    ) -> CallResult<()> {
        let class = inst.class();
        let native_type = class.native_type().ok_or_else(|| {
            ForeignError::type_error(format!(
                "{} is not backed by native type, it can't hold {}",
                class.name(),
                ret_ty.base
            ))
        })?;
        if native_type != ret_ty.base {
            return Err(ForeignError::type_error(format!(
                "__init__ creates {}, but {} holds {}",
                ret_ty.base,
                class.name(),
                native_type
            )));
        }
        match ret {
            NativeReturn::Value(boxed) => {
                let expected = self.type_map.find(&ret_ty.base).map(|x| x.type_id);
                if expected != Some((*boxed).type_id()) {
                    return Err(ForeignError::runtime_error(format!(
                        "init implementation returned value of wrong type, expected {}",
                        ret_ty.base
                    )));
                }
                debug!("fill_instance: {} with {}", class.name(), ret_ty.base);
                inst.set_native(NativeCell::from_boxed(ret_ty.base.clone(), boxed));
                Ok(())
            }
            other => Err(ForeignError::runtime_error(format!(
                "init implementation should return native value, got {:?}",
                other
            ))),
        }
    }

    pub fn get_attr(&self, obj: &Value, name: &str) -> CallResult<Value> {
        match obj {
            Value::Instance(inst) => {
                if name == "__class__" {
                    return Ok(Value::Class(inst.class().clone()));
                }
                let attr = inst.class().lookup(name).ok_or_else(|| {
                    ForeignError::attribute_error(format!(
                        "'{}' object has no attribute '{}'",
                        inst.class().name(),
                        name
                    ))
                })?;
                Ok(bind_to(obj, attr))
            }
            Value::Class(class) => match name {
                "__name__" => Ok(Value::str(class.name())),
                "__module__" => Ok(Value::str(class.module())),
                "__doc__" => Ok(class.doc().map_or(Value::None, Value::str)),
                "__bases__" => Ok(Value::tuple(
                    class.bases().iter().map(|x| Value::Class(x.clone())),
                )),
                _ => class.lookup(name).ok_or_else(|| {
                    ForeignError::attribute_error(format!(
                        "type object '{}' has no attribute '{}'",
                        class.name(),
                        name
                    ))
                }),
            },
            Value::Module(module) => match name {
                "__name__" => Ok(Value::str(module.name())),
                "__doc__" => Ok(module.doc().map_or(Value::None, Value::str)),
                _ => module.get(name).ok_or_else(|| {
                    ForeignError::attribute_error(format!(
                        "'module' object '{}' has no attribute '{}'",
                        module.name(),
                        name
                    ))
                }),
            },
            Value::Function(f) if name == "__name__" => Ok(Value::str(f.name())),
            Value::Function(f) if name == "__doc__" => Ok(f.doc().map_or(Value::None, Value::str)),
            _ => Err(ForeignError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                obj.type_name(),
                name
            ))),
        }
    }

    pub fn isinstance(&self, obj: &Value, class_or_tuple: &Value) -> CallResult<bool> {
        match class_or_tuple {
            Value::Class(class) => Ok(match obj {
                Value::Instance(inst) => inst.class().is_subclass_of(class),
                _ => false,
            }),
            Value::Tuple(items) => {
                for item in items.iter() {
                    if self.isinstance(obj, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(ForeignError::type_error(format!(
                "isinstance() arg 2 must be a class or tuple of classes, not {}",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self, obj: &Value) -> CallResult<i64> {
        let n = match obj {
            Value::Str(s) => s.chars().count(),
            Value::Tuple(items) => items.len(),
            Value::Dict(items) => items.borrow().len(),
            Value::Instance(inst) if inst.class().lookup("__len__").is_some() => {
                return self.call_method(obj, "__len__", &[])?.as_int();
            }
            _ => {
                return Err(ForeignError::type_error(format!(
                    "object of type '{}' has no len()",
                    obj.type_name()
                )));
            }
        };
        Ok(n as i64)
    }

    /// `xclass(name, bases, dict)`: create class at run time
    pub fn create_class(&self, name: &Value, bases: &Value, dict: &Value) -> CallResult<Value> {
        let name = name.as_str().map_err(|_| {
            ForeignError::type_error(format!(
                "xclass() argument 1 must be str, not {}",
                name.type_name()
            ))
        })?;
        let bases = match bases {
            Value::Tuple(items) => items
                .iter()
                .map(|x| match x {
                    Value::Class(c) => Ok(c.clone()),
                    other => Err(ForeignError::type_error(format!(
                        "xclass() bases must be classes, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<CallResult<Vec<_>>>()?,
            other => {
                return Err(ForeignError::type_error(format!(
                    "xclass() argument 2 must be tuple, not {}",
                    other.type_name()
                )));
            }
        };
        for (i, base) in bases.iter().enumerate() {
            if bases[..i].iter().any(|x| Rc::ptr_eq(x, base)) {
                return Err(ForeignError::type_error(format!(
                    "duplicate base class {}",
                    base.name()
                )));
            }
        }
        let dict = match dict {
            Value::Dict(items) => items.borrow().clone(),
            other => {
                return Err(ForeignError::type_error(format!(
                    "xclass() argument 3 must be dict, not {}",
                    other.type_name()
                )));
            }
        };
        let doc = dict
            .iter()
            .find(|(k, _)| k == "__doc__")
            .and_then(|(_, v)| v.as_str().ok().map(String::from));
        let class = self.add_class(ClassDef {
            name: name.into(),
            module: MAIN_MODULE.into(),
            bases,
            dict,
            native_type: None,
            doc,
        })?;
        Ok(Value::Class(class))
    }

    pub fn repr(&self, obj: &Value) -> CallResult<String> {
        let mut out = String::new();
        self.write_repr(&mut out, obj)?;
        Ok(out)
    }

    /// `print` form: strings without quotes
    pub fn str(&self, obj: &Value) -> CallResult<String> {
        match obj {
            Value::Str(s) => Ok(s.to_string()),
            _ => self.repr(obj),
        }
    }

    fn write_repr(&self, out: &mut String, obj: &Value) -> CallResult<()> {
        match obj {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(x) => write!(out, "{}", x).expect(WRITE_TO_MEM_FAILED_MSG),
            Value::Float(x) => out.push_str(&repr_float(*x)),
            Value::Str(s) => out.push_str(&repr_str(s)),
            Value::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_repr(out, item)?;
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(items) => {
                out.push('{');
                for (i, (k, v)) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&repr_str(k));
                    out.push_str(": ");
                    self.write_repr(out, v)?;
                }
                out.push('}');
            }
            Value::Module(m) => write!(out, "<module '{}'>", m.name()).expect(WRITE_TO_MEM_FAILED_MSG),
            Value::Class(c) => {
                write!(out, "<class '{}'>", c.qualified_name()).expect(WRITE_TO_MEM_FAILED_MSG)
            }
            Value::Instance(inst) => {
                if inst.class().lookup("__repr__").is_some() {
                    match self.call_method(obj, "__repr__", &[])? {
                        Value::Str(s) => out.push_str(&s),
                        other => {
                            return Err(ForeignError::type_error(format!(
                                "__repr__ returned non-string (type {})",
                                other.type_name()
                            )));
                        }
                    }
                } else {
                    write!(out, "<{} object>", inst.class().qualified_name())
                        .expect(WRITE_TO_MEM_FAILED_MSG);
                }
            }
            Value::Function(f) => {
                write!(out, "<built-in function {}>", f.name()).expect(WRITE_TO_MEM_FAILED_MSG)
            }
            Value::BoundMethod(m) => {
                let fname: &str = match &m.func {
                    Value::Function(f) => f.name(),
                    _ => "<lambda>",
                };
                write!(out, "<bound method {}.{} of ", m.receiver.type_name(), fname)
                    .expect(WRITE_TO_MEM_FAILED_MSG);
                self.write_repr(out, &m.receiver)?;
                out.push('>');
            }
            Value::Lambda(_) => out.push_str("<function <lambda>>"),
        }
        Ok(())
    }
}

/// Methods and lambdas found on class are bound to instance
fn bind_to(receiver: &Value, attr: Value) -> Value {
    let binds = match &attr {
        Value::Function(f) => f.binds_to_instance(),
        Value::Lambda(_) => true,
        _ => false,
    };
    if binds {
        Value::BoundMethod(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            func: attr,
        }))
    } else {
        attr
    }
}

fn builtin<F>(name: &str, params: &[&str], imp: F) -> (SmolStr, Value)
where
    F: Fn(&mut CallFrame) -> CallResult<NativeReturn> + 'static,
{
    let mut func = Function::new(name.into(), FunctionKind::Function, None);
    func.add_overload(
        Signature {
            rust_path: format!("{}::{}", BUILTINS_MODULE, name).into(),
            params: params
                .iter()
                .map(|x| Param {
                    name: (*x).into(),
                    ty: ArgType::object(),
                })
                .collect(),
            ret: ArgType::object(),
        },
        Rc::new(imp),
    );
    (name.into(), Value::Function(Rc::new(func)))
}

fn builtins_module() -> Rc<Module> {
    let module = Module::new(BUILTINS_MODULE.into(), None);
    let items = [
        builtin("xclass", &["name", "bases", "dict"], |frame| {
            let rt = frame.runtime();
            let class = rt.create_class(&frame.object(0)?, &frame.object(1)?, &frame.object(2)?)?;
            Ok(class.into())
        }),
        builtin("repr", &["obj"], |frame| {
            let text = frame.runtime().repr(&frame.object(0)?)?;
            Ok(Value::from(text).into())
        }),
        builtin("isinstance", &["obj", "class_or_tuple"], |frame| {
            let ret = frame
                .runtime()
                .isinstance(&frame.object(0)?, &frame.object(1)?)?;
            Ok(Value::Bool(ret).into())
        }),
        builtin("len", &["obj"], |frame| {
            let n = frame.runtime().len(&frame.object(0)?)?;
            Ok(Value::Int(n).into())
        }),
    ];
    for (name, value) in items {
        module.set(name, value);
    }
    Rc::new(module)
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.module_names())
            .field("classes", &self.classes.borrow().len())
            .finish()
    }
}
