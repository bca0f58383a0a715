use std::{cell::RefCell, fmt::Write, rc::Rc};

use log::trace;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::{
    syntax::{CmpOp, Expr, Handler, Literal, Stmt},
    Lambda, Scope,
};
use crate::{
    exception::{CallResult, ExceptionKind, ForeignError},
    runtime::Runtime,
    value::Value,
};

/// Statement execution within one session
pub(crate) struct Interp<'a> {
    pub(crate) rt: &'a Runtime,
    pub(crate) globals: &'a Rc<RefCell<Scope>>,
    pub(crate) out: &'a mut String,
}

impl Interp<'_> {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> CallResult<()> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> CallResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                let value = self.eval(expr)?;
                // interactive echo
                if !value.is_none() {
                    let text = self.rt.repr(&value)?;
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.globals.borrow_mut().insert(name.clone(), value);
            }
            Stmt::Import(names) => {
                for name in names {
                    let module = self.rt.import(name)?;
                    self.globals
                        .borrow_mut()
                        .insert(name.clone(), Value::Module(module));
                }
            }
            Stmt::FromImport(module_name, names) => {
                let module = self.rt.import(module_name)?;
                let names = match names {
                    Some(names) => names.clone(),
                    None => module.public_names(),
                };
                for name in names {
                    let value = module.get(&name).ok_or_else(|| {
                        ForeignError::new(
                            ExceptionKind::ImportError,
                            format!("cannot import name {}", name),
                        )
                    })?;
                    self.globals.borrow_mut().insert(name, value);
                }
            }
            Stmt::Pass => {}
            Stmt::Print(items) => {
                let mut line = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        line.push(' ');
                    }
                    let value = self.eval(item)?;
                    line.push_str(&self.rt.str(&value)?);
                }
                writeln!(self.out, "{}", line).expect(crate::WRITE_TO_MEM_FAILED_MSG);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
            } => match self.exec_block(body) {
                Ok(()) => self.exec_block(orelse)?,
                Err(err) => {
                    let handler = find_handler(handlers, &err)?;
                    match handler {
                        Some(handler) => {
                            trace!("exception {} handled", err);
                            self.exec_block(&handler.body)?;
                        }
                        None => return Err(err),
                    }
                }
            },
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> CallResult<Value> {
        eval_expr(self.rt, self.globals, None, expr)
    }
}

fn find_handler<'a>(handlers: &'a [Handler], err: &ForeignError) -> CallResult<Option<&'a Handler>> {
    for handler in handlers {
        if handler.kinds.is_empty() {
            return Ok(Some(handler));
        }
        for name in &handler.kinds {
            let kind = ExceptionKind::from_name(name).ok_or_else(|| {
                ForeignError::new(
                    ExceptionKind::NameError,
                    format!("name '{}' is not defined", name),
                )
            })?;
            if err.kind.is_caught_by(kind) {
                return Ok(Some(handler));
            }
        }
    }
    Ok(None)
}

pub(crate) fn eval_expr(
    rt: &Runtime,
    globals: &Rc<RefCell<Scope>>,
    locals: Option<&Scope>,
    expr: &Expr,
) -> CallResult<Value> {
    let eval = |e: &Expr| eval_expr(rt, globals, locals, e);
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::None => Value::None,
            Literal::Bool(x) => Value::Bool(*x),
            Literal::Int(x) => Value::Int(*x),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
        }),
        Expr::Name(name) => lookup_name(rt, globals, locals, name),
        Expr::Attr(obj, name) => {
            let obj = eval(obj)?;
            rt.get_attr(&obj, name)
        }
        Expr::Call(callee, args) => {
            let callee = eval(callee)?;
            let args = args.iter().map(eval).collect::<CallResult<Vec<_>>>()?;
            rt.call(&callee, &args)
        }
        Expr::Tuple(items) => Ok(Value::tuple(
            items.iter().map(eval).collect::<CallResult<Vec<_>>>()?,
        )),
        Expr::Dict(items) => {
            let mut ret: Vec<(SmolStr, Value)> = Vec::with_capacity(items.len());
            for (k, v) in items {
                let key = match eval(k)? {
                    Value::Str(s) => s,
                    other => {
                        return Err(ForeignError::type_error(format!(
                            "dict keys should be str, got {}",
                            other.type_name()
                        )));
                    }
                };
                let value = eval(v)?;
                match ret.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => ret.push((key, value)),
                }
            }
            Ok(Value::dict(ret))
        }
        Expr::Neg(operand) => match eval(operand)? {
            Value::Int(x) => x.checked_neg().map(Value::Int).ok_or_else(|| {
                ForeignError::new(ExceptionKind::OverflowError, "integer negation overflow")
            }),
            Value::Bool(x) => Ok(Value::Int(-i64::from(x))),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(ForeignError::type_error(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        },
        Expr::Not(operand) => Ok(Value::Bool(!eval(operand)?.is_truthy())),
        Expr::Compare(lhs, op, rhs) => {
            let (lhs, rhs) = (eval(lhs)?, eval(rhs)?);
            Ok(Value::Bool(match op {
                CmpOp::Eq => lhs.equals(&rhs),
                CmpOp::NotEq => !lhs.equals(&rhs),
                CmpOp::Is => lhs.is_same(&rhs),
                CmpOp::IsNot => !lhs.is_same(&rhs),
            }))
        }
        Expr::Lambda(def) => Ok(Value::Lambda(Rc::new(Lambda {
            def: def.clone(),
            captured: locals.cloned().unwrap_or_default(),
            globals: Rc::downgrade(globals),
        }))),
    }
}

fn lookup_name(
    rt: &Runtime,
    globals: &Rc<RefCell<Scope>>,
    locals: Option<&Scope>,
    name: &str,
) -> CallResult<Value> {
    if let Some(v) = locals.and_then(|x| x.get(name)) {
        return Ok(v.clone());
    }
    if let Some(v) = globals.borrow().get(name) {
        return Ok(v.clone());
    }
    rt.builtins().get(name).ok_or_else(|| {
        ForeignError::new(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        )
    })
}

pub(crate) fn call_lambda(rt: &Runtime, lambda: &Lambda, args: &[Value]) -> CallResult<Value> {
    let params = &lambda.def.params;
    if params.len() != args.len() {
        return Err(ForeignError::type_error(format!(
            "<lambda>() takes exactly {} argument{} ({} given)",
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len()
        )));
    }
    let globals = lambda.globals.upgrade().ok_or_else(|| {
        ForeignError::runtime_error("lambda outlived the session that defined it")
    })?;
    let mut locals: Scope = lambda.captured.clone();
    for (name, value) in params.iter().zip(args.iter()) {
        locals.insert(name.clone(), value.clone());
    }
    eval_expr(rt, &globals, Some(&locals), &lambda.def.body)
}

pub(crate) fn new_scope() -> Rc<RefCell<Scope>> {
    Rc::new(RefCell::new(FxHashMap::default()))
}
