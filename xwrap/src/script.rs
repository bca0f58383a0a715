//! Small Python-like language used to drive the runtime from doctest scripts.

mod eval;
mod lexer;
mod parser;
mod syntax;

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use log::debug;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{exception::CallResult, runtime::Runtime, value::Value};

pub(crate) type Scope = FxHashMap<SmolStr, Value>;

/// `lambda params: body`
pub struct Lambda {
    def: Rc<syntax::LambdaDef>,
    captured: Scope,
    globals: Weak<RefCell<Scope>>,
}

impl Lambda {
    pub(crate) fn call(&self, rt: &Runtime, args: &[Value]) -> CallResult<Value> {
        eval::call_lambda(rt, self, args)
    }

    pub fn arity(&self) -> usize {
        self.def.params.len()
    }
}

/// Interpreter state shared by consecutive `run` calls, like interactive prompt
pub struct Session<'rt> {
    rt: &'rt Runtime,
    globals: Rc<RefCell<Scope>>,
    out: String,
}

impl<'rt> Session<'rt> {
    pub fn new(rt: &'rt Runtime) -> Self {
        Session {
            rt,
            globals: eval::new_scope(),
            out: String::new(),
        }
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.rt
    }

    /// Execute source, expression statements echo `repr` of result into output
    pub fn run(&mut self, source: &str) -> CallResult<()> {
        let program = parser::parse_program(source)?;
        debug!("Session::run: {} statements", program.len());
        let mut interp = eval::Interp {
            rt: self.rt,
            globals: &self.globals,
            out: &mut self.out,
        };
        interp.exec_block(&program)
    }

    /// Evaluate one expression without echo
    pub fn eval(&self, source: &str) -> CallResult<Value> {
        let program = parser::parse_program(source)?;
        match program.as_slice() {
            [syntax::Stmt::Expr(expr)] => eval::eval_expr(self.rt, &self.globals, None, expr),
            _ => Err(crate::exception::ForeignError::new(
                crate::exception::ExceptionKind::SyntaxError,
                "expected single expression",
            )),
        }
    }

    /// Output printed since previous call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.into(), value);
    }
}
