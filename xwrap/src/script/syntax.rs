use std::rc::Rc;

use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    NotEq,
    Is,
    IsNot,
}

#[derive(Debug, Clone)]
pub(crate) struct LambdaDef {
    pub(crate) params: Vec<SmolStr>,
    pub(crate) body: Expr,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Name(SmolStr),
    Attr(Box<Expr>, SmolStr),
    Call(Box<Expr>, Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Lambda(Rc<LambdaDef>),
}

#[derive(Debug, Clone)]
pub(crate) struct Handler {
    /// exception names, empty for bare `except:`
    pub(crate) kinds: Vec<SmolStr>,
    pub(crate) body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(Expr),
    Assign(SmolStr, Expr),
    Import(Vec<SmolStr>),
    /// `None` for `from m import *`
    FromImport(SmolStr, Option<Vec<SmolStr>>),
    Pass,
    Print(Vec<Expr>),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Handler>,
        orelse: Vec<Stmt>,
    },
}
