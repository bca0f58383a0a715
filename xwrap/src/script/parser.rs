use std::rc::Rc;

use smol_str::SmolStr;

use super::{
    lexer::{syntax_error, tokenize, Tok, Token},
    syntax::{CmpOp, Expr, Handler, LambdaDef, Literal, Stmt},
};
use crate::exception::{CallResult, ExceptionKind, ForeignError};

const KEYWORDS: &[&str] = &[
    "import", "from", "pass", "print", "try", "except", "else", "lambda", "is", "not", "None",
    "True", "False",
];

pub(crate) fn parse_program(src: &str) -> CallResult<Vec<Stmt>> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut ret = Vec::new();
    while !parser.at(&Tok::Eof) {
        parser.parse_stmt(&mut ret)?;
    }
    Ok(ret)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map_or(&Tok::Eof, |x| &x.tok)
    }

    fn peek_at(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .map_or(&Tok::Eof, |x| &x.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |x| x.line)
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(x) if *x == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(x) if x == kw)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, msg: &str) -> ForeignError {
        syntax_error(self.line(), msg)
    }

    fn expect_op(&mut self, op: &str) -> CallResult<()> {
        if self.at_op(op) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}', got {:?}", op, self.peek())))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> CallResult<()> {
        if self.at_keyword(kw) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", kw)))
        }
    }

    fn expect_newline(&mut self) -> CallResult<()> {
        match self.peek() {
            Tok::Newline => {
                self.bump();
                Ok(())
            }
            Tok::Eof => Ok(()),
            other => Err(self.error(&format!("unexpected {:?}", other))),
        }
    }

    fn parse_name(&mut self) -> CallResult<SmolStr> {
        match self.bump() {
            Tok::Name(name) if !KEYWORDS.contains(&name.as_str()) => Ok(name),
            other => Err(self.error(&format!("expected name, got {:?}", other))),
        }
    }

    fn parse_stmt(&mut self, out: &mut Vec<Stmt>) -> CallResult<()> {
        if self.at_keyword("try") {
            let stmt = self.parse_try()?;
            out.push(stmt);
            return Ok(());
        }
        self.parse_simple_stmts(out)
    }

    /// `small (';' small)* NEWLINE`
    fn parse_simple_stmts(&mut self, out: &mut Vec<Stmt>) -> CallResult<()> {
        loop {
            out.push(self.parse_small_stmt()?);
            if self.at_op(";") {
                self.bump();
                if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                    break;
                }
            } else {
                break;
            }
        }
        self.expect_newline()
    }

    fn parse_small_stmt(&mut self) -> CallResult<Stmt> {
        if self.at_keyword("pass") {
            self.bump();
            return Ok(Stmt::Pass);
        }
        if self.at_keyword("import") {
            self.bump();
            let mut names = vec![self.parse_name()?];
            while self.at_op(",") {
                self.bump();
                names.push(self.parse_name()?);
            }
            return Ok(Stmt::Import(names));
        }
        if self.at_keyword("from") {
            self.bump();
            let module = self.parse_name()?;
            self.expect_keyword("import")?;
            if self.at_op("*") {
                self.bump();
                return Ok(Stmt::FromImport(module, None));
            }
            let mut names = vec![self.parse_name()?];
            while self.at_op(",") {
                self.bump();
                names.push(self.parse_name()?);
            }
            return Ok(Stmt::FromImport(module, Some(names)));
        }
        if self.at_keyword("print") {
            self.bump();
            let mut items = Vec::new();
            if !matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(";")) {
                items.push(self.parse_expr()?);
                while self.at_op(",") {
                    self.bump();
                    if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
            }
            return Ok(Stmt::Print(items));
        }
        if matches!(self.peek(), Tok::Name(_)) && matches!(self.peek_at(1), Tok::Op("=")) {
            let name = self.parse_name()?;
            self.bump();
            let value = self.parse_expr_list()?;
            return Ok(Stmt::Assign(name, value));
        }
        Ok(Stmt::Expr(self.parse_expr_list()?))
    }

    fn parse_try(&mut self) -> CallResult<Stmt> {
        self.expect_keyword("try")?;
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            self.bump();
            let mut kinds = Vec::new();
            if self.at_op("(") {
                self.bump();
                kinds.push(self.parse_name()?);
                while self.at_op(",") {
                    self.bump();
                    kinds.push(self.parse_name()?);
                }
                self.expect_op(")")?;
            } else if !self.at_op(":") {
                kinds.push(self.parse_name()?);
            }
            let body = self.parse_suite()?;
            handlers.push(Handler { kinds, body });
        }
        if handlers.is_empty() {
            return Err(self.error("expected 'except' after 'try' block"));
        }
        let orelse = if self.at_keyword("else") {
            self.bump();
            self.parse_suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
        })
    }

    /// `':' simple_stmts` or `':' NEWLINE INDENT stmt+ DEDENT`
    fn parse_suite(&mut self) -> CallResult<Vec<Stmt>> {
        self.expect_op(":")?;
        let mut ret = Vec::new();
        if self.at(&Tok::Newline) {
            self.bump();
            if !self.at(&Tok::Indent) {
                return Err(self.error("expected an indented block"));
            }
            self.bump();
            while !self.at(&Tok::Dedent) && !self.at(&Tok::Eof) {
                self.parse_stmt(&mut ret)?;
            }
            if self.at(&Tok::Dedent) {
                self.bump();
            }
        } else {
            self.parse_simple_stmts(&mut ret)?;
        }
        Ok(ret)
    }

    /// `expr (',' expr)* [',']`, several items give tuple
    fn parse_expr_list(&mut self) -> CallResult<Expr> {
        let first = self.parse_expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.at_op(",") {
            self.bump();
            if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(";")) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_expr(&mut self) -> CallResult<Expr> {
        if self.at_keyword("lambda") {
            self.bump();
            let mut params = Vec::new();
            if !self.at_op(":") {
                params.push(self.parse_name()?);
                while self.at_op(",") {
                    self.bump();
                    params.push(self.parse_name()?);
                }
            }
            self.expect_op(":")?;
            let body = self.parse_expr()?;
            return Ok(Expr::Lambda(Rc::new(LambdaDef { params, body })));
        }
        self.parse_not()
    }

    fn parse_not(&mut self) -> CallResult<Expr> {
        if self.at_keyword("not") {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> CallResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.at_op("==") {
                self.bump();
                CmpOp::Eq
            } else if self.at_op("!=") {
                self.bump();
                CmpOp::NotEq
            } else if self.at_keyword("is") {
                self.bump();
                if self.at_keyword("not") {
                    self.bump();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Compare(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> CallResult<Expr> {
        if self.at_op("-") {
            self.bump();
            // `-9223372036854775808` fits only when negated as literal
            if let Tok::Int(x) = *self.peek() {
                if !matches!(self.peek_at(1), Tok::Op(".") | Tok::Op("(")) {
                    self.bump();
                    return Ok(Expr::Literal(Literal::Int(int_literal(x, true)?)));
                }
            }
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.at_op("+") {
            self.bump();
            return self.parse_unary();
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> CallResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.at_op("(") {
                self.bump();
                let mut args = Vec::new();
                while !self.at_op(")") {
                    args.push(self.parse_expr()?);
                    if self.at_op(",") {
                        self.bump();
                    } else if !self.at_op(")") {
                        return Err(self.error("expected ',' or ')' in call"));
                    }
                }
                self.bump();
                expr = Expr::Call(Box::new(expr), args);
            } else if self.at_op(".") {
                self.bump();
                let attr = self.parse_name()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_atom(&mut self) -> CallResult<Expr> {
        match self.peek().clone() {
            Tok::Int(x) => {
                self.bump();
                Ok(Expr::Literal(Literal::Int(int_literal(x, false)?)))
            }
            Tok::Float(x) => {
                self.bump();
                Ok(Expr::Literal(Literal::Float(x)))
            }
            Tok::Str(s) => {
                self.bump();
                let mut s = s.to_string();
                // adjacent literals are concatenated
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.bump();
                }
                Ok(Expr::Literal(Literal::Str(s.into())))
            }
            Tok::Name(name) => match name.as_str() {
                "None" => {
                    self.bump();
                    Ok(Expr::Literal(Literal::None))
                }
                "True" | "False" => {
                    self.bump();
                    Ok(Expr::Literal(Literal::Bool(name == "True")))
                }
                _ => Ok(Expr::Name(self.parse_name()?)),
            },
            Tok::Op("(") => {
                self.bump();
                if self.at_op(")") {
                    self.bump();
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at_op(")") {
                    self.bump();
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.at_op(",") {
                    self.bump();
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("{") => {
                self.bump();
                let mut items = Vec::new();
                while !self.at_op("}") {
                    let key = self.parse_expr()?;
                    self.expect_op(":")?;
                    let value = self.parse_expr()?;
                    items.push((key, value));
                    if self.at_op(",") {
                        self.bump();
                    } else if !self.at_op("}") {
                        return Err(self.error("expected ',' or '}' in dict"));
                    }
                }
                self.bump();
                Ok(Expr::Dict(items))
            }
            other => Err(self.error(&format!("invalid syntax at {:?}", other))),
        }
    }
}

fn int_literal(magnitude: u64, negative: bool) -> CallResult<i64> {
    let value = if negative {
        -i128::from(magnitude)
    } else {
        i128::from(magnitude)
    };
    i64::try_from(value).map_err(|_| {
        ForeignError::new(
            ExceptionKind::OverflowError,
            format!("integer literal {} is too large", value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statements() {
        let prog = parse_program(
            "from m1 import *\nimport m2, m3\nn = new_noddy()\nprint 'a', n\nunwrap_int(n)\n",
        )
        .unwrap();
        assert_eq!(5, prog.len());
        assert!(matches!(&prog[0], Stmt::FromImport(m, None) if m == "m1"));
        assert!(matches!(&prog[1], Stmt::Import(names) if names.len() == 2));
        assert!(matches!(&prog[2], Stmt::Assign(n, Expr::Call(..)) if n == "n"));
        assert!(matches!(&prog[3], Stmt::Print(items) if items.len() == 2));
        assert!(matches!(&prog[4], Stmt::Expr(Expr::Call(..))));
    }

    #[test]
    fn test_parse_try() {
        let prog = parse_program(
            "try:\n    unwrap_int_ref(7)\nexcept: pass\nelse: print 'no exception'\n",
        )
        .unwrap();
        match &prog[0] {
            Stmt::Try {
                body,
                handlers,
                orelse,
            } => {
                assert_eq!(1, body.len());
                assert_eq!(1, handlers.len());
                assert!(handlers[0].kinds.is_empty());
                assert!(matches!(orelse[0], Stmt::Print(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        let prog = parse_program("try: f()\nexcept (TypeError, ValueError): pass\n").unwrap();
        match &prog[0] {
            Stmt::Try { handlers, .. } => assert_eq!(2, handlers[0].kinds.len()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_expressions() {
        let prog = parse_program(
            "C = xclass('C', (xinst,), {'__init__': init1, 'get_n': lambda self: 7})",
        )
        .unwrap();
        let call = match &prog[0] {
            Stmt::Assign(_, Expr::Call(_, args)) => args,
            other => panic!("unexpected {:?}", other),
        };
        assert!(matches!(&call[1], Expr::Tuple(items) if items.len() == 1));
        assert!(matches!(&call[2], Expr::Dict(items) if items.len() == 2));

        let prog = parse_program("a is not None == (not b)\nc.get_n().x").unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::Expr(Expr::Compare(_, CmpOp::Eq, _))
        ));
        assert!(matches!(&prog[1], Stmt::Expr(Expr::Attr(_, x)) if x == "x"));
    }

    #[test]
    fn test_int_literal_range() {
        let prog = parse_program("-9223372036854775808\n- 5\n9223372036854775807").unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::Expr(Expr::Literal(Literal::Int(i64::MIN)))
        ));
        assert!(matches!(&prog[1], Stmt::Expr(Expr::Literal(Literal::Int(-5)))));
        assert!(matches!(
            &prog[2],
            Stmt::Expr(Expr::Literal(Literal::Int(i64::MAX)))
        ));
        // not a literal: minus applies to the call result
        assert!(matches!(
            &parse_program("-5 .f()").unwrap()[0],
            Stmt::Expr(Expr::Neg(_))
        ));
        for src in ["9223372036854775808", "-9223372036854775809", "99999999999999999999"] {
            let err = parse_program(src).unwrap_err();
            assert_eq!(ExceptionKind::OverflowError, err.kind, "{}", src);
        }
    }

    #[test]
    fn test_parse_errors() {
        for src in ["try: pass", "f(1 2)", "x = ", "import", "lambda: ", "{1 2}", "else = 1"] {
            let err = parse_program(src).unwrap_err();
            assert_eq!(ExceptionKind::SyntaxError, err.kind, "{}", src);
        }
    }
}
