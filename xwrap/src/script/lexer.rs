use smol_str::SmolStr;

use crate::exception::{CallResult, ExceptionKind, ForeignError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(SmolStr),
    /// magnitude, sign is applied by parser
    Int(u64),
    Float(f64),
    Str(SmolStr),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) tok: Tok,
    pub(crate) line: usize,
}

const TWO_CHAR_OPS: &[&str] = &["==", "!="];
const ONE_CHAR_OPS: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ":", ".", "=", "-", "+", "*", ";",
];

pub(crate) fn syntax_error(line: usize, msg: &str) -> ForeignError {
    ForeignError::new(
        ExceptionKind::SyntaxError,
        format!("{} (line {})", msg, line),
    )
}

/// Split source into tokens, with `Indent`/`Dedent` for blocks
pub(crate) fn tokenize(src: &str) -> CallResult<Vec<Token>> {
    let mut ret = Vec::new();
    let mut indents = vec![0_usize];
    let mut depth = 0_usize;
    let mut lineno = 0;
    for (idx, line) in src.lines().enumerate() {
        lineno = idx + 1;
        let chars: Vec<char> = line.chars().collect();
        let mut pos = 0;
        if depth == 0 {
            let mut width = 0;
            while pos < chars.len() && (chars[pos] == ' ' || chars[pos] == '\t') {
                width = if chars[pos] == '\t' {
                    (width / 8 + 1) * 8
                } else {
                    width + 1
                };
                pos += 1;
            }
            if pos == chars.len() || chars[pos] == '#' {
                continue;
            }
            let top = *indents.last().unwrap_or(&0);
            if width > top {
                indents.push(width);
                ret.push(Token {
                    tok: Tok::Indent,
                    line: lineno,
                });
            } else {
                while width < *indents.last().unwrap_or(&0) {
                    indents.pop();
                    ret.push(Token {
                        tok: Tok::Dedent,
                        line: lineno,
                    });
                }
                if width != *indents.last().unwrap_or(&0) {
                    return Err(syntax_error(
                        lineno,
                        "unindent does not match any outer indentation level",
                    ));
                }
            }
        }
        while pos < chars.len() {
            let c = chars[pos];
            if c == ' ' || c == '\t' {
                pos += 1;
                continue;
            }
            if c == '#' {
                break;
            }
            let tok = if c.is_ascii_digit() {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let mut is_float = false;
                if pos < chars.len() && chars[pos] == '.' {
                    is_float = true;
                    pos += 1;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                    is_float = true;
                    pos += 1;
                    if pos < chars.len() && (chars[pos] == '-' || chars[pos] == '+') {
                        pos += 1;
                    }
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let text: String = chars[start..pos].iter().collect();
                if is_float {
                    Tok::Float(
                        text.parse()
                            .map_err(|_| syntax_error(lineno, "invalid float literal"))?,
                    )
                } else {
                    Tok::Int(text.parse().map_err(|_| {
                        ForeignError::new(
                            ExceptionKind::OverflowError,
                            format!("integer literal {} is too large", text),
                        )
                    })?)
                }
            } else if c.is_alphabetic() || c == '_' {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                Tok::Name(chars[start..pos].iter().collect::<String>().into())
            } else if c == '\'' || c == '"' {
                let (s, next) = scan_string(&chars, pos, lineno)?;
                pos = next;
                Tok::Str(s.into())
            } else {
                let rest: String = chars[pos..chars.len().min(pos + 2)].iter().collect();
                if let Some(op) = TWO_CHAR_OPS.iter().find(|op| rest.starts_with(**op)) {
                    pos += 2;
                    Tok::Op(*op)
                } else if let Some(op) = ONE_CHAR_OPS.iter().find(|op| rest.starts_with(**op)) {
                    match *op {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => {
                            depth = depth.checked_sub(1).ok_or_else(|| {
                                syntax_error(lineno, &format!("unmatched '{}'", op))
                            })?
                        }
                        _ => {}
                    }
                    pos += 1;
                    Tok::Op(*op)
                } else {
                    return Err(syntax_error(
                        lineno,
                        &format!("invalid character '{}'", c),
                    ));
                }
            };
            ret.push(Token { tok, line: lineno });
        }
        if depth == 0 && !matches!(ret.last(), Some(Token { tok: Tok::Newline, .. }) | None) {
            ret.push(Token {
                tok: Tok::Newline,
                line: lineno,
            });
        }
    }
    if depth != 0 {
        return Err(syntax_error(lineno, "unexpected EOF while parsing"));
    }
    while indents.len() > 1 {
        indents.pop();
        ret.push(Token {
            tok: Tok::Dedent,
            line: lineno,
        });
    }
    ret.push(Token {
        tok: Tok::Eof,
        line: lineno,
    });
    Ok(ret)
}

fn scan_string(chars: &[char], start: usize, lineno: usize) -> CallResult<(String, usize)> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut s = String::new();
    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((s, pos + 1));
        }
        if c == '\\' && pos + 1 < chars.len() {
            pos += 1;
            match chars[pos] {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                '0' => s.push('\0'),
                '\\' => s.push('\\'),
                '\'' => s.push('\''),
                '"' => s.push('"'),
                other => {
                    s.push('\\');
                    s.push(other);
                }
            }
        } else {
            s.push(c);
        }
        pos += 1;
    }
    Err(syntax_error(lineno, "EOL while scanning string literal"))
}
