//! The expression language inside `{...}` template segments.
//!
//! Supported forms: literals (null, booleans, integers, floats, quoted
//! strings, lists), identifier lookup through the config chain, field
//! access `a.b.c`, indexing `a[i]`, helper calls `f(x, key=v)`, unary
//! `-`/`!`, arithmetic, comparisons, and the conditional `cond ? a : b`.
//! The only reachable namespaces are the config chain and the fixed helper
//! library — nothing else.

use crate::builtins;
use crate::config::Config;
use crate::expand::{self, ExpandCtx};
use crate::value::{CallArgs, Value};
use indexmap::IndexMap;
use std::fmt;

/// Why an expression failed to evaluate.
///
/// `Missing` and `Message` are tolerated by the expander (the segment is
/// re-emitted verbatim); `Fatal` aborts the whole expansion.
#[derive(Debug)]
pub(crate) enum EvalError {
    Missing(String),
    Message(String),
    Fatal(crate::Error),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Missing(name) => write!(f, "unknown name '{name}'"),
            EvalError::Message(msg) => write!(f, "{msg}"),
            EvalError::Fatal(err) => write!(f, "{err}"),
        }
    }
}

type EvalResult = std::result::Result<Value, EvalError>;

fn message(msg: impl Into<String>) -> EvalError {
    EvalError::Message(msg.into())
}

/// Parse and evaluate one expression against a config.
pub(crate) fn eval_expr(src: &str, config: &Config, ctx: &ExpandCtx) -> EvalResult {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Evaluator { config, ctx }.eval(&expr)
}

// ---------------------------------------------------------------- lexer

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Question,
    Colon,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(src: &str) -> std::result::Result<Vec<Tok>, EvalError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i + 1 < chars.len()
                    && chars[i] == '.'
                    && chars[i + 1].is_ascii_digit()
                {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let x = text
                        .parse::<f64>()
                        .map_err(|e| message(format!("bad float '{text}': {e}")))?;
                    out.push(Tok::Float(x));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|e| message(format!("bad integer '{text}': {e}")))?;
                    out.push(Tok::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(message("unterminated string literal"));
                    }
                    let d = chars[i];
                    if d == quote {
                        i += 1;
                        break;
                    }
                    if d == '\\' && i + 1 < chars.len() {
                        let e = chars[i + 1];
                        let escaped = match e {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        };
                        text.push(escaped);
                        i += 2;
                        continue;
                    }
                    text.push(d);
                    i += 1;
                }
                out.push(Tok::Str(text));
            }
            '.' => {
                out.push(Tok::Dot);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                out.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                out.push(Tok::RBracket);
                i += 1;
            }
            '+' => {
                out.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                out.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                out.push(Tok::Star);
                i += 1;
            }
            '/' => {
                out.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                out.push(Tok::Percent);
                i += 1;
            }
            '?' => {
                out.push(Tok::Question);
                i += 1;
            }
            ':' => {
                out.push(Tok::Colon);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Tok::NotEq);
                    i += 2;
                } else {
                    out.push(Tok::Bang);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Tok::EqEq);
                    i += 2;
                } else {
                    out.push(Tok::Assign);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Tok::Le);
                    i += 2;
                } else {
                    out.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Tok::Ge);
                    i += 2;
                } else {
                    out.push(Tok::Gt);
                    i += 1;
                }
            }
            other => return Err(message(format!("unexpected character '{other}'"))),
        }
    }
    Ok(out)
}

// --------------------------------------------------------------- parser

#[derive(Debug, Clone)]
enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Var(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        named: Vec<(String, Expr)>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> std::result::Result<(), EvalError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(message(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn expect_end(&self) -> std::result::Result<(), EvalError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(message(format!("trailing tokens after expression: {:?}", self.peek())))
        }
    }

    fn parse_expr(&mut self) -> std::result::Result<Expr, EvalError> {
        let cond = self.parse_compare()?;
        if self.eat(&Tok::Question) {
            let then = self.parse_expr()?;
            self.expect(&Tok::Colon)?;
            let other = self.parse_expr()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(other)));
        }
        Ok(cond)
    }

    fn parse_compare(&mut self) -> std::result::Result<Expr, EvalError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinOp::Eq,
            Some(Tok::NotEq) => BinOp::Ne,
            Some(Tok::Lt) => BinOp::Lt,
            Some(Tok::Le) => BinOp::Le,
            Some(Tok::Gt) => BinOp::Gt,
            Some(Tok::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> std::result::Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> std::result::Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> std::result::Result<Expr, EvalError> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> std::result::Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                match self.bump() {
                    Some(Tok::Ident(name)) => expr = Expr::Field(Box::new(expr), name),
                    other => {
                        return Err(message(format!("expected field name, found {other:?}")))
                    }
                }
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Tok::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Tok::LParen) {
                let (args, named) = self.parse_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    named,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(
        &mut self,
    ) -> std::result::Result<(Vec<Expr>, Vec<(String, Expr)>), EvalError> {
        let mut args = Vec::new();
        let mut named = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok((args, named));
        }
        loop {
            // `name=value` is a keyword argument; a bare expression is
            // positional and must precede all keyword arguments.
            if let Some(Tok::Ident(name)) = self.peek().cloned() {
                if self.tokens.get(self.pos + 1) == Some(&Tok::Assign) {
                    self.pos += 2;
                    named.push((name, self.parse_expr()?));
                    if self.eat(&Tok::Comma) {
                        continue;
                    }
                    self.expect(&Tok::RParen)?;
                    return Ok((args, named));
                }
            }
            if !named.is_empty() {
                return Err(message("positional argument after keyword argument"));
            }
            args.push(self.parse_expr()?);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(&Tok::RParen)?;
            return Ok((args, named));
        }
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, EvalError> {
        match self.bump() {
            Some(Tok::Int(n)) => Ok(Expr::Int(n)),
            Some(Tok::Float(x)) => Ok(Expr::Float(x)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Ident(name)) => match name.as_str() {
                "null" | "None" => Ok(Expr::Null),
                "true" | "True" => Ok(Expr::Bool(true)),
                "false" | "False" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Var(name)),
            },
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_expr()?);
                    if self.eat(&Tok::Comma) {
                        continue;
                    }
                    self.expect(&Tok::RBracket)?;
                    return Ok(Expr::List(items));
                }
            }
            other => Err(message(format!("unexpected token {other:?}"))),
        }
    }
}

// ------------------------------------------------------------ evaluator

struct Evaluator<'a> {
    config: &'a Config,
    ctx: &'a ExpandCtx<'a>,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Var(name) => self.eval_var(name),
            Expr::Field(base, name) => self.eval_field(base, name),
            Expr::Index(base, index) => self.eval_index(base, index),
            Expr::Call {
                callee,
                args,
                named,
            } => self.eval_call(callee, args, named),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(n) => Ok(Value::Int(-n)),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(message(format!("cannot negate {}", kind(&other)))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                eval_binary(*op, l, r)
            }
            Expr::Ternary(cond, then, other) => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(other)
                }
            }
        }
    }

    fn eval_var(&self, name: &str) -> EvalResult {
        if let Some(helper) = builtins::lookup(name) {
            return Ok(helper);
        }
        match self.config.lookup(name) {
            Some(value) => self.expand_fetched(self.config, &value.clone()),
            None => Err(EvalError::Missing(name.to_string())),
        }
    }

    fn eval_field(&self, base: &Expr, name: &str) -> EvalResult {
        match self.eval(base)? {
            Value::Config(config) => match config.lookup(name) {
                Some(value) => self.expand_fetched(&config, &value.clone()),
                None => Err(EvalError::Missing(name.to_string())),
            },
            other => Err(message(format!("{} has no field '{name}'", kind(&other)))),
        }
    }

    fn eval_index(&self, base: &Expr, index: &Expr) -> EvalResult {
        let base = self.eval(base)?;
        let index = self.eval(index)?;
        match (&base, &index) {
            (Value::List(items), Value::Int(n)) => {
                let i = usize::try_from(*n)
                    .map_err(|_| message(format!("negative index {n}")))?;
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| message(format!("index {i} out of range")))
            }
            (Value::Config(config), Value::Str(key)) => match config.lookup(key) {
                Some(value) => self.expand_fetched(config, &value.clone()),
                None => Err(EvalError::Missing(key.clone())),
            },
            _ => Err(message(format!(
                "cannot index {} with {}",
                kind(&base),
                kind(&index)
            ))),
        }
    }

    fn eval_call(
        &self,
        callee: &Expr,
        args: &[Expr],
        named: &[(String, Expr)],
    ) -> EvalResult {
        let callee = self.eval(callee)?;
        let func = match callee {
            Value::Func(f) => f,
            other => return Err(message(format!("{} is not callable", kind(&other)))),
        };
        let mut call_args = CallArgs {
            positional: Vec::with_capacity(args.len()),
            named: IndexMap::new(),
        };
        for arg in args {
            call_args.positional.push(self.eval(arg)?);
        }
        for (name, arg) in named {
            let value = self.eval(arg)?;
            call_args.named.insert(name.clone(), value);
        }
        func.call(self.config, &call_args)
            .map_err(|e| message(format!("{}(): {e}", func.name)))
    }

    /// A value fetched from a config is expanded against *that* config, so
    /// its own templates resolve in their owning scope first. Inner
    /// expansion failures are tolerated; only the caps are fatal.
    fn expand_fetched(&self, owner: &Config, value: &Value) -> EvalResult {
        expand::expand_inner(owner, value, self.ctx).map_err(EvalError::Fatal)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Int(_) => "an integer",
        Value::Float(_) => "a float",
        Value::Str(_) => "a string",
        Value::List(_) => "a list",
        Value::Config(_) => "a config",
        Value::Task(_) => "a task",
        Value::Func(_) => "a helper",
        Value::Callback(_) => "a callback",
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> EvalResult {
    use BinOp::*;
    match op {
        Eq => return Ok(Value::Bool(l == r)),
        Ne => return Ok(Value::Bool(l != r)),
        _ => {}
    }
    match (op, &l, &r) {
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Add, Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (_, Value::Int(a), Value::Int(b)) => match op {
            Add => Ok(Value::Int(a + b)),
            Sub => Ok(Value::Int(a - b)),
            Mul => Ok(Value::Int(a * b)),
            Div => {
                if *b == 0 {
                    Err(message("division by zero"))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            Mod => {
                if *b == 0 {
                    Err(message("modulo by zero"))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            Eq | Ne => unreachable!(),
        },
        (_, Value::Str(a), Value::Str(b)) => match op {
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => Err(message(format!("unsupported string operation {op:?}"))),
        },
        _ => {
            let (a, b) = match (as_float(&l), as_float(&r)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(message(format!(
                        "cannot apply {op:?} to {} and {}",
                        kind(&l),
                        kind(&r)
                    )))
                }
            };
            match op {
                Add => Ok(Value::Float(a + b)),
                Sub => Ok(Value::Float(a - b)),
                Mul => Ok(Value::Float(a * b)),
                Div => Ok(Value::Float(a / b)),
                Mod => Ok(Value::Float(a % b)),
                Lt => Ok(Value::Bool(a < b)),
                Le => Ok(Value::Bool(a <= b)),
                Gt => Ok(Value::Bool(a > b)),
                Ge => Ok(Value::Bool(a >= b)),
                Eq | Ne => unreachable!(),
            }
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::ExpandOpts;
    use crate::Config;

    fn eval(config: &Config, src: &str) -> EvalResult {
        let opts = ExpandOpts::default();
        let v =
            expand::expand_value(config, &Value::Str(format!("{{{src}}}")), &opts).unwrap();
        // The expander re-emits failed segments verbatim; surface that as
        // an error so tests can distinguish.
        match v {
            Value::Str(s) if s == format!("{{{src}}}") => Err(message("unexpanded")),
            other => Ok(other),
        }
    }

    fn cfg() -> Config {
        Config::new()
            .with("n", Value::Int(10))
            .with("name", "util")
            .with(
                "srcs",
                Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())]),
            )
    }

    #[test]
    fn test_literals() {
        let c = cfg();
        assert_eq!(eval(&c, "42").unwrap(), Value::Int(42));
        assert_eq!(eval(&c, "2.5").unwrap(), Value::Float(2.5));
        assert_eq!(eval(&c, "'hi'").unwrap(), Value::Str("hi".into()));
        assert_eq!(eval(&c, "true").unwrap(), Value::Bool(true));
        assert_eq!(
            eval(&c, "[1, 2]").unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let c = cfg();
        assert_eq!(eval(&c, "2 + 3 * 4").unwrap(), Value::Int(14));
        assert_eq!(eval(&c, "(2 + 3) * 4").unwrap(), Value::Int(20));
        assert_eq!(eval(&c, "-n + 1").unwrap(), Value::Int(-9));
    }

    #[test]
    fn test_string_concat() {
        let c = cfg();
        assert_eq!(
            eval(&c, "name + '.o'").unwrap(),
            Value::Str("util.o".into())
        );
    }

    #[test]
    fn test_comparisons_and_ternary() {
        let c = cfg();
        assert_eq!(eval(&c, "n > 5").unwrap(), Value::Bool(true));
        assert_eq!(eval(&c, "n == 10 ? 'yes' : 'no'").unwrap(), Value::Str("yes".into()));
        assert_eq!(eval(&c, "n < 5 ? 'yes' : 'no'").unwrap(), Value::Str("no".into()));
    }

    #[test]
    fn test_indexing() {
        let c = cfg();
        assert_eq!(eval(&c, "srcs[1]").unwrap(), Value::Str("b.c".into()));
        assert!(eval(&c, "srcs[9]").is_err());
    }

    #[test]
    fn test_field_access_through_configs() {
        let inner = Config::new().with("flag", "-O2");
        let c = cfg().with("opts", Value::Config(inner));
        assert_eq!(eval(&c, "opts.flag").unwrap(), Value::Str("-O2".into()));
        assert!(eval(&c, "opts.missing").is_err());
    }

    #[test]
    fn test_helper_call_with_args() {
        let c = cfg();
        assert_eq!(
            eval(&c, "swap_ext('main.cpp', '.o')").unwrap(),
            Value::Str("main.o".into())
        );
        assert_eq!(
            eval(&c, "swap_ext(srcs, '.o')").unwrap(),
            Value::List(vec![Value::Str("a.o".into()), Value::Str("b.o".into())])
        );
    }

    #[test]
    fn test_unknown_name_is_missing() {
        let c = cfg();
        assert!(eval(&c, "nonesuch").is_err());
    }

    #[test]
    fn test_kwargs_parse() {
        let c = cfg();
        // len() ignores keyword arguments; this just has to parse.
        assert_eq!(eval(&c, "len(srcs, strict=true)").unwrap(), Value::Int(2));
    }
}
