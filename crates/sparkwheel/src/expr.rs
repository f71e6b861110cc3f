//! Expression evaluation for `$...` scalars.
//!
//! The engine is generic over an [`Evaluator`]: it receives the expression
//! source with `@`-references already rewritten to binding names, the
//! bindings themselves, and a caller-provided namespace of pre-bound
//! globals. [`ExprEvaluator`] is the built-in implementation — a small
//! expression language over [`Value`]:
//!
//! - literals: integers, floats, single/double-quoted strings, `true`,
//!   `false`, `null`, and `[a, b, c]` sequence literals
//! - arithmetic `+ - * / %`, comparisons `== != < <= > >=`, logic
//!   `&& || !`, unary `-`, parentheses
//! - indexing `x[i]` / `x["key"]`, attribute access `m.key`, calls on
//!   callables `f(a, b)`, and `len(x)`
//!
//! Hosts needing a richer language implement [`Evaluator`] themselves and
//! plug it into the config.

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::{CallArgs, Value};

/// Error produced by expression evaluation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExprError {
    pub message: String,
}

impl ExprError {
    fn new(message: impl Into<String>) -> Self {
        ExprError {
            message: message.into(),
        }
    }
}

type ExprResult<T> = std::result::Result<T, ExprError>;

/// Pluggable expression evaluator.
///
/// `bindings` holds the resolved values of rewritten `@`-references;
/// `namespace` holds caller-provided globals. Both are visible as plain
/// identifiers, bindings first.
pub trait Evaluator: Send + Sync {
    fn eval(
        &self,
        source: &str,
        bindings: &IndexMap<String, Value>,
        namespace: &IndexMap<String, Value>,
    ) -> ExprResult<Value>;
}

/// The built-in evaluator.
#[derive(Debug, Clone, Default)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn eval(
        &self,
        source: &str,
        bindings: &IndexMap<String, Value>,
        namespace: &IndexMap<String, Value>,
    ) -> ExprResult<Value> {
        let tokens = lex(source)?;
        let mut parser = TokenStream::new(tokens);
        let expr = parser.parse_expr()?;
        parser.expect_end()?;
        eval_expr(&expr, bindings, namespace)
    }
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

fn lex(source: &str) -> ExprResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() => {
                // Leading-dot float like `.5`.
                let (token, next) = lex_number(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '\'' | '"' => {
                let (token, next) = lex_string(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (token, next) = lex_number(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(ExprError::new(format!(
                    "unexpected character `{other}` in expression"
                )));
            }
        }
    }
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> ExprResult<(Token, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((Token::Str(out), i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExprError::new("unterminated string literal in expression"))
}

fn lex_number(chars: &[char], start: usize) -> ExprResult<(Token, usize)> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() {
        match chars[i] {
            c if c.is_ascii_digit() => i += 1,
            '.' if !is_float && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit()) => {
                is_float = true;
                i += 1;
            }
            _ => break,
        }
    }
    let text: String = chars[start..i].iter().collect();
    if is_float {
        text.parse::<f64>()
            .map(|f| (Token::Float(f), i))
            .map_err(|_| ExprError::new(format!("invalid number `{text}`")))
    } else {
        text.parse::<i64>()
            .map(|v| (Token::Int(v), i))
            .map_err(|_| ExprError::new(format!("invalid number `{text}`")))
    }
}

// ---------------------------------------------------------------------------
// Parser

#[derive(Debug, Clone)]
enum Expr {
    Lit(LitValue),
    Var(String),
    List(Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone)]
enum LitValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        TokenStream { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> ExprResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ExprError::new(format!("expected {what}")))
        }
    }

    fn expect_end(&mut self) -> ExprResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExprError::new(format!(
                "unexpected trailing token {token:?}"
            ))),
        }
    }

    fn parse_expr(&mut self) -> ExprResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(BinOp::Eq),
            Some(Token::NotEq) => Some(BinOp::Ne),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Ge) => Some(BinOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.next();
                let right = self.parse_additive()?;
                Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.next();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(operand)));
        }
        if self.eat(&Token::Not) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket, "closing `]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::Dot) {
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(ExprError::new("expected attribute name after `.`")),
                };
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma, "`,` between call arguments")?;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Lit(LitValue::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(LitValue::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Lit(LitValue::Str(s))),
            Some(Token::True) => Ok(Expr::Lit(LitValue::Bool(true))),
            Some(Token::False) => Ok(Expr::Lit(LitValue::Bool(false))),
            Some(Token::Null) => Ok(Expr::Lit(LitValue::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "closing `)`")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma, "`,` between list items")?;
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(ExprError::new(format!(
                "expected an expression, found {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation

fn eval_expr(
    expr: &Expr,
    bindings: &IndexMap<String, Value>,
    namespace: &IndexMap<String, Value>,
) -> ExprResult<Value> {
    match expr {
        Expr::Lit(lit) => Ok(match lit {
            LitValue::Null => Value::Null,
            LitValue::Bool(b) => Value::Bool(*b),
            LitValue::Int(i) => Value::Int(*i),
            LitValue::Float(f) => Value::Float(*f),
            LitValue::Str(s) => Value::String(s.clone()),
        }),
        Expr::Var(name) => bindings
            .get(name)
            .or_else(|| namespace.get(name))
            .cloned()
            .ok_or_else(|| ExprError::new(format!("name `{name}` is not defined"))),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, bindings, namespace)?);
            }
            Ok(Value::Seq(out))
        }
        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, bindings, namespace)?;
            eval_unary(*op, value)
        }
        Expr::Binary(BinOp::And, left, right) => {
            let left = eval_expr(left, bindings, namespace)?;
            if !truthy_for_logic(&left)? {
                return Ok(Value::Bool(false));
            }
            let right = eval_expr(right, bindings, namespace)?;
            Ok(Value::Bool(truthy_for_logic(&right)?))
        }
        Expr::Binary(BinOp::Or, left, right) => {
            let left = eval_expr(left, bindings, namespace)?;
            if truthy_for_logic(&left)? {
                return Ok(Value::Bool(true));
            }
            let right = eval_expr(right, bindings, namespace)?;
            Ok(Value::Bool(truthy_for_logic(&right)?))
        }
        Expr::Binary(op, left, right) => {
            let left = eval_expr(left, bindings, namespace)?;
            let right = eval_expr(right, bindings, namespace)?;
            eval_binary(*op, left, right)
        }
        Expr::Index(base, index) => {
            let base = eval_expr(base, bindings, namespace)?;
            let index = eval_expr(index, bindings, namespace)?;
            eval_index(&base, &index)
        }
        Expr::Attr(base, name) => {
            let base = eval_expr(base, bindings, namespace)?;
            match &base {
                Value::Map(map) => map.get(name).cloned().ok_or_else(|| {
                    ExprError::new(format!("mapping has no key `{name}`"))
                }),
                other => Err(ExprError::new(format!(
                    "cannot access attribute `{name}` on {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Call(callee, args) => {
            // `len(x)` is the one builtin.
            if let Expr::Var(name) = callee.as_ref() {
                if name == "len" && !bindings.contains_key(name) && !namespace.contains_key(name) {
                    if args.len() != 1 {
                        return Err(ExprError::new("len() takes exactly one argument"));
                    }
                    let value = eval_expr(&args[0], bindings, namespace)?;
                    return eval_len(&value);
                }
            }
            let callee = eval_expr(callee, bindings, namespace)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expr(arg, bindings, namespace)?);
            }
            match &callee {
                Value::Callable(callable) => callable
                    .call(CallArgs::new(evaluated, IndexMap::new()))
                    .map_err(ExprError::new),
                other => Err(ExprError::new(format!(
                    "{} is not callable",
                    other.type_name()
                ))),
            }
        }
    }
}

fn eval_unary(op: UnOp, value: Value) -> ExprResult<Value> {
    match (op, value) {
        (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Neg, other) => Err(ExprError::new(format!(
            "cannot negate {}",
            other.type_name()
        ))),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOp::Not, Value::Null) => Ok(Value::Bool(true)),
        (UnOp::Not, other) => Err(ExprError::new(format!(
            "cannot apply `!` to {}",
            other.type_name()
        ))),
    }
}

fn truthy_for_logic(value: &Value) -> ExprResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(ExprError::new(format!(
            "expected boolean in logical expression, got {}",
            other.type_name()
        ))),
    }
}

fn eval_binary(op: BinOp, left: Value, right: Value) -> ExprResult<Value> {
    use BinOp::*;
    match op {
        Eq => return Ok(Value::Bool(left == right)),
        Ne => return Ok(Value::Bool(left != right)),
        _ => {}
    }

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => eval_int_op(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => eval_float_op(op, *a, *b),
        (Value::Int(a), Value::Float(b)) => eval_float_op(op, *a as f64, *b),
        (Value::Float(a), Value::Int(b)) => eval_float_op(op, *a, *b as f64),
        (Value::String(a), Value::String(b)) => match op {
            Add => Ok(Value::String(format!("{a}{b}"))),
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => Err(binary_type_error(op, &left, &right)),
        },
        (Value::Seq(a), Value::Seq(b)) if op == Add => {
            let mut out = a.clone();
            out.extend(b.clone());
            Ok(Value::Seq(out))
        }
        _ => Err(binary_type_error(op, &left, &right)),
    }
}

fn eval_int_op(op: BinOp, a: i64, b: i64) -> ExprResult<Value> {
    use BinOp::*;
    Ok(match op {
        Add => Value::Int(a.wrapping_add(b)),
        Sub => Value::Int(a.wrapping_sub(b)),
        Mul => Value::Int(a.wrapping_mul(b)),
        Div => {
            if b == 0 {
                return Err(ExprError::new("division by zero"));
            }
            // Integer division only when exact, matching config expectations
            // for sizes and counts.
            if a % b == 0 {
                Value::Int(a / b)
            } else {
                Value::Float(a as f64 / b as f64)
            }
        }
        Rem => {
            if b == 0 {
                return Err(ExprError::new("division by zero"));
            }
            Value::Int(a % b)
        }
        Lt => Value::Bool(a < b),
        Le => Value::Bool(a <= b),
        Gt => Value::Bool(a > b),
        Ge => Value::Bool(a >= b),
        Eq | Ne | And | Or => unreachable!("handled before numeric dispatch"),
    })
}

fn eval_float_op(op: BinOp, a: f64, b: f64) -> ExprResult<Value> {
    use BinOp::*;
    Ok(match op {
        Add => Value::Float(a + b),
        Sub => Value::Float(a - b),
        Mul => Value::Float(a * b),
        Div => Value::Float(a / b),
        Rem => Value::Float(a % b),
        Lt => Value::Bool(a < b),
        Le => Value::Bool(a <= b),
        Gt => Value::Bool(a > b),
        Ge => Value::Bool(a >= b),
        Eq | Ne | And | Or => unreachable!("handled before numeric dispatch"),
    })
}

fn binary_type_error(op: BinOp, left: &Value, right: &Value) -> ExprError {
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    };
    ExprError::new(format!(
        "unsupported operand types for `{symbol}`: {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn eval_index(base: &Value, index: &Value) -> ExprResult<Value> {
    match (base, index) {
        (Value::Seq(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if idx < 0 || idx >= len {
                return Err(ExprError::new(format!(
                    "index {i} out of range (length {len})"
                )));
            }
            Ok(items[idx as usize].clone())
        }
        (Value::Map(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::new(format!("mapping has no key `{key}`"))),
        (base, index) => Err(ExprError::new(format!(
            "cannot index {} with {}",
            base.type_name(),
            index.type_name()
        ))),
    }
}

fn eval_len(value: &Value) -> ExprResult<Value> {
    match value {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Seq(items) => Ok(Value::Int(items.len() as i64)),
        Value::Map(map) => Ok(Value::Int(map.len() as i64)),
        other => Err(ExprError::new(format!(
            "len() not supported for {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> ExprResult<Value> {
        ExprEvaluator.eval(source, &IndexMap::new(), &IndexMap::new())
    }

    fn eval_with(source: &str, bindings: Vec<(&str, Value)>) -> ExprResult<Value> {
        let bindings: IndexMap<String, Value> = bindings
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        ExprEvaluator.eval(source, &bindings, &IndexMap::new())
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval("10 % 3").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_division_promotes_when_inexact() {
        assert_eq!(eval("10 / 2").unwrap(), Value::Int(5));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(eval("1 / 0").is_err());
    }

    #[test]
    fn test_float_arithmetic() {
        assert_eq!(eval("0.5 * 4").unwrap(), Value::Float(2.0));
        assert_eq!(eval(".5 + .5").unwrap(), Value::Float(1.0));
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval("-3 + 5").unwrap(), Value::Int(2));
        assert_eq!(eval("!false").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("2.5 >= 2.5").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' == 'a'").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logic_short_circuits() {
        // The right side would fail if evaluated.
        assert_eq!(eval("false && (1 / 0 == 0)").unwrap(), Value::Bool(false));
        assert_eq!(eval("true || (1 / 0 == 0)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            eval("'foo' + '_' + 'bar'").unwrap(),
            Value::String("foo_bar".into())
        );
    }

    #[test]
    fn test_list_literal_and_concat() {
        assert_eq!(
            eval("[1, 2] + [3]").unwrap(),
            Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval("[10, 20, 30][1]").unwrap(), Value::Int(20));
        assert_eq!(eval("[10, 20, 30][-1]").unwrap(), Value::Int(30));
        assert!(eval("[1][5]").is_err());
    }

    #[test]
    fn test_bindings_and_namespace() {
        assert_eq!(
            eval_with("__ref_0 * 2 + 1", vec![("__ref_0", Value::Int(3))]).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn test_map_attribute_and_index() {
        let map = Value::Map(
            vec![("lr".to_string(), Value::Float(0.1))]
                .into_iter()
                .collect(),
        );
        assert_eq!(
            eval_with("cfg.lr", vec![("cfg", map.clone())]).unwrap(),
            Value::Float(0.1)
        );
        assert_eq!(
            eval_with("cfg['lr']", vec![("cfg", map)]).unwrap(),
            Value::Float(0.1)
        );
    }

    #[test]
    fn test_len_builtin() {
        assert_eq!(eval("len([1, 2, 3])").unwrap(), Value::Int(3));
        assert_eq!(eval("len('abcd')").unwrap(), Value::Int(4));
    }

    #[test]
    fn test_callable_invocation() {
        use crate::value::{Callable, ConstructorFn};
        use std::sync::Arc;

        let func: Arc<ConstructorFn> = Arc::new(|call: CallArgs| {
            let a = call.arg(0).and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(a * 10))
        });
        let callable = Value::Callable(Arc::new(Callable::new("times_ten", func)));
        assert_eq!(
            eval_with("f(4)", vec![("f", callable)]).unwrap(),
            Value::Int(40)
        );
    }

    #[test]
    fn test_undefined_name() {
        let err = eval("nope + 1").unwrap_err();
        assert!(err.message.contains("`nope` is not defined"));
    }

    #[test]
    fn test_type_error_message() {
        let err = eval("'a' * 2").unwrap_err();
        assert!(err.message.contains("unsupported operand types"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(eval("1 2").is_err());
    }

    #[test]
    fn test_null_literal() {
        assert_eq!(eval("null == null").unwrap(), Value::Bool(true));
        assert_eq!(
            eval_with("x == null", vec![("x", Value::Null)]).unwrap(),
            Value::Bool(true)
        );
    }
}
