// =============================================================================
// QMK - Closed Expression Grammar
// =============================================================================
// Table of Contents:
//   1. Value - Runtime value (number/bool/string)
//   2. Tokenizer
//   3. AST and Parser
//   4. Evaluator
// =============================================================================
// Purpose: A single closed arithmetic/boolean grammar shared by the QEC
//          formula evaluator (§4.1) and the macro preprocessor's `.if`/`.set`
//          expressions (§4.6.5). Deliberately has no function calls, no
//          attribute access, and no general code evaluation (§9).
// =============================================================================

use std::collections::HashMap;
use std::fmt;

// =============================================================================
// 1. Value
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn as_number(&self) -> Result<f64, ExprError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(ExprError(format!("expected a number, found {other:?}"))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ExprError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ExprError(format!("expected a boolean, found {other:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<&str, ExprError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ExprError(format!("expected a string, found {other:?}"))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprError(pub String);

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ExprError {}

// =============================================================================
// 2. Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
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
            '+' => {
                tokens.push(Token::Op("+"));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op("-"));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Op("*"));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op("/"));
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ExprError("unterminated string literal".into()));
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| ExprError(format!("invalid numeric literal '{text}'")))?;
                tokens.push(Token::Number(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => return Err(ExprError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

// =============================================================================
// 3. AST and Parser
// =============================================================================

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(String),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Bin(&'static str, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    // or_expr := and_expr ( "or" and_expr )*
    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s == "or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Bin("or", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // and_expr := not_expr ( "and" not_expr )*
    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s == "and") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Bin("and", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // not_expr := "not" not_expr | comparison
    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == "not") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    // comparison := additive ( ("==" |"!="|"<"|"<="|">"|">=") additive )?
    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            if ["==", "!=", "<", "<=", ">", ">="].contains(&op) {
                self.advance();
                let rhs = self.parse_additive()?;
                return Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    // additive := multiplicative ( ("+"|"-") multiplicative )*
    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek().cloned() {
                Some(Token::Op(op)) if op == "+" || op == "-" => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    // multiplicative := unary ( ("*"|"/") unary )*
    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek().cloned() {
                Some(Token::Op(op)) if op == "*" || op == "/" => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    // unary := "-" unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Op("-"))) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    // postfix := primary ( "[" or_expr "]" )*
    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut base = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.advance();
            let index = self.parse_or()?;
            match self.advance() {
                Some(Token::RBracket) => {}
                other => return Err(ExprError(format!("expected ']', found {other:?}"))),
            }
            base = Expr::Index(Box::new(base), Box::new(index));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) if name == "true" => Ok(Expr::Bin(
                "==",
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Number(1.0)),
            )),
            Some(Token::Ident(name)) if name == "false" => Ok(Expr::Bin(
                "==",
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Number(0.0)),
            )),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect_op_paren()?;
                Ok(inner)
            }
            other => Err(ExprError(format!("unexpected token {other:?}"))),
        }
    }

    fn expect_op_paren(&mut self) -> Result<(), ExprError> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            other => Err(ExprError(format!("expected ')', found {other:?}"))),
        }
    }
}

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError(format!(
            "unexpected trailing input after position {}",
            parser.pos
        )));
    }
    Ok(expr)
}

// =============================================================================
// 4. Evaluator
// =============================================================================

pub fn eval(expr: &Expr, ctx: &HashMap<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Var(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError(format!("undefined variable '{name}'"))),
        Expr::Index(base, idx) => {
            let base_val = eval(base, ctx)?;
            let idx_val = eval(idx, ctx)?.as_number()?;
            let s = base_val.as_str()?;
            let i = idx_val as usize;
            let ch = s
                .chars()
                .nth(i)
                .ok_or_else(|| ExprError(format!("string index {i} out of range")))?;
            Ok(Value::Str(ch.to_string()))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.as_bool()?)),
        Expr::Neg(inner) => Ok(Value::Number(-eval(inner, ctx)?.as_number()?)),
        Expr::Bin(op, lhs, rhs) => eval_bin(op, lhs, rhs, ctx),
    }
}

fn eval_bin(
    op: &str,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &HashMap<String, Value>,
) -> Result<Value, ExprError> {
    match op {
        "and" => {
            let l = eval(lhs, ctx)?.as_bool()?;
            if !l {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?))
        }
        "or" => {
            let l = eval(lhs, ctx)?.as_bool()?;
            if l {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?))
        }
        "+" | "-" | "*" | "/" => {
            let l = eval(lhs, ctx)?.as_number()?;
            let r = eval(rhs, ctx)?.as_number()?;
            let n = match op {
                "+" => l + r,
                "-" => l - r,
                "*" => l * r,
                "/" => {
                    if r == 0.0 {
                        return Err(ExprError("division by zero".into()));
                    }
                    l / r
                }
                _ => unreachable!(),
            };
            Ok(Value::Number(n))
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            let ordering = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(ExprError(format!(
                        "cannot compare {l:?} and {r:?}"
                    )))
                }
            };
            let result = match (op, ordering) {
                ("==", _) => l == r,
                ("!=", _) => l != r,
                (_, None) => return Err(ExprError("incomparable values (NaN)".into())),
                ("<", Some(o)) => o == std::cmp::Ordering::Less,
                ("<=", Some(o)) => o != std::cmp::Ordering::Greater,
                (">", Some(o)) => o == std::cmp::Ordering::Greater,
                (">=", Some(o)) => o != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        other => Err(ExprError(format!("unknown operator '{other}'"))),
    }
}

pub fn eval_arithmetic(src: &str, ctx: &HashMap<String, Value>) -> Result<f64, ExprError> {
    let expr = parse(src)?;
    eval(&expr, ctx)?.as_number()
}

pub fn eval_bool(src: &str, ctx: &HashMap<String, Value>) -> Result<bool, ExprError> {
    let expr = parse(src)?;
    eval(&expr, ctx)?.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn arithmetic_precedence() {
        let c = HashMap::new();
        assert_eq!(eval_arithmetic("2 + 3 * 4", &c).unwrap(), 14.0);
        assert_eq!(eval_arithmetic("(2 + 3) * 4", &c).unwrap(), 20.0);
    }

    #[test]
    fn undefined_variable_fails() {
        let c = HashMap::new();
        assert!(eval_arithmetic("x + 1", &c).is_err());
    }

    #[test]
    fn variable_substitution() {
        let c = ctx(&[("codeDistance", Value::Number(3.0))]);
        assert_eq!(eval_arithmetic("codeDistance * 2", &c).unwrap(), 6.0);
    }

    #[test]
    fn boolean_and_comparison() {
        let c = ctx(&[("n", Value::Number(5.0))]);
        assert!(eval_bool("n > 3 and n < 10", &c).unwrap());
        assert!(!eval_bool("n > 3 and not (n < 10)", &c).unwrap());
    }

    #[test]
    fn string_indexing() {
        let c = ctx(&[("name", Value::Str("abc".into()))]);
        let v = eval(&parse("name[1]").unwrap(), &c).unwrap();
        assert_eq!(v, Value::Str("b".into()));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let c = HashMap::new();
        assert!(eval_arithmetic("1 / 0", &c).is_err());
    }
}
