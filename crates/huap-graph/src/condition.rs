//! A restricted boolean expression language for edge conditions: a tiny
//! explicit interpreter rather than a general-purpose `eval`.
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := unary ( "&&" unary )*
//! unary      := "!" unary | membership
//! membership := comparison ( "in" comparison )?
//! comparison := primary ( ("==" | "!=" | "<=" | ">=" | "<" | ">") primary )?
//! primary    := number | string | "true" | "false" | "null"
//!             | "len" "(" expr ")" | identifier | "(" expr ")"
//! ```
//!
//! Only a state-variable reference, the listed operators, and the single
//! `len` function are reachable; attribute access, indexing, and any other
//! call are rejected at parse time, never evaluated.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    True,
    False,
    Null,
    AndAnd,
    OrOr,
    Not,
    In,
    Len,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected character {0:?} in condition")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected end of condition")]
    UnexpectedEof,
    #[error("unexpected token, expected {0}")]
    Expected(&'static str),
    #[error("trailing tokens after a complete expression")]
    TrailingTokens,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
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
                tokens.push(Token::LtEq);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::GtEq);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(ParseError::UnterminatedString);
                }
                tokens.push(Token::String(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| ParseError::UnexpectedChar(c))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "in" => Token::In,
                    "len" => Token::Len,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ParseError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Literal(Value),
    Var(String),
    Len(Box<Ast>),
    Not(Box<Ast>),
    Cmp(CmpOp, Box<Ast>, Box<Ast>),
    In(Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
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

    fn expect(&mut self, expected: &Token, what: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some(t) if t == *expected => Ok(()),
            _ => Err(ParseError::Expected(what)),
        }
    }

    fn parse_expr(&mut self) -> Result<Ast, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Ast, ParseError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.advance();
            let right = self.parse_and()?;
            left = Ast::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast, ParseError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.advance();
            let right = self.parse_unary()?;
            left = Ast::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast, ParseError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Ast::Not(Box::new(inner)));
        }
        self.parse_membership()
    }

    fn parse_membership(&mut self) -> Result<Ast, ParseError> {
        let left = self.parse_comparison()?;
        if matches!(self.peek(), Some(Token::In)) {
            self.advance();
            let right = self.parse_comparison()?;
            return Ok(Ast::In(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Ast, ParseError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(CmpOp::Eq),
            Some(Token::NotEq) => Some(CmpOp::NotEq),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::LtEq) => Some(CmpOp::LtEq),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::GtEq) => Some(CmpOp::GtEq),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Ast::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Ast, ParseError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Ast::Literal(serde_json::json!(n))),
            Some(Token::String(s)) => Ok(Ast::Literal(Value::String(s))),
            Some(Token::True) => Ok(Ast::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Ast::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Ast::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Ast::Var(name)),
            Some(Token::Len) => {
                self.expect(&Token::LParen, "'(' after len")?;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')' to close len(...)")?;
                Ok(Ast::Len(Box::new(inner)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')' to close group")?;
                Ok(inner)
            }
            _ => Err(ParseError::UnexpectedEof),
        }
    }
}

/// A parsed, reusable edge condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(Ast);

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(ParseError::TrailingTokens);
        }
        Ok(Condition(ast))
    }

    /// Evaluates against `state`. A runtime type error is treated as
    /// `false`, never propagated.
    pub fn eval(&self, state: &Map<String, Value>) -> bool {
        eval_ast(&self.0, state).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

fn eval_ast(ast: &Ast, state: &Map<String, Value>) -> Option<Value> {
    match ast {
        Ast::Literal(v) => Some(v.clone()),
        Ast::Var(name) => Some(state.get(name).cloned().unwrap_or(Value::Null)),
        Ast::Len(inner) => {
            let v = eval_ast(inner, state)?;
            let len = match &v {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return None,
            };
            Some(serde_json::json!(len))
        }
        Ast::Not(inner) => {
            let v = eval_ast(inner, state)?;
            Some(Value::Bool(!truthy(&v)))
        }
        Ast::And(l, r) => {
            let lv = eval_ast(l, state)?;
            if !truthy(&lv) {
                return Some(Value::Bool(false));
            }
            let rv = eval_ast(r, state)?;
            Some(Value::Bool(truthy(&rv)))
        }
        Ast::Or(l, r) => {
            let lv = eval_ast(l, state)?;
            if truthy(&lv) {
                return Some(Value::Bool(true));
            }
            let rv = eval_ast(r, state)?;
            Some(Value::Bool(truthy(&rv)))
        }
        Ast::In(needle, haystack) => {
            let needle = eval_ast(needle, state)?;
            let haystack = eval_ast(haystack, state)?;
            match haystack {
                Value::Array(items) => Some(Value::Bool(items.contains(&needle))),
                Value::String(s) => match needle {
                    Value::String(n) => Some(Value::Bool(s.contains(&n))),
                    _ => None,
                },
                Value::Object(map) => match needle {
                    Value::String(k) => Some(Value::Bool(map.contains_key(&k))),
                    _ => None,
                },
                _ => None,
            }
        }
        Ast::Cmp(op, l, r) => {
            let lv = eval_ast(l, state)?;
            let rv = eval_ast(r, state)?;
            compare(*op, &lv, &rv)
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Option<Value> {
    let result = match op {
        CmpOp::Eq => l == r,
        CmpOp::NotEq => l != r,
        CmpOp::Lt | CmpOp::LtEq | CmpOp::Gt | CmpOp::GtEq => {
            let (lf, rf) = (l.as_f64()?, r.as_f64()?);
            match op {
                CmpOp::Lt => lf < rf,
                CmpOp::LtEq => lf <= rf,
                CmpOp::Gt => lf > rf,
                CmpOp::GtEq => lf >= rf,
                _ => unreachable!(),
            }
        }
    };
    Some(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn equality_on_state_var() {
        let cond = Condition::parse("status == 'success'").unwrap();
        assert!(cond.eval(&state(&[("status", json!("success"))])));
        assert!(!cond.eval(&state(&[("status", json!("error"))])));
    }

    #[test]
    fn numeric_comparison() {
        let cond = Condition::parse("count >= 3").unwrap();
        assert!(cond.eval(&state(&[("count", json!(5))])));
        assert!(!cond.eval(&state(&[("count", json!(1))])));
    }

    #[test]
    fn boolean_combinators() {
        let cond = Condition::parse("ready && !blocked").unwrap();
        assert!(cond.eval(&state(&[("ready", json!(true)), ("blocked", json!(false))])));
        assert!(!cond.eval(&state(&[("ready", json!(true)), ("blocked", json!(true))])));
    }

    #[test]
    fn membership_and_len() {
        let cond = Condition::parse("'x' in tags && len(tags) > 1").unwrap();
        assert!(cond.eval(&state(&[("tags", json!(["x", "y"]))])));
        assert!(!cond.eval(&state(&[("tags", json!(["x"]))])));
    }

    #[test]
    fn missing_variable_evaluates_false_not_panic() {
        let cond = Condition::parse("missing == 1").unwrap();
        assert!(!cond.eval(&Map::new()));
    }

    #[test]
    fn rejects_attribute_access() {
        assert!(Condition::parse("state.secret").is_err());
    }

    #[test]
    fn rejects_arbitrary_function_calls() {
        assert!(Condition::parse("eval('1')").is_err());
        assert!(Condition::parse("os.system('ls')").is_err());
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(Condition::parse("status == 'oops").is_err());
    }
}
