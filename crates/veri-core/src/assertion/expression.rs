//! Evaluador sandbox de la forma expresión.
//!
//! Una expresión es booleana y se evalúa contra el espacio de señales
//! resueltas. El sandbox no permite I/O, mutación ni bucles (la gramática
//! no los tiene), y un presupuesto duro de pasos de evaluación corta el
//! descenso ante entradas patológicas: agotarlo produce un error, nunca un
//! FAIL.
//!
//! Gramática (descenso recursivo, precedencia ascendente):
//!   or    := and (("or" | "||") and)*
//!   and   := not (("and" | "&&") not)*
//!   not   := ("not" | "!") not | cmp
//!   cmp   := add (("<" | "<=" | ">" | ">=" | "==" | "!=") add)?
//!   add   := mul (("+" | "-") mul)*
//!   mul   := unary (("*" | "/") unary)*
//!   unary := "-" unary | primary
//!   primary := number | string | "true" | "false" | "null" | ident | "(" or ")"

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Error de evaluación de una expresión. Siempre se reporta como resultado
/// ERROR de la aserción, nunca como FAIL.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    Parse(String),
    BudgetExceeded,
    UnknownSignal(String),
    TypeMismatch(String),
    NotBoolean,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::Parse(msg) => write!(f, "parse error: {msg}"),
            ExprError::BudgetExceeded => write!(f, "evaluation budget exceeded"),
            ExprError::UnknownSignal(name) => write!(f, "unknown signal '{name}'"),
            ExprError::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            ExprError::NotBoolean => write!(f, "expression did not produce a boolean"),
        }
    }
}

// ---------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(source: &str, budget: u32) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        if tokens.len() as u32 > budget {
            return Err(ExprError::BudgetExceeded);
        }
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExprError::Parse("single '=' is not an operator".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' => {
                chars.next();
                if chars.next() == Some('&') {
                    tokens.push(Token::And);
                } else {
                    return Err(ExprError::Parse("single '&' is not an operator".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.next() == Some('|') {
                    tokens.push(Token::Or);
                } else {
                    return Err(ExprError::Parse("single '|' is not an operator".to_string()));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(ExprError::Parse("unterminated string literal".to_string())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            d if d.is_ascii_digit() => {
                let mut num = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        num.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed = num.parse::<f64>().map_err(|_| ExprError::Parse(format!("invalid number '{num}'")))?;
                tokens.push(Token::Num(parsed));
            }
            a if a.is_ascii_alphabetic() || a == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                                "and" => Token::And,
                                "or" => Token::Or,
                                "not" => Token::Not,
                                "true" => Token::True,
                                "false" => Token::False,
                                "null" => Token::Null,
                                _ => Token::Ident(ident),
                            });
            }
            other => return Err(ExprError::Parse(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------
// AST y parser
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_add()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_add(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(ExprError::Parse("expected ')'".to_string()));
                }
                Ok(inner)
            }
            other => Err(ExprError::Parse(format!("unexpected token {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------
// Evaluación
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum EvalValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl EvalValue {
    fn from_json(v: &Value) -> Result<Self, ExprError> {
        match v {
            Value::Null => Ok(EvalValue::Null),
            Value::Bool(b) => Ok(EvalValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(EvalValue::Num)
                                 .ok_or_else(|| ExprError::TypeMismatch("non-finite number".to_string())),
            Value::String(s) => Ok(EvalValue::Str(s.clone())),
            other => Err(ExprError::TypeMismatch(format!("signals of type {} are not usable in expressions",
                                                         match other {
                                                             Value::Array(_) => "array",
                                                             _ => "object",
                                                         }))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EvalValue::Null => "null",
            EvalValue::Bool(_) => "boolean",
            EvalValue::Num(_) => "number",
            EvalValue::Str(_) => "string",
        }
    }
}

struct Evaluator<'a> {
    namespace: &'a IndexMap<String, Value>,
    remaining: u32,
}

impl<'a> Evaluator<'a> {
    fn tick(&mut self) -> Result<(), ExprError> {
        if self.remaining == 0 {
            return Err(ExprError::BudgetExceeded);
        }
        self.remaining -= 1;
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<EvalValue, ExprError> {
        self.tick()?;
        match expr {
            Expr::Num(n) => Ok(EvalValue::Num(*n)),
            Expr::Str(s) => Ok(EvalValue::Str(s.clone())),
            Expr::Bool(b) => Ok(EvalValue::Bool(*b)),
            Expr::Null => Ok(EvalValue::Null),
            Expr::Ident(name) => {
                let value = self.namespace
                                .get(name)
                                .ok_or_else(|| ExprError::UnknownSignal(name.clone()))?;
                EvalValue::from_json(value)
            }
            Expr::Not(inner) => match self.eval(inner)? {
                EvalValue::Bool(b) => Ok(EvalValue::Bool(!b)),
                other => Err(ExprError::TypeMismatch(format!("'not' needs a boolean, got {}", other.kind()))),
            },
            Expr::Neg(inner) => match self.eval(inner)? {
                EvalValue::Num(n) => Ok(EvalValue::Num(-n)),
                other => Err(ExprError::TypeMismatch(format!("unary '-' needs a number, got {}", other.kind()))),
            },
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right),
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<EvalValue, ExprError> {
        // cortocircuito booleano
        if matches!(op, BinOp::And | BinOp::Or) {
            let l = match self.eval(left)? {
                EvalValue::Bool(b) => b,
                other => return Err(ExprError::TypeMismatch(format!("logical operand must be boolean, got {}", other.kind()))),
            };
            if op == BinOp::And && !l {
                return Ok(EvalValue::Bool(false));
            }
            if op == BinOp::Or && l {
                return Ok(EvalValue::Bool(true));
            }
            return match self.eval(right)? {
                EvalValue::Bool(b) => Ok(EvalValue::Bool(b)),
                other => Err(ExprError::TypeMismatch(format!("logical operand must be boolean, got {}", other.kind()))),
            };
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let (a, b) = match (&l, &r) {
                    (EvalValue::Num(a), EvalValue::Num(b)) => (*a, *b),
                    _ => {
                        return Err(ExprError::TypeMismatch(format!("arithmetic needs numbers, got {} and {}",
                                                                   l.kind(),
                                                                   r.kind())))
                    }
                };
                let result = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => {
                        if b == 0.0 {
                            return Err(ExprError::TypeMismatch("division by zero".to_string()));
                        }
                        a / b
                    }
                    _ => unreachable!(),
                };
                Ok(EvalValue::Num(result))
            }
            BinOp::Eq => Ok(EvalValue::Bool(Self::loose_eq(&l, &r))),
            BinOp::Ne => Ok(EvalValue::Bool(!Self::loose_eq(&l, &r))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&l, &r) {
                    (EvalValue::Num(a), EvalValue::Num(b)) => a.partial_cmp(b)
                                                               .ok_or_else(|| ExprError::TypeMismatch("NaN comparison".to_string()))?,
                    (EvalValue::Str(a), EvalValue::Str(b)) => a.cmp(b),
                    _ => {
                        return Err(ExprError::TypeMismatch(format!("cannot order {} against {}", l.kind(), r.kind())))
                    }
                };
                let ok = match op {
                    BinOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinOp::Le => ordering != std::cmp::Ordering::Greater,
                    BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                    BinOp::Ge => ordering != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(EvalValue::Bool(ok))
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    /// Igualdad permisiva: tipos distintos no son iguales (sin error); la
    /// comparación con null así se vuelve utilizable junto a
    /// `treat_missing_as_null`.
    fn loose_eq(l: &EvalValue, r: &EvalValue) -> bool {
        l == r
    }
}

/// Evalúa una expresión contra el espacio de señales resueltas.
pub fn evaluate_expression(source: &str, namespace: &IndexMap<String, Value>, budget: u32) -> Result<bool, ExprError> {
    let tokens = tokenize(source, budget)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse("trailing tokens after expression".to_string()));
    }
    let mut evaluator = Evaluator { namespace,
                                    remaining: budget };
    match evaluator.eval(&ast)? {
        EvalValue::Bool(b) => Ok(b),
        _ => Err(ExprError::NotBoolean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ns(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn eui_comparison_scenario() {
        let namespace = ns(&[("site_eui_kwh_m2", json!(120)), ("target_eui_kwh_m2", json!(150))]);
        assert_eq!(evaluate_expression("site_eui_kwh_m2 < target_eui_kwh_m2", &namespace, 1000), Ok(true));

        let swapped = ns(&[("site_eui_kwh_m2", json!(150)), ("target_eui_kwh_m2", json!(120))]);
        assert_eq!(evaluate_expression("site_eui_kwh_m2 < target_eui_kwh_m2", &swapped, 1000), Ok(false));
    }

    #[test]
    fn boolean_composition_and_precedence() {
        let namespace = ns(&[("a", json!(1)), ("b", json!(2)), ("ok", json!(true))]);
        assert_eq!(evaluate_expression("a + 1 == b and (ok or a > 10)", &namespace, 1000), Ok(true));
        assert_eq!(evaluate_expression("not ok or a * 2 == b", &namespace, 1000), Ok(true));
    }

    #[test]
    fn null_equality_is_usable() {
        let namespace = ns(&[("maybe", Value::Null), ("x", json!(3))]);
        assert_eq!(evaluate_expression("maybe == null or x > 5", &namespace, 1000), Ok(true));
        assert_eq!(evaluate_expression("x == null", &namespace, 1000), Ok(false));
    }

    #[test]
    fn unknown_signal_is_an_error() {
        let namespace = ns(&[]);
        assert_eq!(evaluate_expression("ghost > 1", &namespace, 1000),
                   Err(ExprError::UnknownSignal("ghost".to_string())));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let namespace = ns(&[("name", json!("north"))]);
        assert!(matches!(evaluate_expression("name > 5", &namespace, 1000), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let namespace = ns(&[("x", json!(3))]);
        assert_eq!(evaluate_expression("x + 1", &namespace, 1000), Err(ExprError::NotBoolean));
    }

    #[test]
    fn budget_bounds_pathological_input() {
        // expresión profundamente anidada: el presupuesto la corta sin pánico
        let mut source = String::from("1");
        for _ in 0..200 {
            source = format!("({source} + 1)");
        }
        source.push_str(" == 0");
        let namespace = ns(&[]);
        assert_eq!(evaluate_expression(&source, &namespace, 50), Err(ExprError::BudgetExceeded));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let namespace = ns(&[("x", json!(1))]);
        assert!(matches!(evaluate_expression("x / 0 == 1", &namespace, 1000), Err(ExprError::TypeMismatch(_))));
    }
}
