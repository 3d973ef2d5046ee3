//! Filter expression language.
//!
//! Expressions are parsed once into an [`Expr`] tree and evaluated against a
//! [`Sample`](crate::Sample). Bare names resolve to sample fields; calls
//! resolve at compile time against the fixed table in [`functions`].
//! Evaluation is pure: it only reads the sample.

mod eval;
pub mod functions;
mod lexer;
mod parser;

pub use functions::Function;
pub use parser::parse;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Is,
    IsNot,
}

/// Compiled expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Field names referenced anywhere in the tree, in first-use order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Field(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Unary(_, e) | Self::Not(e) => e.collect_fields(out),
            Self::Binary(_, a, b) | Self::Compare(_, a, b) | Self::And(a, b) | Self::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => {
                then.collect_fields(out);
                cond.collect_fields(out);
                otherwise.collect_fields(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.collect_fields(out)),
        }
    }
}

/// Malformed expression source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset into the source
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at offset {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Runtime failure evaluating an expression against one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Referenced field is absent from the sample
    UndefinedName(String),
    /// Operation applied to operands of the wrong type (e.g. `None + 1`)
    Type(String),
    ZeroDivision,
    /// Argument outside a function's domain, or numeric overflow
    Domain(String),
}

impl EvalError {
    /// Absent fields are expected: the output field is simply left out.
    pub const fn is_undefined_name(&self) -> bool {
        matches!(self, Self::UndefinedName(_))
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedName(name) => write!(f, "name '{name}' is not defined"),
            Self::Type(msg) => write!(f, "type error: {msg}"),
            Self::ZeroDivision => f.write_str("division by zero"),
            Self::Domain(msg) => write!(f, "value error: {msg}"),
        }
    }
}

impl std::error::Error for EvalError {}
