//! Typed boolean filter trees over one event's properties.
//!
//! Predicates are built with [`field`] and [`lit`]:
//!
//! ```ignore
//! let p = field("N").gt(0).and(field("Title").starts_with("ord"));
//! ```
//!
//! [`compiler`] turns them into parameterized SQL; [`eval`] evaluates them
//! against a decoded event when the database cannot.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod compiler;
pub mod eval;

pub use compiler::{Binding, CompileContext, PredicateCompiler, PredicateFragment};
pub use eval::evaluate;

/// Call shapes understood by the compiler.
pub mod method {
    pub const CONTAINS: &str = "contains";
    pub const STARTS_WITH: &str = "starts_with";
    pub const ENDS_WITH: &str = "ends_with";
    pub const IN: &str = "in";
}

/// Errors raised while compiling or evaluating a predicate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredicateError {
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unsupported call: {0}")]
    UnsupportedCall(String),

    #[error("Unknown property {property} on {type_name}")]
    UnknownProperty { type_name: String, property: String },

    #[error("Property {0} is not JSON-encoded; nested access is not possible")]
    NotJsonProperty(String),

    #[error("Collection for IN must be a constant list")]
    NonConstantCollection,

    #[error("Pattern for {0} must be a string constant")]
    NonConstantPattern(String),

    #[error("Cannot filter on {0}: the database has no decompression function")]
    DecompressionUnavailable(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

/// Constant values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    List(Vec<Literal>),
}

macro_rules! impl_literal_from {
    ($($ty:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Literal {
                fn from(value: $ty) -> Self {
                    Literal::$variant($conv(value))
                }
            }

            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Constant(Literal::from(value))
                }
            }
        )*
    };
}

impl_literal_from! {
    bool => Bool via |v| v,
    u8 => Int via i64::from,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    u32 => Int via i64::from,
    i64 => Int via |v| v,
    f32 => Float via f64::from,
    f64 => Float via |v| v,
    &str => String via str::to_string,
    String => String via |v| v,
    Uuid => Uuid via |v| v,
    DateTime<Utc> => DateTime via |v| v,
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(values: Vec<T>) -> Self {
        Literal::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Literal::Null)
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        Expr::Constant(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Conversion-style wrapper; compiles to its operand.
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Filter tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Literal),
    /// Dotted member path; segments after the first address nested JSON.
    Member(Vec<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        method: String,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
}

/// Member access by dotted path, e.g. `field("MyProp.StringList.0")`.
pub fn field(path: &str) -> Expr {
    Expr::Member(path.split('.').map(str::to_string).collect())
}

pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Constant(value.into())
}

impl Expr {
    pub fn binary(op: BinaryOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    pub fn call(method: &str, target: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            method: method.to_string(),
            target: Box::new(target),
            args,
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ne, self, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Lt, self, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Le, self, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Gt, self, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Ge, self, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Or, self, other)
    }

    pub fn add(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Add, self, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Sub, self, other)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        self.eq(Literal::Null)
    }

    pub fn is_not_null(self) -> Expr {
        self.ne(Literal::Null)
    }

    pub fn contains(self, value: impl Into<Expr>) -> Expr {
        Expr::call(method::CONTAINS, self, vec![value.into()])
    }

    pub fn starts_with(self, value: impl Into<Expr>) -> Expr {
        Expr::call(method::STARTS_WITH, self, vec![value.into()])
    }

    pub fn ends_with(self, value: impl Into<Expr>) -> Expr {
        Expr::call(method::ENDS_WITH, self, vec![value.into()])
    }

    pub fn is_in(self, values: impl Into<Literal>) -> Expr {
        Expr::call(method::IN, self, vec![Expr::Constant(values.into())])
    }

    /// OR of all expressions, `None` when empty.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|acc, e| acc.or(e))
    }

    /// AND of all expressions, `None` when empty.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|acc, e| acc.and(e))
    }

    /// Top-level AND operands, left to right.
    pub fn conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut parts = left.conjuncts();
                parts.extend(right.conjuncts());
                parts
            }
            other => vec![other],
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(v) => write!(f, "{:?}", v),
            Literal::Uuid(v) => write!(f, "{}", v),
            Literal::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(lit) => write!(f, "{}", lit),
            Expr::Member(path) => write!(f, "e.{}", path.join(".")),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!({})", operand),
                UnaryOp::Negate => write!(f, "-({})", operand),
                UnaryOp::Identity => write!(f, "{}", operand),
            },
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.sql(), right),
            Expr::Call {
                method,
                target,
                args,
            } => {
                write!(f, "{}.{}(", target, method)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
