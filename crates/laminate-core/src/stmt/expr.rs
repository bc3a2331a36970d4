use super::{Query, Value};

/// An expression inside a query, on-condition, or calculated element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    /// AND a set of expressions
    And(ExprAnd),

    /// Binary comparison
    BinaryOp(ExprBinaryOp),

    /// Function call
    Func(ExprFunc),

    /// OR a set of expressions
    Or(ExprOr),

    /// References an element through a path of names
    Ref(ExprRef),

    /// References the owning row itself; used by backlink on-conditions
    SelfRef,

    /// Evaluate a sub-query
    Query(Box<Query>),

    /// A constant value
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprAnd {
    pub operands: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprOr {
    pub operands: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprBinaryOp {
    pub lhs: Box<Expr>,
    pub op: BinaryOp,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprFunc {
    pub name: String,
    pub args: Vec<Expr>,
}

/// A reference path through element names, relative to the enclosing
/// query's source (or to the owning definition for on-conditions and
/// calculated elements).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprRef {
    pub path: Vec<String>,
}

impl Expr {
    pub fn reference<I>(path: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::Ref(ExprRef {
            path: path.into_iter().map(Into::into).collect(),
        })
    }

    pub fn self_ref() -> Self {
        Self::SelfRef
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn eq(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::binary_op(lhs, BinaryOp::Eq, rhs)
    }

    pub fn add(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::binary_op(lhs, BinaryOp::Add, rhs)
    }

    pub fn binary_op(lhs: impl Into<Expr>, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Self::BinaryOp(ExprBinaryOp {
            lhs: Box::new(lhs.into()),
            op,
            rhs: Box::new(rhs.into()),
        })
    }

    pub fn and_from_vec(operands: Vec<Expr>) -> Self {
        Self::And(ExprAnd { operands })
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Func(ExprFunc {
            name: name.into(),
            args,
        })
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(..))
    }

    pub fn as_ref_expr(&self) -> Option<&ExprRef> {
        match self {
            Self::Ref(expr_ref) => Some(expr_ref),
            _ => None,
        }
    }
}

impl ExprRef {
    /// The first path segment.
    pub fn head(&self) -> &str {
        self.path.first().expect("a reference path is never empty")
    }

    /// The full path joined with `sep`.
    pub fn join(&self, sep: &str) -> String {
        self.path.join(sep)
    }
}

impl From<ExprRef> for Expr {
    fn from(value: ExprRef) -> Self {
        Self::Ref(value)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
