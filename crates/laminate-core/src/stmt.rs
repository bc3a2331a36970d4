mod expr;
pub use expr::{BinaryOp, Expr, ExprAnd, ExprBinaryOp, ExprFunc, ExprOr, ExprRef};

mod query;
pub use query::{
    Direction, Expand, ExpandKind, Join, OrderByExpr, Query, SelectExpr, SelectItem, SetOp,
    SetOpKind, Source, SourceDef,
};

mod value;
pub use value::Value;

pub mod visit_mut;
pub use visit_mut::VisitMut;
