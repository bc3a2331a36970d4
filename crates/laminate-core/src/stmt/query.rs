use super::Expr;
use crate::schema::Name;

/// A view/projection body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    pub source: Source,

    /// Projected columns, in declaration order. Empty means "no explicit
    /// column list"; the calculated-element rewriter synthesizes a star.
    pub columns: Vec<SelectItem>,

    /// Names excluded from star expansion.
    pub excluding: Vec<String>,

    pub filter: Option<Expr>,

    pub group_by: Vec<Expr>,

    pub having: Option<Expr>,

    pub order_by: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Source {
    /// A single definition
    Def(SourceDef),

    /// A join tree
    Join(Box<Join>),

    /// A set combination of two queries
    SetOp(Box<SetOp>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceDef {
    pub target: Name,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Join {
    pub left: Source,
    pub right: Source,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SetOp {
    pub op: SetOpKind,
    pub left: Query,
    pub right: Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// One entry of a column list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectItem {
    /// `*`: expanded against the query's combined source elements.
    Star,

    Expr(SelectExpr),

    /// A structured expand/inline group.
    Expand(Expand),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expand {
    pub kind: ExpandKind,

    /// Path to the structured field or relationship being expanded.
    pub path: Vec<String>,

    pub alias: Option<String>,

    /// Nested column list, possibly containing further groups.
    pub items: Vec<SelectItem>,

    /// Names excluded from a nested star.
    pub excluding: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExpandKind {
    /// Keeps a nested group in the output (wire-metadata).
    Expand,

    /// Splices the group's columns into the parent list.
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderByExpr {
    pub expr: Expr,
    pub order: Option<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Asc,
    Desc,
}

impl Query {
    /// A query selecting everything from a single definition.
    pub fn select(target: impl Into<Name>) -> Self {
        Self {
            source: Source::Def(SourceDef {
                target: target.into(),
                alias: None,
            }),
            columns: vec![],
            excluding: vec![],
            filter: None,
            group_by: vec![],
            having: None,
            order_by: vec![],
        }
    }

    /// The definition the query primarily reads from: the left-most leaf of
    /// the source tree.
    pub fn primary_source(&self) -> Option<&SourceDef> {
        self.source.primary()
    }
}

impl Source {
    pub fn primary(&self) -> Option<&SourceDef> {
        match self {
            Self::Def(def) => Some(def),
            Self::Join(join) => join.left.primary(),
            Self::SetOp(set_op) => set_op.left.source.primary(),
        }
    }

    /// Every definition referenced anywhere in the source tree.
    pub fn targets(&self) -> Vec<&Name> {
        let mut out = vec![];
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a Name>) {
        match self {
            Self::Def(def) => out.push(&def.target),
            Self::Join(join) => {
                join.left.collect_targets(out);
                join.right.collect_targets(out);
            }
            Self::SetOp(set_op) => {
                set_op.left.source.collect_targets(out);
                set_op.right.source.collect_targets(out);
            }
        }
    }
}

impl SelectItem {
    pub fn expr(expr: impl Into<Expr>) -> Self {
        Self::Expr(SelectExpr {
            expr: expr.into(),
            alias: None,
        })
    }

    pub fn aliased(expr: impl Into<Expr>, alias: impl Into<String>) -> Self {
        Self::Expr(SelectExpr {
            expr: expr.into(),
            alias: Some(alias.into()),
        })
    }

    pub fn is_star(&self) -> bool {
        matches!(self, Self::Star)
    }

    pub fn as_select_expr(&self) -> Option<&SelectExpr> {
        match self {
            Self::Expr(select_expr) => Some(select_expr),
            _ => None,
        }
    }
}
