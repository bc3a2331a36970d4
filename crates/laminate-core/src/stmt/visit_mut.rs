#![allow(unused_variables)]

use super::{Expr, OrderByExpr, Query, SelectItem, Source};

/// Mutable visitor over the statement tree. Implementations override the
/// hooks they care about and delegate the rest to the free walk functions.
pub trait VisitMut {
    fn visit_expr_mut(&mut self, i: &mut Expr) {
        visit_expr_mut(self, i);
    }

    fn visit_query_mut(&mut self, i: &mut Query) {
        visit_query_mut(self, i);
    }

    fn visit_source_mut(&mut self, i: &mut Source) {
        visit_source_mut(self, i);
    }

    fn visit_select_item_mut(&mut self, i: &mut SelectItem) {
        visit_select_item_mut(self, i);
    }

    fn visit_order_by_expr_mut(&mut self, i: &mut OrderByExpr) {
        visit_order_by_expr_mut(self, i);
    }
}

pub fn visit_expr_mut<V>(v: &mut V, node: &mut Expr)
where
    V: VisitMut + ?Sized,
{
    match node {
        Expr::And(expr_and) => {
            for operand in &mut expr_and.operands {
                v.visit_expr_mut(operand);
            }
        }
        Expr::BinaryOp(expr_binary_op) => {
            v.visit_expr_mut(&mut expr_binary_op.lhs);
            v.visit_expr_mut(&mut expr_binary_op.rhs);
        }
        Expr::Func(expr_func) => {
            for arg in &mut expr_func.args {
                v.visit_expr_mut(arg);
            }
        }
        Expr::Or(expr_or) => {
            for operand in &mut expr_or.operands {
                v.visit_expr_mut(operand);
            }
        }
        Expr::Query(query) => {
            v.visit_query_mut(query);
        }
        Expr::Ref(..) | Expr::SelfRef | Expr::Value(..) => {}
    }
}

pub fn visit_query_mut<V>(v: &mut V, node: &mut Query)
where
    V: VisitMut + ?Sized,
{
    v.visit_source_mut(&mut node.source);

    for column in &mut node.columns {
        v.visit_select_item_mut(column);
    }

    if let Some(filter) = &mut node.filter {
        v.visit_expr_mut(filter);
    }

    for expr in &mut node.group_by {
        v.visit_expr_mut(expr);
    }

    if let Some(having) = &mut node.having {
        v.visit_expr_mut(having);
    }

    for order_by_expr in &mut node.order_by {
        v.visit_order_by_expr_mut(order_by_expr);
    }
}

pub fn visit_source_mut<V>(v: &mut V, node: &mut Source)
where
    V: VisitMut + ?Sized,
{
    match node {
        Source::Def(..) => {}
        Source::Join(join) => {
            v.visit_source_mut(&mut join.left);
            v.visit_source_mut(&mut join.right);
            v.visit_expr_mut(&mut join.on);
        }
        Source::SetOp(set_op) => {
            v.visit_query_mut(&mut set_op.left);
            v.visit_query_mut(&mut set_op.right);
        }
    }
}

pub fn visit_select_item_mut<V>(v: &mut V, node: &mut SelectItem)
where
    V: VisitMut + ?Sized,
{
    match node {
        SelectItem::Star => {}
        SelectItem::Expr(select_expr) => v.visit_expr_mut(&mut select_expr.expr),
        SelectItem::Expand(expand) => {
            for item in &mut expand.items {
                v.visit_select_item_mut(item);
            }
        }
    }
}

pub fn visit_order_by_expr_mut<V>(v: &mut V, node: &mut OrderByExpr)
where
    V: VisitMut + ?Sized,
{
    v.visit_expr_mut(&mut node.expr);
}
