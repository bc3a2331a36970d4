use super::{RawTree, ResolvedTree};
use crate::diag::{codes, Location};
use crate::schema::{Definition, Element, Schema};
use crate::stmt::{visit_mut, Expr, ExprRef, Query, SelectItem, VisitMut};
use crate::{Diagnostics, Options};

use log::{debug, trace};

/// Upper bound on inlining rounds. Chains of calculated elements referencing
/// calculated elements converge in as many rounds as the chain is long; a
/// round that still substitutes at the cap is a reference cycle.
const MAX_INLINE_ROUNDS: usize = 32;

impl RawTree {
    /// Inlines every reference to an on-read calculated element into the
    /// views that surface it, then cleans the storage side up: on-read
    /// calculated elements are deleted, on-write ones move to the end of
    /// their definition's element sequence.
    pub fn rewrite_calculated(self, options: &Options, diag: &mut Diagnostics) -> ResolvedTree {
        let mut schema = self.schema;

        debug!("rewriting calculated elements in views");

        for index in 0..schema.definitions.len() {
            let definition = &schema.definitions[index];
            let Some(query) = definition.query() else {
                continue;
            };

            let mut query = query.clone();
            let view_name = definition.name.qualified();
            rewrite_view(&schema, &view_name, &mut query, options, diag);

            let definition = schema
                .definitions
                .get_index_mut(index)
                .map(|(_, definition)| definition)
                .expect("definition index in range");
            *definition.query_mut().expect("definition is a view") = query;
        }

        cleanup_storage_side(&mut schema);

        ResolvedTree { schema }
    }
}

fn rewrite_view(
    schema: &Schema,
    view_name: &str,
    query: &mut Query,
    options: &Options,
    diag: &mut Diagnostics,
) {
    let Some(source) = query.primary_source() else {
        return;
    };
    let Some(root) = schema.definitions.get(&source.target) else {
        // Unknown source; the front end reports this, nothing to rewrite.
        return;
    };

    // A view without an explicit column list gets a synthesized star.
    if query.columns.is_empty() {
        query.columns.push(SelectItem::Star);
    }

    // Stars cannot carry a calculated element into the output, so they are
    // exploded into individual columns whenever the source has any.
    let has_calculated = root
        .elements
        .values()
        .any(|element| element.is_calculated_on_read());

    if has_calculated && query.columns.iter().any(SelectItem::is_star) {
        query.columns = explode_star(root, &query.columns, &query.excluding);
    }

    // Inlining replaces the reference expression, which would lose the
    // column's name; pin it as an alias first.
    for column in &mut query.columns {
        let SelectItem::Expr(select_expr) = column else {
            continue;
        };
        if select_expr.alias.is_some() {
            continue;
        }
        if let Some(expr_ref) = select_expr.expr.as_ref_expr() {
            let is_calc = schema
                .resolve(root, &expr_ref.path)
                .map(Element::is_calculated_on_read)
                .unwrap_or(false);
            if is_calc {
                select_expr.alias = Some(expr_ref.join(options.sep()));
            }
        }
    }

    // Calculated elements used only in filters still get a column for the
    // duration of the rewrite; it is removed again below.
    let synthetic_from = query.columns.len();
    for expr_ref in filter_only_calc_refs(schema, root, query) {
        query.columns.push(SelectItem::expr(Expr::Ref(expr_ref)));
    }

    for round in 0..MAX_INLINE_ROUNDS {
        let mut inline = InlineCalc {
            schema,
            root,
            changed: false,
        };
        inline.visit_query_mut(query);

        if !inline.changed {
            break;
        }

        if round == MAX_INLINE_ROUNDS - 1 {
            diag.error(
                codes::REF_CYCLIC_CALCULATED,
                Location::definition(view_name),
                "calculated elements reference each other in a cycle",
            );
        }
    }

    query.columns.truncate(synthetic_from);
}

/// Expands every star in `columns` against the source's elements, honoring
/// the `excluding` list and explicit-column shadowing. To-many and
/// unmanaged relationships are not projectable and are skipped.
fn explode_star(root: &Definition, columns: &[SelectItem], excluding: &[String]) -> Vec<SelectItem> {
    let listed: Vec<&str> = columns
        .iter()
        .filter_map(|column| column.as_select_expr())
        .filter_map(|select_expr| select_expr.expr.as_ref_expr())
        .filter(|expr_ref| expr_ref.path.len() == 1)
        .map(|expr_ref| expr_ref.head())
        .collect();

    let mut out = Vec::with_capacity(columns.len() + root.elements.len());

    for column in columns {
        if !column.is_star() {
            out.push(column.clone());
            continue;
        }

        for element in root.rendered_elements() {
            if excluding.iter().any(|name| name == &element.name) {
                continue;
            }
            if listed.contains(&element.name.as_str()) {
                continue;
            }
            if let Some(relation) = element.as_relation() {
                if relation.is_to_many() || !relation.is_managed() {
                    continue;
                }
            }

            out.push(SelectItem::expr(Expr::reference([element.name.as_str()])));
        }
    }

    out
}

/// References to on-read calculated elements that appear in the filter or
/// having clause but in no projected column.
fn filter_only_calc_refs(schema: &Schema, root: &Definition, query: &Query) -> Vec<ExprRef> {
    let mut refs = vec![];

    if let Some(filter) = &query.filter {
        collect_calc_refs(schema, root, filter, &mut refs);
    }
    if let Some(having) = &query.having {
        collect_calc_refs(schema, root, having, &mut refs);
    }

    refs.retain(|expr_ref| {
        !query
            .columns
            .iter()
            .filter_map(|column| column.as_select_expr())
            .any(|select_expr| select_expr.expr.as_ref_expr() == Some(expr_ref))
    });

    refs
}

fn collect_calc_refs(schema: &Schema, root: &Definition, expr: &Expr, out: &mut Vec<ExprRef>) {
    match expr {
        Expr::Ref(expr_ref) => {
            let is_calc = schema
                .resolve(root, &expr_ref.path)
                .map(Element::is_calculated_on_read)
                .unwrap_or(false);

            if is_calc && !out.contains(expr_ref) {
                out.push(expr_ref.clone());
            }
        }
        Expr::And(expr_and) => {
            for operand in &expr_and.operands {
                collect_calc_refs(schema, root, operand, out);
            }
        }
        Expr::Or(expr_or) => {
            for operand in &expr_or.operands {
                collect_calc_refs(schema, root, operand, out);
            }
        }
        Expr::BinaryOp(expr_binary_op) => {
            collect_calc_refs(schema, root, &expr_binary_op.lhs, out);
            collect_calc_refs(schema, root, &expr_binary_op.rhs, out);
        }
        Expr::Func(expr_func) => {
            for arg in &expr_func.args {
                collect_calc_refs(schema, root, arg, out);
            }
        }
        // Sub-queries scope their references to their own source.
        Expr::Query(..) | Expr::SelfRef | Expr::Value(..) => {}
    }
}

/// Substitutes references to on-read calculated elements with the element's
/// expression, re-scoped to the referencing path.
struct InlineCalc<'a> {
    schema: &'a Schema,
    root: &'a Definition,
    changed: bool,
}

impl VisitMut for InlineCalc<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let Expr::Ref(expr_ref) = expr {
            let element = self.schema.resolve(self.root, &expr_ref.path);

            if element.map(Element::is_calculated_on_read).unwrap_or(false) {
                let calculated = element
                    .and_then(|element| element.calculated.as_ref())
                    .expect("checked to be calculated");

                // Internal references are relative to the defining
                // definition; prefixing with the navigation path makes them
                // absolute with respect to the view's source.
                let prefix = expr_ref.path[..expr_ref.path.len() - 1].to_vec();
                let mut inlined = calculated.expr.clone();
                Rescope { prefix: &prefix }.visit_expr_mut(&mut inlined);

                trace!("inlined calculated element `{}`", expr_ref.join("."));

                *expr = inlined;
                self.changed = true;

                // Chained calculated references are picked up next round.
                return;
            }
        }

        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_query_mut(&mut self, query: &mut Query) {
        // A nested query scopes its references to its own source.
        let root = query
            .primary_source()
            .and_then(|source| self.schema.definitions.get(&source.target));

        match root {
            Some(root) if root.id != self.root.id => {
                let mut nested = InlineCalc {
                    schema: self.schema,
                    root,
                    changed: false,
                };
                visit_mut::visit_query_mut(&mut nested, query);
                self.changed |= nested.changed;
            }
            _ => visit_mut::visit_query_mut(self, query),
        }
    }
}

struct Rescope<'a> {
    prefix: &'a [String],
}

impl VisitMut for Rescope<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.prefix.is_empty() {
            return;
        }

        if let Expr::Ref(expr_ref) = expr {
            let mut path = self.prefix.to_vec();
            path.append(&mut expr_ref.path);
            expr_ref.path = path;
            return;
        }

        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_query_mut(&mut self, _query: &mut Query) {
        // References inside a nested query resolve against that query's own
        // source and keep their paths.
    }
}

/// Deletes on-read calculated elements from entities and structured types
/// and moves on-write ones to the end of the element sequence. Runs only
/// after every view has been rewritten.
fn cleanup_storage_side(schema: &mut Schema) {
    for definition in schema.definitions.values_mut() {
        if definition.is_view() || definition.is_dummy() {
            continue;
        }

        let on_read: Vec<String> = definition
            .elements
            .values()
            .filter(|element| element.is_calculated_on_read())
            .map(|element| element.name.clone())
            .collect();

        for name in &on_read {
            definition.elements.shift_remove(name);
            trace!("removed consumed calculated element `{name}`");
        }

        let on_write: Vec<String> = definition
            .elements
            .values()
            .filter(|element| {
                element
                    .calculated
                    .as_ref()
                    .map(|calculated| calculated.on_write)
                    .unwrap_or(false)
            })
            .map(|element| element.name.clone())
            .collect();

        for name in on_write {
            if let Some(element) = definition.elements.shift_remove(&name) {
                definition.elements.insert(name, element);
            }
        }
    }
}
