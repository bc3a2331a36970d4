use super::{ExpandedTree, FlatTree};
use crate::diag::{codes, Location};
use crate::schema::{Definition, Element, ElementTy, Name, Schema};
use crate::stmt::{Expand, Expr, ExprRef, OrderByExpr, Query, SelectExpr, SelectItem, Source};
use crate::{Diagnostics, Options, Target};

use log::{debug, trace};
use std::collections::HashSet;

impl FlatTree {
    /// Rewrites references to structured fields and managed relationships
    /// in projected columns and group/order clauses into one reference per
    /// leaf or foreign key, in flattening order. Stars are expanded against
    /// the query's combined source elements, honoring `excluding` and
    /// explicit-column shadowing. Expand/inline groups are processed with an
    /// explicit work stack, never unbounded recursion.
    pub fn expand_references(self, options: &Options, diag: &mut Diagnostics) -> ExpandedTree {
        let mut schema = self.schema;

        debug!("expanding structural references");

        if options.keep_structured {
            // Structures stay nested; only to-many expands degrade their
            // owning definition into a dummy stand-in.
            degrade_to_many_expands(&mut schema, diag);
        } else {
            for index in 0..schema.definitions.len() {
                let definition = &schema.definitions[index];
                if definition.expanded {
                    continue;
                }
                let Some(query) = definition.query() else {
                    continue;
                };

                let mut query = query.clone();
                let view_name = definition.name.qualified();

                let expander = Expander {
                    schema: &schema,
                    options,
                };
                expander.rewrite_query(&mut query, &view_name, diag);

                let definition = schema
                    .definitions
                    .get_index_mut(index)
                    .map(|(_, definition)| definition)
                    .expect("definition index in range");
                *definition.query_mut().expect("definition is a view") = query;
                definition.expanded = true;
            }
        }

        drop_dummy_references(&mut schema, diag);

        ExpandedTree { schema }
    }
}

struct Expander<'a> {
    schema: &'a Schema,
    options: &'a Options,
}

/// One work-stack entry: the remaining items of one (possibly nested)
/// column list, together with the navigation prefix and alias context they
/// are rewritten under.
struct Frame {
    items: std::vec::IntoIter<SelectItem>,
    prefix: Vec<String>,
    alias_prefix: Option<String>,
    excluding: Vec<String>,
    listed: HashSet<String>,
}

impl Frame {
    fn new(
        items: Vec<SelectItem>,
        prefix: Vec<String>,
        alias_prefix: Option<String>,
        excluding: Vec<String>,
    ) -> Self {
        let listed = items
            .iter()
            .filter_map(|item| item.as_select_expr())
            .filter_map(|select_expr| select_expr.expr.as_ref_expr())
            .filter(|expr_ref| expr_ref.path.len() == 1)
            .map(|expr_ref| expr_ref.head().to_string())
            .collect();

        Self {
            items: items.into_iter(),
            prefix,
            alias_prefix,
            excluding,
            listed,
        }
    }
}

enum Entered {
    Frame(Frame),
    Dropped,
}

impl<'a> Expander<'a> {
    fn rewrite_query(&self, query: &mut Query, view_name: &str, diag: &mut Diagnostics) {
        self.rewrite_source(&mut query.source, view_name, diag);

        // The combined source: every definition in the join tree, left to
        // right. References resolve against the first one that knows them.
        let targets: Vec<Name> = query.source.targets().into_iter().cloned().collect();
        let sources: Vec<&Definition> = targets
            .iter()
            .filter_map(|target| self.schema.definitions.get(target))
            .collect();

        if sources.is_empty() {
            return;
        }

        // Views reading from other views project already-expanded columns;
        // only entity-backed queries carry structural references.
        if sources.iter().any(|source| !source.is_entity()) {
            return;
        }

        let columns = std::mem::take(&mut query.columns);
        query.columns = self.rewrite_columns(&sources, columns, &query.excluding, view_name, diag);

        let group_by = std::mem::take(&mut query.group_by);
        for expr in group_by {
            self.expand_clause_expr(&sources, expr, &mut query.group_by, view_name, diag);
        }

        let order_by = std::mem::take(&mut query.order_by);
        for order_by_expr in order_by {
            let mut exprs = vec![];
            self.expand_clause_expr(&sources, order_by_expr.expr, &mut exprs, view_name, diag);
            for expr in exprs {
                query.order_by.push(OrderByExpr {
                    expr,
                    order: order_by_expr.order,
                });
            }
        }

        if let Some(filter) = &mut query.filter {
            self.rewrite_subqueries(filter, view_name, diag);
        }
        if let Some(having) = &mut query.having {
            self.rewrite_subqueries(having, view_name, diag);
        }
    }

    fn rewrite_source(&self, source: &mut Source, view_name: &str, diag: &mut Diagnostics) {
        match source {
            Source::Def(..) => {}
            Source::Join(join) => {
                self.rewrite_source(&mut join.left, view_name, diag);
                self.rewrite_source(&mut join.right, view_name, diag);
            }
            Source::SetOp(set_op) => {
                self.rewrite_query(&mut set_op.left, view_name, diag);
                self.rewrite_query(&mut set_op.right, view_name, diag);
            }
        }
    }

    fn rewrite_subqueries(&self, expr: &mut Expr, view_name: &str, diag: &mut Diagnostics) {
        match expr {
            Expr::Query(query) => self.rewrite_query(query, view_name, diag),
            Expr::And(expr_and) => {
                for operand in &mut expr_and.operands {
                    self.rewrite_subqueries(operand, view_name, diag);
                }
            }
            Expr::Or(expr_or) => {
                for operand in &mut expr_or.operands {
                    self.rewrite_subqueries(operand, view_name, diag);
                }
            }
            Expr::BinaryOp(expr_binary_op) => {
                self.rewrite_subqueries(&mut expr_binary_op.lhs, view_name, diag);
                self.rewrite_subqueries(&mut expr_binary_op.rhs, view_name, diag);
            }
            Expr::Func(expr_func) => {
                for arg in &mut expr_func.args {
                    self.rewrite_subqueries(arg, view_name, diag);
                }
            }
            Expr::Ref(..) | Expr::SelfRef | Expr::Value(..) => {}
        }
    }

    fn rewrite_columns(
        &self,
        sources: &[&'a Definition],
        columns: Vec<SelectItem>,
        excluding: &[String],
        view_name: &str,
        diag: &mut Diagnostics,
    ) -> Vec<SelectItem> {
        let mut out = vec![];
        let mut stack = vec![Frame::new(columns, vec![], None, excluding.to_vec())];

        'frames: while let Some(mut frame) = stack.pop() {
            while let Some(item) = frame.items.next() {
                match item {
                    SelectItem::Star => self.expand_star(sources, &frame, &mut out),
                    SelectItem::Expr(select_expr) => {
                        self.expand_column(sources, &frame, select_expr, &mut out, view_name, diag);
                    }
                    SelectItem::Expand(group) => {
                        match self.enter_group(sources, &frame, group, view_name, diag) {
                            Entered::Frame(child) => {
                                stack.push(frame);
                                stack.push(child);
                                continue 'frames;
                            }
                            Entered::Dropped => {}
                        }
                    }
                }
            }
        }

        out
    }

    /// Expands a star against the elements visible at the frame's prefix:
    /// the combined source, a relationship target, or a structured subtree.
    /// Relations are skipped; their foreign keys are ordinary sibling
    /// columns by now.
    fn expand_star(&self, sources: &[&'a Definition], frame: &Frame, out: &mut Vec<SelectItem>) {
        let sep = self.options.sep();

        let mut elements: Vec<&Element> = vec![];
        if frame.prefix.is_empty() {
            let mut seen = HashSet::new();
            for source in sources {
                for element in source.rendered_elements() {
                    if seen.insert(element.name.as_str()) {
                        elements.push(element);
                    }
                }
            }
        } else {
            match self.resolve_in(sources, &frame.prefix) {
                Some(element) => elements = self.visible_children(element),
                None => return,
            }
        }

        for element in elements {
            if element.ignored || element.is_relation() {
                continue;
            }
            if self.dropped_array(element) {
                continue;
            }
            if frame.excluding.iter().any(|excluded| excluded == &element.name) {
                continue;
            }
            if frame.listed.contains(&element.name) {
                continue;
            }

            let mut path = frame.prefix.clone();
            path.push(element.name.clone());

            let alias = match &frame.alias_prefix {
                Some(alias_prefix) => Some(format!("{alias_prefix}{sep}{}", element.name)),
                None if frame.prefix.is_empty() => None,
                None => Some(path.join(sep)),
            };

            let collapsed = self.collapse_in(sources, &path);
            out.push(SelectItem::Expr(SelectExpr {
                expr: Expr::Ref(ExprRef { path: collapsed }),
                alias,
            }));
        }
    }

    fn expand_column(
        &self,
        sources: &[&'a Definition],
        frame: &Frame,
        select_expr: SelectExpr,
        out: &mut Vec<SelectItem>,
        view_name: &str,
        diag: &mut Diagnostics,
    ) {
        let sep = self.options.sep();
        let SelectExpr { expr, alias } = select_expr;

        let Expr::Ref(expr_ref) = &expr else {
            // Literals, functions and sub-queries pass through untouched.
            out.push(SelectItem::Expr(SelectExpr { expr, alias }));
            return;
        };

        let mut full = frame.prefix.clone();
        full.extend(expr_ref.path.iter().cloned());

        let Some(element) = self.resolve_in(sources, &full) else {
            // Unknown reference; the front end owns that diagnostic.
            out.push(SelectItem::Expr(SelectExpr {
                expr: Expr::Ref(ExprRef { path: full }),
                alias,
            }));
            return;
        };

        match &element.ty {
            ElementTy::Structured(..) | ElementTy::Named(..) => {
                for leaf_path in self.leaf_paths(element) {
                    let mut path = full.clone();
                    path.extend(leaf_path.iter().cloned());

                    let leaf_alias = match (&alias, &frame.alias_prefix) {
                        (Some(alias), _) => format!("{alias}{sep}{}", leaf_path.join(sep)),
                        (None, Some(alias_prefix)) => {
                            format!(
                                "{alias_prefix}{sep}{}{sep}{}",
                                expr_ref.join(sep),
                                leaf_path.join(sep)
                            )
                        }
                        (None, None) => path.join(sep),
                    };

                    let collapsed = self.collapse_in(sources, &path);
                    out.push(SelectItem::Expr(SelectExpr {
                        expr: Expr::Ref(ExprRef { path: collapsed }),
                        alias: Some(leaf_alias),
                    }));
                }
            }
            ElementTy::Relation(relation) => {
                if relation.is_to_many() {
                    diag.error(
                        codes::EXPAND_TO_MANY,
                        Location::element(view_name, full.join(".")),
                        "a to-many relationship cannot be flattened into a column",
                    );
                    return;
                }
                if !relation.is_managed() || relation.synthesized.is_empty() {
                    diag.warning(
                        codes::REL_KEY_WITHOUT_FK,
                        Location::element(view_name, full.join(".")),
                        "the relationship carries no foreign keys; the column is dropped",
                    );
                    return;
                }

                let strip = format!("{}{sep}", element.name);
                for synthesized in &relation.synthesized {
                    let suffix = synthesized
                        .name
                        .strip_prefix(&strip)
                        .unwrap_or(&synthesized.name);

                    let mut path = full[..full.len() - 1].to_vec();
                    path.push(synthesized.name.clone());

                    let leaf_alias = match (&alias, &frame.alias_prefix) {
                        (Some(alias), _) => format!("{alias}{sep}{suffix}"),
                        (None, Some(alias_prefix)) => {
                            format!("{alias_prefix}{sep}{}{sep}{suffix}", expr_ref.join(sep))
                        }
                        (None, None) => path.join(sep),
                    };

                    let collapsed = self.collapse_in(sources, &path);
                    out.push(SelectItem::Expr(SelectExpr {
                        expr: Expr::Ref(ExprRef { path: collapsed }),
                        alias: Some(leaf_alias),
                    }));
                }

                trace!(
                    "expanded relationship reference `{}` into {} column(s)",
                    full.join("."),
                    relation.synthesized.len()
                );
            }
            ElementTy::Scalar(..) | ElementTy::Array(..) => {
                let collapsed = self.collapse_in(sources, &full);
                let alias = match alias {
                    Some(alias) => Some(alias),
                    None if collapsed != expr_ref.path => match &frame.alias_prefix {
                        Some(alias_prefix) => {
                            Some(format!("{alias_prefix}{sep}{}", expr_ref.join(sep)))
                        }
                        None => Some(full.join(sep)),
                    },
                    None => None,
                };

                out.push(SelectItem::Expr(SelectExpr {
                    expr: Expr::Ref(ExprRef { path: collapsed }),
                    alias,
                }));
            }
        }
    }

    fn enter_group(
        &self,
        sources: &[&'a Definition],
        frame: &Frame,
        group: Expand,
        view_name: &str,
        diag: &mut Diagnostics,
    ) -> Entered {
        let sep = self.options.sep();

        let mut full = frame.prefix.clone();
        full.extend(group.path.iter().cloned());

        let Some(element) = self.resolve_in(sources, &full) else {
            diag.warning(
                codes::TYPE_UNRESOLVED,
                Location::element(view_name, full.join(".")),
                "the expand group references an unknown element and is dropped",
            );
            return Entered::Dropped;
        };

        match &element.ty {
            ElementTy::Relation(relation) if relation.is_to_many() => {
                diag.error(
                    codes::EXPAND_TO_MANY,
                    Location::element(view_name, full.join(".")),
                    "a to-many relationship cannot be expanded into a tabular projection",
                );
                Entered::Dropped
            }
            ElementTy::Relation(..) | ElementTy::Structured(..) | ElementTy::Named(..) => {
                let items = if group.items.is_empty() {
                    vec![SelectItem::Star]
                } else {
                    group.items
                };

                let alias_prefix = match group.alias {
                    Some(alias) => Some(match &frame.alias_prefix {
                        Some(alias_prefix) => format!("{alias_prefix}{sep}{alias}"),
                        None => alias,
                    }),
                    None => frame
                        .alias_prefix
                        .as_ref()
                        .map(|alias_prefix| format!("{alias_prefix}{sep}{}", group.path.join(sep))),
                };

                Entered::Frame(Frame::new(items, full, alias_prefix, group.excluding))
            }
            ElementTy::Scalar(..) | ElementTy::Array(..) => {
                diag.warning(
                    codes::TYPE_UNRESOLVED,
                    Location::element(view_name, full.join(".")),
                    "only structured fields and relationships can be expanded; \
                     the group is dropped",
                );
                Entered::Dropped
            }
        }
    }

    /// Expands one group/order clause expression, preserving relative
    /// order: structured refs and managed relationships fan out into their
    /// leaves, everything else passes through with a collapsed path.
    fn expand_clause_expr(
        &self,
        sources: &[&'a Definition],
        expr: Expr,
        out: &mut Vec<Expr>,
        view_name: &str,
        diag: &mut Diagnostics,
    ) {
        let Expr::Ref(expr_ref) = &expr else {
            out.push(expr);
            return;
        };

        let Some(element) = self.resolve_in(sources, &expr_ref.path) else {
            out.push(expr);
            return;
        };

        match &element.ty {
            ElementTy::Structured(..) | ElementTy::Named(..) => {
                for leaf_path in self.leaf_paths(element) {
                    let mut path = expr_ref.path.clone();
                    path.extend(leaf_path);
                    let collapsed = self.collapse_in(sources, &path);
                    out.push(Expr::Ref(ExprRef { path: collapsed }));
                }
            }
            ElementTy::Relation(relation) => {
                if relation.is_to_many() {
                    diag.error(
                        codes::EXPAND_TO_MANY,
                        Location::element(view_name, expr_ref.join(".")),
                        "a to-many relationship cannot be used in a group/order clause",
                    );
                    return;
                }

                for synthesized in &relation.synthesized {
                    let mut path = expr_ref.path[..expr_ref.path.len() - 1].to_vec();
                    path.push(synthesized.name.clone());
                    let collapsed = self.collapse_in(sources, &path);
                    out.push(Expr::Ref(ExprRef { path: collapsed }));
                }
            }
            ElementTy::Scalar(..) | ElementTy::Array(..) => {
                let collapsed = self.collapse_in(sources, &expr_ref.path);
                out.push(Expr::Ref(ExprRef { path: collapsed }));
            }
        }
    }

    /// Resolves a path against the first source definition that knows its
    /// head.
    fn resolve_in(&self, sources: &[&'a Definition], path: &[String]) -> Option<&'a Element> {
        sources
            .iter()
            .find_map(|source| self.schema.resolve(source, path))
    }

    fn collapse_in(&self, sources: &[&'a Definition], path: &[String]) -> Vec<String> {
        let Some(head) = path.first() else {
            return path.to_vec();
        };
        for source in sources {
            if source.elements.contains_key(head) {
                return self.collapse_path(source, path);
            }
        }
        path.to_vec()
    }

    /// Children visible behind an element: a relationship exposes its
    /// target's elements, structural elements their subtree.
    fn visible_children(&self, element: &'a Element) -> Vec<&'a Element> {
        match &element.ty {
            ElementTy::Structured(children) => children.values().collect(),
            ElementTy::Named(name) => self
                .schema
                .definitions
                .get(name)
                .map(|target| target.rendered_elements().collect())
                .unwrap_or_default(),
            ElementTy::Relation(relation) => self
                .schema
                .definitions
                .get(&relation.target)
                .map(|target| target.rendered_elements().collect())
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    /// Scalar leaf paths inside a structural element, depth first, in
    /// declaration order. Relations contribute nothing; their synthesized
    /// keys are siblings inside the same subtree.
    fn leaf_paths(&self, element: &'a Element) -> Vec<Vec<String>> {
        let mut out = vec![];
        self.collect_leaf_paths(element, &mut vec![], &mut out);
        out
    }

    fn collect_leaf_paths(
        &self,
        element: &'a Element,
        prefix: &mut Vec<String>,
        out: &mut Vec<Vec<String>>,
    ) {
        for child in self.visible_children(element) {
            if child.ignored {
                continue;
            }

            match &child.ty {
                ElementTy::Scalar(..) => {
                    let mut path = prefix.clone();
                    path.push(child.name.clone());
                    out.push(path);
                }
                ElementTy::Array(..) => {
                    if !self.dropped_array(child) {
                        let mut path = prefix.clone();
                        path.push(child.name.clone());
                        out.push(path);
                    }
                }
                ElementTy::Structured(..) | ElementTy::Named(..) => {
                    prefix.push(child.name.clone());
                    self.collect_leaf_paths(child, prefix, out);
                    prefix.pop();
                }
                ElementTy::Relation(..) => {}
            }
        }
    }

    fn dropped_array(&self, element: &Element) -> bool {
        matches!(element.ty, ElementTy::Array(..)) && self.options.target == Target::Relational
    }

    /// Joins path segments that step through structural elements into the
    /// flattened leaf name, leaving relationship navigation segments alone:
    /// `ship.city` becomes `ship_city`, `order.addr.street` becomes
    /// `order.addr_street`.
    fn collapse_path(&self, root: &'a Definition, path: &[String]) -> Vec<String> {
        let sep = self.options.sep();

        let mut out: Vec<String> = vec![];
        let mut current: Option<&Element> = None;

        for (step, segment) in path.iter().enumerate() {
            let next = if step == 0 {
                root.elements.get(segment)
            } else {
                match current.map(|element| &element.ty) {
                    Some(ElementTy::Structured(children)) => children.get(segment),
                    Some(ElementTy::Named(name)) => self
                        .schema
                        .definitions
                        .get(name)
                        .and_then(|target| target.elements.get(segment)),
                    Some(ElementTy::Relation(relation)) => self
                        .schema
                        .definitions
                        .get(&relation.target)
                        .and_then(|target| target.elements.get(segment)),
                    _ => None,
                }
            };

            let merge = matches!(current, Some(previous) if previous.is_structural());
            if merge {
                let last = out.last_mut().expect("merge follows a pushed segment");
                *last = format!("{last}{sep}{segment}");
            } else {
                out.push(segment.clone());
            }

            match next {
                Some(element) => current = Some(element),
                None => {
                    // Unresolvable tail; keep the remaining segments as-is.
                    for rest in &path[step + 1..] {
                        out.push(rest.clone());
                    }
                    break;
                }
            }
        }

        out
    }
}

/// Keep-structured mode: an expand group reaching a to-many relationship
/// degrades the owning definition to a dummy stand-in.
fn degrade_to_many_expands(schema: &mut Schema, diag: &mut Diagnostics) {
    let mut degrade = vec![];

    for index in 0..schema.definitions.len() {
        let definition = &schema.definitions[index];
        let Some(query) = definition.query() else {
            continue;
        };
        let Some(root) = query
            .primary_source()
            .and_then(|source| schema.definitions.get(&source.target))
        else {
            continue;
        };

        if columns_reach_to_many(schema, root, &query.columns, &[]) {
            degrade.push(index);
        }
    }

    for index in degrade {
        let definition = schema
            .definitions
            .get_index_mut(index)
            .map(|(_, definition)| definition)
            .expect("definition index in range");

        diag.info(
            codes::EXPAND_TO_MANY,
            Location::definition(definition.name.qualified()),
            "an expand group reaches a to-many relationship; the definition is replaced \
             by a dummy stand-in",
        );
        definition.degrade_to_dummy();
    }
}

fn columns_reach_to_many(
    schema: &Schema,
    root: &Definition,
    columns: &[SelectItem],
    prefix: &[String],
) -> bool {
    // Explicit stack of (prefix, items); nesting depth is user-controlled.
    let mut stack: Vec<(Vec<String>, &[SelectItem])> = vec![(prefix.to_vec(), columns)];

    while let Some((prefix, items)) = stack.pop() {
        for item in items {
            let SelectItem::Expand(group) = item else {
                continue;
            };

            let mut full = prefix.clone();
            full.extend(group.path.iter().cloned());

            if let Some(element) = schema.resolve(root, &full) {
                if let Some(relation) = element.as_relation() {
                    if relation.is_to_many() {
                        return true;
                    }
                }
            }

            stack.push((full, group.items.as_slice()));
        }
    }

    false
}

/// Drops every inbound reference to a dummy definition: views sourcing one
/// are degraded themselves, relationship elements targeting one are removed
/// together with their synthesized keys.
fn drop_dummy_references(schema: &mut Schema, diag: &mut Diagnostics) {
    enum Action {
        DegradeView(usize),
        DropElements(usize, Vec<String>),
    }

    loop {
        let dummies: HashSet<Name> = schema
            .definitions()
            .filter(|definition| definition.is_dummy())
            .map(|definition| definition.name.clone())
            .collect();

        if dummies.is_empty() {
            return;
        }

        let mut actions = vec![];

        for index in 0..schema.definitions.len() {
            let definition = &schema.definitions[index];
            if definition.is_dummy() {
                continue;
            }

            if let Some(query) = definition.query() {
                if query
                    .source
                    .targets()
                    .iter()
                    .any(|target| dummies.contains(target))
                {
                    actions.push(Action::DegradeView(index));
                    continue;
                }
            }

            let mut names = vec![];
            for element in definition.elements.values() {
                let Some(relation) = element.as_relation() else {
                    continue;
                };
                if dummies.contains(&relation.target) {
                    names.push(element.name.clone());
                    for synthesized in &relation.synthesized {
                        names.push(synthesized.name.clone());
                    }
                }
            }
            if !names.is_empty() {
                actions.push(Action::DropElements(index, names));
            }
        }

        if actions.is_empty() {
            return;
        }

        for action in actions {
            match action {
                Action::DegradeView(index) => {
                    let definition = schema
                        .definitions
                        .get_index_mut(index)
                        .map(|(_, definition)| definition)
                        .expect("definition index in range");

                    diag.info(
                        codes::REF_DROPPED_DEFINITION,
                        Location::definition(definition.name.qualified()),
                        "the view reads from a definition that was degraded to a dummy \
                         stand-in and is degraded as well",
                    );
                    definition.degrade_to_dummy();
                }
                Action::DropElements(index, names) => {
                    let definition = schema
                        .definitions
                        .get_index_mut(index)
                        .map(|(_, definition)| definition)
                        .expect("definition index in range");
                    let def_name = definition.name.qualified();

                    for name in names {
                        if definition.elements.shift_remove(&name).is_some() {
                            diag.info(
                                codes::REF_DROPPED_DEFINITION,
                                Location::element(&def_name, &name),
                                "the element referenced a definition that was degraded to \
                                 a dummy stand-in and is dropped",
                            );
                        }
                    }
                }
            }
        }
    }
}
