use super::{FlatTree, KeyedTree};
use crate::diag::{codes, Location};
use crate::schema::{DefId, Element, ElementTy, Schema};
use crate::{Diagnostics, Options, Target};

use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

impl KeyedTree {
    /// Replaces every structured element by its scalar leaves under
    /// synthesized joined names, preserving declaration order. Structural
    /// elements are retained in place, marked ignored. A definition whose
    /// types cannot be resolved is fatal for that definition only; siblings
    /// keep processing.
    pub fn flatten(self, options: &Options, diag: &mut Diagnostics) -> FlatTree {
        let mut schema = self.schema;

        if options.keep_structured {
            debug!("structure flattening skipped (keep_structured)");
            return FlatTree { schema };
        }

        debug!("flattening structured elements");

        let mut cx = Flatten {
            options,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            failed: HashSet::new(),
        };

        for index in 0..schema.definitions.len() {
            let _ = cx.ensure(&schema, index, diag);
        }

        let mut resolved = cx.resolved;
        for definition in schema.definitions.values_mut() {
            if let Some(elements) = resolved.remove(&definition.id) {
                definition.elements = elements;
                definition.flattened = true;
            }
        }

        FlatTree { schema }
    }
}

struct Flatten<'a> {
    options: &'a Options,

    /// Flattened element maps, memoized by stable definition id and
    /// assigned to the tree once every definition has been computed.
    resolved: HashMap<DefId, IndexMap<String, Element>>,

    /// Definitions currently being computed; re-entering one is a
    /// structured-type reference cycle.
    in_progress: HashSet<DefId>,

    /// Definitions that failed fatally; referencing them aborts the
    /// referencing definition without a second diagnostic.
    failed: HashSet<DefId>,
}

impl Flatten<'_> {
    fn ensure(&mut self, schema: &Schema, index: usize, diag: &mut Diagnostics) -> Result<(), ()> {
        let definition = &schema.definitions[index];
        let id = definition.id;

        // Idempotent per node: a definition flattened by an earlier run is
        // left untouched.
        if definition.flattened || self.resolved.contains_key(&id) {
            return Ok(());
        }
        if self.failed.contains(&id) {
            return Err(());
        }
        if !self.in_progress.insert(id) {
            return Err(());
        }

        let def_name = definition.name.qualified();
        let mut out = IndexMap::with_capacity(definition.elements.len());
        let mut ok = true;

        for element in definition.elements.values() {
            if self
                .flatten_element(schema, &def_name, element, &[], false, false, &mut out, diag)
                .is_err()
            {
                ok = false;
                break;
            }
        }

        self.in_progress.remove(&id);

        if ok {
            trace!("flattened `{def_name}` into {} entries", out.len());
            self.resolved.insert(id, out);
            Ok(())
        } else {
            self.failed.insert(id);
            Err(())
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_element(
        &mut self,
        schema: &Schema,
        def_name: &str,
        element: &Element,
        prefix: &[String],
        inherited_key: bool,
        inherited_nullable: bool,
        out: &mut IndexMap<String, Element>,
        diag: &mut Diagnostics,
    ) -> Result<(), ()> {
        let sep = self.options.sep();

        let mut path = prefix.to_vec();
        path.push(element.name.clone());
        let joined = path.join(sep);

        let key = element.key || inherited_key;
        let not_null = element.not_null && !inherited_nullable;

        match &element.ty {
            ElementTy::Scalar(..) => {
                let mut leaf = element.clone();
                leaf.name = joined.clone();
                leaf.key = key;
                leaf.not_null = not_null;
                prefix_origin(&mut leaf, prefix, sep);
                insert_checked(out, def_name, joined, leaf, diag);
            }
            ElementTy::Array(..) => {
                let mut leaf = element.clone();
                leaf.name = joined.clone();
                leaf.key = key;
                leaf.not_null = not_null;

                if self.options.target == Target::Relational {
                    diag.warning(
                        codes::TYPE_ARRAY_UNSUPPORTED,
                        Location::element(def_name, &joined),
                        "the relational target cannot represent array-typed elements; \
                         the column is dropped",
                    );
                    leaf.ignored = true;
                }

                insert_checked(out, def_name, joined, leaf, diag);
            }
            ElementTy::Relation(..) => {
                let mut leaf = element.clone();
                leaf.name = joined.clone();
                leaf.key = key;
                leaf.not_null = not_null;

                // A relation hoisted out of a structured container keeps its
                // synthesized key list consistent with the renamed siblings.
                if !prefix.is_empty() {
                    let prefix_joined = prefix.join(sep);
                    if let Some(relation) = leaf.as_relation_mut() {
                        for synthesized in &mut relation.synthesized {
                            synthesized.name = format!("{prefix_joined}{sep}{}", synthesized.name);
                        }
                    }
                }

                insert_checked(out, def_name, joined, leaf, diag);
            }
            ElementTy::Structured(children) => {
                let mut marker = element.clone();
                marker.name = joined.clone();
                marker.key = key;
                marker.ignored = true;
                insert_checked(out, def_name, joined, marker, diag);

                let child_nullable = inherited_nullable || !element.not_null;
                for child in children.values() {
                    self.flatten_element(
                        schema,
                        def_name,
                        child,
                        &path,
                        key,
                        child_nullable,
                        out,
                        diag,
                    )?;
                }
            }
            ElementTy::Named(name) => {
                let Some((target_index, _, target)) = schema.definitions.get_full(name) else {
                    diag.error(
                        codes::TYPE_UNRESOLVED,
                        Location::element(def_name, &joined),
                        format!("type `{name}` is not defined"),
                    );
                    return Err(());
                };

                if !target.is_structured_type() {
                    diag.error(
                        codes::TYPE_UNRESOLVED,
                        Location::element(def_name, &joined),
                        format!("type `{name}` is not a structured type"),
                    );
                    return Err(());
                }

                if self.in_progress.contains(&target.id) {
                    diag.error(
                        codes::TYPE_CYCLIC,
                        Location::element(def_name, &joined),
                        format!("structured type `{name}` refers back to itself"),
                    );
                    return Err(());
                }

                self.ensure(schema, target_index, diag)?;

                let mut marker = element.clone();
                marker.name = joined.clone();
                marker.key = key;
                marker.ignored = true;
                insert_checked(out, def_name, joined.clone(), marker, diag);

                let entries: Vec<Element> = if target.flattened {
                    target.elements.values().cloned().collect()
                } else {
                    self.resolved[&target.id].values().cloned().collect()
                };

                let child_nullable = inherited_nullable || !element.not_null;
                for mut entry in entries {
                    let entry_name = format!("{joined}{sep}{}", entry.name);

                    if let Some(relation) = entry.as_relation_mut() {
                        for synthesized in &mut relation.synthesized {
                            synthesized.name = format!("{joined}{sep}{}", synthesized.name);
                        }
                    } else if let Some(origin) = &entry.origin {
                        entry.origin = Some(format!("{joined}{sep}{origin}"));
                    }

                    entry.name = entry_name.clone();
                    entry.key = entry.key || key;
                    entry.not_null = entry.not_null && !child_nullable;
                    insert_checked(out, def_name, entry_name, entry, diag);
                }
            }
        }

        Ok(())
    }
}

fn prefix_origin(element: &mut Element, prefix: &[String], sep: &str) {
    if prefix.is_empty() {
        return;
    }
    if let Some(origin) = &element.origin {
        element.origin = Some(format!("{}{sep}{origin}", prefix.join(sep)));
    }
}

/// A collision between a synthesized name and an existing sibling is a
/// reported error, never silently resolved; the first element wins and
/// processing continues.
fn insert_checked(
    out: &mut IndexMap<String, Element>,
    def_name: &str,
    name: String,
    element: Element,
    diag: &mut Diagnostics,
) {
    if out.contains_key(&name) {
        diag.error(
            codes::NAME_DUPLICATE_ELEMENT,
            Location::element(def_name, &name),
            format!("flattened element name `{name}` collides with an existing sibling"),
        );
        return;
    }

    out.insert(name, element);
}
