use super::{KeyedTree, ResolvedTree};
use crate::diag::{codes, Location};
use crate::schema::{
    DefId, Definition, Element, ElementTy, KeyRef, RelationKind, ScalarType, Schema, SynthesizedKey,
};
use crate::{Diagnostics, Options};

use indexmap::IndexMap;
use log::{debug, trace};

/// Name of the synthetic tenant key element.
const TENANT: &str = "tenant";

impl ResolvedTree {
    /// Materializes foreign-key elements for every managed relationship by
    /// walking the target's primary key. The walk is recursive: a key entry
    /// may be structured, or itself a managed relationship whose keys are
    /// chain-prefixed. Relations whose dependencies are not resolved yet are
    /// retried on a worklist until a sweep makes no progress; a stall is
    /// reported as a modeling cycle, never looped on.
    pub fn synthesize_keys(self, options: &Options, diag: &mut Diagnostics) -> KeyedTree {
        let mut schema = self.schema;

        if options.tenant_discriminator {
            apply_tenant_discriminator(&mut schema);
        }

        debug!("synthesizing relationship keys");

        let mut work = vec![];
        for def_index in 0..schema.definitions.len() {
            prepare_definition(&mut schema, def_index, &mut work, diag);
        }

        // Each sweep must key at least one relation, so the sweep count is
        // bounded by the item count. The explicit cap turns an unexpected
        // non-termination into reported errors below.
        let cap = work.len() + 1;
        let mut remaining = work;

        for _sweep in 0..cap {
            if remaining.is_empty() {
                break;
            }

            let mut deferred = vec![];
            let mut progressed = false;

            for item in remaining {
                match resolve_item(&schema, &item, options, diag) {
                    Outcome::Keys(leaves) => {
                        apply_keys(&mut schema, &item, leaves, options, diag);
                        progressed = true;
                    }
                    Outcome::Defer => deferred.push(item),
                    Outcome::Fail => {
                        mark_processed(&mut schema, &item);
                        progressed = true;
                    }
                }
            }

            remaining = deferred;
            if !progressed {
                break;
            }
        }

        for item in remaining {
            diag.error(
                codes::REL_CYCLIC_KEYS,
                item.location(&schema),
                "foreign-key resolution did not terminate; the relationship is part of a \
                 cyclic key definition",
            );
            mark_processed(&mut schema, &item);
        }

        KeyedTree { schema }
    }
}

/// One managed to-one relation awaiting key synthesis, addressed by
/// definition index and element path (relations may sit inside structured
/// elements).
struct WorkItem {
    def_index: usize,
    path: Vec<String>,
}

impl WorkItem {
    fn location(&self, schema: &Schema) -> Location {
        Location::element(
            schema.definitions[self.def_index].name.qualified(),
            self.path.join("."),
        )
    }
}

enum Outcome {
    Keys(Vec<Leaf>),
    Defer,
    Fail,
}

enum Stop {
    Defer,
    Fail,
}

/// One foreign-key leaf derived from the target's primary key. `suffix` is
/// the name part after the owning relation's name, `parent` the leaf name on
/// the target, and `element` a clone of the target leaf whose type facets
/// travel verbatim.
struct Leaf {
    suffix: String,
    parent: String,
    element: Element,
}

/// Classifies every relation in the definition: managed to-one relations
/// become work items; to-many and unmanaged relations are validated and
/// marked processed right away.
fn prepare_definition(
    schema: &mut Schema,
    def_index: usize,
    work: &mut Vec<WorkItem>,
    diag: &mut Diagnostics,
) {
    let definition = &schema.definitions[def_index];
    let def_name = definition.name.qualified();

    let mut relations = vec![];
    collect_relations(&definition.elements, &mut vec![], &mut relations);

    let mut processed = vec![];

    for path in relations {
        let element = element_at(definition, &path).expect("collected path resolves");
        let relation = element.expect_relation();

        if relation.keyed {
            continue;
        }

        if relation.is_managed() && !relation.is_to_many() {
            work.push(WorkItem { def_index, path });
            continue;
        }

        if relation.is_managed() && relation.is_to_many() {
            // A to-many target cannot be pinned down to one foreign-key row
            // on the owning side. Compositions express ownership through
            // their backlink instead; a plain association to many cannot be
            // followed without an on-condition.
            if relation.kind == RelationKind::Association {
                diag.warning(
                    codes::REL_MANAGED_TO_MANY,
                    Location::element(&def_name, path.join(".")),
                    "a managed to-many association materializes no foreign keys; \
                     specify an on-condition",
                );
            }
            processed.push(path);
            continue;
        }

        // Unmanaged: validate the backlink, if any.
        if let Some(backlink) = relation.backlink_name() {
            let valid = schema
                .definitions
                .get(&relation.target)
                .and_then(|target| target.elements.get(backlink))
                .and_then(Element::as_relation)
                .map(|forward| forward.target == definition.name)
                .unwrap_or(false);

            if !valid {
                diag.error(
                    codes::REL_MISSING_BACKLINK,
                    Location::element(&def_name, path.join(".")),
                    format!(
                        "backlink `{backlink}` does not name a relationship on `{}` \
                         pointing back here",
                        relation.target
                    ),
                );
            }
        }
        processed.push(path);
    }

    for path in processed {
        let item = WorkItem { def_index, path };
        mark_processed(schema, &item);
    }
}

fn collect_relations(
    elements: &IndexMap<String, Element>,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    for element in elements.values() {
        match &element.ty {
            ElementTy::Relation(..) => {
                let mut path = prefix.clone();
                path.push(element.name.clone());
                out.push(path);
            }
            ElementTy::Structured(children) => {
                prefix.push(element.name.clone());
                collect_relations(children, prefix, out);
                prefix.pop();
            }
            _ => {}
        }
    }
}

fn resolve_item(
    schema: &Schema,
    item: &WorkItem,
    options: &Options,
    diag: &mut Diagnostics,
) -> Outcome {
    let definition = &schema.definitions[item.def_index];
    let element = element_at(definition, &item.path).expect("work item path resolves");
    let relation = element.expect_relation();
    let location = item.location(schema);

    let Some(target) = schema.definitions.get(&relation.target) else {
        diag.error(
            codes::TYPE_UNRESOLVED,
            location,
            format!("relationship target `{}` is not defined", relation.target),
        );
        return Outcome::Fail;
    };

    let explicit = match &relation.payload {
        crate::schema::RelationPayload::Managed { keys } => keys,
        crate::schema::RelationPayload::Unmanaged { .. } => return Outcome::Fail,
    };

    let mut leaves = vec![];
    let mut seen = vec![];

    let outcome = if explicit.is_empty() {
        default_key_leaves(schema, target, options, &location, &mut leaves, &mut seen, diag)
    } else {
        let mut result = Ok(());
        for key_ref in explicit {
            result = resolve_key_ref(
                schema, target, key_ref, options, &location, &mut leaves, &mut seen, diag,
            );
            if result.is_err() {
                break;
            }
        }
        result
    };

    match outcome {
        Ok(()) if leaves.is_empty() => {
            diag.error(
                codes::REL_KEY_WITHOUT_FK,
                item.location(schema),
                format!("target `{}` yields no usable foreign-key elements", target.name),
            );
            Outcome::Fail
        }
        Ok(()) => Outcome::Keys(leaves),
        Err(Stop::Defer) => Outcome::Defer,
        Err(Stop::Fail) => Outcome::Fail,
    }
}

/// Walks the target's primary key in declaration order. Keyed relations in
/// the primary key contribute nothing themselves; the foreign-key elements
/// they synthesized sit right after them, carry the key flag, and are
/// enumerated as ordinary scalar leaves.
#[allow(clippy::too_many_arguments)]
fn default_key_leaves(
    schema: &Schema,
    target: &Definition,
    options: &Options,
    location: &Location,
    out: &mut Vec<Leaf>,
    seen: &mut Vec<DefId>,
    diag: &mut Diagnostics,
) -> Result<(), Stop> {
    let mut any_key = false;

    for element in target.elements.values() {
        if element.ignored || !element.key {
            continue;
        }
        any_key = true;

        match &element.ty {
            ElementTy::Scalar(..) => out.push(Leaf {
                suffix: element.name.clone(),
                parent: element.name.clone(),
                element: element.clone(),
            }),
            ElementTy::Array(..) => {
                diag.error(
                    codes::REL_KEY_WITHOUT_FK,
                    location.clone(),
                    format!(
                        "key element `{}.{}` is array-typed and cannot act as a foreign key",
                        target.name, element.name
                    ),
                );
                return Err(Stop::Fail);
            }
            ElementTy::Structured(children) => {
                container_leaves(
                    schema,
                    children,
                    &element.name,
                    &element.name,
                    options,
                    location,
                    out,
                    seen,
                    diag,
                )?;
            }
            ElementTy::Named(name) => {
                let children = named_elements(schema, name, location, seen, diag)?;
                container_leaves(
                    schema,
                    children,
                    &element.name,
                    &element.name,
                    options,
                    location,
                    out,
                    seen,
                    diag,
                )?;
                seen.pop();
            }
            ElementTy::Relation(relation) => {
                if !relation.is_managed() || relation.is_to_many() {
                    diag.error(
                        codes::REL_KEY_WITHOUT_FK,
                        location.clone(),
                        format!(
                            "key element `{}.{}` is a relationship without valid foreign keys",
                            target.name, element.name
                        ),
                    );
                    return Err(Stop::Fail);
                }
                if !relation.keyed {
                    return Err(Stop::Defer);
                }
                if relation.synthesized.is_empty() {
                    diag.error(
                        codes::REL_KEY_WITHOUT_FK,
                        location.clone(),
                        format!(
                            "key element `{}.{}` is a relationship without valid foreign keys",
                            target.name, element.name
                        ),
                    );
                    return Err(Stop::Fail);
                }
                // Synthesized siblings carry the key flag and are picked up
                // by this very loop.
            }
        }
    }

    if !any_key {
        diag.error(
            codes::REL_KEY_WITHOUT_FK,
            location.clone(),
            format!("target `{}` has no primary key", target.name),
        );
        return Err(Stop::Fail);
    }

    Ok(())
}

/// Resolves one explicit key-list entry against the target.
#[allow(clippy::too_many_arguments)]
fn resolve_key_ref(
    schema: &Schema,
    target: &Definition,
    key_ref: &KeyRef,
    options: &Options,
    location: &Location,
    out: &mut Vec<Leaf>,
    seen: &mut Vec<DefId>,
    diag: &mut Diagnostics,
) -> Result<(), Stop> {
    let sep = options.sep();

    if key_ref.path.is_empty() {
        diag.error(
            codes::TYPE_UNRESOLVED,
            location.clone(),
            "empty key reference",
        );
        return Err(Stop::Fail);
    }

    // Walk the path; only structured steps may be traversed.
    let mut container = &target.elements;
    let mut element: Option<&Element> = None;

    for (step, segment) in key_ref.path.iter().enumerate() {
        if step > 0 {
            container = match &element.expect("set on previous step").ty {
                ElementTy::Structured(children) => children,
                ElementTy::Named(name) => {
                    let children = named_elements(schema, name, location, seen, diag)?;
                    seen.pop();
                    children
                }
                _ => {
                    diag.error(
                        codes::TYPE_UNRESOLVED,
                        location.clone(),
                        format!(
                            "key reference `{}` traverses a non-structured element",
                            key_ref.path.join(".")
                        ),
                    );
                    return Err(Stop::Fail);
                }
            };
        }

        element = container.get(segment);
        if element.is_none() {
            diag.error(
                codes::TYPE_UNRESOLVED,
                location.clone(),
                format!(
                    "key reference `{}` names an unknown element on `{}`",
                    key_ref.path.join("."),
                    target.name
                ),
            );
            return Err(Stop::Fail);
        }
    }

    let element = element.expect("path is non-empty");
    let base = key_ref
        .alias
        .clone()
        .unwrap_or_else(|| key_ref.path.join(sep));
    let parent_base = key_ref.path.join(sep);

    match &element.ty {
        ElementTy::Scalar(..) => out.push(Leaf {
            suffix: base,
            parent: parent_base,
            element: element.clone(),
        }),
        ElementTy::Array(..) => {
            diag.error(
                codes::REL_KEY_WITHOUT_FK,
                location.clone(),
                "array-typed elements cannot act as foreign keys",
            );
            return Err(Stop::Fail);
        }
        ElementTy::Structured(children) => {
            container_leaves(
                schema, children, &base, &parent_base, options, location, out, seen, diag,
            )?;
        }
        ElementTy::Named(name) => {
            let children = named_elements(schema, name, location, seen, diag)?;
            container_leaves(
                schema, children, &base, &parent_base, options, location, out, seen, diag,
            )?;
            seen.pop();
        }
        ElementTy::Relation(relation) => {
            // A key entry that is itself a managed relationship: reuse its
            // synthesized keys and chain-prefix the names.
            if !relation.is_managed() || relation.is_to_many() {
                diag.error(
                    codes::REL_KEY_WITHOUT_FK,
                    location.clone(),
                    format!(
                        "key reference `{}` is a relationship without valid foreign keys",
                        key_ref.path.join(".")
                    ),
                );
                return Err(Stop::Fail);
            }
            if !relation.keyed {
                return Err(Stop::Defer);
            }
            if relation.synthesized.is_empty() {
                diag.error(
                    codes::REL_KEY_WITHOUT_FK,
                    location.clone(),
                    format!(
                        "key reference `{}` is a relationship without valid foreign keys",
                        key_ref.path.join(".")
                    ),
                );
                return Err(Stop::Fail);
            }

            let strip = format!("{}{sep}", element.name);
            for synthesized in &relation.synthesized {
                let remainder = synthesized
                    .name
                    .strip_prefix(&strip)
                    .unwrap_or(&synthesized.name);
                let sibling = container
                    .get(&synthesized.name)
                    .expect("synthesized sibling exists next to its relation");

                out.push(Leaf {
                    suffix: format!("{base}{sep}{remainder}"),
                    parent: synthesized.name.clone(),
                    element: sibling.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Collects every scalar leaf inside a structured container, depth first and
/// in declaration order.
#[allow(clippy::too_many_arguments)]
fn container_leaves(
    schema: &Schema,
    children: &IndexMap<String, Element>,
    suffix_base: &str,
    parent_base: &str,
    options: &Options,
    location: &Location,
    out: &mut Vec<Leaf>,
    seen: &mut Vec<DefId>,
    diag: &mut Diagnostics,
) -> Result<(), Stop> {
    let sep = options.sep();

    for child in children.values() {
        if child.ignored {
            continue;
        }

        let suffix = format!("{suffix_base}{sep}{}", child.name);
        let parent = format!("{parent_base}{sep}{}", child.name);

        match &child.ty {
            ElementTy::Scalar(..) => out.push(Leaf {
                suffix,
                parent,
                element: child.clone(),
            }),
            ElementTy::Array(..) => continue,
            ElementTy::Structured(grandchildren) => {
                container_leaves(
                    schema,
                    grandchildren,
                    &suffix,
                    &parent,
                    options,
                    location,
                    out,
                    seen,
                    diag,
                )?;
            }
            ElementTy::Named(name) => {
                let grandchildren = named_elements(schema, name, location, seen, diag)?;
                container_leaves(
                    schema,
                    grandchildren,
                    &suffix,
                    &parent,
                    options,
                    location,
                    out,
                    seen,
                    diag,
                )?;
                seen.pop();
            }
            ElementTy::Relation(relation) => {
                if !relation.is_managed() || relation.is_to_many() {
                    continue;
                }
                if !relation.keyed {
                    return Err(Stop::Defer);
                }
                // Keyed: the synthesized siblings live in this container and
                // are collected as scalars.
            }
        }
    }

    Ok(())
}

/// Resolves a structured-type reference, guarding against reference cycles.
/// On success the target's id has been pushed onto `seen`; the caller pops
/// it once done with the returned elements.
fn named_elements<'a>(
    schema: &'a Schema,
    name: &crate::schema::Name,
    location: &Location,
    seen: &mut Vec<DefId>,
    diag: &mut Diagnostics,
) -> Result<&'a IndexMap<String, Element>, Stop> {
    let Some(target) = schema.definitions.get(name) else {
        diag.error(
            codes::TYPE_UNRESOLVED,
            location.clone(),
            format!("type `{name}` is not defined"),
        );
        return Err(Stop::Fail);
    };

    if !target.is_structured_type() {
        diag.error(
            codes::TYPE_UNRESOLVED,
            location.clone(),
            format!("type `{name}` is not a structured type"),
        );
        return Err(Stop::Fail);
    }

    if seen.contains(&target.id) {
        diag.error(
            codes::TYPE_CYCLIC,
            location.clone(),
            format!("structured type `{name}` refers back to itself"),
        );
        return Err(Stop::Fail);
    }

    seen.push(target.id);
    Ok(&target.elements)
}

/// Inserts the synthesized elements immediately after their relation and
/// records the key list on the relation itself.
fn apply_keys(
    schema: &mut Schema,
    item: &WorkItem,
    leaves: Vec<Leaf>,
    options: &Options,
    diag: &mut Diagnostics,
) {
    let sep = options.sep();
    let definition = schema
        .definitions
        .get_index_mut(item.def_index)
        .map(|(_, definition)| definition)
        .expect("definition index in range");
    let def_name = definition.name.qualified();

    let container = container_mut(definition, &item.path[..item.path.len() - 1]);
    let rel_name = item.path.last().expect("work item path is non-empty").clone();
    let rel_pos = container
        .get_index_of(&rel_name)
        .expect("relation still present");

    let (rel_key, rel_not_null) = {
        let element = &container[&rel_name];
        (element.key, element.not_null)
    };

    let mut insert_at = rel_pos + 1;
    let mut synthesized = vec![];

    for leaf in leaves {
        let name = format!("{rel_name}{sep}{}", leaf.suffix);

        if container.contains_key(&name) {
            diag.error(
                codes::NAME_DUPLICATE_ELEMENT,
                Location::element(&def_name, &name),
                format!("generated foreign-key element `{name}` collides with an existing sibling"),
            );
            continue;
        }

        // Type facets travel verbatim from the target leaf.
        let mut element = leaf.element;
        element.name = name.clone();
        element.key = rel_key;
        element.not_null = rel_not_null;
        element.default = None;
        element.calculated = None;
        element.ignored = false;
        element.origin = Some(rel_name.clone());

        trace!("synthesized foreign key `{def_name}.{name}`");

        container.shift_insert(insert_at, name.clone(), element);
        insert_at += 1;

        synthesized.push(SynthesizedKey {
            name,
            parent: leaf.parent,
        });
    }

    let relation = container
        .get_mut(&rel_name)
        .and_then(Element::as_relation_mut)
        .expect("work item names a relation");
    relation.synthesized = synthesized;
    relation.keyed = true;
}

/// Marks a relation processed without synthesizing anything, so later passes
/// and re-runs skip it.
fn mark_processed(schema: &mut Schema, item: &WorkItem) {
    let definition = schema
        .definitions
        .get_index_mut(item.def_index)
        .map(|(_, definition)| definition)
        .expect("definition index in range");

    let container = container_mut(definition, &item.path[..item.path.len() - 1]);
    let relation = container
        .get_mut(item.path.last().expect("non-empty path"))
        .and_then(Element::as_relation_mut)
        .expect("work item names a relation");
    relation.keyed = true;
}

fn element_at<'a>(definition: &'a Definition, path: &[String]) -> Option<&'a Element> {
    let mut container = &definition.elements;
    let mut element = None;

    for (step, segment) in path.iter().enumerate() {
        if step > 0 {
            container = match &element?.ty {
                ElementTy::Structured(children) => children,
                _ => return None,
            };
        }
        element = container.get(segment);
    }

    element
}

fn container_mut<'a>(
    definition: &'a mut Definition,
    prefix: &[String],
) -> &'a mut IndexMap<String, Element> {
    let mut container = &mut definition.elements;

    for segment in prefix {
        let element = container
            .get_mut(segment)
            .expect("relation path resolved earlier");
        container = match &mut element.ty {
            ElementTy::Structured(children) => children,
            _ => panic!("relation container must be structured"),
        };
    }

    container
}

/// Adds the synthetic tenant key to every persisted entity, widening primary
/// keys (and, transitively, foreign keys and constraints) by one dimension.
fn apply_tenant_discriminator(schema: &mut Schema) {
    for definition in schema.definitions.values_mut() {
        if !definition.is_entity() || !definition.persisted {
            continue;
        }
        if definition.elements.contains_key(TENANT) {
            continue;
        }

        let mut element = Element::scalar(TENANT, ScalarType::string(Some(36)));
        element.key = true;
        element.not_null = true;

        definition
            .elements
            .shift_insert(0, TENANT.to_string(), element);
    }
}
