use super::{ExpandedTree, LoweredSchema};
use crate::diag::{codes, Location};
use crate::schema::{Definition, OnDelete, ReferentialConstraint, Schema};
use crate::{CheckType, ConstraintMode, Diagnostics, Options};

use log::{debug, trace};
use std::collections::HashSet;

impl ExpandedTree {
    /// Groups the synthesized foreign-key elements of every managed
    /// relationship into one referential constraint per relationship.
    /// Compositions drive CASCADE through their ownership link; everything
    /// else restricts. Emission is governed by the decision table over the
    /// global switch, the global check type, and per-relationship
    /// overrides.
    pub fn derive_constraints(self, options: &Options, diag: &mut Diagnostics) -> LoweredSchema {
        let mut schema = self.schema;

        debug!("deriving referential constraints");

        let ownership = ownership_links(&schema);

        let mut planned: Vec<(usize, Vec<ReferentialConstraint>)> = vec![];

        for index in 0..schema.definitions.len() {
            let definition = &schema.definitions[index];
            if !constraint_side(definition) {
                continue;
            }
            let def_name = definition.name.qualified();

            let mut constraints = vec![];

            for element in definition.elements.values() {
                let Some(relation) = element.as_relation() else {
                    continue;
                };
                if !relation.is_managed()
                    || relation.is_to_many()
                    || relation.synthesized.is_empty()
                {
                    continue;
                }

                let Some(target) = schema.definitions.get(&relation.target) else {
                    continue;
                };
                if !constraint_side(target) {
                    continue;
                }

                if !should_emit(options, relation.check_override) {
                    continue;
                }

                let name = format!(
                    "fk_{}_{}",
                    definition.name.last(),
                    target.name.last()
                );

                // A clash with a declared uniqueness constraint is reported,
                // never silently renamed.
                if definition.unique.contains_key(&name) {
                    diag.error(
                        codes::CONSTRAINT_DUPLICATE_NAME,
                        Location::element(&def_name, &element.name),
                        format!(
                            "generated constraint identifier `{name}` collides with a \
                             declared uniqueness constraint"
                        ),
                    );
                    continue;
                }

                let owned = ownership.contains(&(def_name.clone(), element.name.clone()));
                let on_delete = if owned {
                    OnDelete::Cascade
                } else {
                    OnDelete::Restrict
                };

                let check = relation
                    .check_override
                    .unwrap_or(options.constraint_check_type);

                constraints.push(ReferentialConstraint {
                    name,
                    source_relation: element.name.clone(),
                    dependent: relation
                        .synthesized
                        .iter()
                        .map(|synthesized| synthesized.name.clone())
                        .collect(),
                    parent: target.name.clone(),
                    parent_key: relation
                        .synthesized
                        .iter()
                        .map(|synthesized| synthesized.parent.clone())
                        .collect(),
                    on_delete,
                    validated: true,
                    enforced: check == CheckType::Database,
                });
            }

            if !constraints.is_empty() {
                planned.push((index, constraints));
            }
        }

        for (index, constraints) in planned {
            let definition = schema
                .definitions
                .get_index_mut(index)
                .map(|(_, definition)| definition)
                .expect("definition index in range");

            for constraint in constraints {
                match definition.constraints.get_mut(&constraint.name) {
                    None => {
                        trace!(
                            "attached constraint `{}` ({:?})",
                            constraint.name,
                            constraint.on_delete
                        );
                        definition
                            .constraints
                            .insert(constraint.name.clone(), constraint);
                    }
                    Some(existing) => {
                        // Same originating relationship: already derived,
                        // nothing to add. Different relationships merging
                        // under one identifier: the weaker rule wins.
                        if existing.source_relation != constraint.source_relation {
                            existing.on_delete = existing.on_delete.weaker(constraint.on_delete);
                        }
                    }
                }
            }
        }

        LoweredSchema { schema }
    }
}

/// A constraint is never emitted when either side is a query, is not
/// persisted, or already exists externally.
fn constraint_side(definition: &Definition) -> bool {
    definition.is_entity() && definition.persisted && !definition.external
}

/// The normative decision table: (global switch, global check type,
/// per-relationship override) -> emit.
fn should_emit(options: &Options, check_override: Option<CheckType>) -> bool {
    match options.constraint_mode {
        ConstraintMode::Off => false,
        ConstraintMode::On => match check_override {
            Some(CheckType::Database) => true,
            Some(CheckType::Runtime) => false,
            None => options.constraint_check_type == CheckType::Database,
        },
        ConstraintMode::Individual => matches!(check_override, Some(CheckType::Database)),
    }
}

/// Child-to-parent ownership links, keyed by (dependent definition,
/// relationship element). A to-many composition marks the backlink
/// relationship on its target; a to-one managed composition is the
/// ownership link itself.
fn ownership_links(schema: &Schema) -> HashSet<(String, String)> {
    let mut links = HashSet::new();

    for definition in schema.definitions() {
        for element in definition.elements.values() {
            let Some(relation) = element.as_relation() else {
                continue;
            };
            if !relation.is_composition() {
                continue;
            }

            if relation.is_to_many() {
                if let Some(backlink) = relation.backlink_name() {
                    links.insert((relation.target.qualified(), backlink.to_string()));
                }
            } else if relation.is_managed() {
                links.insert((definition.name.qualified(), element.name.clone()));
            }
        }
    }

    links
}
