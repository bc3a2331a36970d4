use super::{Definition, Element, ElementTy, Schema};
use crate::{Error, Result};

/// Structural checks over a lowered tree. A failure here is a pipeline bug,
/// not a modeling error, so these return [`Error::InvalidSchema`] instead of
/// recording diagnostics.
struct Verify<'a> {
    schema: &'a Schema,
}

impl Schema {
    pub(crate) fn verify(&self) -> Result<()> {
        Verify { schema: self }.verify()
    }
}

impl Verify<'_> {
    fn verify(&self) -> Result<()> {
        for definition in self.schema.definitions() {
            self.verify_relations_keyed(definition)?;
            self.verify_key_counts(definition)?;
            self.verify_constraint_columns(definition)?;
        }

        Ok(())
    }

    fn verify_relations_keyed(&self, definition: &Definition) -> Result<()> {
        for element in definition.elements.values() {
            let Some(relation) = element.as_relation() else {
                continue;
            };

            if relation.is_managed() && !relation.keyed {
                return Err(Error::invalid_schema(format!(
                    "managed relation `{}.{}` was never keyed",
                    definition.name, element.name
                )));
            }
        }

        Ok(())
    }

    /// For every managed relation, the synthesized key count must equal the
    /// number of primary-key leaves of its target. Relations that were
    /// degraded during lowering carry an empty key list and are exempt.
    fn verify_key_counts(&self, definition: &Definition) -> Result<()> {
        for element in definition.elements.values() {
            let Some(relation) = element.as_relation() else {
                continue;
            };

            if !relation.is_managed() || relation.synthesized.is_empty() {
                continue;
            }

            let Some(target) = self.schema.definitions.get(&relation.target) else {
                return Err(Error::invalid_schema(format!(
                    "relation `{}.{}` targets unknown definition `{}`",
                    definition.name, element.name, relation.target
                )));
            };

            let expected = self.key_leaf_count(target);
            if relation.synthesized.len() != expected {
                return Err(Error::invalid_schema(format!(
                    "relation `{}.{}` synthesized {} key(s), target `{}` has {} primary-key leaves",
                    definition.name,
                    element.name,
                    relation.synthesized.len(),
                    target.name,
                    expected
                )));
            }
        }

        Ok(())
    }

    /// Constraints may only reference elements that exist in the
    /// post-flattening tree. Column names are joined leaf names, so the
    /// check applies to flattened definitions; a keep-structured tree keys
    /// its element maps by the nested names instead.
    fn verify_constraint_columns(&self, definition: &Definition) -> Result<()> {
        for constraint in definition.constraints.values() {
            if definition.flattened {
                for column in &constraint.dependent {
                    if !definition.elements.contains_key(column) {
                        return Err(Error::invalid_schema(format!(
                            "constraint `{}` references missing element `{}.{}`",
                            constraint.name, definition.name, column
                        )));
                    }
                }
            }

            let Some(parent) = self.schema.definitions.get(&constraint.parent) else {
                return Err(Error::invalid_schema(format!(
                    "constraint `{}` references missing parent `{}`",
                    constraint.name, constraint.parent
                )));
            };

            if parent.flattened {
                for column in &constraint.parent_key {
                    if !parent.elements.contains_key(column) {
                        return Err(Error::invalid_schema(format!(
                            "constraint `{}` references missing parent element `{}.{}`",
                            constraint.name, parent.name, column
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn key_leaf_count(&self, definition: &Definition) -> usize {
        definition
            .key_elements()
            .map(|element| self.leaves_in(element))
            .sum()
    }

    /// Scalar leaves reachable inside one key element. Relations contribute
    /// nothing themselves; their synthesized foreign keys are siblings and
    /// counted on their own.
    fn leaves_in(&self, element: &Element) -> usize {
        match &element.ty {
            ElementTy::Scalar(..) => 1,
            ElementTy::Array(..) | ElementTy::Relation(..) => 0,
            ElementTy::Structured(children) => children
                .values()
                .filter(|child| !child.ignored)
                .map(|child| self.leaves_in(child))
                .sum(),
            ElementTy::Named(name) => self
                .schema
                .definitions
                .get(name)
                .map(|target| {
                    target
                        .rendered_elements()
                        .map(|child| self.leaves_in(child))
                        .sum()
                })
                .unwrap_or(0),
        }
    }
}
