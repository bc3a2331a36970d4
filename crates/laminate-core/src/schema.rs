mod constraint;
pub use constraint::{OnDelete, ReferentialConstraint};

mod definition;
pub use definition::{DefId, DefKind, Definition, ViewDef};

mod element;
pub use element::{Calculated, Element, ElementTy, ScalarTy, ScalarType};

mod name;
pub use name::Name;

mod relation;
pub use relation::{
    Cardinality, CardinalityMax, KeyRef, Relation, RelationKind, RelationPayload, SynthesizedKey,
};

mod verify;

use indexmap::IndexMap;

/// The schema tree: an ordered mapping from qualified name to definition.
///
/// Built by an external front end, cloned defensively at pipeline entry,
/// mutated in place by the lowering passes, and handed read-only to a
/// renderer.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schema {
    pub definitions: IndexMap<Name, Definition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a definition, assigning its [`DefId`] from the insertion
    /// position.
    pub fn insert(&mut self, mut definition: Definition) -> DefId {
        let id = DefId(self.definitions.len());
        definition.id = id;
        self.definitions.insert(definition.name.clone(), definition);
        id
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(&Name::new(name))
    }

    pub fn definition_mut(&mut self, name: &str) -> Option<&mut Definition> {
        self.definitions.get_mut(&Name::new(name))
    }

    #[track_caller]
    pub fn expect_definition(&self, name: &str) -> &Definition {
        self.definition(name)
            .unwrap_or_else(|| panic!("no definition named `{name}`"))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    /// Resolves an element path starting at `root`, walking through inline
    /// structures, structured-type references, and relationship targets.
    ///
    /// Returns `None` if the path is empty, any step is unknown, or a step
    /// tries to descend through a scalar.
    pub fn resolve<'a>(&'a self, root: &'a Definition, path: &[String]) -> Option<&'a Element> {
        let [first, rest @ ..] = path else {
            return None;
        };

        let mut current = root.elements.get(first)?;

        for step in rest {
            current = match &current.ty {
                ElementTy::Scalar(..) | ElementTy::Array(..) => return None,
                ElementTy::Structured(children) => children.get(step)?,
                ElementTy::Named(name) => self.definitions.get(name)?.elements.get(step)?,
                ElementTy::Relation(relation) => {
                    self.definitions.get(&relation.target)?.elements.get(step)?
                }
            };
        }

        Some(current)
    }
}
