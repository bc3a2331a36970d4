use super::Name;

/// A referential constraint between a dependent and a parent definition.
///
/// `dependent` and `parent_key` are parallel arrays, in the order the
/// foreign-key elements were synthesized.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferentialConstraint {
    /// Generated identifier, unique within the dependent definition.
    pub name: String,

    /// The relationship the constraint was derived from. Used for
    /// de-duplication when a relation is visited more than once.
    pub source_relation: String,

    /// Foreign-key element names on the dependent definition.
    pub dependent: Vec<String>,

    /// Qualified name of the parent definition.
    pub parent: Name,

    /// Primary-key leaf names on the parent definition.
    pub parent_key: Vec<String>,

    pub on_delete: OnDelete,

    pub validated: bool,
    pub enforced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OnDelete {
    Cascade,
    Restrict,
}

impl OnDelete {
    /// Merging rule when two constraint groups land on one identifier: the
    /// weaker rule wins.
    pub fn weaker(self, other: Self) -> Self {
        match (self, other) {
            (Self::Cascade, Self::Cascade) => Self::Cascade,
            _ => Self::Restrict,
        }
    }
}
