use super::Name;
use crate::{stmt, CheckType};

/// A declarative relationship between two definitions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    pub kind: RelationKind,

    /// Qualified name of the target definition. Forward references are
    /// allowed; the target may be defined later in the tree.
    pub target: Name,

    pub cardinality: Cardinality,

    pub payload: RelationPayload,

    /// False if the forward side is suppressed for navigation. Key and
    /// constraint synthesis still treat the relation as if it existed.
    pub navigable: bool,

    /// Per-relationship override of the global constraint check type.
    pub check_override: Option<CheckType>,

    /// Foreign-key elements synthesized for this relation, in the order
    /// they were derived from the target's primary key.
    pub synthesized: Vec<SynthesizedKey>,

    /// Processed marker: set once key synthesis has handled this relation.
    pub keyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationKind {
    /// A loose reference.
    Association,

    /// An ownership link: the parent existentially owns the children and
    /// drives CASCADE deletion.
    Composition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cardinality {
    pub min: u32,
    pub max: CardinalityMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CardinalityMax {
    One,
    Many,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationPayload {
    /// Foreign keys are derived from the target's primary key. An empty key
    /// list means "the full primary key"; a non-empty one names a subset
    /// with optional aliases.
    Managed { keys: Vec<KeyRef> },

    /// An explicit on-condition, optionally mirroring a forward relation.
    Unmanaged {
        on: stmt::Expr,
        /// Name of the forward relation on the target this is the inverse
        /// of.
        backlink: Option<String>,
    },
}

/// One entry of a managed relation's key list: a path into the target plus
/// an optional alias for the synthesized element name.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyRef {
    pub path: Vec<String>,
    pub alias: Option<String>,
}

/// A foreign-key element produced by key synthesis. `name` lives on the
/// owning definition, `parent` is the matching leaf on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynthesizedKey {
    pub name: String,
    pub parent: String,
}

impl Relation {
    /// A managed to-one association deriving its keys from the target's
    /// full primary key.
    pub fn association(target: impl Into<Name>) -> Self {
        Self::new(RelationKind::Association, target, Cardinality::TO_ONE)
    }

    /// A to-many composition; ownership is expressed through the backlink
    /// on-condition set via [`Relation::backlink`].
    pub fn composition_of_many(target: impl Into<Name>) -> Self {
        Self::new(RelationKind::Composition, target, Cardinality::TO_MANY)
    }

    fn new(kind: RelationKind, target: impl Into<Name>, cardinality: Cardinality) -> Self {
        Self {
            kind,
            target: target.into(),
            cardinality,
            payload: RelationPayload::Managed { keys: vec![] },
            navigable: true,
            check_override: None,
            synthesized: vec![],
            keyed: false,
        }
    }

    /// Turns the relation into the unmanaged inverse of `forward` on the
    /// target side. The on-condition mirrors the forward relation.
    pub fn backlink(mut self, forward: impl Into<String>) -> Self {
        let forward = forward.into();
        self.payload = RelationPayload::Unmanaged {
            on: stmt::Expr::eq(
                stmt::Expr::reference([forward.as_str()]),
                stmt::Expr::self_ref(),
            ),
            backlink: Some(forward),
        };
        self
    }

    pub fn is_managed(&self) -> bool {
        matches!(self.payload, RelationPayload::Managed { .. })
    }

    pub fn is_composition(&self) -> bool {
        matches!(self.kind, RelationKind::Composition)
    }

    pub fn is_to_many(&self) -> bool {
        self.cardinality.max == CardinalityMax::Many
    }

    pub fn backlink_name(&self) -> Option<&str> {
        match &self.payload {
            RelationPayload::Unmanaged { backlink, .. } => backlink.as_deref(),
            RelationPayload::Managed { .. } => None,
        }
    }
}

impl Cardinality {
    pub const TO_ONE: Self = Self {
        min: 0,
        max: CardinalityMax::One,
    };

    pub const TO_MANY: Self = Self {
        min: 0,
        max: CardinalityMax::Many,
    };
}
