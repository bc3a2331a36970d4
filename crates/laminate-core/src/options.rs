use crate::{Error, Result};

/// Separator used when joining path segments into flattened leaf names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Separator {
    Underscore,
    Dot,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Underscore => "_",
            Self::Dot => ".",
        }
    }
}

/// The renderer the lowered tree is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    /// Relational (SQL) schema generation. Requires full flattening.
    Relational,

    /// Wire-format metadata generation. May keep structures nested.
    WireMetadata,
}

/// Global switch for referential-constraint emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintMode {
    /// Never emit constraints.
    Off,

    /// Emit according to the global check type, per-relationship overrides
    /// still apply.
    On,

    /// Emit only for relationships that individually opt in.
    Individual,
}

/// Whether referential integrity is checked at runtime or by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CheckType {
    Runtime,
    Database,
}

/// Configuration for one compilation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Separator joining path segments of synthesized leaf names.
    pub name_separator: Separator,

    /// Compilation target; enables/disables individual passes.
    pub target: Target,

    /// Skip structural flattening, keeping nested elements in place. Only
    /// valid for the wire-metadata target.
    pub keep_structured: bool,

    /// Global referential-constraint switch.
    pub constraint_mode: ConstraintMode,

    /// Global referential-constraint check type.
    pub constraint_check_type: CheckType,

    /// Adds a synthetic tenant key to every persisted entity, widening
    /// primary keys and referential constraints by one dimension.
    pub tenant_discriminator: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name_separator: Separator::Underscore,
            target: Target::Relational,
            keep_structured: false,
            constraint_mode: ConstraintMode::Off,
            constraint_check_type: CheckType::Runtime,
            tenant_discriminator: false,
        }
    }
}

impl Options {
    /// Rejects option combinations the pipeline cannot honor.
    pub fn verify(&self) -> Result<()> {
        if self.keep_structured && self.target == Target::Relational {
            return Err(Error::invalid_options(
                "`keep_structured` requires the wire-metadata target; \
                 the relational target must flatten structures",
            ));
        }

        Ok(())
    }

    pub(crate) fn sep(&self) -> &'static str {
        self.name_separator.as_str()
    }
}
