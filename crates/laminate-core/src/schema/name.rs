use std::fmt;

/// A qualified definition name, e.g. `shop.Order`.
///
/// Stored as its dot-separated parts so namespaces and the final identifier
/// can be inspected without re-parsing.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Name {
    pub parts: Vec<String>,
}

impl Name {
    pub fn new(src: &str) -> Self {
        Self {
            parts: src.split('.').map(String::from).collect(),
        }
    }

    pub fn from_parts(parts: Vec<String>) -> Self {
        assert!(!parts.is_empty(), "a name needs at least one part");
        Self { parts }
    }

    /// The unqualified final identifier.
    pub fn last(&self) -> &str {
        self.parts.last().expect("a name has at least one part")
    }

    /// The full dot-joined qualified name.
    pub fn qualified(&self) -> String {
        self.parts.join(".")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.qualified())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Name({})", self.qualified())
    }
}

impl From<&str> for Name {
    fn from(src: &str) -> Self {
        Self::new(src)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Name {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.qualified())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let src = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Self::new(&src))
    }
}
