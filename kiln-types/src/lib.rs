//! Shared types for kiln
//!
//! This crate provides common types used across the kiln crates,
//! including work identities, component identifiers and attribute sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable fingerprint naming one unit-of-work instance.
///
/// The unique id is always safe to use as a single path segment, so a
/// workspace directory can be derived from it directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Wrap an existing unique id, rejecting anything that is not a plain path segment.
    pub fn new(unique_id: impl Into<String>) -> Result<Self, InvalidIdentity> {
        let unique_id = unique_id.into();
        if unique_id.is_empty() {
            return Err(InvalidIdentity::Empty);
        }
        if unique_id == "." || unique_id == ".." {
            return Err(InvalidIdentity::Reserved(unique_id));
        }
        if let Some(c) = unique_id
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '\0' | ':'))
        {
            return Err(InvalidIdentity::IllegalCharacter {
                id: unique_id.clone(),
                character: c,
            });
        }
        Ok(Identity(unique_id))
    }

    /// Derive an identity from content components.
    ///
    /// Components are length-prefixed before hashing so that `["ab", "c"]`
    /// and `["a", "bc"]` produce different identities.
    pub fn from_components(components: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for component in components {
            hasher.update(&(component.len() as u64).to_le_bytes());
            hasher.update(component);
        }
        Identity(hasher.finalize().to_hex().to_string())
    }

    /// The path-safe unique id
    pub fn unique_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = InvalidIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Reasons a string cannot be used as an [`Identity`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdentity {
    #[error("identity must not be empty")]
    Empty,

    #[error("identity `{0}` is a reserved path segment")]
    Reserved(String),

    #[error("identity `{id}` contains illegal character {character:?}")]
    IllegalCharacter { id: String, character: char },
}

/// Identifier of the component that owns a set of artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of variant attributes, e.g. `{artifactType=jar}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeSet(BTreeMap<String, String>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AttributeSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// Shape of a declared output property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeType {
    File,
    Directory,
}

impl fmt::Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeType::File => write!(f, "file"),
            TreeType::Directory => write!(f, "directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rejects_path_separators() {
        assert!(Identity::new("abc123").is_ok());
        assert_eq!(Identity::new(""), Err(InvalidIdentity::Empty));
        assert!(matches!(
            Identity::new(".."),
            Err(InvalidIdentity::Reserved(_))
        ));
        assert!(matches!(
            Identity::new("a/b"),
            Err(InvalidIdentity::IllegalCharacter { character: '/', .. })
        ));
    }

    #[test]
    fn identity_from_components_is_stable() {
        let a = Identity::from_components(&[b"transform", b"input.jar"]);
        let b = Identity::from_components(&[b"transform", b"input.jar"]);
        let c = Identity::from_components(&[b"transformi", b"nput.jar"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.unique_id().len(), 64);
        assert!(Identity::new(a.unique_id()).is_ok());
    }

    #[test]
    fn attribute_set_displays_in_key_order() {
        let attrs = AttributeSet::new()
            .with("usage", "runtime")
            .with("artifactType", "classes");

        assert_eq!(attrs.to_string(), "{artifactType=classes, usage=runtime}");
        assert_eq!(attrs.get("usage"), Some("runtime"));
        assert_eq!(AttributeSet::new().to_string(), "{}");
    }
}
