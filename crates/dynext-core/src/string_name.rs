//! Interned-style names with a precomputed hash.
//!
//! [`StringName`] is the key type for classes, methods, properties and signals.
//! The hash is computed once with XXHash64 when the name is built, so map
//! lookups keyed by name never rehash the text.
//!
//! # Examples
//!
//! ```
//! use dynext_core::StringName;
//!
//! let a = StringName::new("RefCounted");
//! let b = StringName::from("RefCounted");
//! assert_eq!(a, b);
//! assert_eq!(a.hash_value(), b.hash_value());
//! assert!(a.is_valid_identifier());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

/// Seed mixed into every name hash.
const NAME_SEED: u64 = 0x2fac10b63a6cc57c;

/// An immutable, cheaply clonable name.
#[derive(Clone)]
pub struct StringName {
    text: Arc<str>,
    hash: u64,
}

impl StringName {
    /// Build a name from text.
    pub fn new(text: impl AsRef<str>) -> Self {
        let text = text.as_ref();
        Self {
            hash: xxh64(text.as_bytes(), NAME_SEED),
            text: Arc::from(text),
        }
    }

    /// The empty name.
    pub fn empty() -> Self {
        Self::new("")
    }

    /// The underlying text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The precomputed 64-bit hash.
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the name is usable as a class identifier.
    ///
    /// The first character must be alphabetic or `_`, and the rest
    /// alphanumeric or `_`. Non-ASCII letters are accepted.
    pub fn is_valid_identifier(&self) -> bool {
        let mut chars = self.text.chars();
        match chars.next() {
            Some(first) if first == '_' || first.is_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c == '_' || c.is_alphanumeric())
    }
}

impl Default for StringName {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for StringName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.text == other.text
    }
}

impl Eq for StringName {}

impl PartialEq<str> for StringName {
    fn eq(&self, other: &str) -> bool {
        &*self.text == other
    }
}

impl PartialEq<&str> for StringName {
    fn eq(&self, other: &&str) -> bool {
        &*self.text == *other
    }
}

impl Hash for StringName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for StringName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StringName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl fmt::Debug for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{:?}", &*self.text)
    }
}

impl fmt::Display for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for StringName {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for StringName {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&String> for StringName {
    fn from(text: &String) -> Self {
        Self::new(text)
    }
}

impl From<&StringName> for StringName {
    fn from(name: &StringName) -> Self {
        name.clone()
    }
}

impl AsRef<str> for StringName {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn equal_text_gives_equal_names() {
        let a = StringName::new("Node");
        let b = StringName::from(String::from("Node"));
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(a, StringName::new("Node2D"));
    }

    #[test]
    fn compares_with_plain_strings() {
        let name = StringName::new("bar");
        assert_eq!(name, "bar");
        assert!(name == *"bar");
    }

    #[test]
    fn usable_as_map_key() {
        let mut map = FxHashMap::default();
        map.insert(StringName::new("x"), 1);
        map.insert(StringName::new("y"), 2);
        assert_eq!(map.get(&StringName::new("x")), Some(&1));
        assert_eq!(map.get(&StringName::new("z")), None);
    }

    #[test]
    fn identifier_validation() {
        assert!(StringName::new("Foo").is_valid_identifier());
        assert!(StringName::new("_private2").is_valid_identifier());
        assert!(StringName::new("Ünïcode").is_valid_identifier());
        assert!(!StringName::new("").is_valid_identifier());
        assert!(!StringName::new("2Fast").is_valid_identifier());
        assert!(!StringName::new("has space").is_valid_identifier());
        assert!(!StringName::new("dash-ed").is_valid_identifier());
    }

    #[test]
    fn display_and_debug() {
        let name = StringName::new("Resource");
        assert_eq!(name.to_string(), "Resource");
        assert_eq!(format!("{name:?}"), "&\"Resource\"");
    }

    #[test]
    fn ordering_follows_text() {
        let mut names = vec![StringName::new("b"), StringName::new("a"), StringName::new("c")];
        names.sort();
        let texts: Vec<&str> = names.iter().map(StringName::as_str).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }
}
