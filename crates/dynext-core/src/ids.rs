//! Identifier types for loaded libraries and live objects.

use std::fmt;

/// Opaque handle a loaded library uses to identify itself when calling back
/// into the host.
///
/// Tokens are issued by the runtime and resolved through its extension table.
/// The value carries no address and is never dereferenced, so a stale token
/// simply fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ExtensionToken(u64);

impl ExtensionToken {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExtensionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "library#{}", self.0)
    }
}

/// Stable identity of a live object.
///
/// Packs a slot index (low 32 bits) with the slot's generation (high 32 bits).
/// Generations start at 1, so the all-zero value is never issued and serves
/// as the null identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// The null identity.
    pub const NULL: InstanceId = InstanceId(0);

    #[inline]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Object#{}>", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<InstanceId> for u64 {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_packs_index_and_generation() {
        let id = InstanceId::from_parts(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert!(!id.is_null());
        assert_eq!(InstanceId::from_raw(id.raw()), id);
    }

    #[test]
    fn null_identity() {
        assert!(InstanceId::NULL.is_null());
        assert_eq!(InstanceId::default(), InstanceId::NULL);
    }

    #[test]
    fn token_display() {
        assert_eq!(ExtensionToken::new(4).to_string(), "library#4");
    }
}
