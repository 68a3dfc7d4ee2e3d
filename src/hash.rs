//! Deterministic hash-based identity.
//!
//! Provides [`TypeHash`], a 64-bit hash identifying registered host types,
//! and [`ContentHash`], the digest of generated context source text.
//!
//! Hashes are computed deterministically from names and text, so they are
//! stable across process restarts. The content hash doubles as the
//! compiled-artifact cache key and as the disambiguating module name of a
//! generated context type (`ctx_<hash>`), which keeps independently generated
//! context types from colliding inside one process.
//!
//! Uses XXHash64 with domain-mixing constants so a type named `"x"` and a
//! source unit whose text is `"x"` can never share a hash.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

/// Domain marker for type-name hashes.
const DOMAIN_TYPE: u64 = 0x2fac10b63a6cc57c;

/// Domain marker for generated-source content hashes.
const DOMAIN_SOURCE: u64 = 0x5ea77ffbcdf5f302;

/// A deterministic 64-bit hash identifying a registered type.
///
/// Computed from the type's name; the same name always produces the same
/// hash, so identity does not depend on registration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(DOMAIN_TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is the empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A deterministic digest of generated source text.
///
/// Keys the process-wide and on-disk compiled-artifact caches and names the
/// module of the generated `Globals` type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Digest the given source text.
    #[inline]
    pub fn of(source: &str) -> Self {
        ContentHash(DOMAIN_SOURCE ^ xxh64(source.as_bytes(), 0))
    }

    /// The module name a context type generated from this source lives in.
    pub fn module_name(self) -> String {
        format!("ctx_{:016x}", self.0)
    }

    /// File stem for the on-disk artifact of this hash.
    pub fn file_stem(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:#018x})", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(TypeHash::from_name("Sensor"), TypeHash::from_name("Sensor"));
        assert_ne!(TypeHash::from_name("Sensor"), TypeHash::from_name("Pump"));
    }

    #[test]
    fn content_hash_determinism() {
        let a = ContentHash::of("class Globals { }");
        let b = ContentHash::of("class Globals { }");
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::of("class Globals { bool flag; }"));
    }

    #[test]
    fn domains_do_not_collide() {
        // A type named like a source unit must hash differently.
        assert_ne!(TypeHash::from_name("x").0, ContentHash::of("x").0);
    }

    #[test]
    fn module_name_is_hash_derived() {
        let hash = ContentHash::of("anything");
        let module = hash.module_name();
        assert!(module.starts_with("ctx_"));
        assert_eq!(module.len(), "ctx_".len() + 16);
    }
}
