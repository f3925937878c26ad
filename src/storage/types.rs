//! Type-safe object identifiers for the storage layer.

use std::fmt;

use sha3::{Digest, Sha3_256};
use ulid::Ulid;

use crate::storage::error::{StorageError, StorageResult};

/// Length of a hex-encoded oid.
pub const OID_LENGTH: usize = 64;

/// An object id.
///
/// Regular objects use a 64 character lowercase hex string; the root B-tree
/// uses the fixed id `root`. Ids derived from a domain identifier are the
/// SHA3-256 of that identifier, so the same domain id always lands in the
/// same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(String);

impl Oid {
    /// id of the root B-tree
    pub const ROOT: &'static str = "root";

    /// parse an oid, validating its format
    pub fn new(value: impl Into<String>) -> StorageResult<Self> {
        let value = value.into();
        if value == Self::ROOT || is_hex_oid(&value) {
            Ok(Self(value))
        } else {
            Err(StorageError::InvalidKey(value))
        }
    }

    /// the root oid
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// derive the oid for a domain identifier
    pub fn from_domain_id(id: &str) -> Self {
        Self(hex::encode(Sha3_256::digest(id.as_bytes())))
    }

    /// generate a fresh random oid for objects without a domain identifier
    pub fn generate() -> Self {
        let seed = format!("{}{}", Ulid::new(), Ulid::new());
        Self::from_domain_id(&seed)
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// two-level shard directories (`ab`, `cd`) for a hex oid
    pub fn shard(&self) -> Option<(&str, &str)> {
        if self.is_root() {
            None
        } else {
            Some((&self.0[0..2], &self.0[2..4]))
        }
    }

    /// short form for log output
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

pub(crate) fn is_hex_oid(value: &str) -> bool {
    value.len() == OID_LENGTH && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_oid_is_deterministic() {
        let a = Oid::from_domain_id("/datasets/abc");
        let b = Oid::from_domain_id("/datasets/abc");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), OID_LENGTH);
        assert_ne!(a, Oid::from_domain_id("/datasets/abd"));
    }

    #[test]
    fn test_generated_oids_differ() {
        let a = Oid::generate();
        let b = Oid::generate();
        assert_ne!(a, b);
        assert!(Oid::new(a.as_str()).is_ok());
    }

    #[test]
    fn test_oid_validation() {
        assert!(Oid::new("root").unwrap().is_root());
        assert!(Oid::new("abc").is_err());
        assert!(Oid::new("Z".repeat(64)).is_err());
        assert!(Oid::new("A".repeat(64)).is_err()); // uppercase
        assert!(Oid::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn test_shard() {
        let oid = Oid::new(format!("abcd{}", "0".repeat(60))).unwrap();
        assert_eq!(oid.shard(), Some(("ab", "cd")));
        assert_eq!(Oid::root().shard(), None);
    }
}
