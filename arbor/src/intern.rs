//! String interning.
//!
//! Names and canonical values are stored as [`IStr`] handles over the global
//! `string_cache` atom set. Handles for the same content are the same atom,
//! so equality is a word compare, and an entry is released once its last
//! handle drops.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use string_cache::DefaultAtom;

/// Interned string handle.
#[derive(Clone, PartialEq, Eq)]
pub struct IStr(DefaultAtom);

/// Interned handle for `s`.
pub fn intern(s: &str) -> IStr {
    IStr(DefaultAtom::from(s))
}

impl IStr {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when both handles are the same atom. Always agrees with `==`.
    pub fn ptr_eq(&self, other: &IStr) -> bool {
        self.0 == other.0
    }
}

impl From<&str> for IStr {
    fn from(s: &str) -> Self {
        intern(s)
    }
}

impl PartialEq<str> for IStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for IStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

// Hashes the content, not the atom, so `Borrow<str>` lookups work.
impl Hash for IStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for IStr {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IStr {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Deref for IStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for IStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rapidhash::RapidHashSet;

    use super::*;

    #[test]
    fn test_same_content_same_atom() {
        let a = intern("interface-name");
        let b = intern("interface-name");
        let c = intern("eth1");
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "interface-name");
        assert!(intern("b") > intern("a"));
    }

    #[test]
    fn test_set_lookup_by_str() {
        let set: RapidHashSet<IStr> = ["eth0", "eth1"].into_iter().map(intern).collect();
        assert!(set.contains("eth0"));
        assert!(!set.contains("eth2"));
    }
}
