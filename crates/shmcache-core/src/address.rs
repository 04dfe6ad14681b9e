//! Entry and segment naming
//!
//! An [`Address`] is a base name plus keyword attributes, rendered as
//! `NAME:KEY1_VALUE1:KEY2_VALUE2...` with keys in ascending order. The same
//! rendering names the cache entry on disk and the shared segment in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default prefix of shared segment names
pub const DEFAULT_SEGMENT_PREFIX: &str = "ddf";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    name: String,
    attrs: BTreeMap<String, String>,
}

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Add a keyword attribute. A repeated key keeps the last value.
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.attrs.insert(key.into(), value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Path of this entry under a namespace root
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(self.to_string())
    }

    /// Shared segment name: `<prefix>.<pid>.<address>`
    pub fn segment_name(&self, prefix: &str, pid: u32) -> String {
        format!("{}.{}.{}", prefix, pid, self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.attrs {
            write!(f, ":{}_{}", key, value)?;
        }
        Ok(())
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Address::new(name)
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Address::new(name)
    }
}

impl From<&Address> for Address {
    fn from(address: &Address) -> Self {
        address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_renders_alone() {
        assert_eq!(Address::new("WTerm").to_string(), "WTerm");
    }

    #[test]
    fn attrs_sorted_by_key() {
        let a = Address::new("X").with("a", 1).with("b", 2);
        let b = Address::new("X").with("b", 2).with("a", 1);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "X:a_1:b_2");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn repeated_key_keeps_last() {
        let a = Address::new("WTerm").with("facet", 1).with("facet", 7);
        assert_eq!(a.to_string(), "WTerm:facet_7");
    }

    #[test]
    fn segment_and_path_share_rendering() {
        let a = Address::new("WTerm").with("wmax", 25000);
        assert_eq!(a.segment_name("ddf", 4242), "ddf.4242.WTerm:wmax_25000");
        assert_eq!(
            a.path_in(Path::new("/cache/ms.ddfcache")),
            PathBuf::from("/cache/ms.ddfcache/WTerm:wmax_25000")
        );
    }
}
