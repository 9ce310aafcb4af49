//! Extension namespace registry.
//!
//! Extensions are identified by URIs; prefixes are a per-file shorthand.
//! The registry is a bijection both ways: no prefix maps to two URIs and no
//! URI to two prefixes. The empty prefix always denotes the default E57
//! namespace and is never counted as an extension.

use e57_core::name::is_identifier;
use e57_core::{Error, ErrorKind, Result};

/// URI of the default E57 namespace.
pub const E57_V1_0_URI: &str = "http://www.astm.org/COMMIT/E57/2010-e57-v1.0";

/// Bijective prefix ↔ URI registry for one session.
///
/// Entries are kept sorted by prefix; `prefix_at`/`uri_at` enumerate in
/// ascending prefix order, which is stable for the session lifetime (it
/// need not match insertion order).
#[derive(Debug, Default)]
pub(crate) struct ExtensionRegistry {
    /// `(prefix, uri)` pairs, sorted by prefix.
    entries: Vec<(String, String)>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Register a `(prefix, uri)` pair.
    pub fn add(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::bad_api_argument(
                "cannot redeclare the default namespace (empty prefix)",
            ));
        }
        if uri.is_empty() {
            return Err(Error::bad_api_argument("extension URI must be nonempty"));
        }
        if !is_identifier(prefix) {
            return Err(Error::bad_api_argument(format!(
                "illegal extension prefix: {prefix:?}"
            )));
        }
        match self.entries.binary_search_by(|(p, _)| p.as_str().cmp(prefix)) {
            Ok(_) => Err(Error::new(
                ErrorKind::DuplicatePrefix,
                format!("prefix {prefix:?} is already declared"),
            )),
            Err(insert_at) => {
                if self.entries.iter().any(|(_, u)| u == uri) {
                    return Err(Error::new(
                        ErrorKind::DuplicateUri,
                        format!("URI {uri:?} is already declared"),
                    ));
                }
                self.entries
                    .insert(insert_at, (prefix.to_owned(), uri.to_owned()));
                Ok(())
            }
        }
    }

    /// URI declared for `prefix`; the empty prefix resolves to the default
    /// E57 namespace. A well-formed but undeclared prefix is `None`.
    pub fn lookup_prefix(&self, prefix: &str) -> Result<Option<&str>> {
        if prefix.is_empty() {
            return Ok(Some(E57_V1_0_URI));
        }
        if !is_identifier(prefix) {
            return Err(Error::bad_api_argument(format!(
                "illegal extension prefix: {prefix:?}"
            )));
        }
        Ok(self
            .entries
            .binary_search_by(|(p, _)| p.as_str().cmp(prefix))
            .ok()
            .map(|i| self.entries[i].1.as_str()))
    }

    /// Prefix declared for `uri`, if any.
    pub fn lookup_uri(&self, uri: &str) -> Result<Option<&str>> {
        if uri.is_empty() {
            return Err(Error::bad_api_argument("extension URI must be nonempty"));
        }
        Ok(self
            .entries
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str()))
    }

    /// True when `prefix` is declared (the empty prefix always is).
    pub fn is_declared(&self, prefix: &str) -> bool {
        prefix.is_empty()
            || self
                .entries
                .binary_search_by(|(p, _)| p.as_str().cmp(prefix))
                .is_ok()
    }

    /// Number of declared extensions (the default namespace not counted).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// The `index`-th prefix in ascending prefix order.
    pub fn prefix_at(&self, index: usize) -> Result<&str> {
        self.entries
            .get(index)
            .map(|(p, _)| p.as_str())
            .ok_or_else(|| {
                Error::bad_api_argument(format!(
                    "extension index {index} out of range ({} declared)",
                    self.entries.len()
                ))
            })
    }

    /// The `index`-th URI; corresponds to `prefix_at(index)`.
    pub fn uri_at(&self, index: usize) -> Result<&str> {
        self.entries
            .get(index)
            .map(|(_, u)| u.as_str())
            .ok_or_else(|| {
                Error::bad_api_argument(format!(
                    "extension index {index} out of range ({} declared)",
                    self.entries.len()
                ))
            })
    }

    /// Iterate `(prefix, uri)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Verify the bijection and ordering invariants.
    pub fn check_invariant(&self) -> Result<()> {
        for window in self.entries.windows(2) {
            if window[0].0 >= window[1].0 {
                return Err(Error::new(
                    ErrorKind::InvarianceViolation,
                    "extension prefixes out of order or duplicated",
                ));
            }
        }
        for (i, (_, uri)) in self.entries.iter().enumerate() {
            if self.entries[i + 1..].iter().any(|(_, u)| u == uri) {
                return Err(Error::new(
                    ErrorKind::InvarianceViolation,
                    format!("extension URI {uri:?} declared twice"),
                ));
            }
        }
        for i in 0..self.count() {
            let prefix = self.prefix_at(i)?;
            let uri = self.uri_at(i)?;
            if self.lookup_prefix(prefix)? != Some(uri) || self.lookup_uri(uri)? != Some(prefix) {
                return Err(Error::new(
                    ErrorKind::InvarianceViolation,
                    "extension lookup does not match enumeration",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup_both_directions() {
        let mut reg = ExtensionRegistry::new();
        reg.add("demo", "http://example.com/D").unwrap();
        assert_eq!(reg.lookup_prefix("demo").unwrap(), Some("http://example.com/D"));
        assert_eq!(reg.lookup_uri("http://example.com/D").unwrap(), Some("demo"));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn empty_prefix_is_default_namespace() {
        let reg = ExtensionRegistry::new();
        assert_eq!(reg.lookup_prefix("").unwrap(), Some(E57_V1_0_URI));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn duplicate_prefix_then_duplicate_uri() {
        let mut reg = ExtensionRegistry::new();
        reg.add("x", "U1").unwrap();
        let err = reg.add("x", "U2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicatePrefix);
        let err = reg.add("y", "U1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateUri);
    }

    #[test]
    fn empty_arguments_rejected() {
        let mut reg = ExtensionRegistry::new();
        assert_eq!(
            reg.add("", "U").unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
        assert_eq!(
            reg.add("p", "").unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
        assert_eq!(
            reg.lookup_uri("").unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
    }

    #[test]
    fn illegal_prefix_rejected() {
        let mut reg = ExtensionRegistry::new();
        assert!(reg.add("1bad", "U").is_err());
        assert!(reg.lookup_prefix("a:b").is_err());
    }

    #[test]
    fn undeclared_lookups_return_none() {
        let reg = ExtensionRegistry::new();
        assert_eq!(reg.lookup_prefix("ghost").unwrap(), None);
        assert_eq!(reg.lookup_uri("http://nowhere").unwrap(), None);
    }

    #[test]
    fn enumeration_is_sorted_and_corresponding() {
        let mut reg = ExtensionRegistry::new();
        reg.add("zulu", "http://z").unwrap();
        reg.add("alpha", "http://a").unwrap();
        reg.add("mike", "http://m").unwrap();
        assert_eq!(reg.prefix_at(0).unwrap(), "alpha");
        assert_eq!(reg.prefix_at(1).unwrap(), "mike");
        assert_eq!(reg.prefix_at(2).unwrap(), "zulu");
        for i in 0..reg.count() {
            let p = reg.prefix_at(i).unwrap().to_owned();
            let u = reg.uri_at(i).unwrap().to_owned();
            assert_eq!(reg.lookup_prefix(&p).unwrap(), Some(u.as_str()));
            assert_eq!(reg.lookup_uri(&u).unwrap(), Some(p.as_str()));
        }
        reg.check_invariant().unwrap();
    }

    #[test]
    fn index_out_of_range_rejected() {
        let reg = ExtensionRegistry::new();
        assert_eq!(
            reg.prefix_at(0).unwrap_err().kind(),
            ErrorKind::BadApiArgument
        );
    }
}
