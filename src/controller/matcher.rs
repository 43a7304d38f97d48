//! # Namespace Matcher
//!
//! Crypt namespace patterns are regular expressions searched (not anchored)
//! against the full namespace name: `ns` matches `ns1`, `my-ns-2` and `insert`.
//! Anchor explicitly (`^ns$`) for an exact match. A pattern that fails to
//! compile matches nothing.

use crate::crd::Crypt;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// A Crypt's namespace patterns, compiled once
#[derive(Debug, Clone, Default)]
pub struct NamespacePatterns {
    compiled: Vec<Regex>,
}

impl NamespacePatterns {
    /// Compile `patterns`, dropping (and logging) any that are malformed
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| {
                let pattern = pattern.as_ref();
                match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "Ignoring malformed namespace pattern");
                        None
                    }
                }
            })
            .collect();
        Self { compiled }
    }

    pub fn for_crypt(crypt: &Crypt) -> Self {
        Self::compile(&crypt.spec.namespaces)
    }

    /// True if any pattern matches; stops at the first match
    pub fn matches(&self, namespace: &str) -> bool {
        self.compiled.iter().any(|regex| regex.is_match(namespace))
    }

    /// Every namespace in `namespaces` matched by at least one pattern, deduplicated
    pub fn select<'a, I>(&self, namespaces: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        namespaces
            .into_iter()
            .filter(|ns| self.matches(ns))
            .map(str::to_string)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Namespaces matched by `patterns` among `namespaces`
pub fn matching_namespaces<'a, S, I>(patterns: &[S], namespaces: I) -> BTreeSet<String>
where
    S: AsRef<str>,
    I: IntoIterator<Item = &'a str>,
{
    NamespacePatterns::compile(patterns).select(namespaces)
}

/// Crypts whose patterns match a newly appeared namespace
///
/// Every Crypt is tested; a match on one Crypt does not end the scan.
pub fn crypts_matching_namespace<'a>(
    crypts: &'a [Arc<Crypt>],
    namespace: &'a str,
) -> impl Iterator<Item = &'a Arc<Crypt>> + 'a {
    crypts
        .iter()
        .filter(move |crypt| NamespacePatterns::for_crypt(crypt).matches(namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CryptSpec;
    use kube::api::ObjectMeta;

    fn crypt(namespace: &str, name: &str, patterns: &[&str]) -> Arc<Crypt> {
        Arc::new(Crypt {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: CryptSpec {
                secrets: Vec::new(),
                namespaces: patterns.iter().map(|p| p.to_string()).collect(),
            },
            status: None,
        })
    }

    #[test]
    fn test_unanchored_search() {
        let patterns = NamespacePatterns::compile(&["ns"]);
        assert!(patterns.matches("ns1"));
        assert!(patterns.matches("my-ns-1"));
        assert!(patterns.matches("insert"));
        assert!(!patterns.matches("default"));
    }

    #[test]
    fn test_anchored_pattern_is_exact() {
        let patterns = NamespacePatterns::compile(&["^ns$"]);
        assert!(patterns.matches("ns"));
        assert!(!patterns.matches("ns1"));
        assert!(!patterns.matches("my-ns-1"));
    }

    #[test]
    fn test_malformed_pattern_matches_nothing() {
        let patterns = NamespacePatterns::compile(&["(unclosed"]);
        assert!(patterns.is_empty());
        assert!(!patterns.matches("(unclosed"));

        // Other patterns in the list still apply
        let patterns = NamespacePatterns::compile(&["[", "prod"]);
        assert!(patterns.matches("prod-eu"));
    }

    #[test]
    fn test_select_unions_and_deduplicates() {
        let namespaces = ["test-ns1", "test-ns2", "kube-system", "default"];
        let selected = matching_namespaces(&["test-ns1", "test-ns", "^default$"], namespaces);
        assert_eq!(
            selected.into_iter().collect::<Vec<_>>(),
            vec!["default", "test-ns1", "test-ns2"]
        );
    }

    #[test]
    fn test_no_patterns_select_nothing() {
        let none: [&str; 0] = [];
        assert!(matching_namespaces(&none, ["default"]).is_empty());
    }

    #[test]
    fn test_reverse_trigger_scans_every_crypt() {
        let crypts = vec![
            crypt("a", "first", &["^team-"]),
            crypt("b", "second", &["nomatch"]),
            crypt("c", "third", &["team", "other"]),
        ];

        let names: Vec<_> = crypts_matching_namespace(&crypts, "team-blue")
            .map(|c| c.metadata.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["first", "third"]);
    }
}
