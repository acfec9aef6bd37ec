//! Domain registry
//! Holds the fixed origin host <-> proxy prefix table

use crate::error::RegistryError;
use std::collections::HashSet;

/// Prefix reserved for the mirrored code-hosting service
pub const PASS_THROUGH_PREFIX: &str = "gh.";

/// Origin served behind [`PASS_THROUGH_PREFIX`]
pub const PASS_THROUGH_ORIGIN: &str = "github.com";

const BUILTIN_MAPPINGS: &[(&str, &str)] = &[
    ("ci-cn-wiki.wikidot.com", "ci."),
    ("d3g0gp89917ko0.cloudfront.net", "cloudfront-com."),
    ("scp-wiki.wdfiles.com", "scp-wiki-com."),
    ("ci-wiki-intl.wdfiles.com", "ci-intl-com."),
    ("www.wikidot.com", "wikidot-com."),
    ("ci-cn-wiki.wdfiles.com", "ci-cn-wiki-wdfiles-com."),
    ("cdn.onesignal.com", "cdn."),
    ("fonts.gstatic.com", "fonts."),
    ("ci-theme.wdfiles.com", "ci-theme."),
];

/// One origin host and the prefix it is served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMapping {
    pub origin_host: String,
    pub proxy_prefix: String,
}

impl DomainMapping {
    pub fn new(origin_host: impl Into<String>, proxy_prefix: impl Into<String>) -> Self {
        Self {
            origin_host: origin_host.into(),
            proxy_prefix: proxy_prefix.into(),
        }
    }
}

/// Read-only mapping table, built once at startup and shared by reference
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    entries: Vec<DomainMapping>,
    pass_through_prefix: String,
    pass_through_origin: String,
}

impl DomainRegistry {
    /// Build a registry from custom entries, rejecting empty or duplicated
    /// prefixes and origins
    pub fn new(entries: Vec<DomainMapping>) -> Result<Self, RegistryError> {
        let mut prefixes = HashSet::new();
        let mut origins = HashSet::new();

        for entry in &entries {
            if entry.proxy_prefix.is_empty() {
                return Err(RegistryError::EmptyPrefix(entry.origin_host.clone()));
            }
            if entry.origin_host.is_empty() {
                return Err(RegistryError::EmptyOrigin(entry.proxy_prefix.clone()));
            }
            if !prefixes.insert(entry.proxy_prefix.as_str()) {
                return Err(RegistryError::DuplicatePrefix(entry.proxy_prefix.clone()));
            }
            if !origins.insert(entry.origin_host.as_str()) {
                return Err(RegistryError::DuplicateOrigin(entry.origin_host.clone()));
            }
        }

        Ok(Self {
            entries,
            pass_through_prefix: PASS_THROUGH_PREFIX.to_string(),
            pass_through_origin: PASS_THROUGH_ORIGIN.to_string(),
        })
    }

    /// The table the service ships with
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_MAPPINGS
                .iter()
                .map(|(origin, prefix)| DomainMapping::new(*origin, *prefix))
                .collect(),
            pass_through_prefix: PASS_THROUGH_PREFIX.to_string(),
            pass_through_origin: PASS_THROUGH_ORIGIN.to_string(),
        }
    }

    /// Replace the pass-through prefix and its fixed origin
    pub fn with_pass_through(
        mut self,
        prefix: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        self.pass_through_prefix = prefix.into();
        self.pass_through_origin = origin.into();
        self
    }

    pub fn entries(&self) -> &[DomainMapping] {
        &self.entries
    }

    pub fn pass_through_prefix(&self) -> &str {
        &self.pass_through_prefix
    }

    pub fn pass_through_origin(&self) -> &str {
        &self.pass_through_origin
    }

    pub fn is_pass_through(&self, prefix: &str) -> bool {
        prefix == self.pass_through_prefix
    }

    /// Find the prefix the host is served under.
    /// The pass-through literal wins outright; otherwise the longest
    /// matching prefix is returned, earlier entries winning ties.
    pub fn prefix_for_host(&self, host: &str) -> Option<&str> {
        if !self.pass_through_prefix.is_empty() && host.starts_with(&self.pass_through_prefix) {
            return Some(&self.pass_through_prefix);
        }

        let mut best: Option<&str> = None;
        for entry in &self.entries {
            if !host.starts_with(&entry.proxy_prefix) {
                continue;
            }
            match best {
                Some(current) if current.len() >= entry.proxy_prefix.len() => {}
                _ => best = Some(&entry.proxy_prefix),
            }
        }
        best
    }

    /// Reverse lookup. The pass-through prefix has no entry here.
    pub fn origin_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.proxy_prefix == prefix)
            .map(|entry| entry.origin_host.as_str())
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let builtin = DomainRegistry::builtin();
        assert_eq!(builtin.entries().len(), BUILTIN_MAPPINGS.len());
        assert!(DomainRegistry::new(builtin.entries().to_vec()).is_ok());
    }

    #[test]
    fn test_prefix_for_host() {
        let registry = DomainRegistry::builtin();
        assert_eq!(registry.prefix_for_host("ci.mirror.example"), Some("ci."));
        assert_eq!(
            registry.prefix_for_host("ci-intl-com.mirror.example"),
            Some("ci-intl-com.")
        );
        assert_eq!(registry.prefix_for_host("fonts.mirror.example:8080"), Some("fonts."));
        assert_eq!(registry.prefix_for_host("unknown.mirror.example"), None);
        assert_eq!(registry.prefix_for_host(""), None);
    }

    #[test]
    fn test_pass_through_prefix_wins() {
        let registry = DomainRegistry::builtin();
        assert_eq!(registry.prefix_for_host("gh.mirror.example"), Some("gh."));
        assert!(registry.is_pass_through("gh."));
        assert_eq!(registry.origin_for_prefix("gh."), None);
        assert_eq!(registry.pass_through_origin(), "github.com");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = DomainRegistry::new(vec![
            DomainMapping::new("short.origin", "app."),
            DomainMapping::new("long.origin", "app.v2."),
        ])
        .unwrap();

        assert_eq!(registry.prefix_for_host("app.v2.mirror.example"), Some("app.v2."));
        assert_eq!(registry.prefix_for_host("app.mirror.example"), Some("app."));
    }

    #[test]
    fn test_origin_for_prefix() {
        let registry = DomainRegistry::builtin();
        assert_eq!(registry.origin_for_prefix("cdn."), Some("cdn.onesignal.com"));
        assert_eq!(registry.origin_for_prefix("nope."), None);
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = DomainRegistry::new(vec![
            DomainMapping::new("a.origin", "x."),
            DomainMapping::new("b.origin", "x."),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePrefix("x.".to_string()));

        let err = DomainRegistry::new(vec![
            DomainMapping::new("a.origin", "x."),
            DomainMapping::new("a.origin", "y."),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateOrigin("a.origin".to_string()));
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let err = DomainRegistry::new(vec![DomainMapping::new("a.origin", "")]).unwrap_err();
        assert_eq!(err, RegistryError::EmptyPrefix("a.origin".to_string()));
    }

    #[test]
    fn test_with_pass_through() {
        let registry = DomainRegistry::builtin().with_pass_through("code.", "git.example");
        assert_eq!(registry.prefix_for_host("code.mirror.example"), Some("code."));
        assert_eq!(registry.prefix_for_host("gh.mirror.example"), None);
        assert_eq!(registry.pass_through_origin(), "git.example");
    }
}
