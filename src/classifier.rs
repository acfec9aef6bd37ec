//! Request classification: fixed redirect, unconfigured host, or proxy

use crate::registry::DomainRegistry;

/// Paths answered with a redirect on every host
pub const RESERVED_PATHS: &[&str] = &["/login", "/signup"];

/// Where reserved paths redirect to
pub const DEFAULT_REDIRECT_LOCATION: &str = "https://www.gov.cn";

/// Outcome of looking at an inbound host and path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Answer with a 302 to this location
    Redirect(&'a str),
    /// Host is not served by this deployment
    NotConfigured,
    /// Forward to `target_host`; `prefix` is the matched proxy prefix
    Proceed { target_host: &'a str, prefix: &'a str },
}

/// Pure decision function over the registry
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    reserved_paths: Vec<String>,
    redirect_location: String,
}

impl RequestClassifier {
    pub fn new(redirect_location: impl Into<String>) -> Self {
        Self {
            reserved_paths: RESERVED_PATHS.iter().map(|p| p.to_string()).collect(),
            redirect_location: redirect_location.into(),
        }
    }

    pub fn redirect_location(&self) -> &str {
        &self.redirect_location
    }

    pub fn is_reserved(&self, path: &str) -> bool {
        self.reserved_paths.iter().any(|p| p == path)
    }

    pub fn classify<'a>(
        &'a self,
        registry: &'a DomainRegistry,
        host: &str,
        path: &str,
    ) -> Classification<'a> {
        // Reserved paths are checked before any domain resolution
        if self.is_reserved(path) {
            return Classification::Redirect(&self.redirect_location);
        }

        let prefix = match registry.prefix_for_host(host) {
            Some(prefix) => prefix,
            None => return Classification::NotConfigured,
        };

        if registry.is_pass_through(prefix) {
            return Classification::Proceed {
                target_host: registry.pass_through_origin(),
                prefix,
            };
        }

        match registry.origin_for_prefix(prefix) {
            Some(target_host) => Classification::Proceed { target_host, prefix },
            None => Classification::NotConfigured,
        }
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT_LOCATION)
    }
}
