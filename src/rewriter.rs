//! Content rewriter
//! Replaces origin-domain references in text payloads with the matching
//! proxy domains. Works on raw bytes, so the payload's encoding is kept.

use crate::registry::DomainRegistry;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::{Captures, NoExpand, Regex};
use std::borrow::Cow;

/// Content types whose bodies are rewritten; matched as substrings
const REWRITABLE_TYPES: &[&str] = &[
    "text/",
    "application/json",
    "application/javascript",
    "application/xml",
];

/// A quote followed by a single `/`, i.e. a root-relative reference.
/// Protocol-relative `"//host` references are left to the domain rules.
/// The class after the slash is byte-oriented so non-UTF-8 payloads match.
static QUOTED_ROOT_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(["'])/((?-u:[^/])|$)"#).expect("Root-relative regex is valid")
});

/// Surface forms an origin host is found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Https,
    Http,
    ProtocolRelative,
    DoubleQuoted,
    SingleQuoted,
}

impl Surface {
    const ALL: [Surface; 5] = [
        Surface::Https,
        Surface::Http,
        Surface::ProtocolRelative,
        Surface::DoubleQuoted,
        Surface::SingleQuoted,
    ];

    fn needle(self, origin: &str) -> String {
        match self {
            Surface::Https => format!("https://{}", origin),
            Surface::Http => format!("http://{}", origin),
            Surface::ProtocolRelative => format!("//{}", origin),
            Surface::DoubleQuoted => format!("\"{}\"", origin),
            Surface::SingleQuoted => format!("'{}'", origin),
        }
    }

    fn replacement(self, proxy_domain: &str) -> String {
        match self {
            // plain http is upgraded
            Surface::Https | Surface::Http => format!("https://{}", proxy_domain),
            Surface::ProtocolRelative => format!("//{}", proxy_domain),
            Surface::DoubleQuoted => format!("\"{}\"", proxy_domain),
            Surface::SingleQuoted => format!("'{}'", proxy_domain),
        }
    }
}

struct DomainRule {
    proxy_prefix: String,
    patterns: Vec<(Surface, Regex)>,
}

/// Precompiled rewrite rules for every registry entry
pub struct ContentRewriter {
    rules: Vec<DomainRule>,
    pass_through_prefix: String,
}

impl ContentRewriter {
    pub fn new(registry: &DomainRegistry) -> Self {
        let rules = registry
            .entries()
            .iter()
            .map(|entry| DomainRule {
                proxy_prefix: entry.proxy_prefix.clone(),
                patterns: Surface::ALL
                    .iter()
                    .map(|surface| {
                        let needle = regex::escape(&surface.needle(&entry.origin_host));
                        let re = Regex::new(&needle).expect("Escaped literal regex is valid");
                        (*surface, re)
                    })
                    .collect(),
            })
            .collect();

        Self {
            rules,
            pass_through_prefix: registry.pass_through_prefix().to_string(),
        }
    }

    /// Rewrite `body` for a client that reached us through `current_hostname`,
    /// matched under `host_prefix`. Non-text payloads are returned untouched.
    pub fn rewrite(
        &self,
        body: Bytes,
        content_type: &str,
        host_prefix: &str,
        current_hostname: &str,
    ) -> Bytes {
        if !is_rewritable(content_type) {
            return body;
        }

        let domain_suffix = current_hostname
            .strip_prefix(host_prefix)
            .unwrap_or(current_hostname);

        // None until a pattern actually matches
        let mut text: Option<Vec<u8>> = None;

        for rule in &self.rules {
            let full_proxy_domain = format!("{}{}", rule.proxy_prefix, domain_suffix);
            for (surface, pattern) in &rule.patterns {
                let replacement = surface.replacement(&full_proxy_domain);
                let current = text.as_deref().unwrap_or(&body[..]);
                let replaced = match pattern.replace_all(current, NoExpand(replacement.as_bytes()))
                {
                    Cow::Owned(out) => Some(out),
                    Cow::Borrowed(_) => None,
                };
                if replaced.is_some() {
                    text = replaced;
                }
            }
        }

        if host_prefix == self.pass_through_prefix {
            let absolute = format!("https://{}/", current_hostname);
            let current = text.as_deref().unwrap_or(&body[..]);
            let replaced = match QUOTED_ROOT_RELATIVE.replace_all(current, |caps: &Captures| {
                let mut out = caps[1].to_vec();
                out.extend_from_slice(absolute.as_bytes());
                out.extend_from_slice(&caps[2]);
                out
            }) {
                Cow::Owned(out) => Some(out),
                Cow::Borrowed(_) => None,
            };
            if replaced.is_some() {
                text = replaced;
            }
        }

        match text {
            Some(out) => Bytes::from(out),
            None => body,
        }
    }
}

/// Whether a payload of this content type is rewritten
pub fn is_rewritable(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    REWRITABLE_TYPES
        .iter()
        .any(|kind| content_type.contains(kind))
}
