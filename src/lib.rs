//! MirrorProxy - A domain-rewriting reverse proxy
//!
//! Serves a fixed set of origin hosts under proxy hostnames built from a
//! per-origin prefix and a shared domain suffix:
//! - Prefix-based routing over a static domain table
//! - Repair of malformed nested-URL request paths
//! - Transparent gzip decoding of origin responses
//! - Rewriting of origin-domain references in text payloads
//! - Header sanitization (CORS, cache, CSP removal) on the way out

pub mod assembler;
pub mod classifier;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod proxy;
pub mod registry;
pub mod rewriter;

pub use classifier::{Classification, RequestClassifier};
pub use error::{ProxyError, RegistryError};
pub use fetcher::{UpstreamFetcher, UpstreamResponse};
pub use normalizer::normalize_path;
pub use proxy::{ProxyConfig, ProxyServer};
pub use registry::{DomainMapping, DomainRegistry};
pub use rewriter::ContentRewriter;
