//! Error kinds for the proxy pipeline
//! Every variant is terminal for the request it belongs to

use hyper::StatusCode;
use thiserror::Error;

/// A failure while handling one proxied request
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound host matched no proxy prefix
    #[error("Domain not configured for proxy")]
    DomainNotConfigured,

    /// The outbound request could not be built
    #[error("Failed to create request: {0}")]
    RequestConstruction(String),

    /// The origin could not be reached, or did not answer in time
    #[error("Proxy Error: {0}")]
    UpstreamTransport(#[source] reqwest::Error),

    /// The origin sent a gzip body that does not decode
    #[error("Failed to decompress Gzip")]
    Decompression(#[source] std::io::Error),

    /// The origin's body stream broke off
    #[error("Failed to read response: {0}")]
    ResponseRead(#[source] reqwest::Error),
}

impl ProxyError {
    /// Status code surfaced to the client
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::DomainNotConfigured => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::RequestConstruction(_)
            | ProxyError::Decompression(_)
            | ProxyError::ResponseRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Rejected domain table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("mapping for origin '{0}' has an empty proxy prefix")]
    EmptyPrefix(String),

    #[error("mapping with proxy prefix '{0}' has an empty origin host")]
    EmptyOrigin(String),

    #[error("proxy prefix '{0}' is assigned to more than one origin")]
    DuplicatePrefix(String),

    #[error("origin host '{0}' is mapped more than once")]
    DuplicateOrigin(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_message_and_status() {
        let err = ProxyError::DomainNotConfigured;
        assert_eq!(err.to_string(), "Domain not configured for proxy");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_decompression_is_internal_error() {
        let err = ProxyError::Decompression(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad header",
        ));
        assert_eq!(err.to_string(), "Failed to decompress Gzip");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_construction_error_carries_detail() {
        let err = ProxyError::RequestConstruction("invalid host".to_string());
        assert_eq!(err.to_string(), "Failed to create request: invalid host");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
