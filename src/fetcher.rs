//! Upstream fetcher
//! Issues the outbound request to the origin and returns a fully read,
//! decompressed body

use crate::error::ProxyError;
use anyhow::{Context, Result};
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, HOST, REFERER};
use hyper::{Method, StatusCode};
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Headers that describe the inbound connection rather than the request.
/// `content-length` is recomputed by the client from the forwarded body.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Response from the origin with its body already in memory
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// HTTP client bound to one scheme and timeout
pub struct UpstreamFetcher {
    client: reqwest::Client,
    scheme: String,
}

impl UpstreamFetcher {
    /// Create a fetcher whose round trips are bounded by `timeout`
    pub fn new(timeout: Duration, scheme: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            scheme: scheme.into(),
        })
    }

    /// Absolute origin URL for a normalized path and the raw inbound query
    pub fn target_url(
        &self,
        target_host: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<Url, ProxyError> {
        let mut url = Url::parse(&format!("{}://{}", self.scheme, target_host))
            .map_err(|e| ProxyError::RequestConstruction(e.to_string()))?;
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }

    /// Send the request and read the whole response
    pub async fn fetch(
        &self,
        method: Method,
        inbound_headers: &HeaderMap,
        body: Bytes,
        target_host: &str,
        url: Url,
    ) -> Result<UpstreamResponse, ProxyError> {
        let headers = outbound_headers(inbound_headers, target_host, &url)?;

        let request = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .build()
            .map_err(|e| ProxyError::RequestConstruction(e.to_string()))?;

        debug!("Fetching {} {}", request.method(), request.url());

        let response = self
            .client
            .execute(request)
            .await
            .map_err(ProxyError::UpstreamTransport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.bytes().await.map_err(ProxyError::ResponseRead)?;

        let body = if is_gzip(&headers) {
            // The origin ignored `Accept-Encoding: identity`
            warn!("Origin {} answered with gzip despite identity request", target_host);
            Bytes::from(decode_gzip(&raw).map_err(ProxyError::Decompression)?)
        } else {
            raw
        };

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Copy inbound headers for the origin and force the ones the proxy owns
pub fn outbound_headers(
    inbound: &HeaderMap,
    target_host: &str,
    target_url: &Url,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 3);

    for (name, value) in inbound.iter() {
        if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let host = HeaderValue::from_str(target_host)
        .map_err(|e| ProxyError::RequestConstruction(format!("invalid host header: {}", e)))?;
    let referer = HeaderValue::from_str(target_url.as_str())
        .map_err(|e| ProxyError::RequestConstruction(format!("invalid referer header: {}", e)))?;

    headers.insert(HOST, host);
    headers.insert(REFERER, referer);
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Ok(headers)
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

/// Inflate a gzip payload, including concatenated members
pub fn decode_gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(Cursor::new(bytes));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use hyper::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
    use std::io::Write;

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn fetcher() -> UpstreamFetcher {
        UpstreamFetcher::new(Duration::from_secs(30), "https").unwrap()
    }

    #[test]
    fn test_decodes_gzip_payload() {
        let compressed = gzip(b"<a href=\"https://www.wikidot.com/\">");
        assert_eq!(
            decode_gzip(&compressed).unwrap(),
            b"<a href=\"https://www.wikidot.com/\">"
        );
    }

    #[test]
    fn test_decodes_concatenated_gzip_members() {
        let mut compressed = gzip(b"first half, ");
        compressed.extend_from_slice(&gzip(b"second half"));
        assert_eq!(decode_gzip(&compressed).unwrap(), b"first half, second half");
    }

    #[test]
    fn test_rejects_corrupt_gzip() {
        assert!(decode_gzip(b"definitely not gzip").is_err());
    }

    #[test]
    fn test_is_gzip() {
        let mut headers = HeaderMap::new();
        assert!(!is_gzip(&headers));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(" GZIP "));
        assert!(is_gzip(&headers));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        assert!(!is_gzip(&headers));
    }

    #[test]
    fn test_target_url_is_secure() {
        let url = fetcher()
            .target_url("www.wikidot.com", "/forum/t-1", Some("page=2&x=y"))
            .unwrap();
        assert_eq!(url.as_str(), "https://www.wikidot.com/forum/t-1?page=2&x=y");
    }

    #[test]
    fn test_target_url_without_query() {
        let url = fetcher().target_url("github.com", "/", None).unwrap();
        assert_eq!(url.as_str(), "https://github.com/");
    }

    #[test]
    fn test_target_url_rejects_bad_host() {
        let err = fetcher().target_url("bad host", "/", None).unwrap_err();
        assert!(matches!(err, ProxyError::RequestConstruction(_)));
    }

    #[test]
    fn test_outbound_headers_overrides() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("ci.mirror.example"));
        inbound.insert(REFERER, HeaderValue::from_static("https://ci.mirror.example/"));
        inbound.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        inbound.insert("x-custom", HeaderValue::from_static("kept"));

        let url = Url::parse("https://ci-cn-wiki.wikidot.com/page").unwrap();
        let headers = outbound_headers(&inbound, "ci-cn-wiki.wikidot.com", &url).unwrap();

        assert_eq!(headers.get(HOST).unwrap(), "ci-cn-wiki.wikidot.com");
        assert_eq!(headers.get(REFERER).unwrap(), "https://ci-cn-wiki.wikidot.com/page");
        assert_eq!(headers.get(ACCEPT_ENCODING).unwrap(), "identity");
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        assert_eq!(headers.get_all(HOST).iter().count(), 1);
    }

    #[test]
    fn test_outbound_headers_keep_repeated_values_in_order() {
        let mut inbound = HeaderMap::new();
        inbound.append("cookie", HeaderValue::from_static("a=1"));
        inbound.append("cookie", HeaderValue::from_static("b=2"));

        let url = Url::parse("https://www.wikidot.com/").unwrap();
        let headers = outbound_headers(&inbound, "www.wikidot.com", &url).unwrap();

        let cookies: Vec<_> = headers.get_all("cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_outbound_headers_drop_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        inbound.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let url = Url::parse("https://www.wikidot.com/").unwrap();
        let headers = outbound_headers(&inbound, "www.wikidot.com", &url).unwrap();

        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(TRANSFER_ENCODING).is_none());
    }
}
