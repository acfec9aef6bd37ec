//! Response assembly
//! Turns the origin's status/headers and the rewritten body into the
//! response sent to the client

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_LENGTH,
};
use hyper::{Response, StatusCode};

/// Upstream headers invalidated by decompression and rewriting, plus
/// framing headers owned by our own connection
const DROPPED_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
];

/// Headers that would block the rewritten content or wipe client storage
const BLOCKING_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "clear-site-data",
];

pub const CACHE_DIRECTIVE: &str = "public, max-age=14400";

/// Build the client response for a proxied request
pub fn assemble(
    status: StatusCode,
    upstream_headers: &HeaderMap,
    body: Bytes,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut headers = HeaderMap::with_capacity(upstream_headers.len() + 4);

    for (name, value) in upstream_headers.iter() {
        if DROPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_DIRECTIVE));

    for name in BLOCKING_HEADERS {
        headers.remove(*name);
    }

    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Create full body
pub fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
    Full::new(bytes)
        .map_err(|never| match never {})
        .boxed()
}
