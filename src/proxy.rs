//! Proxy server implementation
//! Accepts requests for proxy hostnames, forwards them to the matching
//! origin and rewrites origin references in the response

use crate::assembler::{assemble, full_body};
use crate::classifier::{Classification, RequestClassifier, DEFAULT_REDIRECT_LOCATION};
use crate::error::ProxyError;
use crate::fetcher::UpstreamFetcher;
use crate::normalizer::normalize_path;
use crate::registry::DomainRegistry;
use crate::rewriter::ContentRewriter;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UPSTREAM_SCHEME: &str = "https";

/// Proxy server configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub http_port: u16,
    /// Bound on the whole origin round trip, body included
    pub upstream_timeout: Duration,
    /// Scheme used towards origins
    pub upstream_scheme: String,
    /// Target of the reserved-path redirect
    pub redirect_location: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            upstream_scheme: DEFAULT_UPSTREAM_SCHEME.to_string(),
            redirect_location: DEFAULT_REDIRECT_LOCATION.to_string(),
        }
    }
}

/// Proxy server
pub struct ProxyServer {
    config: ProxyConfig,
    registry: Arc<DomainRegistry>,
    classifier: RequestClassifier,
    rewriter: ContentRewriter,
    fetcher: UpstreamFetcher,
}

impl ProxyServer {
    /// Create a new proxy server over a fixed domain table
    pub fn new(config: ProxyConfig, registry: Arc<DomainRegistry>) -> Result<Self> {
        let fetcher =
            UpstreamFetcher::new(config.upstream_timeout, config.upstream_scheme.clone())?;
        let classifier = RequestClassifier::new(config.redirect_location.clone());
        let rewriter = ContentRewriter::new(&registry);

        Ok(Self {
            config,
            registry,
            classifier,
            rewriter,
            fetcher,
        })
    }

    /// Start the proxy server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.http_port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Proxy server listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { server.handle_request(req, remote_addr).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle incoming request
    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            host = %Self::request_host(&req),
            path = %req.uri().path(),
        );

        async move {
            debug!("{} {} from {}", req.method(), req.uri(), remote_addr);
            match self.process_request(req).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    match &e {
                        ProxyError::DomainNotConfigured => warn!("{}", e),
                        _ => error!("Request failed: {}", e),
                    }
                    Ok(Self::error_response(e.status(), &e.to_string()))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the request through classification, fetch, rewrite and assembly
    async fn process_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError> {
        let current_hostname = Self::request_host(&req);
        let path = req.uri().path().to_string();

        let (target_host, host_prefix) =
            match self.classifier.classify(&self.registry, &current_hostname, &path) {
                Classification::Redirect(location) => {
                    debug!("Reserved path {}, redirecting to {}", path, location);
                    return Ok(Self::redirect_response(location));
                }
                Classification::NotConfigured => return Err(ProxyError::DomainNotConfigured),
                Classification::Proceed {
                    target_host,
                    prefix,
                } => (target_host.to_string(), prefix.to_string()),
            };

        let normalized_path = normalize_path(&path);
        if normalized_path != path {
            debug!("Normalized path {} -> {}", path, normalized_path);
        }

        let url = self
            .fetcher
            .target_url(&target_host, &normalized_path, req.uri().query())?;

        let (parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| {
                ProxyError::RequestConstruction(format!("failed to read request body: {}", e))
            })?
            .to_bytes();

        let upstream = self
            .fetcher
            .fetch(parts.method, &parts.headers, body_bytes, &target_host, url)
            .await?;

        let rewritten = self.rewriter.rewrite(
            upstream.body.clone(),
            upstream.content_type(),
            &host_prefix,
            &current_hostname,
        );

        info!(
            "{} -> {} {} ({} bytes)",
            current_hostname,
            target_host,
            upstream.status,
            rewritten.len()
        );

        Ok(assemble(upstream.status, &upstream.headers, rewritten))
    }

    /// Inbound hostname as sent by the client, port included
    fn request_host<T>(req: &Request<T>) -> String {
        req.headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.to_string())
            .or_else(|| req.uri().authority().map(|a| a.to_string()))
            .unwrap_or_default()
    }

    /// Create error response
    fn error_response(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut response = Response::new(full_body(Bytes::from(message.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Create redirect response
    fn redirect_response(location: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut response = Response::new(full_body(Bytes::new()));
        *response.status_mut() = StatusCode::FOUND;
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers_mut().insert(LOCATION, value);
        }
        response
    }
}
