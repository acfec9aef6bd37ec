//! MirrorProxy - Main entry point
//!
//! A domain-rewriting reverse proxy over a fixed domain table

use anyhow::Result;
use clap::Parser;
use mirrorproxy::{DomainRegistry, ProxyConfig, ProxyServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// MirrorProxy - A domain-rewriting reverse proxy
#[derive(Parser, Debug)]
#[command(name = "mirrorproxy")]
#[command(author = "MirrorProxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "A domain-rewriting reverse proxy")]
struct Args {
    /// HTTP port to listen on
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Upstream round-trip timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value = "30")]
    upstream_timeout: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting MirrorProxy v1.0.0");

    let registry = Arc::new(DomainRegistry::builtin());
    info!("Loaded {} domain mappings", registry.entries().len());
    for mapping in registry.entries() {
        debug!("  {} <- {}*", mapping.origin_host, mapping.proxy_prefix);
    }
    debug!(
        "  {} <- {}* (pass-through)",
        registry.pass_through_origin(),
        registry.pass_through_prefix()
    );

    let config = ProxyConfig {
        http_port: args.http_port,
        upstream_timeout: Duration::from_secs(args.upstream_timeout),
        ..ProxyConfig::default()
    };

    let server = Arc::new(ProxyServer::new(config, registry)?);

    info!("Make sure the proxy hostnames resolve to this server");

    server.run().await?;

    Ok(())
}
