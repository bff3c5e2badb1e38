//! httpsproxy - Main entry point
//!
//! Forwards all traffic to one upstream host

use anyhow::{Context, Result};
use clap::Parser;
use httpsproxy::{
    build_trust_store, create_client, load_pem_files, BundledRoots, CertPool, NativeRoots,
    ProxyConfig, ProxyServer, SelfTarget, UpstreamTarget, DEFAULT_TIMEOUT,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// httpsproxy - A single-target HTTPS reverse proxy
#[derive(Parser, Debug)]
#[command(name = "httpsproxy")]
#[command(author = "httpsproxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "A single-target HTTPS reverse proxy")]
struct Args {
    /// HTTP port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Upstream to forward to, e.g. https://blynk-cloud.com
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: String,

    /// Public URL of this proxy; enables rewriting of upstream redirects
    #[arg(long, env = "SELF_URL")]
    self_url: Option<String>,

    /// Extra PEM certificate files to trust for the upstream
    #[arg(long, env = "EXTRA_CERTS", value_delimiter = ',')]
    extra_cert: Vec<PathBuf>,

    /// Upstream timeout in seconds
    #[arg(long, env = "TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Use the compiled-in root certificates instead of the system store
    #[arg(long, env = "BUNDLED_ROOTS", default_value = "false")]
    bundled_roots: bool,

    /// Path answered locally for health checks
    #[arg(long, env = "HEALTH_PATH")]
    health_path: Option<String>,

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

    info!("Starting httpsproxy v1.0.0");

    let upstream = UpstreamTarget::parse(&args.upstream_url).context("Invalid upstream URL")?;
    let self_target = args
        .self_url
        .as_deref()
        .map(SelfTarget::parse)
        .transpose()
        .context("Invalid self URL")?;

    match &self_target {
        Some(target) => info!(
            "Rewriting redirects to {}://{}",
            target.scheme(),
            target.host()
        ),
        None => info!("No self URL set, redirects are passed through"),
    }

    let pem_certs = load_pem_files(&args.extra_cert)?;
    let CertPool {
        trust_store,
        failed_certs,
        system_roots_error,
    } = if args.bundled_roots {
        build_trust_store(&BundledRoots, &pem_certs)
    } else {
        build_trust_store(&NativeRoots, &pem_certs)
    };

    if let Some(e) = system_roots_error {
        warn!("Cannot get system cert pool: {}", e);
    }
    for cert in &failed_certs {
        warn!("Failed to add certificate to pool:\n{}", cert);
    }
    info!("Trust store holds {} certificates", trust_store.len());

    let client = create_client(&trust_store, Duration::from_secs(args.timeout_secs))
        .context("Failed to create upstream client")?;

    let config = ProxyConfig {
        http_port: args.port,
        health_path: args.health_path,
    };

    let server = Arc::new(ProxyServer::new(config, client, upstream, self_target));

    server.run().await
}
