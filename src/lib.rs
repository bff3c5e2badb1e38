//! httpsproxy - A single-target HTTPS reverse proxy
//!
//! Provides:
//! - Trust store construction from platform roots plus extra PEM certificates
//! - An outbound client that never follows redirects
//! - Request forwarding with a request header allow-list
//! - `Location` rewriting from the upstream host to the proxy's public URL

pub mod certificate;
pub mod client;
pub mod config;
pub mod error;
pub mod proxy;
pub mod target;

pub use certificate::{build_trust_store, BundledRoots, CertPool, NativeRoots, RootsProvider, TrustStore};
pub use client::{create_client, DEFAULT_TIMEOUT};
pub use config::load_pem_files;
pub use error::{ProxyError, TargetError};
pub use proxy::{ProxyConfig, ProxyServer, HEADERS_TO_COPY};
pub use target::{rewrite_location, SelfTarget, UpstreamTarget};
