//! Outbound HTTP client used to reach the upstream

use crate::certificate::TrustStore;
use crate::error::ProxyError;
use reqwest::{redirect, Client};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for a full upstream exchange, body included
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the client shared by all forwarded requests.
///
/// TLS trusts only the roots in `trust_store`. Redirects are never followed,
/// so a 3xx from upstream reaches the handler with its `Location` intact.
pub fn create_client(trust_store: &TrustStore, timeout: Duration) -> Result<Client, ProxyError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(trust_store.root_store())
        .with_no_client_auth();

    Client::builder()
        .use_preconfigured_tls(tls)
        .redirect(redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(ProxyError::Client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{build_trust_store, BundledRoots};

    #[test]
    fn test_create_client() {
        let pool = build_trust_store::<_, String>(&BundledRoots, &[]);
        assert!(create_client(&pool.trust_store, DEFAULT_TIMEOUT).is_ok());
    }

    #[test]
    fn test_create_client_after_failed_cert() {
        let pool = build_trust_store(&BundledRoots, &["not a certificate"]);
        assert_eq!(pool.failed_certs.len(), 1);
        assert!(create_client(&pool.trust_store, Duration::from_millis(500)).is_ok());
    }
}
