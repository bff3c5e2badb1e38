//! Trust store construction for upstream TLS connections
//! Combines a platform root set with extra PEM certificates

use crate::error::ProxyError;
use rustls::RootCertStore;
use std::sync::Arc;

/// Source of the platform's default trusted roots
pub trait RootsProvider {
    fn load(&self) -> Result<RootCertStore, ProxyError>;
}

/// Roots from the operating system's certificate store
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRoots;

impl RootsProvider for NativeRoots {
    fn load(&self) -> Result<RootCertStore, ProxyError> {
        let result = rustls_native_certs::load_native_certs();

        // Partial failures are tolerated as long as some roots were found
        if result.certs.is_empty() && !result.errors.is_empty() {
            let message = result
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProxyError::SystemRoots(message));
        }

        let mut store = RootCertStore::empty();
        store.add_parsable_certificates(result.certs);
        Ok(store)
    }
}

/// Mozilla roots compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledRoots;

impl RootsProvider for BundledRoots {
    fn load(&self) -> Result<RootCertStore, ProxyError> {
        Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        })
    }
}

/// Immutable set of certificate authorities trusted for upstream connections
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
}

impl TrustStore {
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// DER-encoded subject of every trusted root, in insertion order
    pub fn subjects(&self) -> Vec<Vec<u8>> {
        self.roots
            .roots
            .iter()
            .map(|anchor| anchor.subject.as_ref().to_vec())
            .collect()
    }

    pub(crate) fn root_store(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }
}

/// Result of building a trust store
#[derive(Debug)]
pub struct CertPool {
    pub trust_store: TrustStore,
    /// Supplied PEM strings that could not be added, verbatim and in input order
    pub failed_certs: Vec<String>,
    /// Set when the platform roots were unavailable and an empty base was used
    pub system_roots_error: Option<ProxyError>,
}

/// Build a trust store from the provider's roots plus `pem_certs`.
///
/// Never fails: a provider error is reported in `system_roots_error` and
/// the store then holds only the supplied certificates that parsed.
pub fn build_trust_store<P, S>(provider: &P, pem_certs: &[S]) -> CertPool
where
    P: RootsProvider + ?Sized,
    S: AsRef<str>,
{
    let (mut store, system_roots_error) = match provider.load() {
        Ok(store) => (store, None),
        Err(e) => (RootCertStore::empty(), Some(e)),
    };

    let failed_certs = pem_certs
        .iter()
        .map(AsRef::as_ref)
        .filter(|pem| !append_pem(&mut store, pem))
        .map(str::to_string)
        .collect();

    CertPool {
        trust_store: TrustStore {
            roots: Arc::new(store),
        },
        failed_certs,
        system_roots_error,
    }
}

/// Add every certificate block in `pem` to the store.
/// Returns true if at least one certificate was added.
fn append_pem(store: &mut RootCertStore, pem: &str) -> bool {
    let mut reader = pem.as_bytes();
    let mut added = false;
    for cert in rustls_pemfile::certs(&mut reader).flatten() {
        if store.add(cert).is_ok() {
            added = true;
        }
    }
    added
}
