//! Error types for trust store construction, configuration and forwarding

use std::error::Error as StdError;
use thiserror::Error;

/// Errors raised while building the trust store, the outbound client,
/// or while forwarding a single request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("cannot load system cert pool: {0}")]
    SystemRoots(String),

    #[error("failed to configure TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to build outbound client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to read request body: {0}")]
    InboundBody(#[source] Box<dyn StdError + Send + Sync>),

    #[error("failed to build upstream request: {0}")]
    BuildRequest(#[source] reqwest::Error),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to build response: {0}")]
    BuildResponse(#[from] hyper::http::Error),
}

/// Errors raised while parsing the upstream or public URL.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("cannot parse URL {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL {url:?} has unsupported scheme {scheme:?}")]
    UnsupportedScheme { url: String, scheme: String },
}

/// Render an error together with all of its causes, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
