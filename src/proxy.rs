//! Proxy server implementation
//! Forwards every request to a single upstream and rewrites its redirects

use crate::error::{error_chain, ProxyError};
use crate::target::{rewrite_location, SelfTarget, UpstreamTarget};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Body;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, LOCATION, TRANSFER_ENCODING,
    USER_AGENT,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use reqwest::Client;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Request headers forwarded to the upstream; everything else is dropped
pub const HEADERS_TO_COPY: [HeaderName; 2] = [CONTENT_TYPE, USER_AGENT];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Proxy server configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub http_port: u16,
    /// Path answered locally with `200 OK` instead of being forwarded
    pub health_path: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            health_path: None,
        }
    }
}

/// Proxy server
pub struct ProxyServer {
    config: ProxyConfig,
    client: Client,
    upstream: UpstreamTarget,
    self_target: Option<SelfTarget>,
    headers_to_copy: Vec<HeaderName>,
}

impl ProxyServer {
    /// Create a new proxy server.
    /// Redirects are rewritten to `self_target` only when it is set.
    pub fn new(
        config: ProxyConfig,
        client: Client,
        upstream: UpstreamTarget,
        self_target: Option<SelfTarget>,
    ) -> Self {
        Self {
            config,
            client,
            upstream,
            self_target,
            headers_to_copy: HEADERS_TO_COPY.to_vec(),
        }
    }

    /// Replace the request header allow-list
    pub fn with_headers_to_copy(mut self, headers: Vec<HeaderName>) -> Self {
        self.headers_to_copy = headers;
        self
    }

    /// Start the proxy server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.http_port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            "Forwarding to {}://{}",
            self.upstream.scheme(),
            self.upstream.host()
        );

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    // Usually transient (e.g. out of file descriptors)
                    error!("Failed to accept connection: {}", e);
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
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
            .title_case_headers(true)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { Ok::<_, Infallible>(server.handle(req, remote_addr).await) }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Forward one inbound request and produce the response for the caller.
    ///
    /// Any failure becomes a 502 whose body is the error text.
    pub async fn handle<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Response<BoxBody<Bytes, hyper::Error>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if method == Method::GET && self.config.health_path.as_deref() == Some(path.as_str()) {
            return Self::text_response(StatusCode::OK, "OK");
        }

        match self.forward(req, remote_addr).await {
            Ok(response) => {
                debug!("{} {} from {} -> {}", method, path, remote_addr, response.status());
                response
            }
            Err(e) => {
                let message = error_chain(&e);
                error!("{} {} from {} failed: {}", method, path, remote_addr, message);
                Self::text_response(StatusCode::BAD_GATEWAY, &message)
            }
        }
    }

    async fn forward<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ProxyError>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        // Only path and query of the inbound URI are used
        let url = self.upstream.url_for(req.uri().path(), req.uri().query())?;

        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::InboundBody(e.into()))?
            .to_bytes();

        let mut builder = self
            .client
            .request(parts.method, url)
            .header(X_FORWARDED_FOR, remote_addr.to_string())
            .headers(copy_request_headers(&parts.headers, &self.headers_to_copy));
        if !body.is_empty() {
            builder = builder.body(body);
        }
        let outbound = builder.build().map_err(ProxyError::BuildRequest)?;

        let upstream_response = self.client.execute(outbound).await?;
        let status = upstream_response.status();
        let headers = upstream_response.headers().clone();
        let body = upstream_response.bytes().await?;

        let mut response = Response::builder().status(status);
        for (name, value) in headers.iter() {
            if is_connection_header(name) {
                continue;
            }
            let value = if name == LOCATION {
                self.rewrite_location_value(value)
            } else {
                value.clone()
            };
            response = response.header(name.clone(), value);
        }

        Ok(response.body(Self::full_body(body))?)
    }

    fn rewrite_location_value(&self, value: &HeaderValue) -> HeaderValue {
        let Ok(location) = value.to_str() else {
            return value.clone();
        };
        let rewritten = rewrite_location(location, &self.upstream, self.self_target.as_ref());
        HeaderValue::from_str(&rewritten).unwrap_or_else(|_| value.clone())
    }

    /// Create plain text response
    fn text_response(status: StatusCode, body: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let mut response = Response::new(Self::full_body(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
        Full::new(bytes).map_err(|never| match never {}).boxed()
    }
}

/// Copy the allow-listed headers that carry a non-empty value
fn copy_request_headers(from: &HeaderMap, names: &[HeaderName]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in names {
        if let Some(value) = from.get(name) {
            if !value.is_empty() {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
    headers
}

/// Framing headers of the upstream connection; the buffered body is re-framed
fn is_connection_header(name: &HeaderName) -> bool {
    name == CONNECTION || name == TRANSFER_ENCODING || name.as_str() == "keep-alive"
}
