//! Upstream and public addresses of the proxy, and `Location` rewriting

use crate::error::TargetError;
use tracing::debug;
use url::Url;

/// The single backend every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: String,
    host: String,
}

/// The externally visible address of the proxy itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTarget {
    scheme: String,
    host: String,
}

impl UpstreamTarget {
    /// Parse a target such as `https://blynk-cloud.com`.
    /// Only the scheme and authority are kept.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let (scheme, host) = parse_origin(input)?;
        Ok(Self { scheme, host })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build the upstream URL for an inbound path and raw query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        Url::parse(&url)
    }
}

impl SelfTarget {
    /// Parse the public URL of the proxy, e.g. `https://blynk-proxy.appspot.com`
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let (scheme, host) = parse_origin(input)?;
        Ok(Self { scheme, host })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

fn parse_origin(input: &str) -> Result<(String, String), TargetError> {
    let url = Url::parse(input).map_err(|source| TargetError::Parse {
        url: input.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(TargetError::UnsupportedScheme {
                url: input.to_string(),
                scheme: scheme.to_string(),
            })
        }
    }

    Ok((url.scheme().to_string(), authority(&url)))
}

/// `host[:port]` of a parsed http(s) URL. Default ports are already dropped by the parser.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Rewrite a `Location` value pointing at the upstream so it points at the proxy.
///
/// Returns the input unchanged when no public URL is configured, when the
/// value does not parse as a URL with a host, or when it names another host.
/// The host comparison uses the `host[:port]` text exactly as written.
/// Path, query and fragment are carried over byte for byte.
pub fn rewrite_location(
    location: &str,
    upstream: &UpstreamTarget,
    self_target: Option<&SelfTarget>,
) -> String {
    let Some(self_target) = self_target else {
        return location.to_string();
    };

    // Scheme-relative values take the upstream's scheme
    let (parse_input, rest) = match location.strip_prefix("//") {
        Some(rest) => (format!("{}:{}", upstream.scheme(), location), rest),
        None => match location.find("://") {
            Some(scheme_end) => (location.to_string(), &location[scheme_end + 3..]),
            None => return location.to_string(),
        },
    };

    if let Err(e) = Url::parse(&parse_input) {
        debug!("Not rewriting Location {:?}: {}", location, e);
        return location.to_string();
    }

    let authority_end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#' | '\\'))
        .unwrap_or(rest.len());
    // The parser reads a backslash as a path separator; the value is passed through instead
    if rest[authority_end..].starts_with('\\') {
        return location.to_string();
    }

    let raw_authority = &rest[..authority_end];
    let (userinfo, host) = match raw_authority.rfind('@') {
        Some(at) => raw_authority.split_at(at + 1),
        None => ("", raw_authority),
    };
    if host != upstream.host() {
        return location.to_string();
    }

    format!(
        "{}://{}{}{}",
        self_target.scheme(),
        userinfo,
        self_target.host(),
        &rest[authority_end..]
    )
}
