//! Reverse proxying to configured upstreams.
//!
//! A proxy rule forwards matching requests to an upstream URL produced
//! from the rule's destination template. Hop-by-hop headers are dropped in
//! both directions and the client address is appended to
//! `X-Forwarded-For`. Upstream bodies stream back through a producer task
//! that stops when the client disconnects.

use std::net::SocketAddr;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Response, StatusCode};
use once_cell::sync::Lazy;
use tracing::{debug, warn};
use url::Url;

use crate::body::{self, ServeBody};
use crate::config::ProxyRule;
use crate::error::{Result, ServeError};
use crate::headers;
use crate::rules::source_matches;
use crate::template::expand_destination;

/// Shared HTTP client for connection pooling and reuse.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(32)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// A compiled proxy route.
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    source: String,
    destination: String,
}

impl ProxyHandler {
    /// Compiles a proxy rule, validating that the destination is an
    /// absolute `http` or `https` URL.
    pub fn new(rule: &ProxyRule) -> Result<Self> {
        let url = Url::parse(&rule.destination).map_err(|err| {
            ServeError::ConfigError(format!(
                "proxy destination {:?}: {err}",
                rule.destination
            ))
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ServeError::ConfigError(format!(
                    "proxy destination {:?}: only http and https are supported, got {other:?}",
                    rule.destination
                )))
            }
        }

        Ok(Self {
            source: rule.source.clone(),
            destination: rule.destination.clone(),
        })
    }

    /// The configured source pattern.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when this route swallows every request.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.source.as_str(), "/*" | "/**" | "**")
    }

    /// Resolves the upstream URL for `path`, or `None` when the source
    /// does not match.
    pub fn upstream_url(&self, path: &str) -> Option<String> {
        let captures = source_matches(&self.source, path, true)?;
        expand_destination(&self.destination, &captures).ok()
    }

    /// Forwards the request to the upstream and maps the response back.
    ///
    /// Any upstream failure collapses to [`ServeError::UpstreamError`]; the
    /// caller renders it as a plain 500 without upstream diagnostics.
    pub async fn forward(
        &self,
        method: Method,
        req_headers: &HeaderMap,
        body: Bytes,
        remote_addr: SocketAddr,
        upstream_url: &str,
        query: Option<&str>,
    ) -> Result<Response<ServeBody>> {
        let mut url = upstream_url.to_string();
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        debug!(%url, "proxying request");

        let mut request = HTTP_CLIENT.request(
            reqwest::Method::from_bytes(method.as_str().as_bytes())
                .map_err(|err| ServeError::UpstreamError(format!("method: {err}")))?,
            &url,
        );

        for (name, value) in req_headers {
            let name = name.as_str();
            if headers::is_hop_by_hop(name) || name == headers::HOST {
                continue;
            }
            if name == headers::X_FORWARDED_FOR {
                // Folded below together with the client address.
                continue;
            }
            if let Ok(value) = value.to_str() {
                request = request.header(name, value);
            }
        }

        // Retain prior X-Forwarded-For entries as a comma+space separated
        // list with the immediate client appended.
        let client_ip = remote_addr.ip().to_string();
        let forwarded = match req_headers
            .get(headers::X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
        {
            Some(prior) => format!("{prior}, {client_ip}"),
            None => client_ip,
        };
        request = request.header(headers::X_FORWARDED_FOR, forwarded);

        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream = request.send().await.map_err(|err| {
            warn!("upstream request failed: {err}");
            ServeError::UpstreamError(err.to_string())
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .map_err(|err| ServeError::UpstreamError(format!("status: {err}")))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in upstream.headers() {
            if headers::is_hop_by_hop(name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let (tx, stream) = body::channel();
        tokio::spawn(async move {
            let mut upstream = upstream;
            loop {
                match upstream.chunk().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Client went away; drop the upstream body.
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        let _ = tx
                            .send(Err(std::io::Error::other(err.to_string())))
                            .await;
                        return;
                    }
                }
            }
        });

        builder
            .body(stream)
            .map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
    }
}
