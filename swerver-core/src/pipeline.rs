//! The request-handling pipeline.
//!
//! Maps an incoming URL to an action: proxy, redirect, directory listing,
//! file response or error. Resolution order: boundary check, clean-URL
//! applicability, redirects (including the trailing-slash rule), rewrites,
//! companion lookup, directory handling, symlink policy, content serving.
//! Header overrides apply to the finished response.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::body::{self, ServeBody};
use crate::config::ServeConfig;
use crate::content::serve_content;
use crate::error::{Result, ServeError};
use crate::headers;
use crate::listing::{render_directory, ListOutcome};
use crate::path::{normalize, path_is_inside};
use crate::proxy::ProxyHandler;
use crate::rules::{applicable, apply_rewrites, possible_paths, should_redirect, source_matches};
use crate::templates;

/// The request handler. Stateless across requests; one instance serves any
/// number of connections concurrently.
#[derive(Debug)]
pub struct Handler {
    config: Arc<ServeConfig>,
    proxies: Vec<ProxyHandler>,
}

impl Handler {
    /// Compiles the proxy routes and validates the configuration.
    pub fn new(config: Arc<ServeConfig>) -> Result<Self> {
        config.validate()?;

        let proxies = config
            .proxy
            .iter()
            .map(ProxyHandler::new)
            .collect::<Result<Vec<_>>>()?;

        if proxies.iter().any(ProxyHandler::is_catch_all) {
            debug!("catch-all proxy route configured; file serving is unreachable");
        }

        Ok(Self { config, proxies })
    }

    /// Read-only access to the handler's configuration.
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Handles one request, producing exactly one response.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Response<ServeBody> {
        let (parts, body) = req.into_parts();

        let decoded_path = match percent_decode_str(parts.uri.path()).decode_utf8() {
            Ok(path) => path.into_owned(),
            Err(_) => {
                let err = ServeError::BadRequest("undecodable percent-encoding".into());
                return self.finish(&parts, self.error_response(&parts.headers, err).await);
            }
        };
        debug!(method = %parts.method, path = %decoded_path, "request");

        // Proxy routes intercept before the file pipeline, for any method.
        let matched = self
            .proxies
            .iter()
            .find_map(|proxy| proxy.upstream_url(&decoded_path).map(|url| (proxy, url)));
        if let Some((proxy, upstream_url)) = matched {
            let response = self
                .forward_upstream(proxy, &parts, body, remote_addr, &upstream_url)
                .await;
            return self.finish(&parts, response);
        }
        drop(body);

        if parts.method != Method::GET && parts.method != Method::HEAD {
            warn!("denying method {}", parts.method);
            let response = plain_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            );
            return self.finish(&parts, response);
        }

        let response = match self.respond(&parts, &decoded_path).await {
            Ok(response) => response,
            Err(err) => self.error_response(&parts.headers, err).await,
        };
        self.finish(&parts, response)
    }

    async fn forward_upstream(
        &self,
        proxy: &ProxyHandler,
        parts: &Parts,
        body: Incoming,
        remote_addr: SocketAddr,
        upstream_url: &str,
    ) -> Response<ServeBody> {
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                let err = ServeError::BadRequest(format!("request body: {err}"));
                return self.error_response(&parts.headers, err).await;
            }
        };

        match proxy
            .forward(
                parts.method.clone(),
                &parts.headers,
                bytes,
                remote_addr,
                upstream_url,
                parts.uri.query(),
            )
            .await
        {
            Ok(response) => response,
            Err(err) => self.error_response(&parts.headers, err).await,
        }
    }

    // The file pipeline proper. Every early return is a complete response;
    // every error maps to exactly one status code.
    async fn respond(&self, parts: &Parts, decoded_path: &str) -> Result<Response<ServeBody>> {
        let config = &self.config;

        let mut absolute = normalize(&config.public.join(decoded_path.trim_start_matches('/')));
        if !path_is_inside(&absolute, &config.public) {
            return Err(ServeError::BadRequest(format!(
                "path {decoded_path:?} escapes the public directory"
            )));
        }

        let clean_url = applicable(decoded_path, &config.clean_urls);

        if let Some(redirect) = should_redirect(decoded_path, clean_url, config) {
            debug!(target = %redirect.target, status = redirect.status, "redirecting");
            return redirect_response(&redirect.target, redirect.status, parts.uri.query());
        }

        // Most files have extensions, so stat extensioned paths right away;
        // extension-less paths usually need the companion lookup below and
        // get their stat later.
        let mut stats = if std::path::Path::new(decoded_path).extension().is_some() {
            self.lstat(&absolute).await?
        } else {
            None
        };

        let rewritten = apply_rewrites(decoded_path, &config.rewrites);

        if stats.is_none() && (clean_url || rewritten.is_some()) {
            let candidates = match &rewritten {
                Some(path) if !path.is_empty() => vec![path.clone()],
                _ => possible_paths(decoded_path, ".html"),
            };

            for candidate in candidates {
                let candidate_abs =
                    normalize(&config.public.join(candidate.trim_start_matches('/')));
                if !path_is_inside(&candidate_abs, &config.public) {
                    continue;
                }
                if let Some(meta) = self.lstat(&candidate_abs).await? {
                    absolute = candidate_abs;
                    stats = Some(meta);
                    break;
                }
            }
        }

        if stats.is_none() {
            stats = self.lstat(&absolute).await?;
        }

        let is_dir = stats.as_ref().is_some_and(|meta| meta.is_dir());
        if is_dir {
            if !applicable(decoded_path, &config.directory_listing) {
                // Listing is disabled for this path; report not-found.
                stats = None;
            } else {
                match render_directory(config, decoded_path, &absolute).await? {
                    ListOutcome::SingleFile(path) => {
                        stats = self.lstat(&path).await?;
                        absolute = path;
                    }
                    ListOutcome::Listing(listing) => {
                        return listing_response(&parts.headers, &listing);
                    }
                }
            }
        }

        let is_symlink = stats
            .as_ref()
            .is_some_and(|meta| meta.file_type().is_symlink());

        // Two not-found scenarios: the path does not exist, or it is a
        // symlink while the symlinks option is disabled.
        if stats.is_none() || (is_symlink && !config.symlinks) {
            return Err(ServeError::NotFound(decoded_path.to_string()));
        }

        if is_symlink {
            let target = tokio::fs::read_link(&absolute).await?;
            absolute = if target.is_absolute() {
                target
            } else {
                // Relative link targets resolve against the link's parent.
                match absolute.parent() {
                    Some(parent) => normalize(&parent.join(target)),
                    None => target,
                }
            };
            stats = self.lstat(&absolute).await?;
            if stats.is_none() {
                return Err(ServeError::NotFound(decoded_path.to_string()));
            }
        }

        let file = tokio::fs::File::open(&absolute).await.map_err(ServeError::Io)?;
        let modtime = stats.and_then(|meta| meta.modified().ok());
        let name = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        serve_content(&parts.method, &parts.headers, &name, modtime, file).await
    }

    async fn lstat(&self, path: &std::path::Path) -> Result<Option<std::fs::Metadata>> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ServeError::Io(err)),
        }
    }

    /// Renders an error, preferring a `<status>.html` page from the public
    /// root, then JSON for clients accepting it, then the built-in page.
    async fn error_response(&self, req_headers: &HeaderMap, err: ServeError) -> Response<ServeBody> {
        if err.is_server_error() {
            warn!("request failed: {err}");
        } else {
            debug!("request rejected: {err}");
        }

        let status = err.status_code();

        let page = self.config.public.join(format!("{}.html", status.as_u16()));
        if let Ok(contents) = tokio::fs::read(&page).await {
            return Response::builder()
                .status(status)
                .header(headers::CONTENT_TYPE, "text/html; charset=utf-8")
                .header(headers::CONTENT_LENGTH, contents.len())
                .body(body::full(contents))
                .unwrap_or_else(|_| plain_response(status, "error"));
        }

        if accepts_json(req_headers) {
            let payload = templates::error_json(&err);
            return Response::builder()
                .status(status)
                .header(headers::CONTENT_TYPE, "application/json; charset=utf-8")
                .header(headers::CONTENT_LENGTH, payload.len())
                .body(body::full(payload))
                .unwrap_or_else(|_| plain_response(status, "error"));
        }

        let page = templates::error_html(status.as_u16(), &err);
        Response::builder()
            .status(status)
            .header(headers::CONTENT_TYPE, "text/html; charset=utf-8")
            .header(headers::CONTENT_LENGTH, page.len())
            .body(body::full(page))
            .unwrap_or_else(|_| plain_response(status, "error"))
    }

    // Post-serve stages shared by every response: header overrides and
    // HEAD body suppression.
    fn finish(&self, parts: &Parts, mut response: Response<ServeBody>) -> Response<ServeBody> {
        let decoded_path = percent_decode_str(parts.uri.path())
            .decode_utf8()
            .map(|path| path.into_owned())
            .unwrap_or_else(|_| parts.uri.path().to_string());

        for rule in &self.config.headers {
            if source_matches(&rule.source, &decoded_path, false).is_none() {
                continue;
            }
            for header in &rule.headers {
                let name = HeaderName::try_from(header.key.as_str());
                let value = HeaderValue::try_from(header.value.as_str());
                if let (Ok(name), Ok(value)) = (name, value) {
                    response.headers_mut().insert(name, value);
                } else {
                    warn!(key = %header.key, "skipping invalid header override");
                }
            }
        }

        if parts.method == Method::HEAD {
            let (head, _) = response.into_parts();
            response = Response::from_parts(head, body::empty());
        }

        response
    }
}

/// Reports whether the request prefers a JSON representation.
pub fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(headers::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("application/json"))
}

fn redirect_response(
    target: &str,
    status: u16,
    query: Option<&str>,
) -> Result<Response<ServeBody>> {
    let mut location = target.to_string();
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }

    let status = StatusCode::from_u16(status)
        .map_err(|err| ServeError::ConfigError(format!("redirect status: {err}")))?;

    Response::builder()
        .status(status)
        .header(headers::LOCATION, location)
        .header(headers::CONTENT_LENGTH, 0)
        .body(body::empty())
        .map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
}

fn listing_response(
    req_headers: &HeaderMap,
    listing: &crate::listing::DirectoryListing,
) -> Result<Response<ServeBody>> {
    let (content_type, payload) = if accepts_json(req_headers) {
        let payload = serde_json::to_string(listing)
            .map_err(|err| ServeError::UpstreamError(format!("listing encode: {err}")))?;
        ("application/json; charset=utf-8", payload)
    } else {
        ("text/html; charset=utf-8", templates::directory_html(listing))
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(headers::CONTENT_TYPE, content_type)
        .header(headers::CONTENT_LENGTH, payload.len())
        .body(body::full(payload))
        .map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
}

fn plain_response(status: StatusCode, message: &str) -> Response<ServeBody> {
    Response::builder()
        .status(status)
        .header(headers::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body::full(message.to_string()))
        .unwrap_or_else(|_| Response::new(body::full("Internal Server Error")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_json() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_json(&headers));

        headers.insert("accept", "text/html".parse().unwrap());
        assert!(!accepts_json(&headers));

        headers.insert("accept", "Application/JSON".parse().unwrap());
        assert!(accepts_json(&headers));

        headers.insert(
            "accept",
            "text/html, application/json;q=0.9".parse().unwrap(),
        );
        assert!(accepts_json(&headers));
    }

    #[test]
    fn test_redirect_response() {
        let response = redirect_response("/about", 307, None).unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/about"
        );

        let response = redirect_response("/about", 301, Some("a=1")).unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/about?a=1"
        );
    }

    #[test]
    fn test_invalid_redirect_status() {
        assert!(redirect_response("/x", 99, None).is_err());
    }
}
