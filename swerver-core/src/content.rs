//! Content delivery from a seekable source.
//!
//! Handles conditional requests (RFC 7232), single- and multi-range
//! responses (RFC 7233), MIME type inference with content sniffing, and
//! `HEAD` equivalence. The caller supplies an open file, the modification
//! time and a name used only for type inference.

use std::io::SeekFrom;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hyper::{HeaderMap, Method, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::body::{self, BodySender, ServeBody, CHUNK_SIZE};
use crate::conditional::{check_preconditions, is_zero_time, Preconditions};
use crate::error::{Result, ServeError};
use crate::headers;
use crate::multipart;
use crate::range::{parse_range, sum_ranges_size, HttpRange, RangeError};

/// The sniffing step uses at most this many bytes to make its decision.
const SNIFF_LEN: usize = 512;

/// Serves `content` for the given request, honoring preconditions and byte
/// ranges. `name` is used only for MIME type inference; `modtime` is
/// ignored when zero or the Unix epoch.
pub async fn serve_content(
    method: &Method,
    req_headers: &HeaderMap,
    name: &str,
    modtime: Option<SystemTime>,
    mut content: File,
) -> Result<Response<ServeBody>> {
    // One size-probing seek pair, before anything else may fail.
    let size = content
        .seek(SeekFrom::End(0))
        .await
        .map_err(|err| ServeError::SeekerError(err.to_string()))?;
    content
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|err| ServeError::SeekerError(err.to_string()))?;

    let etag = file_etag(modtime, size);
    let last_modified = modtime
        .filter(|&t| !is_zero_time(Some(t)))
        .map(httpdate::fmt_http_date);

    let range_honored =
        match check_preconditions(method, req_headers, Some(&etag), modtime) {
            Preconditions::PreconditionFailed => {
                debug!(%etag, "precondition failed");
                return precondition_response(StatusCode::PRECONDITION_FAILED, &etag, None);
            }
            Preconditions::NotModified => {
                debug!(%etag, "not modified");
                // RFC 7232 §4.1: with an ETag present, Last-Modified is
                // elided; Content-Type and Content-Length are never sent.
                return precondition_response(StatusCode::NOT_MODIFIED, &etag, None);
            }
            Preconditions::Proceed { range_honored } => range_honored,
        };

    let content_type = match infer_content_type(name) {
        Some(content_type) => content_type,
        None => sniff_content_type(&mut content).await?,
    };

    let ranges = if range_honored {
        match req_headers
            .get(headers::RANGE)
            .and_then(|value| value.to_str().ok())
        {
            Some(header) => match parse_range(header, size) {
                Ok(ranges) if sum_ranges_size(&ranges) > size => {
                    // Ranges covering more than the content itself are
                    // probably an attack or a confused client; ignore them.
                    debug!(header, "ignoring range set larger than content");
                    Vec::new()
                }
                Ok(ranges) => ranges,
                Err(RangeError::Invalid) | Err(RangeError::NoOverlap) => {
                    return range_not_satisfiable(size, &etag, last_modified.as_deref());
                }
            },
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let mut builder = Response::builder()
        .header(headers::ACCEPT_RANGES, "bytes")
        .header(headers::ETAG, &etag);
    if let Some(last_modified) = &last_modified {
        builder = builder.header(headers::LAST_MODIFIED, last_modified);
    }

    let head = method == Method::HEAD;

    let response = match ranges.len() {
        0 => {
            let builder = builder
                .status(StatusCode::OK)
                .header(headers::CONTENT_TYPE, &content_type)
                .header(headers::CONTENT_LENGTH, size);
            let body = if head {
                body::empty()
            } else {
                stream_body(content, vec![HttpRange { start: 0, length: size }], None)
            };
            builder.body(body)
        }
        1 => {
            // RFC 7233 §4.1: a single-range response carries a
            // Content-Range header and the bytes of that range alone.
            let range = ranges[0];
            let builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(headers::CONTENT_TYPE, &content_type)
                .header(headers::CONTENT_RANGE, range.content_range(size))
                .header(headers::CONTENT_LENGTH, range.length);
            let body = if head {
                body::empty()
            } else {
                stream_body(content, vec![range], None)
            };
            builder.body(body)
        }
        _ => {
            let boundary = multipart::random_boundary();
            let send_size = multipart::encoded_size(&ranges, &boundary, &content_type, size);
            let builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(headers::CONTENT_TYPE, multipart::content_type(&boundary))
                .header(headers::CONTENT_LENGTH, send_size);
            let body = if head {
                body::empty()
            } else {
                let framing = Framing {
                    boundary,
                    content_type: content_type.clone(),
                    size,
                };
                stream_body(content, ranges, Some(framing))
            };
            builder.body(body)
        }
    };

    response.map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
}

/// Strong ETag derived from modification time and size.
fn file_etag(modtime: Option<SystemTime>, size: u64) -> String {
    let seconds = modtime
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    format!("\"{seconds:x}-{size:x}\"")
}

fn precondition_response(
    status: StatusCode,
    etag: &str,
    last_modified: Option<&str>,
) -> Result<Response<ServeBody>> {
    let mut builder = Response::builder()
        .status(status)
        .header(headers::ETAG, etag);
    if let Some(last_modified) = last_modified {
        builder = builder.header(headers::LAST_MODIFIED, last_modified);
    }
    builder
        .body(body::empty())
        .map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
}

fn range_not_satisfiable(
    size: u64,
    etag: &str,
    last_modified: Option<&str>,
) -> Result<Response<ServeBody>> {
    let mut builder = Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(headers::CONTENT_RANGE, format!("bytes */{size}"))
        .header(headers::ETAG, etag);
    if let Some(last_modified) = last_modified {
        builder = builder.header(headers::LAST_MODIFIED, last_modified);
    }
    builder
        .body(body::empty())
        .map_err(|err| ServeError::UpstreamError(format!("response build: {err}")))
}

/// Type inference from the file extension. Text types are served with an
/// explicit UTF-8 charset.
fn infer_content_type(name: &str) -> Option<String> {
    let mime = mime_guess::from_path(name).first()?;
    let mime = mime.as_ref();
    if mime.starts_with("text/") && !mime.contains("charset") {
        Some(format!("{mime}; charset=utf-8"))
    } else {
        Some(mime.to_string())
    }
}

/// Reads up to 512 bytes to decide between text and binary (plus a few
/// well-known signatures), then seeks back to the origin.
async fn sniff_content_type(content: &mut File) -> Result<String> {
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0usize;
    loop {
        let n = content
            .read(&mut buf[filled..])
            .await
            .map_err(ServeError::Io)?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }

    content
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|err| ServeError::SeekerError(err.to_string()))?;

    Ok(detect_content_type(&buf[..filled]).to_string())
}

fn detect_content_type(data: &[u8]) -> &'static str {
    if data.is_empty() {
        return "text/plain; charset=utf-8";
    }

    let trimmed = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|pos| &data[pos..])
        .unwrap_or(&[]);
    for tag in [&b"<!DOCTYPE HTML"[..], b"<HTML", b"<HEAD", b"<BODY"] {
        if trimmed.len() >= tag.len() && trimmed[..tag.len()].eq_ignore_ascii_case(tag) {
            return "text/html; charset=utf-8";
        }
    }

    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return "image/jpeg";
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if data.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    if data.starts_with(b"\x1f\x8b") {
        return "application/x-gzip";
    }

    let binary = data
        .iter()
        .any(|&b| b < 0x09 || (0x0e..0x20).contains(&b) && b != 0x1b || b == 0x7f);
    if !binary && std::str::from_utf8(data).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

struct Framing {
    boundary: String,
    content_type: String,
    size: u64,
}

/// Streams the requested ranges through a producer task. With framing the
/// parts are wrapped in multipart headers and a closing delimiter.
fn stream_body(file: File, ranges: Vec<HttpRange>, framing: Option<Framing>) -> ServeBody {
    let (tx, body) = body::channel();
    tokio::spawn(stream_ranges(file, ranges, framing, tx));
    body
}

async fn stream_ranges(
    mut file: File,
    ranges: Vec<HttpRange>,
    framing: Option<Framing>,
    tx: BodySender,
) {
    for (index, range) in ranges.iter().enumerate() {
        if let Some(framing) = &framing {
            let header = multipart::part_header(
                &framing.boundary,
                index == 0,
                range,
                &framing.content_type,
                framing.size,
            );
            if tx.send(Ok(Bytes::from(header))).await.is_err() {
                // Client went away; stop producing.
                return;
            }
        }

        if let Err(err) = file.seek(SeekFrom::Start(range.start)).await {
            let _ = tx.send(Err(err)).await;
            return;
        }

        let mut remaining = range.length;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let mut buf = vec![0u8; want];
            match file.read(&mut buf).await {
                Ok(0) => return,
                Ok(n) => {
                    buf.truncate(n);
                    remaining -= n as u64;
                    if tx.send(Ok(Bytes::from(buf))).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    }

    if let Some(framing) = &framing {
        let _ = tx.send(Ok(Bytes::from(multipart::trailer(&framing.boundary)))).await;
    }
}
