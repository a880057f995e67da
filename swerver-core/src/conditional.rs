//! Conditional request evaluation (RFC 7232).
//!
//! Precondition headers are checked in the order RFC 7232 §6 prescribes:
//! `If-Match`, `If-Unmodified-Since`, `If-None-Match`, `If-Modified-Since`,
//! with `If-Range` gating the `Range` header afterwards.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hyper::{HeaderMap, Method};

use crate::headers;

/// The result of one precondition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    /// The header is absent or unusable; fall through.
    None,
    True,
    False,
}

/// What the precondition stage decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preconditions {
    /// Proceed with the request; honor the `Range` header if `range` is set.
    Proceed { range_honored: bool },
    /// Answer `304 Not Modified`.
    NotModified,
    /// Answer `412 Precondition Failed`.
    PreconditionFailed,
}

/// Scans a syntactically valid ETag at the start of `s`, returning it and
/// the remaining text. Returns `None` when no valid ETag is present.
/// See RFC 7232 §2.3.
pub fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    let start = if let Some(rest) = s.strip_prefix("W/") {
        s.len() - rest.len()
    } else {
        0
    };

    let bytes = s.as_bytes();
    if bytes.len() < start + 2 || bytes[start] != b'"' {
        return None;
    }

    for i in start + 1..bytes.len() {
        match bytes[i] {
            // Character values allowed in ETags.
            0x21 | 0x23..=0x7E | 0x80.. => {}
            b'"' => return Some((&s[..i + 1], &s[i + 1..])),
            _ => return None,
        }
    }
    None
}

/// Strong comparison: byte-equal and both strong (starting with `"`).
pub fn etag_strong_match(a: &str, b: &str) -> bool {
    a == b && a.starts_with('"')
}

/// Weak comparison: equal after stripping an optional `W/` prefix.
pub fn etag_weak_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// Reports whether `t` is obviously unspecified (zero or the Unix epoch).
pub fn is_zero_time(t: Option<SystemTime>) -> bool {
    match t {
        None => true,
        Some(t) => t == UNIX_EPOCH,
    }
}

// The Last-Modified header truncates sub-second precision, so comparisons
// work on whole seconds.
fn unix_seconds(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

fn truncated(t: SystemTime) -> Option<SystemTime> {
    unix_seconds(t).map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn check_if_match(headers: &HeaderMap, etag: Option<&str>) -> Cond {
    let mut value = match header_str(headers, headers::IF_MATCH) {
        Some(value) => value,
        None => return Cond::None,
    };

    loop {
        value = value.trim_start();
        if value.is_empty() {
            break;
        }
        if let Some(rest) = value.strip_prefix(',') {
            value = rest;
            continue;
        }
        if value.starts_with('*') {
            return Cond::True;
        }
        match scan_etag(value) {
            Some((candidate, rest)) => {
                if etag.is_some_and(|etag| etag_strong_match(candidate, etag)) {
                    return Cond::True;
                }
                value = rest;
            }
            None => break,
        }
    }

    Cond::False
}

fn check_if_unmodified_since(headers: &HeaderMap, modtime: Option<SystemTime>) -> Cond {
    let value = match header_str(headers, headers::IF_UNMODIFIED_SINCE) {
        Some(value) if !is_zero_time(modtime) => value,
        _ => return Cond::None,
    };
    let limit = match httpdate::parse_http_date(value) {
        Ok(t) => t,
        Err(_) => return Cond::None,
    };

    match modtime.and_then(truncated) {
        Some(modtime) if modtime <= limit => Cond::True,
        Some(_) => Cond::False,
        None => Cond::None,
    }
}

fn check_if_none_match(headers: &HeaderMap, etag: Option<&str>) -> Cond {
    let mut value = match header_str(headers, headers::IF_NONE_MATCH) {
        Some(value) => value,
        None => return Cond::None,
    };

    loop {
        value = value.trim_start();
        if value.is_empty() {
            break;
        }
        if let Some(rest) = value.strip_prefix(',') {
            value = rest;
            continue;
        }
        if value.starts_with('*') {
            return Cond::False;
        }
        match scan_etag(value) {
            Some((candidate, rest)) => {
                if etag.is_some_and(|etag| etag_weak_match(candidate, etag)) {
                    return Cond::False;
                }
                value = rest;
            }
            None => break,
        }
    }

    Cond::True
}

fn check_if_modified_since(
    method: &Method,
    headers: &HeaderMap,
    modtime: Option<SystemTime>,
) -> Cond {
    if method != Method::GET && method != Method::HEAD {
        return Cond::None;
    }
    let value = match header_str(headers, headers::IF_MODIFIED_SINCE) {
        Some(value) if !is_zero_time(modtime) => value,
        _ => return Cond::None,
    };
    let limit = match httpdate::parse_http_date(value) {
        Ok(t) => t,
        Err(_) => return Cond::None,
    };

    match modtime.and_then(truncated) {
        Some(modtime) if modtime <= limit => Cond::False,
        Some(_) => Cond::True,
        None => Cond::None,
    }
}

fn check_if_range(
    method: &Method,
    headers: &HeaderMap,
    etag: Option<&str>,
    modtime: Option<SystemTime>,
) -> Cond {
    if method != Method::GET && method != Method::HEAD {
        return Cond::None;
    }
    let value = match header_str(headers, headers::IF_RANGE) {
        Some(value) => value,
        None => return Cond::None,
    };

    if let Some((candidate, _)) = scan_etag(value) {
        return if etag.is_some_and(|etag| etag_strong_match(candidate, etag)) {
            Cond::True
        } else {
            Cond::False
        };
    }

    // The If-Range value may also be a date; it matches on exact
    // second-precision equality.
    let modtime = match modtime {
        Some(t) if !is_zero_time(Some(t)) => t,
        _ => return Cond::False,
    };
    match httpdate::parse_http_date(value) {
        Ok(t) if unix_seconds(t) == unix_seconds(modtime) => Cond::True,
        _ => Cond::False,
    }
}

/// Evaluates all request preconditions for a resource with the given ETag
/// and modification time.
pub fn check_preconditions(
    method: &Method,
    headers: &HeaderMap,
    etag: Option<&str>,
    modtime: Option<SystemTime>,
) -> Preconditions {
    // This function carefully follows RFC 7232 section 6.
    let mut check = check_if_match(headers, etag);
    if check == Cond::None {
        check = check_if_unmodified_since(headers, modtime);
    }
    if check == Cond::False {
        return Preconditions::PreconditionFailed;
    }

    match check_if_none_match(headers, etag) {
        Cond::False => {
            return if method == Method::GET || method == Method::HEAD {
                Preconditions::NotModified
            } else {
                Preconditions::PreconditionFailed
            };
        }
        Cond::None => {
            if check_if_modified_since(method, headers, modtime) == Cond::False {
                return Preconditions::NotModified;
            }
        }
        Cond::True => {}
    }

    let range_honored = headers.contains_key(headers::RANGE)
        && check_if_range(method, headers, etag, modtime) != Cond::False;

    Preconditions::Proceed { range_honored }
}
