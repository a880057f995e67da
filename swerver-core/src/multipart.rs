//! `multipart/byteranges` framing (RFC 7233 appendix A).
//!
//! The same header/trailer strings are used by the streaming producer and
//! by the size computation, so a `HEAD` response reports exactly the byte
//! count a `GET` would transfer.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::range::HttpRange;

/// Generates a random boundary token.
pub fn random_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(60)
        .map(char::from)
        .collect()
}

/// The `Content-Type` header value announcing a multipart response.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/byteranges; boundary={boundary}")
}

/// The part header for one range. The first part omits the leading CRLF.
pub fn part_header(
    boundary: &str,
    first: bool,
    range: &HttpRange,
    content_type: &str,
    size: u64,
) -> String {
    let lead = if first { "" } else { "\r\n" };
    format!(
        "{lead}--{boundary}\r\nContent-Range: {}\r\nContent-Type: {content_type}\r\n\r\n",
        range.content_range(size)
    )
}

/// The closing delimiter written after the last part.
pub fn trailer(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

/// Number of body bytes a multipart response over `ranges` will occupy,
/// framing included.
pub fn encoded_size(ranges: &[HttpRange], boundary: &str, content_type: &str, size: u64) -> u64 {
    let mut total = 0u64;
    for (index, range) in ranges.iter().enumerate() {
        total += part_header(boundary, index == 0, range, content_type, size).len() as u64;
        total += range.length;
    }
    total + trailer(boundary).len() as u64
}
