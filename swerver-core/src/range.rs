//! Byte range processing (`Range` HTTP header, RFC 7233).

/// A byte range to be sent to the client: a half-open interval expressed as
/// start plus length over the content size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRange {
    pub start: u64,
    pub length: u64,
}

impl HttpRange {
    /// The `Content-Range` header value for this range.
    pub fn content_range(&self, size: u64) -> String {
        let end = (self.start + self.length).saturating_sub(1);
        format!("bytes {}-{end}/{size}", self.start)
    }
}

/// Why a `Range` header could not be honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// The header is syntactically malformed.
    Invalid,
    /// No requested range overlaps the content; answer `416` with
    /// `Content-Range: bytes */<size>`.
    NoOverlap,
}

/// Parses a `Range` header value against a content of `size` bytes.
///
/// Each spec is `N-M` (inclusive bounds), `N-` (to end of content) or `-K`
/// (last K bytes). Specs starting past the end of the content are dropped;
/// if every spec does so the result is [`RangeError::NoOverlap`].
pub fn parse_range(header: &str, size: u64) -> Result<Vec<HttpRange>, RangeError> {
    const UNIT: &str = "bytes=";

    let rest = header.strip_prefix(UNIT).ok_or(RangeError::Invalid)?;
    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for spec in rest.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }

        let (start, end) = spec.split_once('-').ok_or(RangeError::Invalid)?;
        let (start, end) = (start.trim(), end.trim());

        let range = if start.is_empty() {
            // -K: the last K bytes, K a non-negative integer
            // (RFC 7233 §2.1 suffix-length).
            if end.is_empty() || end.starts_with('-') {
                return Err(RangeError::Invalid);
            }
            let suffix: u64 = end.parse().map_err(|_| RangeError::Invalid)?;
            let length = suffix.min(size);
            HttpRange {
                start: size - length,
                length,
            }
        } else {
            let first: u64 = start.parse().map_err(|_| RangeError::Invalid)?;
            if first >= size {
                // Begins after the end of the content: contributes to the
                // no-overlap condition rather than being an error.
                no_overlap = true;
                continue;
            }
            if end.is_empty() {
                HttpRange {
                    start: first,
                    length: size - first,
                }
            } else {
                let mut last: u64 = end.parse().map_err(|_| RangeError::Invalid)?;
                if first > last {
                    return Err(RangeError::Invalid);
                }
                if last >= size {
                    last = size - 1;
                }
                HttpRange {
                    start: first,
                    length: last - first + 1,
                }
            }
        };

        ranges.push(range);
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }
    Ok(ranges)
}

/// Total number of content bytes covered by `ranges`.
pub fn sum_ranges_size(ranges: &[HttpRange]) -> u64 {
    ranges.iter().map(|range| range.length).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_range() {
        let ranges = parse_range("bytes=0-4", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 0, length: 5 }]);
        assert_eq!(ranges[0].content_range(10), "bytes 0-4/10");
    }

    #[test]
    fn test_open_ended_range() {
        let ranges = parse_range("bytes=5-", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 5, length: 5 }]);
    }

    #[test]
    fn test_suffix_range() {
        let ranges = parse_range("bytes=-3", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 7, length: 3 }]);

        // A suffix longer than the content covers all of it.
        let ranges = parse_range("bytes=-100", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 0, length: 10 }]);
    }

    #[test]
    fn test_end_clamped_to_size() {
        let ranges = parse_range("bytes=8-99", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 8, length: 2 }]);
    }

    #[test]
    fn test_multiple_ranges() {
        let ranges = parse_range("bytes=0-1, 3-4", 10).unwrap();
        assert_eq!(
            ranges,
            vec![
                HttpRange { start: 0, length: 2 },
                HttpRange { start: 3, length: 2 },
            ]
        );
        assert_eq!(sum_ranges_size(&ranges), 4);
    }

    #[test]
    fn test_no_overlap() {
        assert_eq!(parse_range("bytes=100-", 10), Err(RangeError::NoOverlap));
        assert_eq!(parse_range("bytes=10-20", 10), Err(RangeError::NoOverlap));

        // One overlapping spec rescues the set.
        let ranges = parse_range("bytes=100-, 0-0", 10).unwrap();
        assert_eq!(ranges, vec![HttpRange { start: 0, length: 1 }]);
    }

    #[test]
    fn test_invalid() {
        assert_eq!(parse_range("chars=0-4", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=abc", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=4-2", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=--5", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=a-b", 10), Err(RangeError::Invalid));
    }

    #[test]
    fn test_empty_specs_skipped() {
        let ranges = parse_range("bytes=0-1,,", 10).unwrap();
        assert_eq!(ranges.len(), 1);
    }
}
