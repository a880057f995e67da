//! Balanced pair scanning.
//!
//! Finds the first outermost balanced `open…close` pair in a string, which
//! brace expansion uses to peel off one brace set at a time.

/// Result of a successful balanced scan.
///
/// `start`/`end` are byte offsets of the opening and closing tokens;
/// `pre`, `body` and `post` are the slices before, inside and after the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancedMatch<'a> {
    pub start: usize,
    pub end: usize,
    pub pre: &'a str,
    pub body: &'a str,
    pub post: &'a str,
}

/// Finds the first outermost balanced pair of `open` and `close` in `input`.
///
/// Closing tokens before the first opening token are ignored. When nesting is
/// unbalanced, the leftmost unmatched open is paired with the nearest
/// subsequent close. Returns `None` when no balancing pair exists.
///
/// # Example
///
/// ```
/// use swerver_core::glob::balanced;
///
/// let m = balanced("{", "}", "pre{in{nest}}post").unwrap();
/// assert_eq!(m.pre, "pre");
/// assert_eq!(m.body, "in{nest}");
/// assert_eq!(m.post, "post");
/// ```
pub fn balanced<'a>(open: &str, close: &str, input: &'a str) -> Option<BalancedMatch<'a>> {
    let (start, end) = balanced_range(open, close, input)?;

    let body_start = start + open.len();
    let post_start = end + close.len();

    Some(BalancedMatch {
        start,
        end,
        pre: &input[..start],
        body: if body_start > end {
            ""
        } else {
            &input[body_start..end]
        },
        post: if post_start > input.len() {
            ""
        } else {
            &input[post_start..]
        },
    })
}

fn index_of(haystack: &str, needle: &str, from: usize) -> isize {
    if from > haystack.len() {
        return -1;
    }
    match haystack[from..].find(needle) {
        Some(pos) => (pos + from) as isize,
        None => -1,
    }
}

fn balanced_range(open: &str, close: &str, input: &str) -> Option<(usize, usize)> {
    let mut ai = index_of(input, open, 0);
    let mut bi = index_of(input, close, (ai + 1) as usize);
    let mut i = ai;

    if ai < 0 || bi <= 0 {
        return None;
    }

    let mut result: Option<(usize, usize)> = None;
    let mut begs: Vec<usize> = Vec::new();
    let mut left = input.len();
    let mut right = 0usize;

    while i >= 0 && result.is_none() {
        if i == ai {
            begs.push(i as usize);
            ai = index_of(input, open, (i + 1) as usize);
        } else if begs.len() == 1 {
            result = Some((begs.pop().unwrap(), bi as usize));
        } else {
            let beg = begs.pop().unwrap();
            if beg < left {
                left = beg;
                right = bi as usize;
            }
            bi = index_of(input, close, (i + 1) as usize);
        }

        i = if ai < bi && ai >= 0 { ai } else { bi };
    }

    if result.is_none() && !begs.is_empty() {
        result = Some((left, right));
    }

    result
}
