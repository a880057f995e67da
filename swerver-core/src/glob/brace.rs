//! Bash-style brace expansion.
//!
//! Expands the outermost brace set of a pattern into concrete strings:
//!
//! * comma lists: `a{b,c}d` → `abd`, `acd`
//! * numeric sequences: `{1..3}`, `{10..2..3}`, negative bounds allowed
//! * alpha sequences: `{a..e}` with single-character endpoints
//!
//! Nested sets in a brace body expand recursively. A body with neither `,`
//! nor `..` is not a valid set and is returned as-is (Bash rule).

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use super::balanced::balanced;

// Escape markers. Randomized so user input cannot collide with them.
static ESC_SLASH: Lazy<String> = Lazy::new(|| marker("SLASH"));
static ESC_OPEN: Lazy<String> = Lazy::new(|| marker("OPEN"));
static ESC_CLOSE: Lazy<String> = Lazy::new(|| marker("CLOSE"));
static ESC_COMMA: Lazy<String> = Lazy::new(|| marker("COMMA"));
static ESC_PERIOD: Lazy<String> = Lazy::new(|| marker("PERIOD"));

static NUMERIC_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+\.\.-?\d+(?:\.\.-?\d+)?$").unwrap());
static ALPHA_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]\.\.[a-zA-Z](?:\.\.-?\d+)?$").unwrap());
static COMMA_THEN_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r",.*\}").unwrap());
static PADDED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?0\d").unwrap());

fn marker(name: &str) -> String {
    format!("\0{}{}\0", name, rand::thread_rng().gen::<u32>())
}

/// Expands all brace sets in `pattern` into the list of concrete strings.
///
/// # Example
///
/// ```
/// use swerver_core::glob::brace_expand;
///
/// assert_eq!(brace_expand("file-{a,b}.jpg"), vec!["file-a.jpg", "file-b.jpg"]);
/// assert_eq!(brace_expand("{1..3}"), vec!["1", "2", "3"]);
/// ```
pub fn brace_expand(pattern: &str) -> Vec<String> {
    if pattern.is_empty() {
        return Vec::new();
    }

    // Anything starting with {} keeps its first two bytes literal, but only
    // at the top level: {},a}b expands to nothing special while a{},b}c
    // expands to [a}c, abc]. Bash 4.3 rule.
    let escaped = if let Some(rest) = pattern.strip_prefix("{}") {
        format!("\\{{\\}}{rest}")
    } else {
        pattern.to_string()
    };

    expand(&escape_braces(&escaped), true)
        .into_iter()
        .map(|item| unescape_braces(&item))
        .collect()
}

fn escape_braces(s: &str) -> String {
    s.replace("\\\\", &ESC_SLASH)
        .replace("\\{", &ESC_OPEN)
        .replace("\\}", &ESC_CLOSE)
        .replace("\\,", &ESC_COMMA)
        .replace("\\.", &ESC_PERIOD)
}

fn unescape_braces(s: &str) -> String {
    s.replace(ESC_SLASH.as_str(), "\\")
        .replace(ESC_OPEN.as_str(), "{")
        .replace(ESC_CLOSE.as_str(), "}")
        .replace(ESC_COMMA.as_str(), ",")
        .replace(ESC_PERIOD.as_str(), ".")
}

// str.split(","), except that nested braced sections count as single
// members, like {a,{b,c},d}.
fn parse_comma_parts(s: &str) -> Vec<String> {
    if s.is_empty() {
        return vec![String::new()];
    }

    let m = match balanced("{", "}", s) {
        Some(m) => m,
        None => return s.split(',').map(str::to_string).collect(),
    };

    let mut p: Vec<String> = m.pre.split(',').map(str::to_string).collect();
    let last = p.len() - 1;
    p[last].push_str(&format!("{{{}}}", m.body));

    let mut post_parts = parse_comma_parts(m.post);
    if !m.post.is_empty() {
        let first = post_parts.remove(0);
        p[last].push_str(&first);
        p.extend(post_parts);
    }

    p
}

fn numeric(s: &str) -> i64 {
    s.parse::<i64>()
        .unwrap_or_else(|_| s.bytes().next().map_or(0, i64::from))
}

fn embrace(s: &str) -> String {
    format!("{{{s}}}")
}

fn is_padded(el: &str) -> bool {
    PADDED.is_match(el)
}

fn expand(s: &str, is_top: bool) -> Vec<String> {
    let m = match balanced("{", "}", s) {
        Some(m) => m,
        None => return vec![s.to_string()],
    };
    if m.pre.ends_with('$') {
        return vec![s.to_string()];
    }

    let is_numeric_sequence = NUMERIC_SEQUENCE.is_match(m.body);
    let is_alpha_sequence = ALPHA_SEQUENCE.is_match(m.body);
    let is_sequence = is_numeric_sequence || is_alpha_sequence;
    let is_options = m.body.contains(',');

    if !is_sequence && !is_options {
        // {a},b}
        if COMMA_THEN_CLOSE.is_match(m.post) {
            let retry = format!("{}{{{}{}{}", m.pre, m.body, ESC_CLOSE.as_str(), m.post);
            return expand(&retry, false);
        }
        return vec![s.to_string()];
    }

    let mut n: Vec<String>;
    if is_sequence {
        n = m.body.split("..").map(str::to_string).collect();
    } else {
        n = parse_comma_parts(m.body);
        if n.len() == 1 {
            // x{{a,b}}y ==> x{a}y x{b}y
            let nv = n.remove(0);
            n = expand(&nv, false).iter().map(|item| embrace(item)).collect();
            if n.len() == 1 {
                let post = if m.post.is_empty() {
                    vec![String::new()]
                } else {
                    expand(m.post, false)
                };

                return post
                    .iter()
                    .map(|item| format!("{}{}{}", m.pre, n[0], item))
                    .collect();
            }
        }
    }

    // At this point n holds the member parts and is not a single-entry
    // comma set. pre is guaranteed to be free of brace sets.
    let pre = m.pre;
    let post = if m.post.is_empty() {
        vec![String::new()]
    } else {
        expand(m.post, false)
    };

    let mut members: Vec<String> = Vec::new();

    if is_sequence {
        let x = numeric(&n[0]);
        let y = numeric(&n[1]);
        let width = n[0].len().max(n[1].len());
        let mut incr = if n.len() == 3 { numeric(&n[2]).abs() } else { 1 };

        let reverse = y < x;
        if reverse {
            incr = -incr;
        }
        let pad = n.iter().any(|item| is_padded(item));

        let mut i = x;
        while if reverse { i >= y } else { i <= y } {
            let c = if is_alpha_sequence {
                let ch = char::from_u32(i as u32).unwrap_or('\0');
                if ch == '\\' {
                    String::new()
                } else {
                    ch.to_string()
                }
            } else {
                let digits = i.to_string();
                if pad {
                    let need = width.saturating_sub(digits.len());
                    if need > 0 {
                        if i < 0 {
                            format!("-{}{}", "0".repeat(need), &digits[1..])
                        } else {
                            format!("{}{}", "0".repeat(need), digits)
                        }
                    } else {
                        digits
                    }
                } else {
                    digits
                }
            };

            members.push(c);
            i += incr;
        }
    } else {
        for item in &n {
            members.extend(expand(item, false));
        }
    }

    let mut expansions = Vec::new();
    for member in &members {
        for post_item in &post {
            let expansion = format!("{pre}{member}{post_item}");
            if is_top || is_sequence || !expansion.is_empty() {
                expansions.push(expansion);
            }
        }
    }

    expansions
}
