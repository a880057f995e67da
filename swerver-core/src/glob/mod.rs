//! POSIX-shell-style glob matching over slash-separated paths.
//!
//! Supports brace expansion (`{a,b}`, `{1..3}`), globstar (`**`), character
//! classes, extglob groups (`?(…)`, `*(…)`, `+(…)`, `@(…)`, `!(…)`) and
//! leading-`!` negation. Patterns compile to per-segment regular expressions;
//! `**` is kept as a sentinel and resolved by segment-wise recursion.

mod balanced;
mod brace;

pub use balanced::{balanced, BalancedMatch};
pub use brace::brace_expand;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ServeError};

/// Matching options, mirroring the classic minimatch switch set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Do not expand `{a,b}` and `{1..3}` brace sets.
    pub no_brace: bool,
    /// Disable `**` matching against multiple path segments.
    pub no_globstar: bool,
    /// Allow patterns to match entries starting with a period even when the
    /// pattern has no period in that spot.
    pub dot: bool,
    /// Disable extglob-style patterns like `+(a|b)`.
    pub no_ext: bool,
    /// Perform a case-insensitive match.
    pub no_case: bool,
    /// Return the pattern itself from [`match_list`] when nothing matched.
    pub no_null: bool,
    /// Match patterns without slashes against the basename of the path.
    pub match_base: bool,
    /// Suppress treating `#` at the start of a pattern as a comment.
    pub no_comment: bool,
    /// Suppress treating a leading `!` as negation.
    pub no_negate: bool,
    /// Report hits from negated expressions as if they were not negated.
    pub flip_negate: bool,
}

// Any single thing other than /
const QMARK: &str = "[^/]";
// * => any number of characters
const STAR: &str = "[^/]*?";
// Characters that need to be escaped in a regular expression.
const RE_SPECIALS: &str = "().*{}+?[]^$\\!";
// Bound on a single segment; pathological patterns are rejected up front.
const MAX_SEGMENT_LEN: usize = 64 * 1024;

static SLASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new("/+").unwrap());
// Matches some even number of \, then maybe one \, followed by a |.
static UNESCAPED_PIPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"((?:\\{2}){0,64})(\\?)\|").unwrap());
static PAREN_AFTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)[+*?]?").unwrap());
// A regular expression that cannot match anything.
static NEVER_MATCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\s\S]").unwrap());

fn extglob_open(kind: char) -> &'static str {
    match kind {
        '!' => "(?:(?!(?:",
        _ => "(?:",
    }
}

fn extglob_close(kind: char) -> &'static str {
    match kind {
        '!' => "))[^/]*?)",
        '?' => ")?",
        '+' => ")+",
        '*' => ")*",
        _ => ")",
    }
}

/// Guard applied before a segment regex runs, standing in for the
/// no-leading-dot rule of shell globs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotGuard {
    /// Segment may match anything its regex matches.
    None,
    /// Segment must not be `.` or `..` (the `dot` option is set).
    NoDots,
    /// Segment must not start with a period.
    NoDotFiles,
}

/// A compiled pattern segment.
#[derive(Debug, Clone)]
enum Segment {
    /// The `**` sentinel; consumes zero or more path segments.
    Globstar,
    /// A regular segment compiled to an anchored regex.
    Pattern {
        re: Regex,
        guard: DotGuard,
        require_nonempty: bool,
    },
}

impl Segment {
    fn matches(&self, part: &str) -> bool {
        match self {
            Segment::Globstar => true,
            Segment::Pattern {
                re,
                guard,
                require_nonempty,
            } => {
                match guard {
                    DotGuard::NoDotFiles if part.starts_with('.') => return false,
                    DotGuard::NoDots if part == "." || part == ".." => return false,
                    _ => {}
                }
                if *require_nonempty && part.is_empty() {
                    return false;
                }
                re.is_match(part)
            }
        }
    }
}

/// A compiled glob pattern.
///
/// # Example
///
/// ```
/// use swerver_core::glob::{Glob, MatchOptions};
///
/// let glob = Glob::new("/app/**", MatchOptions::default()).unwrap();
/// assert!(glob.matches("/app/x/y"));
/// assert!(!glob.matches("/other"));
/// ```
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    options: MatchOptions,
    negate: bool,
    comment: bool,
    empty: bool,
    set: Vec<Vec<Segment>>,
}

impl Glob {
    /// Compiles `pattern` with the given options.
    ///
    /// Fails with [`ServeError::PatternError`] when a segment exceeds the
    /// 64 KiB bound.
    pub fn new(pattern: &str, options: MatchOptions) -> Result<Self> {
        let mut glob = Glob {
            pattern: pattern.trim().to_string(),
            options,
            negate: false,
            comment: false,
            empty: false,
            set: Vec::new(),
        };

        // Empty patterns and comments match nothing.
        if !options.no_comment && glob.pattern.starts_with('#') {
            glob.comment = true;
            return Ok(glob);
        }
        if glob.pattern.is_empty() {
            glob.empty = true;
            return Ok(glob);
        }

        glob.parse_negate();

        for plain in glob.brace_expand_pattern() {
            let mut row = Vec::new();
            for part in SLASH_RUN.split(&plain) {
                row.push(parse_segment(part, &options)?);
            }
            if !row.is_empty() {
                glob.set.push(row);
            }
        }

        Ok(glob)
    }

    /// The original pattern, with leading `!` characters stripped.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True if the pattern is negated by a leading `!`.
    pub fn negated(&self) -> bool {
        self.negate
    }

    fn parse_negate(&mut self) {
        if self.options.no_negate {
            return;
        }

        let stripped = self.pattern.trim_start_matches('!');
        let bangs = self.pattern.len() - stripped.len();
        self.negate = bangs % 2 == 1;
        if bangs > 0 {
            self.pattern = stripped.to_string();
        }
    }

    fn brace_expand_pattern(&self) -> Vec<String> {
        if self.options.no_brace || !self.pattern.contains('{') {
            return vec![self.pattern.clone()];
        }
        brace_expand(&self.pattern)
    }

    /// Matches `path` against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.matches_partial(path, false)
    }

    /// Matches `path`, optionally in partial mode.
    ///
    /// In partial mode a path shorter than the pattern still matches, which
    /// is useful while walking a tree where deeper entries may match later.
    pub fn matches_partial(&self, path: &str, partial: bool) -> bool {
        if self.comment {
            return false;
        }
        if self.empty {
            return path.is_empty();
        }
        if path == "/" && partial {
            return true;
        }

        let fparts: Vec<&str> = SLASH_RUN.split(path).collect();

        // Basename of the path: the last non-empty segment.
        let filename = fparts
            .iter()
            .rev()
            .find(|part| !part.is_empty())
            .copied()
            .unwrap_or("");

        // Just one of the brace-expanded alternatives needs to match. If
        // negating, one hit means the whole match has failed.
        for row in &self.set {
            let file: Vec<&str> = if self.options.match_base && row.len() == 1 {
                vec![filename]
            } else {
                fparts.clone()
            };
            if self.match_one(&file, row, partial) {
                if self.options.flip_negate {
                    return true;
                }
                return !self.negate;
            }
        }

        if self.options.flip_negate {
            return false;
        }
        self.negate
    }

    fn match_one(&self, file: &[&str], pattern: &[Segment], partial: bool) -> bool {
        let fl = file.len();
        let pl = pattern.len();
        let mut fi = 0;
        let mut pi = 0;

        while fi < fl && pi < pl {
            if let Segment::Globstar = pattern[pi] {
                // Take the rest of the pattern after the **, and see if it
                // would match the file remainder. If so, success. If not,
                // the ** swallows a segment and we try again.
                let pr = pi + 1;
                if pr == pl {
                    // A ** at the end swallows the rest, but never .  or ..
                    // and only dotfiles when the dot option is set.
                    return file[fi..].iter().all(|part| {
                        *part != "."
                            && *part != ".."
                            && (self.options.dot || !part.starts_with('.'))
                    });
                }

                let mut fr = fi;
                while fr < fl {
                    let swallowee = file[fr];
                    if self.match_one(&file[fr..], &pattern[pr..], partial) {
                        return true;
                    }
                    if swallowee == "."
                        || swallowee == ".."
                        || (!self.options.dot && swallowee.starts_with('.'))
                    {
                        break;
                    }
                    fr += 1;
                }

                // In partial mode running out of file is not a failure yet.
                return partial && fr == fl;
            }

            if !pattern[pi].matches(file[fi]) {
                return false;
            }
            fi += 1;
            pi += 1;
        }

        if fi == fl && pi == pl {
            // Ran out of pattern and filename at the same time: an exact hit.
            true
        } else if fi == fl {
            // Ran out of file with pattern left; fine during tree traversal.
            partial
        } else if pi == pl {
            // Ran out of pattern with file left. Only acceptable on the very
            // last empty segment of a path with a trailing slash, so that
            // a/* still matches a/b/.
            fi == fl - 1 && file[fi].is_empty()
        } else {
            unreachable!("glob segment walk left both cursors mid-way")
        }
    }
}

/// Matches a single path against a pattern with the given options.
pub fn match_string(path: &str, pattern: &str, options: MatchOptions) -> Result<bool> {
    Ok(Glob::new(pattern, options)?.matches(path))
}

/// Filters `list` down to the entries matching `pattern`.
///
/// With the `no_null` option, returns the pattern itself when nothing
/// matched.
pub fn match_list(list: &[&str], pattern: &str, options: MatchOptions) -> Result<Vec<String>> {
    let glob = Glob::new(pattern, options)?;
    let mut result: Vec<String> = list
        .iter()
        .filter(|item| glob.matches(item))
        .map(|item| item.to_string())
        .collect();

    if options.no_null && result.is_empty() {
        result.push(pattern.to_string());
    }
    Ok(result)
}

struct PatternListEntry {
    kind: char,
    re_start: usize,
    re_end: usize,
}

struct InnerParse {
    re: String,
    has_magic: bool,
}

// Compiles one path segment. ** only has special meaning when it is the
// whole segment; otherwise any series of * is equivalent to a single *.
fn parse_segment(pattern: &str, options: &MatchOptions) -> Result<Segment> {
    if pattern.len() > MAX_SEGMENT_LEN {
        return Err(ServeError::PatternError("pattern is too long".into()));
    }

    if !options.no_globstar && pattern == "**" {
        return Ok(Segment::Globstar);
    }
    if pattern.is_empty() {
        return Ok(Segment::Pattern {
            re: Regex::new("^$").expect("static regex"),
            guard: DotGuard::None,
            require_nonempty: false,
        });
    }

    let parsed = parse_inner(pattern, options, false)?;

    let add_pattern_start = matches!(parsed.re.as_bytes().first(), Some(b'.' | b'[' | b'('));
    let guard = if !add_pattern_start || pattern.starts_with('.') {
        DotGuard::None
    } else if options.dot {
        DotGuard::NoDots
    } else {
        DotGuard::NoDotFiles
    };

    let anchored = if options.no_case {
        format!("(?i)^{}$", parsed.re)
    } else {
        format!("^{}$", parsed.re)
    };

    // An expression the engine rejects (negative extglob expands to a
    // look-around) can never match anything.
    let re = Regex::new(&anchored).unwrap_or_else(|_| NEVER_MATCH.clone());

    Ok(Segment::Pattern {
        re,
        guard,
        require_nonempty: parsed.has_magic,
    })
}

fn parse_inner(pattern: &str, options: &MatchOptions, is_sub: bool) -> Result<InnerParse> {
    let mut re = String::new();
    let mut has_magic = options.no_case;
    let mut escaping = false;
    let mut state_char: Option<char> = None;
    let mut pattern_list_stack: Vec<PatternListEntry> = Vec::new();
    let mut negative_lists: Vec<PatternListEntry> = Vec::new();
    let mut in_class = false;
    let mut class_start: isize = -1;
    let mut re_class_start = 0usize;

    fn clear_state(re: &mut String, has_magic: &mut bool, state_char: &mut Option<char>) {
        match state_char.take() {
            None => {}
            Some('*') => {
                re.push_str(STAR);
                *has_magic = true;
            }
            Some('?') => {
                re.push_str(QMARK);
                *has_magic = true;
            }
            Some(other) => {
                re.push('\\');
                re.push(other);
            }
        }
    }

    for (i, c) in pattern.char_indices() {
        // Skip over any characters that are escaped.
        if escaping && RE_SPECIALS.contains(c) {
            re.push('\\');
            re.push(c);
            escaping = false;
            continue;
        }

        match c {
            // Segments are split on / before parsing; even escaped slashes
            // cannot appear here.
            '/' => {
                return Err(ServeError::PatternError("unexpected / in segment".into()));
            }

            '\\' => {
                clear_state(&mut re, &mut has_magic, &mut state_char);
                escaping = true;
            }

            // The various state characters for extglob handling. Inside a
            // class all of them are literals, except that [!a] means [^a].
            '?' | '*' | '+' | '@' | '!' => {
                if in_class {
                    if c == '!' && i as isize == class_start + 1 {
                        re.push('^');
                    } else {
                        re.push(c);
                    }
                    continue;
                }

                clear_state(&mut re, &mut has_magic, &mut state_char);
                state_char = Some(c);
                // Without extglob, +(asdf|foo) isn't a thing; resolve the
                // state char immediately.
                if options.no_ext {
                    clear_state(&mut re, &mut has_magic, &mut state_char);
                }
            }

            '(' => {
                if in_class {
                    re.push('(');
                    continue;
                }

                match state_char.take() {
                    None => re.push_str("\\("),
                    Some(kind) => {
                        pattern_list_stack.push(PatternListEntry {
                            kind,
                            re_start: re.len(),
                            re_end: 0,
                        });
                        // Negation is (?:(?!js)[^/]*)
                        re.push_str(extglob_open(kind));
                    }
                }
            }

            ')' => {
                if in_class || pattern_list_stack.is_empty() {
                    re.push_str("\\)");
                    continue;
                }

                clear_state(&mut re, &mut has_magic, &mut state_char);
                has_magic = true;
                let mut pl = pattern_list_stack.pop().expect("stack checked above");
                re.push_str(extglob_close(pl.kind));
                pl.re_end = re.len();
                if pl.kind == '!' {
                    negative_lists.push(pl);
                }
            }

            '|' => {
                if in_class || pattern_list_stack.is_empty() || escaping {
                    re.push_str("\\|");
                    escaping = false;
                    continue;
                }

                clear_state(&mut re, &mut has_magic, &mut state_char);
                re.push('|');
            }

            '[' => {
                clear_state(&mut re, &mut has_magic, &mut state_char);

                if in_class {
                    re.push_str("\\[");
                    continue;
                }

                in_class = true;
                class_start = i as isize;
                re_class_start = re.len();
                re.push('[');
            }

            ']' => {
                // A right bracket occurring first in the list is a literal
                // (POSIX.2 2.8.3.2).
                if i as isize == class_start + 1 || !in_class {
                    re.push_str("\\]");
                    escaping = false;
                    continue;
                }

                // [z-a] style classes are valid globs but invalid regexes;
                // re-walk the contents as literal text.
                let cs = &pattern[(class_start + 1) as usize..i];
                if Regex::new(&format!("[{cs}]")).is_err() {
                    let sp = parse_inner(cs, options, true)?;
                    re.truncate(re_class_start);
                    re.push_str("\\[");
                    re.push_str(&sp.re);
                    re.push_str("\\]");
                    has_magic = has_magic || sp.has_magic;
                    in_class = false;
                    continue;
                }

                has_magic = true;
                in_class = false;
                re.push(']');
            }

            _ => {
                clear_state(&mut re, &mut has_magic, &mut state_char);

                if escaping {
                    escaping = false;
                } else if RE_SPECIALS.contains(c) && !(c == '^' && in_class) {
                    re.push('\\');
                }

                re.push(c);
            }
        }
    }

    // A class left open, like [abc, is the literal characters \[abc.
    if in_class {
        let cs = &pattern[(class_start + 1) as usize..];
        let sp = parse_inner(cs, options, true)?;
        re.truncate(re_class_start);
        re.push_str("\\[");
        re.push_str(&sp.re);
        has_magic = has_magic || sp.has_magic;
    }

    // A +( thing left open at the end of the pattern: degrade the group
    // marker to its literal form and escape any | that slipped through.
    while let Some(pl) = pattern_list_stack.pop() {
        let tail_start = pl.re_start + extglob_open(pl.kind).len();
        let tail = re[tail_start..].to_string();
        let tail = UNESCAPED_PIPE.replace_all(&tail, |caps: &regex::Captures| {
            let doubled = &caps[1];
            let escape = if caps[2].is_empty() { "\\" } else { &caps[2] };
            format!("{doubled}{doubled}{escape}|")
        });

        let marker = match pl.kind {
            '*' => STAR.to_string(),
            '?' => QMARK.to_string(),
            other => format!("\\{other}"),
        };

        has_magic = true;
        re.truncate(pl.re_start);
        re.push_str(&marker);
        re.push_str("\\(");
        re.push_str(&tail);
    }

    clear_state(&mut re, &mut has_magic, &mut state_char);
    if escaping {
        // Trailing backslash stands for itself.
        re.push_str("\\\\");
    }

    // A pattern like *.!(x) must ensure that the negated section covers the
    // whole suffix; move everything after each negative list inside it.
    for n in (0..negative_lists.len()).rev() {
        let nl = &negative_lists[n];

        let nl_before = re[..nl.re_start].to_string();
        let nl_first = re[nl.re_start..nl.re_end - 8].to_string();
        let mut nl_last = re[nl.re_end - 8..nl.re_end].to_string();
        let mut nl_after = re[nl.re_end..].to_string();
        nl_last.push_str(&nl_after);

        // Open parens before the negated section mean their closers are not
        // part of the suffix the look-ahead must cover.
        let open_parens_before = nl_before.matches('(').count();
        for _ in 0..open_parens_before {
            nl_after = PAREN_AFTER.replace(&nl_after, "").into_owned();
        }

        let dollar = if nl_after.is_empty() && !is_sub { "$" } else { "" };
        re = format!("{nl_before}{nl_first}{nl_after}{dollar}{nl_last}");
    }

    Ok(InnerParse { re, has_magic })
}
