//! Named-parameter path templates.
//!
//! Templates like `/users/:id` or `/files/:name(\d+)?` compile to a capturing
//! regular expression; the reverse operation substitutes parameter values
//! back into the template to produce a concrete path.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ServeError};

/// The default delimiter for path segments.
pub const DEFAULT_DELIMITER: &str = "/";

// Matches escaped characters, Express-style `:name` parameters with an
// optional `(pattern)` suffix, and bare `(pattern)` groups, each optionally
// followed by a `+`, `*` or `?` modifier:
//
//   ":test(\d+)?"  => name "test", pattern "\d+", modifier "?"
//   "(\d+)"        => unnamed group with pattern "\d+"
static PATH_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(\\.)",
        r"|",
        r"(?::(\w+)(?:\(((?:\\.|[^\\()])+)\))?|\(((?:\\.|[^\\()])+)\))([+*?])?",
    ))
    .expect("static regex")
});

static ESCAPE_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.+*?=^!:${}()\[\]|/\\])").expect("static regex"));
static ESCAPE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"([=!:$/()])").expect("static regex"));

/// Options controlling template compilation.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// The default delimiter for segments.
    pub delimiter: String,
    /// Characters to consider delimiters when parsing (all when empty).
    pub whitelist: String,
    /// When true the regexp is case sensitive.
    pub sensitive: bool,
    /// When true an optional trailing delimiter no longer matches.
    pub strict: bool,
    /// When true the regexp matches from the beginning of the string.
    pub start: bool,
    /// When true the regexp matches to the end of the string.
    pub end: bool,
    /// Optional characters treated as "end" characters.
    pub ends_with: String,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            delimiter: String::new(),
            whitelist: String::new(),
            sensitive: false,
            strict: false,
            start: true,
            end: true,
            ends_with: String::new(),
        }
    }
}

/// One token of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A literal run of characters.
    Literal(String),
    /// A named or positional parameter.
    Parameter {
        name: String,
        prefix: String,
        delimiter: String,
        optional: bool,
        repeat: bool,
        pattern: String,
    },
}

/// A compiled path template: tokens plus the capturing regex built from them.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    tokens: Vec<Token>,
    regex: Regex,
    keys: Vec<String>,
}

impl PathTemplate {
    /// Parses and compiles `path` with default options.
    pub fn new(path: &str) -> Result<Self> {
        Self::with_options(path, &TemplateOptions::default())
    }

    /// Parses and compiles `path`.
    pub fn with_options(path: &str, options: &TemplateOptions) -> Result<Self> {
        let tokens = parse(path, options);
        let (regex, keys) = tokens_to_regex(&tokens, options)?;
        Ok(Self {
            tokens,
            regex,
            keys,
        })
    }

    /// The parsed token list.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The names of the capturing parameters, in order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Matches `path`, returning the parameter captures on success.
    ///
    /// The returned map also records positional captures under `$1`, `$2`, …
    /// so destinations may refer to unnamed groups.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        let mut params = HashMap::new();

        for (index, key) in self.keys.iter().enumerate() {
            let value = captures
                .get(index + 1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            params.insert(format!("${}", index + 1), value.clone());
            params.insert(key.clone(), value);
        }

        Some(params)
    }

    /// Reverse compilation: substitutes `params` into the template to yield
    /// a concrete path.
    ///
    /// Missing values are an error unless the parameter is optional.
    pub fn compile(&self, params: &HashMap<String, String>) -> Result<String> {
        let mut out = String::new();

        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Parameter {
                    name,
                    prefix,
                    optional,
                    ..
                } => match params.get(name) {
                    Some(value) => {
                        out.push_str(prefix);
                        out.push_str(value);
                    }
                    None if *optional => {}
                    None => {
                        return Err(ServeError::PatternError(format!(
                            "missing value for parameter {name:?}"
                        )))
                    }
                },
            }
        }

        Ok(out)
    }
}

/// Substitutes `$N` placeholders and `:name` tokens in `destination` with
/// the corresponding captures.
///
/// Unlike [`PathTemplate::compile`], parameters without a capture keep
/// their literal spelling: a proxy destination such as
/// `http://host:9000/$1` scans `:9000` as a parameter token, which must
/// survive untouched.
pub fn expand_destination(destination: &str, params: &HashMap<String, String>) -> Result<String> {
    let template = PathTemplate::new(destination)?;
    let mut out = String::new();

    for token in template.tokens() {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Parameter { name, prefix, .. } => match params.get(name) {
                Some(value) => {
                    out.push_str(prefix);
                    out.push_str(value);
                }
                None => {
                    out.push_str(prefix);
                    out.push(':');
                    out.push_str(name);
                }
            },
        }
    }

    // Positional references surviving as literals ($1, $2, ...) resolve to
    // the unnamed captures of the source match.
    for (key, value) in params {
        if key.starts_with('$') {
            out = out.replace(key.as_str(), value);
        }
    }

    Ok(out)
}

fn escape_string(s: &str) -> String {
    ESCAPE_STRING.replace_all(s, r"\$1").into_owned()
}

fn escape_group(s: &str) -> String {
    ESCAPE_GROUP.replace_all(s, r"\$1").into_owned()
}

/// Scans `input` into literal and parameter tokens.
pub fn parse(input: &str, options: &TemplateOptions) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut key = 0usize;
    let mut index = 0usize;
    let mut path = String::new();
    let mut path_escaped = false;

    let default_delimiter = if options.delimiter.is_empty() {
        DEFAULT_DELIMITER
    } else {
        &options.delimiter
    };

    while let Some(caps) = PATH_TOKENS.captures(&input[index..]) {
        let whole = caps.get(0).expect("group 0 always present");
        let escaped = caps.get(1).map(|m| m.as_str());
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let capture = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let group = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let modifier = caps.get(5).map(|m| m.as_str()).unwrap_or("");

        path.push_str(&input[index..index + whole.start()]);
        index += whole.end();

        // Escaped sequences stand for their second character.
        if let Some(escaped) = escaped {
            path.push_str(&escaped[1..]);
            path_escaped = true;
            continue;
        }

        let mut prev = String::new();
        if !path_escaped {
            if let Some(last) = path.chars().last() {
                let allowed =
                    options.whitelist.is_empty() || options.whitelist.contains(last);
                if allowed {
                    prev = last.to_string();
                    path.truncate(path.len() - last.len_utf8());
                }
            }
        }

        // Push the accumulated literal run.
        if !path.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut path)));
            path_escaped = false;
        }

        let repeat = modifier == "+" || modifier == "*";
        let optional = modifier == "?" || modifier == "*";
        let delimiter = if prev.is_empty() {
            default_delimiter.to_string()
        } else {
            prev.clone()
        };

        let raw_pattern = if !capture.is_empty() { capture } else { group };
        let pattern = if raw_pattern.is_empty() {
            if delimiter == default_delimiter {
                format!("[^{}]+?", escape_string(&delimiter))
            } else {
                format!(
                    "[^{}]+?",
                    escape_string(&format!("{delimiter}{default_delimiter}"))
                )
            }
        } else {
            escape_group(raw_pattern)
        };

        let token_name = if name.is_empty() {
            key += 1;
            (key - 1).to_string()
        } else {
            name.to_string()
        };

        tokens.push(Token::Parameter {
            name: token_name,
            prefix: prev,
            delimiter,
            optional,
            repeat,
            pattern,
        });
    }

    // Push any remaining characters.
    if !path.is_empty() || index < input.len() {
        path.push_str(&input[index..]);
        tokens.push(Token::Literal(path));
    }

    tokens
}

/// Builds the capturing regex for a token list, returning it together with
/// the ordered parameter names.
pub fn tokens_to_regex(
    tokens: &[Token],
    options: &TemplateOptions,
) -> Result<(Regex, Vec<String>)> {
    let delimiter = if options.delimiter.is_empty() {
        DEFAULT_DELIMITER
    } else {
        &options.delimiter
    };
    let ends_with = if options.ends_with.is_empty() {
        "$".to_string()
    } else {
        format!("{}|$", escape_string(&options.ends_with))
    };

    let mut route = String::new();
    if options.start {
        route.push('^');
    }

    let mut keys = Vec::new();

    for token in tokens {
        match token {
            Token::Literal(text) => route.push_str(&escape_string(text)),
            Token::Parameter {
                name,
                prefix,
                delimiter: token_delimiter,
                optional,
                repeat,
                pattern,
            } => {
                let capture = if *repeat {
                    format!(
                        "(?:{pattern})(?:{}(?:{pattern}))*",
                        escape_string(token_delimiter)
                    )
                } else {
                    pattern.clone()
                };

                keys.push(name.clone());

                if *optional {
                    if prefix.is_empty() {
                        route.push_str(&format!("({capture})?"));
                    } else {
                        route.push_str(&format!("(?:{}({capture}))?", escape_string(prefix)));
                    }
                } else {
                    route.push_str(&format!("{}({capture})", escape_string(prefix)));
                }
            }
        }
    }

    if options.end {
        if !options.strict {
            route.push_str(&format!("(?:{})?", escape_string(delimiter)));
        }
        if ends_with == "$" {
            route.push('$');
        } else {
            route.push_str(&format!("(?:{ends_with})"));
        }
    } else {
        let end_delimited = match tokens.last() {
            Some(Token::Literal(text)) => text.ends_with(delimiter),
            Some(Token::Parameter { .. }) => false,
            None => true,
        };

        if !options.strict {
            route.push_str(&format!("(?:{}(?:{ends_with}))?", escape_string(delimiter)));
        }
        if !end_delimited {
            route.push_str(&format!("(?:{}|{ends_with})", escape_string(delimiter)));
        }
    }

    if !options.sensitive {
        route = format!("(?i){route}");
    }

    let regex = Regex::new(&route)
        .map_err(|err| ServeError::PatternError(format!("template regex: {err}")))?;

    Ok((regex, keys))
}
