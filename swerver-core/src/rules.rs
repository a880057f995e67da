//! Declarative matching rules of the request pipeline.
//!
//! Clean-URL selection, rewrites, redirects and proxy routing all resolve
//! through the same small algebra: a configured *source* is tried as a
//! path template first where the stage supports captures, then as a glob.

use std::collections::HashMap;

use crate::config::{RewriteRule, Selector, ServeConfig, DEFAULT_REDIRECT_STATUS};
use crate::glob::{Glob, MatchOptions};
use crate::path::{clean_url_path, ensure_slash_start, slasher};
use crate::template::{expand_destination, PathTemplate};

/// Outcome of a redirect decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// The Location to send.
    pub target: String,
    /// The status code to use.
    pub status: u16,
}

/// Matches a configured source against a request path.
///
/// When `allow_segments` is set the source is first interpreted as a path
/// template (with `*` standing for a capture group); on success the capture
/// map is returned. Either way the source is retried as a glob, yielding an
/// empty capture map.
pub fn source_matches(
    source: &str,
    request_path: &str,
    allow_segments: bool,
) -> Option<HashMap<String, String>> {
    let slashed = slasher(source);
    let resolved = clean_url_path(request_path);

    if allow_segments {
        let normalized = slashed.replace('*', "(.*)");
        if let Ok(template) = PathTemplate::new(&normalized) {
            if let Some(captures) = template.match_path(&resolved) {
                return Some(captures);
            }
        }
    }

    match Glob::new(&slashed, MatchOptions::default()) {
        Ok(glob) if glob.matches(&resolved) => Some(HashMap::new()),
        _ => None,
    }
}

/// Resolves a source/destination pair against a path, producing the
/// destination with captures substituted, or `None` when the source does
/// not match.
pub fn to_target(source: &str, destination: &str, previous_path: &str) -> Option<String> {
    let captures = source_matches(source, previous_path, true)?;
    expand_destination(destination, &captures).ok()
}

/// Resolves the rewrite chain for `path`.
///
/// The first rule whose source matches fires and is removed from the
/// working set before recursing on its destination, so a rule can fire at
/// most once and resolution terminates after at most `rules.len()` steps.
/// Returns `None` when no rule fired at all.
pub fn apply_rewrites(path: &str, rewrites: &[RewriteRule]) -> Option<String> {
    for (index, rule) in rewrites.iter().enumerate() {
        if let Some(target) = to_target(&rule.source, &rule.destination, path) {
            let target = slasher(&target);

            let mut remaining = rewrites.to_vec();
            remaining.remove(index);

            return Some(apply_rewrites(&target, &remaining).unwrap_or(target));
        }
    }

    None
}

/// Decides whether `decoded_path` should redirect, and where to.
///
/// Clean-URL suffixes are stripped before the trailing-slash rule runs so
/// that at most one redirect is produced when both options apply. Redirect
/// rules are evaluated last; their `type` (or 307 when zero) is the status.
pub fn should_redirect(
    decoded_path: &str,
    clean_url: bool,
    config: &ServeConfig,
) -> Option<Redirect> {
    let mut path = decoded_path.to_string();
    let mut cleaned_url = false;

    if clean_url {
        if let Some(stripped) = path.strip_suffix(".html") {
            path = stripped.to_string();
            cleaned_url = true;
        } else if let Some(stripped) = path.strip_suffix("/index") {
            path = stripped.to_string();
            cleaned_url = true;
        }
    }

    if let Some(trailing_slash) = config.trailing_slash {
        let is_trailed = path.ends_with('/') && path.len() > 1;
        let name = path.rsplit('/').next().unwrap_or("");
        let has_extension = name.contains('.') && !name.starts_with('.');
        let is_dotfile = name.starts_with('.');

        let target = if !trailing_slash && is_trailed {
            Some(path[..path.len() - 1].to_string())
        } else if trailing_slash && !is_trailed && !has_extension && !is_dotfile && path != "/" {
            Some(format!("{path}/"))
        } else {
            None
        };

        if let Some(target) = target {
            return Some(Redirect {
                target,
                status: 301,
            });
        }
    }

    if cleaned_url {
        return Some(Redirect {
            target: ensure_slash_start(&path),
            status: DEFAULT_REDIRECT_STATUS,
        });
    }

    for rule in &config.redirects {
        if let Some(target) = to_target(&rule.source, &rule.destination, decoded_path) {
            let status = if rule.kind == 0 {
                DEFAULT_REDIRECT_STATUS
            } else {
                rule.kind
            };
            return Some(Redirect { target, status });
        }
    }

    None
}

/// Evaluates a boolean-or-glob-list selector against a path.
pub fn applicable(decoded_path: &str, selector: &Selector) -> bool {
    match selector {
        Selector::Disabled => false,
        Selector::All => true,
        Selector::Globs(globs) => globs
            .iter()
            .any(|source| source_matches(source, decoded_path, false).is_some()),
    }
}

/// Reports whether a directory entry may appear in a listing.
pub fn can_be_listed(unlisted: &[String], name: &str) -> bool {
    let slashed = slasher(name);
    !unlisted
        .iter()
        .any(|source| source_matches(source, &slashed, false).is_some())
}

/// Candidate companion paths probed when a clean URL or rewrite did not
/// resolve to an on-disk object: `<path>/index.html`, then `<path>.html`.
pub fn possible_paths(relative_path: &str, extension: &str) -> Vec<String> {
    let mut entries = vec![format!(
        "{}/index{extension}",
        relative_path.trim_end_matches('/')
    )];

    let part = relative_path.trim_end_matches('/');
    let candidate = format!("{part}{extension}");
    let base = candidate.rsplit('/').next().unwrap_or(&candidate);
    if base != extension {
        entries.push(candidate);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RedirectRule, ServeConfig};

    fn rewrite(source: &str, destination: &str) -> RewriteRule {
        RewriteRule {
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }

    #[test]
    fn test_source_matches_glob() {
        assert!(source_matches("/app/**", "/app/x/y", false).is_some());
        assert!(source_matches("app/**", "/app/x", false).is_some());
        assert!(source_matches("/app/**", "/other", false).is_none());
    }

    #[test]
    fn test_source_matches_template_captures() {
        let captures = source_matches("/users/:id", "/users/42", true).unwrap();
        assert_eq!(captures["id"], "42");

        let captures = source_matches("/api/*", "/api/ping", true).unwrap();
        assert_eq!(captures["0"], "ping");
    }

    #[test]
    fn test_source_matches_cleans_path() {
        assert!(source_matches("/app/**", "/app//x/./y", false).is_some());
    }

    #[test]
    fn test_to_target() {
        assert_eq!(
            to_target("/old/:page", "/new/:page", "/old/contact"),
            Some("/new/contact".to_string())
        );
        assert_eq!(to_target("/old/:page", "/new/:page", "/none"), None);
        // A glob-only match substitutes nothing but still resolves.
        assert_eq!(
            to_target("/app/**", "/index.html", "/app/deep/route"),
            Some("/index.html".to_string())
        );
    }

    #[test]
    fn test_apply_rewrites_no_match() {
        assert_eq!(apply_rewrites("/x", &[]), None);
        assert_eq!(apply_rewrites("/x", &[rewrite("/y", "/z")]), None);
    }

    #[test]
    fn test_apply_rewrites_single() {
        let rules = vec![rewrite("/app/**", "/index.html")];
        assert_eq!(apply_rewrites("/app/a/b", &rules), Some("/index.html".into()));
    }

    #[test]
    fn test_apply_rewrites_chain() {
        let rules = vec![rewrite("/a", "/b"), rewrite("/b", "/c")];
        assert_eq!(apply_rewrites("/a", &rules), Some("/c".into()));
    }

    #[test]
    fn test_apply_rewrites_terminates() {
        // Mutually recursive rules each fire once, then resolution stops.
        let rules = vec![rewrite("/a", "/b"), rewrite("/b", "/a")];
        assert_eq!(apply_rewrites("/a", &rules), Some("/a".into()));

        // A self-referencing rule cannot re-fire.
        let rules = vec![rewrite("/loop", "/loop")];
        assert_eq!(apply_rewrites("/loop", &rules), Some("/loop".into()));
    }

    #[test]
    fn test_should_redirect_clean_urls() {
        let config = ServeConfig::default();
        let redirect = should_redirect("/about.html", true, &config).unwrap();
        assert_eq!(redirect.target, "/about");
        assert_eq!(redirect.status, 307);

        let redirect = should_redirect("/docs/index", true, &config).unwrap();
        assert_eq!(redirect.target, "/docs");

        assert_eq!(should_redirect("/about", true, &config), None);
        assert_eq!(should_redirect("/about.html", false, &config), None);
    }

    #[test]
    fn test_should_redirect_rules() {
        let mut config = ServeConfig::default();
        config.redirects = vec![
            RedirectRule {
                source: "/old/:page".into(),
                destination: "/new/:page".into(),
                kind: 0,
            },
            RedirectRule {
                source: "/gone".into(),
                destination: "/elsewhere".into(),
                kind: 301,
            },
        ];

        let redirect = should_redirect("/old/contact", false, &config).unwrap();
        assert_eq!(redirect.target, "/new/contact");
        assert_eq!(redirect.status, 307);

        let redirect = should_redirect("/gone", false, &config).unwrap();
        assert_eq!(redirect.target, "/elsewhere");
        assert_eq!(redirect.status, 301);
    }

    #[test]
    fn test_should_redirect_trailing_slash() {
        let mut config = ServeConfig::default();
        config.trailing_slash = Some(true);

        let redirect = should_redirect("/docs", false, &config).unwrap();
        assert_eq!(redirect.target, "/docs/");
        assert_eq!(redirect.status, 301);

        // Paths with an extension or a leading dot are left alone.
        assert_eq!(should_redirect("/app.js", false, &config), None);
        assert_eq!(should_redirect("/.well-known", false, &config), None);
        assert_eq!(should_redirect("/", false, &config), None);

        config.trailing_slash = Some(false);
        let redirect = should_redirect("/docs/", false, &config).unwrap();
        assert_eq!(redirect.target, "/docs");

        config.trailing_slash = None;
        assert_eq!(should_redirect("/docs", false, &config), None);
        assert_eq!(should_redirect("/docs/", false, &config), None);
    }

    #[test]
    fn test_clean_url_before_trailing_slash() {
        // Only one redirect happens when both options are in play.
        let mut config = ServeConfig::default();
        config.trailing_slash = Some(true);

        let redirect = should_redirect("/docs/index", true, &config).unwrap();
        assert_eq!(redirect.target, "/docs/");
        assert_eq!(redirect.status, 301);
    }

    #[test]
    fn test_applicable() {
        assert!(applicable("/x", &Selector::All));
        assert!(!applicable("/x", &Selector::Disabled));
        assert!(applicable(
            "/app/page",
            &Selector::Globs(vec!["/app/**".into()])
        ));
        assert!(!applicable(
            "/other",
            &Selector::Globs(vec!["/app/**".into()])
        ));
    }

    #[test]
    fn test_can_be_listed() {
        let unlisted = vec![".DS_Store".to_string(), ".git".to_string()];
        assert!(!can_be_listed(&unlisted, ".git"));
        assert!(!can_be_listed(&unlisted, ".DS_Store"));
        assert!(can_be_listed(&unlisted, "index.html"));
    }

    #[test]
    fn test_possible_paths() {
        assert_eq!(
            possible_paths("/about", ".html"),
            vec!["/about/index.html", "/about.html"]
        );
        assert_eq!(possible_paths("/", ".html"), vec!["/index.html"]);
    }

    #[test]
    fn test_first_matching_redirect_wins() {
        let mut config = ServeConfig::default();
        config.redirects = vec![
            RedirectRule {
                source: "/a/**".into(),
                destination: "/first".into(),
                kind: 0,
            },
            RedirectRule {
                source: "/a/b".into(),
                destination: "/second".into(),
                kind: 0,
            },
        ];
        let redirect = should_redirect("/a/b", false, &config).unwrap();
        assert_eq!(redirect.target, "/first");
    }
}
