//! Configuration model for swerver.
//!
//! The `swerver.json` file is deserialized into a raw serde-facing schema
//! and converted into [`ServeConfig`], the typed, immutable view the
//! pipeline consumes. Pattern problems are reported here, at startup, never
//! per request.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ServeError};
use crate::glob::{Glob, MatchOptions};
use crate::path::slasher;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "swerver.json";

/// Default status code for redirects.
pub const DEFAULT_REDIRECT_STATUS: u16 = 307;

/// Entries hidden from directory listings unless configured otherwise.
pub const DEFAULT_UNLISTED: &[&str] = &[".DS_Store", ".git"];

/// A boolean-or-glob-list selector, as used by `cleanUrls` and
/// `directoryListing`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Applies to every path.
    #[default]
    All,
    /// Disabled entirely.
    Disabled,
    /// Applies to paths matching at least one glob.
    Globs(Vec<String>),
}

impl Selector {
    fn from_raw(raw: Option<BoolOrGlobs>) -> Self {
        match raw {
            None | Some(BoolOrGlobs::Bool(true)) => Selector::All,
            Some(BoolOrGlobs::Bool(false)) => Selector::Disabled,
            Some(BoolOrGlobs::Globs(globs)) => Selector::Globs(globs),
        }
    }

    /// The globs to validate at startup, if any.
    pub fn globs(&self) -> &[String] {
        match self {
            Selector::Globs(globs) => globs,
            _ => &[],
        }
    }
}

/// A rewrite rule: requests matching `source` resolve to `destination`
/// internally, without a redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRule {
    pub source: String,
    pub destination: String,
}

/// A redirect rule. `kind` of zero stands for the default status (307).
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectRule {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type", default)]
    pub kind: u16,
}

/// A proxy rule: requests matching `source` forward to the upstream URL
/// produced from `destination`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRule {
    pub source: String,
    pub destination: String,
}

/// One header override: `key: value` applied to responses for paths
/// matching `source`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderValue {
    pub key: String,
    pub value: String,
}

/// Header overrides for paths matching a glob.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderRule {
    pub source: String,
    pub headers: Vec<HeaderValue>,
}

/// TLS key material. Both paths must be set for TLS to be enabled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    #[serde(default)]
    pub key_file: String,
    #[serde(default)]
    pub cert_file: String,
}

impl SslConfig {
    /// True when both a key and a certificate are configured.
    pub fn is_enabled(&self) -> bool {
        !self.key_file.is_empty() && !self.cert_file.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BoolOrGlobs {
    Bool(bool),
    Globs(Vec<String>),
}

// Configuration file schema, as written by users.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    public: String,
    clean_urls: Option<BoolOrGlobs>,
    rewrites: Vec<RewriteRule>,
    redirects: Vec<RedirectRule>,
    proxy: Vec<ProxyRule>,
    headers: Vec<HeaderRule>,
    directory_listing: Option<BoolOrGlobs>,
    unlisted: Option<Vec<String>>,
    trailing_slash: Option<bool>,
    render_single: bool,
    symlinks: bool,
    ssl: SslConfig,
}

/// Typed view of the user-supplied configuration. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Absolute path of the public root directory.
    pub public: PathBuf,
    /// Clean-URL selector.
    pub clean_urls: Selector,
    /// Ordered rewrite rules, applied non-reentrantly.
    pub rewrites: Vec<RewriteRule>,
    /// Ordered redirect rules.
    pub redirects: Vec<RedirectRule>,
    /// Ordered proxy rules, routed before the file pipeline.
    pub proxy: Vec<ProxyRule>,
    /// Header override rules, applied after a response is produced.
    pub headers: Vec<HeaderRule>,
    /// Directory listing selector.
    pub directory_listing: Selector,
    /// Globs excluded from directory listings.
    pub unlisted: Vec<String>,
    /// Trailing-slash policy; `None` leaves paths alone.
    pub trailing_slash: Option<bool>,
    /// Serve the sole file of a directory instead of its listing.
    pub render_single: bool,
    /// Resolve symlinks instead of reporting 404.
    pub symlinks: bool,
    /// TLS key material.
    pub ssl: SslConfig,

    // Not part of the configuration file; set from CLI flags.
    /// Show debugging information.
    pub debug: bool,
    /// Disable response compression in the outer router.
    pub no_compression: bool,
    /// Copy the first local address to the clipboard on startup.
    pub clipboard: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            public: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            clean_urls: Selector::All,
            rewrites: Vec::new(),
            redirects: Vec::new(),
            proxy: Vec::new(),
            headers: Vec::new(),
            directory_listing: Selector::All,
            unlisted: DEFAULT_UNLISTED.iter().map(|s| s.to_string()).collect(),
            trailing_slash: None,
            render_single: false,
            symlinks: false,
            ssl: SslConfig::default(),
            debug: false,
            no_compression: false,
            clipboard: true,
        }
    }
}

impl ServeConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the defaults, matching the behavior of running
    /// without a configuration file. Parse errors and invalid patterns are
    /// reported as [`ServeError::ConfigError`] / [`ServeError::PatternError`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfig = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|err| ServeError::ConfigError(format!("{}: {err}", path.display())))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
            Err(err) => return Err(ServeError::Io(err)),
        };

        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let cwd = env::current_dir().map_err(ServeError::Io)?;
        let public = if raw.public.is_empty() {
            cwd
        } else {
            cwd.join(raw.public)
        };

        let unlisted = match raw.unlisted {
            Some(globs) if !globs.is_empty() => globs,
            _ => DEFAULT_UNLISTED.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            public,
            clean_urls: Selector::from_raw(raw.clean_urls),
            rewrites: raw.rewrites,
            redirects: raw.redirects,
            proxy: raw.proxy,
            headers: raw.headers,
            directory_listing: Selector::from_raw(raw.directory_listing),
            unlisted,
            trailing_slash: raw.trailing_slash,
            render_single: raw.render_single,
            symlinks: raw.symlinks,
            ssl: raw.ssl,
            ..Self::default()
        })
    }

    /// Compiles every configured glob once so that bad patterns fail at
    /// startup instead of at request time.
    pub fn validate(&self) -> Result<()> {
        let mut sources: Vec<&str> = Vec::new();
        sources.extend(self.clean_urls.globs().iter().map(String::as_str));
        sources.extend(self.directory_listing.globs().iter().map(String::as_str));
        sources.extend(self.unlisted.iter().map(String::as_str));
        sources.extend(self.headers.iter().map(|rule| rule.source.as_str()));
        sources.extend(self.rewrites.iter().map(|rule| rule.source.as_str()));
        sources.extend(self.redirects.iter().map(|rule| rule.source.as_str()));
        sources.extend(self.proxy.iter().map(|rule| rule.source.as_str()));

        for source in sources {
            Glob::new(&slasher(source), MatchOptions::default()).map_err(|err| {
                ServeError::PatternError(format!("invalid pattern {source:?}: {err}"))
            })?;
        }

        for rule in &self.redirects {
            if rule.kind != 0 && !(300..400).contains(&rule.kind) {
                return Err(ServeError::ConfigError(format!(
                    "redirect type {} is not a redirect status",
                    rule.kind
                )));
            }
        }

        Ok(())
    }

    /// Applies the `--single` flag: every not-found request rewrites to
    /// `/index.html` and lone files in directories are served directly.
    pub fn apply_single(&mut self) {
        self.render_single = true;
        self.rewrites.push(RewriteRule {
            source: "**".to_string(),
            destination: "/index.html".to_string(),
        });
    }
}
