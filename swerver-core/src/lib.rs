//! swerver-core - request pipeline and matchers for the swerver file server
//!
//! This crate provides the reusable pieces of swerver:
//! - A POSIX-shell-style glob matcher with brace expansion, globstar and
//!   extglob support
//! - A named-parameter path-template matcher with reverse compilation
//! - The content server: conditional requests (RFC 7232) and byte ranges
//!   (RFC 7233) over a seekable source
//! - The request pipeline composing clean URLs, rewrites, redirects,
//!   directory listings, proxying and error rendering from configuration
//!
//! # Overview
//!
//! The binary crate wires [`Handler`] into a hyper server; everything here
//! is framework-visible but transport-agnostic enough to unit test without
//! sockets. Configuration comes from a `swerver.json` file deserialized
//! into [`ServeConfig`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use swerver_core::{Handler, ServeConfig};
//!
//! let config = Arc::new(ServeConfig::default());
//! let handler = Handler::new(config).unwrap();
//! # let _ = handler;
//! ```
//!
//! # Modules
//!
//! - [`glob`] - glob matching, brace expansion and the balanced scanner
//! - [`template`] - path templates (`/users/:id`) and reverse compilation
//! - [`rules`] - the matcher algebra of the pipeline stages
//! - [`content`] - conditional and range-aware content delivery
//! - [`listing`] - directory listing view models
//! - [`pipeline`] - the request handler
//! - [`proxy`] - upstream forwarding
//! - [`config`] - the typed configuration model
//! - [`error`] - error taxonomy and status mapping

#![forbid(unsafe_code)]

pub mod body;
pub mod conditional;
pub mod config;
pub mod content;
pub mod error;
pub mod glob;
pub mod headers;
pub mod listing;
pub mod multipart;
pub mod path;
pub mod pipeline;
pub mod proxy;
pub mod range;
pub mod rules;
pub mod template;
pub mod templates;
pub mod tls;

// Re-export commonly used items at crate root
pub use body::ServeBody;
pub use config::{
    HeaderRule, ProxyRule, RedirectRule, RewriteRule, Selector, ServeConfig, SslConfig,
    DEFAULT_CONFIG_FILE,
};
pub use error::{Result, ServeError};
pub use pipeline::Handler;
