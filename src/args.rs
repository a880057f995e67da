use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for swerver
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(disable_version_flag = true)]
pub struct Args {
    /// Directory to serve (overrides the configuration file)
    pub public: Option<PathBuf>,

    /// Display the current version of swerver
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Specify a port to listen on; may be given more than once to listen
    /// in multiple places
    #[arg(short, long, default_value = "5000")]
    pub listen: Vec<String>,

    /// Port (deprecated, use --listen)
    #[arg(short, long, hide = true)]
    pub port: Option<String>,

    /// Show debugging information
    #[arg(short, long)]
    pub debug: bool,

    /// Rewrite all not-found requests to `index.html`
    #[arg(short, long)]
    pub single: bool,

    /// Do not copy the local address to the clipboard
    #[arg(short = 'n', long)]
    pub no_clipboard: bool,

    /// Disable compression for files served
    #[arg(short = 'u', long)]
    pub no_compression: bool,

    /// Resolve symlinks instead of showing 404 errors
    #[arg(short = 'S', long)]
    pub symlinks: bool,

    /// Specify a custom path to `swerver.json`
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// The listen endpoints with the deprecated `--port` flag folded in.
    pub fn endpoints(&self) -> Vec<String> {
        let mut listen = self.listen.clone();
        if let Some(port) = &self.port {
            if listen == ["5000"] {
                listen = vec![port.clone()];
            } else {
                listen.push(port.clone());
            }
        }
        if listen.is_empty() {
            listen.push("5000".to_string());
        }
        listen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen() {
        let args = Args::parse_from(["swerver"]);
        assert_eq!(args.endpoints(), vec!["5000"]);
    }

    #[test]
    fn test_listen_repeatable() {
        let args = Args::parse_from(["swerver", "-l", "3000", "-l", "3001"]);
        assert_eq!(args.endpoints(), vec!["3000", "3001"]);
    }

    #[test]
    fn test_port_replaces_default() {
        let args = Args::parse_from(["swerver", "-p", "8080"]);
        assert_eq!(args.endpoints(), vec!["8080"]);
    }

    #[test]
    fn test_port_appends_to_explicit_listen() {
        let args = Args::parse_from(["swerver", "-l", "3000", "-p", "8080"]);
        assert_eq!(args.endpoints(), vec!["3000", "8080"]);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["swerver", "-s", "-d", "-S", "-u", "-n", "public"]);
        assert!(args.single);
        assert!(args.debug);
        assert!(args.symlinks);
        assert!(args.no_compression);
        assert!(args.no_clipboard);
        assert_eq!(args.public, Some(PathBuf::from("public")));
    }
}
