//! swerver - a configurable static HTTP(S) file server
//!
//! Serves files from a public directory with clean URLs, rewrites,
//! redirects, directory listings, proxying and optional TLS.

#![forbid(unsafe_code)]

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::EnvFilter;

use swerver_core::{Handler, ServeConfig, DEFAULT_CONFIG_FILE};

mod args;
mod server;

use args::Args;

/// Graceful shutdown timeout in seconds
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = match ServeConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ Configuration error: {err}");
            std::process::exit(1);
        }
    };

    // CLI flags override the configuration file.
    if let Some(public) = &args.public {
        config.public = public.clone();
    }
    if args.single {
        config.apply_single();
    }
    config.debug = args.debug;
    config.clipboard = !args.no_clipboard;
    config.no_compression = args.no_compression;
    if args.symlinks {
        config.symlinks = true;
    }

    config.public = match config.public.canonicalize() {
        Ok(public) => public,
        Err(err) => {
            eprintln!(
                "❌ Public directory {} is not accessible: {err}",
                config.public.display()
            );
            std::process::exit(1);
        }
    };

    let tls = if config.ssl.is_enabled() {
        match swerver_core::tls::acceptor(&config.ssl) {
            Ok(acceptor) => Some(acceptor),
            Err(err) => {
                eprintln!("❌ TLS error: {err}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let endpoints = args.endpoints();

    let handler = match Handler::new(Arc::new(config)) {
        Ok(handler) => Arc::new(handler),
        Err(err) => {
            eprintln!("❌ Configuration error: {err}");
            std::process::exit(1);
        }
    };

    server::print_startup_info(handler.config(), &endpoints);

    // Bind every endpoint up front so misconfiguration fails fast.
    let mut listeners = Vec::new();
    for endpoint in &endpoints {
        let addr = match parse_endpoint(endpoint) {
            Ok(addr) => addr,
            Err(err) => {
                eprintln!("❌ Invalid listen endpoint {endpoint:?}: {err}");
                std::process::exit(1);
            }
        };
        match TcpListener::bind(addr).await {
            Ok(listener) => listeners.push(listener),
            Err(err) => {
                eprintln!("❌ Failed to bind to {addr}: {err}");
                std::process::exit(1);
            }
        }
    }

    for endpoint in &endpoints {
        println!("✅ swerver is running on port {endpoint}");
    }

    // Track active connections for graceful shutdown
    let active_connections = Arc::new(AtomicUsize::new(0));

    for listener in listeners {
        tokio::spawn(accept_loop(
            listener,
            handler.clone(),
            tls.clone(),
            active_connections.clone(),
        ));
    }

    shutdown_signal().await;
    println!("\n🛑 Shutdown signal received, stopping gracefully...");

    // Graceful shutdown: wait for active connections to finish
    let active = active_connections.load(Ordering::SeqCst);
    if active > 0 {
        println!("⏳ Waiting for {active} active connection(s) to finish...");

        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);

        while active_connections.load(Ordering::SeqCst) > 0 {
            if start.elapsed() >= timeout {
                let remaining = active_connections.load(Ordering::SeqCst);
                eprintln!(
                    "⚠️  Timeout reached, forcing shutdown with {remaining} connection(s) still active"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("✅ swerver stopped cleanly.");
}

fn parse_endpoint(endpoint: &str) -> Result<SocketAddr, String> {
    if let Ok(port) = endpoint.parse::<u16>() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    endpoint.parse::<SocketAddr>().map_err(|err| err.to_string())
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<Handler>,
    tls: Option<TlsAcceptor>,
    active_connections: Arc<AtomicUsize>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                eprintln!("⚠️  Failed to accept connection: {err}");
                continue;
            }
        };

        let handler = handler.clone();
        let tls = tls.clone();
        let connections = active_connections.clone();
        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(req, addr).await) }
            });

            let result = match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => {
                        http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                    }
                    Err(err) => {
                        tracing::debug!("TLS handshake failed from {addr}: {err}");
                        connections.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                },
                None => {
                    http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                }
            };

            if let Err(err) = result {
                tracing::debug!("connection error from {addr}: {err}");
            }

            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
