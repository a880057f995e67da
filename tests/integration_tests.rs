//! End-to-end tests driving the request pipeline over a real listener.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tempfile::TempDir;

use swerver_core::{Handler, ProxyRule, RedirectRule, RewriteRule, Selector, ServeConfig};

async fn spawn_server(config: ServeConfig) -> SocketAddr {
    let handler = Arc::new(Handler::new(Arc::new(config)).expect("valid configuration"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler.handle(req, peer).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// A minimal upstream that answers `pong` and echoes the received
/// `X-Forwarded-For` header back in `echo-x-forwarded-for`.
async fn spawn_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let service = service_fn(|req: hyper::Request<hyper::body::Incoming>| async move {
                    let mut builder = hyper::Response::builder()
                        .status(200)
                        .header("content-type", "text/plain");
                    if let Some(xff) = req.headers().get("x-forwarded-for") {
                        builder = builder.header("echo-x-forwarded-for", xff);
                    }
                    Ok::<_, Infallible>(builder.body(Full::new(Bytes::from("pong"))).unwrap())
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn site() -> (TempDir, ServeConfig) {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("index.html"), b"<h1>home</h1>").unwrap();
    std::fs::write(root.path().join("about.html"), b"<h1>about</h1>").unwrap();
    std::fs::write(root.path().join("data.bin"), b"0123456789").unwrap();

    let config = ServeConfig {
        public: root.path().to_path_buf(),
        ..ServeConfig::default()
    };
    (root, config)
}

#[tokio::test]
async fn test_serves_index_for_root() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), "<h1>home</h1>");
}

#[tokio::test]
async fn test_clean_urls_redirect_and_resolve() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/about.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 307);
    assert_eq!(response.headers()["location"], "/about");

    let response = client()
        .get(format!("http://{addr}/about"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>about</h1>");
}

#[tokio::test]
async fn test_rewrite_serves_destination() {
    let (_root, mut config) = site();
    config.rewrites = vec![RewriteRule {
        source: "/app/**".into(),
        destination: "/index.html".into(),
    }];
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/app/x/y"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>home</h1>");
}

#[tokio::test]
async fn test_redirect_rule_with_captures() {
    let (_root, mut config) = site();
    config.redirects = vec![RedirectRule {
        source: "/old/:page".into(),
        destination: "/new/:page".into(),
        kind: 301,
    }];
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/old/contact"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 301);
    assert_eq!(response.headers()["location"], "/new/contact");
}

#[tokio::test]
async fn test_single_range() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/data.bin"))
        .header("range", "bytes=0-4")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()["content-range"], "bytes 0-4/10");
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], b"01234");
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/data.bin"))
        .header("range", "bytes=100-")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 416);
    assert_eq!(response.headers()["content-range"], "bytes */10");
}

#[tokio::test]
async fn test_proxy_round_trip() {
    let upstream = spawn_upstream().await;

    let (_root, mut config) = site();
    config.proxy = vec![ProxyRule {
        source: "/api/*".into(),
        destination: format!("http://{upstream}/$1"),
    }];
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/api/ping"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let forwarded = response.headers()["echo-x-forwarded-for"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(forwarded.contains("127.0.0.1"), "got {forwarded:?}");
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_not_found_json_body() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/missing"))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_directory_listing() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("notes.txt"), b"x").unwrap();
    std::fs::create_dir(root.path().join("sub")).unwrap();

    let config = ServeConfig {
        public: root.path().to_path_buf(),
        ..ServeConfig::default()
    };
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let page = response.text().await.unwrap();
    assert!(page.contains("notes.txt"));
    assert!(page.contains("sub/"));

    let response = client()
        .get(format!("http://{addr}/"))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    let listing: serde_json::Value =
        serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(listing["files"][0]["name"], "notes.txt");
}

#[tokio::test]
async fn test_listing_disabled_yields_not_found() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("notes.txt"), b"x").unwrap();

    let config = ServeConfig {
        public: root.path().to_path_buf(),
        directory_listing: Selector::Disabled,
        clean_urls: Selector::Disabled,
        ..ServeConfig::default()
    };
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_head_matches_get() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let get = client()
        .get(format!("http://{addr}/data.bin"))
        .send()
        .await
        .unwrap();
    let head = client()
        .head(format!("http://{addr}/data.bin"))
        .send()
        .await
        .unwrap();

    assert_eq!(get.status(), head.status());
    for name in ["content-type", "content-length", "accept-ranges", "etag"] {
        assert_eq!(get.headers().get(name), head.headers().get(name), "{name}");
    }
    assert!(head.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_path_escape_rejected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (_root, config) = site();
    let addr = spawn_server(config).await;

    // A dot-dot request target; sent raw because HTTP clients normalize
    // the path away before it reaches the wire.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /../../etc/passwd HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(
        response.starts_with("HTTP/1.1 400"),
        "got {}",
        response.lines().next().unwrap_or("")
    );
}

#[tokio::test]
async fn test_header_overrides_applied() {
    let (_root, mut config) = site();
    config.headers = vec![swerver_core::HeaderRule {
        source: "**/*.bin".into(),
        headers: vec![swerver_core::config::HeaderValue {
            key: "Cache-Control".into(),
            value: "max-age=3600".into(),
        }],
    }];
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/data.bin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["cache-control"], "max-age=3600");
}

#[tokio::test]
async fn test_trailing_slash_redirect() {
    let (_root, mut config) = site();
    config.trailing_slash = Some(true);
    std::fs::create_dir(_root.path().join("docs")).unwrap();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 301);
    assert_eq!(response.headers()["location"], "/docs/");
}

#[tokio::test]
async fn test_conditional_get_not_modified() {
    let (_root, config) = site();
    let addr = spawn_server(config).await;

    let first = client()
        .get(format!("http://{addr}/data.bin"))
        .send()
        .await
        .unwrap();
    let etag = first.headers()["etag"].to_str().unwrap().to_string();

    let second = client()
        .get(format!("http://{addr}/data.bin"))
        .header("if-none-match", etag)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 304);
    assert!(second.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_error_page() {
    let (_root, config) = site();
    std::fs::write(_root.path().join("404.html"), b"<h1>gone</h1>").unwrap();
    let addr = spawn_server(config).await;

    let response = client()
        .get(format!("http://{addr}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "<h1>gone</h1>");
}
