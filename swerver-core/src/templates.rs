//! Built-in response templates.
//!
//! The error page and the directory listing are rendered from small
//! built-in HTML templates; clients accepting `application/json` receive
//! the JSON representations instead.

use serde::Serialize;

use crate::error::ServeError;
use crate::listing::DirectoryListing;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorInfo<'a> {
    error: ErrorBody<'a>,
}

/// The JSON error body: `{"error": {"code": …, "message": …}}`.
pub fn error_json(err: &ServeError) -> String {
    let info = ErrorInfo {
        error: ErrorBody {
            code: err.slug(),
            message: err.user_message(),
        },
    };
    serde_json::to_string(&info).unwrap_or_else(|_| {
        r#"{"error":{"code":"internal_server_error","message":"A server error has occurred"}}"#
            .to_string()
    })
}

/// The built-in HTML error page.
pub fn error_html(status: u16, err: &ServeError) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{status} &mdash; {message}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 10vh auto; max-width: 36em; color: #333; }}
h1 {{ font-size: 4em; margin-bottom: 0; color: #111; }}
p {{ font-size: 1.2em; color: #666; }}
</style>
</head>
<body>
<h1>{status}</h1>
<p>{message}</p>
</body>
</html>
"#,
        message = escape(err.user_message()),
    )
}

/// The built-in directory listing page.
pub fn directory_html(listing: &DirectoryListing) -> String {
    let mut crumbs = String::new();
    for (index, crumb) in listing.breadcrumbs.iter().enumerate() {
        if index > 0 {
            crumbs.push_str(" / ");
        }
        crumbs.push_str(&format!(
            r#"<a href="{}">{}</a>"#,
            escape(&crumb.url),
            escape(&crumb.name)
        ));
    }

    let mut rows = String::new();
    for file in &listing.files {
        let size = file
            .size
            .map(|bytes| bytes.to_string())
            .unwrap_or_else(|| "&mdash;".to_string());
        rows.push_str(&format!(
            "<tr><td><a href=\"{href}\">{name}</a></td><td>{ext}</td><td>{size}</td></tr>\n",
            href = escape(&file.relative),
            name = escape(&file.base),
            ext = escape(&file.ext),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Index of {directory}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 5vh auto; max-width: 48em; color: #333; }}
table {{ border-collapse: collapse; width: 100%; }}
td {{ padding: 0.3em 1em 0.3em 0; border-bottom: 1px solid #eee; }}
a {{ text-decoration: none; }}
</style>
</head>
<body>
<h1>{crumbs}</h1>
<table>
{rows}</table>
</body>
</html>
"#,
        directory = escape(&listing.directory),
    )
}

// Minimal HTML escaping for text and attribute positions.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{Breadcrumb, DirectoryListing, FileDetail};

    #[test]
    fn test_error_json_shape() {
        let body = error_json(&ServeError::NotFound("/x".into()));
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["error"]["code"], "not_found");
        assert_eq!(
            parsed["error"]["message"],
            "The requested path could not be found"
        );
    }

    #[test]
    fn test_error_html_contains_status() {
        let page = error_html(404, &ServeError::NotFound("/x".into()));
        assert!(page.contains("404"));
        assert!(page.contains("could not be found"));
    }

    #[test]
    fn test_directory_html_escapes_names() {
        let listing = DirectoryListing {
            directory: "/".into(),
            breadcrumbs: vec![Breadcrumb {
                name: "root".into(),
                url: "/".into(),
            }],
            files: vec![FileDetail {
                base: "<script>.txt".into(),
                name: "<script>.txt".into(),
                ext: "txt".into(),
                relative: "/%3Cscript%3E.txt".into(),
                is_dir: false,
                size: Some(12),
            }],
        };

        let page = directory_html(&listing);
        assert!(page.contains("&lt;script&gt;.txt"));
        assert!(!page.contains("<script>.txt"));
        assert!(page.contains("12"));
    }
}
