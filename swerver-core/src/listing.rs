//! Directory listings.
//!
//! Enumerates a directory into the rendering model consumed by the HTML
//! template and the JSON representation: breadcrumbs decomposing the
//! request path plus per-entry details. The lister produces data only; it
//! never writes HTTP.

use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;

use crate::config::ServeConfig;
use crate::error::Result;
use crate::rules::can_be_listed;

// Everything a URL path segment cannot carry verbatim.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Details of one listed entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    /// Display name; directories carry a trailing slash.
    pub base: String,
    /// Raw entry name.
    pub name: String,
    /// Extension without the leading dot; `txt` when the entry has none.
    pub ext: String,
    /// URL the entry links to, relative to the server root, escaped.
    pub relative: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes; absent for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One breadcrumb of the request path.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

/// The rendering model of a directory listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub directory: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub files: Vec<FileDetail>,
}

/// What the lister decided for a directory.
#[derive(Debug)]
pub enum ListOutcome {
    /// Render this listing.
    Listing(DirectoryListing),
    /// The directory holds exactly one file; serve it instead.
    SingleFile(PathBuf),
}

/// Enumerates `absolute_path` for the request path `relative_path`.
///
/// Entries matching an `unlisted` glob are omitted. With `renderSingle`
/// enabled, a directory whose only entry is a file short-circuits to
/// [`ListOutcome::SingleFile`].
pub async fn render_directory(
    config: &ServeConfig,
    relative_path: &str,
    absolute_path: &Path,
) -> Result<ListOutcome> {
    let mut reader = tokio::fs::read_dir(absolute_path).await?;

    let mut entries: Vec<(String, bool, Option<u64>)> = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata().await?;
        let is_dir = metadata.is_dir();
        let size = (!is_dir).then(|| metadata.len());
        entries.push((name, is_dir, size));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if config.render_single && entries.len() == 1 && !entries[0].1 {
        return Ok(ListOutcome::SingleFile(absolute_path.join(&entries[0].0)));
    }

    let need_slash = if relative_path.ends_with('/') { "" } else { "/" };

    let mut files = Vec::new();
    for (name, is_dir, size) in entries {
        if !can_be_listed(&config.unlisted, &name) {
            continue;
        }

        let escaped = utf8_percent_encode(&name, SEGMENT).to_string();
        let mut base = name.clone();
        let mut relative = format!("{relative_path}{need_slash}{escaped}");
        if is_dir {
            base.push('/');
            relative.push('/');
        }

        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
            _ => "txt".to_string(),
        };

        files.push(FileDetail {
            base,
            name,
            ext,
            relative,
            is_dir,
            size,
        });
    }

    Ok(ListOutcome::Listing(DirectoryListing {
        directory: relative_path.to_string(),
        breadcrumbs: breadcrumbs(relative_path),
        files,
    }))
}

/// Decomposes a request path into breadcrumbs with cumulative URLs and a
/// synthetic root entry.
pub fn breadcrumbs(relative_path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        name: "root".to_string(),
        url: "/".to_string(),
    }];

    let mut prefix = String::from("/");
    for part in relative_path.split('/') {
        if part.is_empty() {
            continue;
        }
        let escaped = utf8_percent_encode(part, SEGMENT).to_string();
        prefix.push_str(&escaped);
        prefix.push('/');
        crumbs.push(Breadcrumb {
            name: part.to_string(),
            url: prefix.clone(),
        });
    }

    crumbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(root: &TempDir) -> ServeConfig {
        ServeConfig {
            public: root.path().to_path_buf(),
            ..ServeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_listing_sorted_with_details() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("b.txt"), b"hello").unwrap();
        fs::write(root.path().join("a.css"), b"x").unwrap();
        fs::create_dir(root.path().join("sub")).unwrap();

        let config = config_for(&root);
        let outcome = render_directory(&config, "/", root.path()).await.unwrap();
        let listing = match outcome {
            ListOutcome::Listing(listing) => listing,
            other => panic!("expected listing, got {other:?}"),
        };

        let names: Vec<&str> = listing.files.iter().map(|f| f.base.as_str()).collect();
        assert_eq!(names, vec!["a.css", "b.txt", "sub/"]);

        let sub = &listing.files[2];
        assert!(sub.is_dir);
        assert_eq!(sub.relative, "/sub/");
        assert_eq!(sub.size, None);

        let b = &listing.files[1];
        assert_eq!(b.ext, "txt");
        assert_eq!(b.relative, "/b.txt");
        assert_eq!(b.size, Some(5));
    }

    #[tokio::test]
    async fn test_unlisted_entries_hidden() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.html"), b"x").unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        fs::write(root.path().join(".DS_Store"), b"x").unwrap();

        let config = config_for(&root);
        let outcome = render_directory(&config, "/", root.path()).await.unwrap();
        let listing = match outcome {
            ListOutcome::Listing(listing) => listing,
            other => panic!("expected listing, got {other:?}"),
        };

        let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["index.html"]);
    }

    #[tokio::test]
    async fn test_render_single() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("only.pdf"), b"x").unwrap();

        let mut config = config_for(&root);
        config.render_single = true;

        let outcome = render_directory(&config, "/", root.path()).await.unwrap();
        match outcome {
            ListOutcome::SingleFile(path) => {
                assert_eq!(path, root.path().join("only.pdf"));
            }
            other => panic!("expected single file, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_render_single_needs_exactly_one_file() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"x").unwrap();
        fs::write(root.path().join("b.txt"), b"x").unwrap();

        let mut config = config_for(&root);
        config.render_single = true;

        let outcome = render_directory(&config, "/", root.path()).await.unwrap();
        assert!(matches!(outcome, ListOutcome::Listing(_)));
    }

    #[tokio::test]
    async fn test_subdirectory_relative_urls() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        fs::write(root.path().join("docs/guide.md"), b"x").unwrap();

        let config = config_for(&root);
        let outcome = render_directory(&config, "/docs", &root.path().join("docs"))
            .await
            .unwrap();
        let listing = match outcome {
            ListOutcome::Listing(listing) => listing,
            other => panic!("expected listing, got {other:?}"),
        };
        assert_eq!(listing.files[0].relative, "/docs/guide.md");
    }

    #[tokio::test]
    async fn test_names_escaped_in_urls() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("my file?.txt"), b"x").unwrap();

        let config = config_for(&root);
        let outcome = render_directory(&config, "/", root.path()).await.unwrap();
        let listing = match outcome {
            ListOutcome::Listing(listing) => listing,
            other => panic!("expected listing, got {other:?}"),
        };
        assert_eq!(listing.files[0].relative, "/my%20file%3F.txt");
        assert_eq!(listing.files[0].name, "my file?.txt");
    }

    #[test]
    fn test_breadcrumbs() {
        let crumbs = breadcrumbs("/a/b");
        assert_eq!(
            crumbs,
            vec![
                Breadcrumb {
                    name: "root".into(),
                    url: "/".into()
                },
                Breadcrumb {
                    name: "a".into(),
                    url: "/a/".into()
                },
                Breadcrumb {
                    name: "b".into(),
                    url: "/a/b/".into()
                },
            ]
        );

        assert_eq!(breadcrumbs("/").len(), 1);
    }

    #[test]
    fn test_extension_defaults() {
        // Dotfiles and extension-less names render as txt.
        for name in ["README", ".gitignore"] {
            let ext = match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
                _ => "txt".to_string(),
            };
            assert_eq!(ext, "txt", "for {name}");
        }
    }
}
