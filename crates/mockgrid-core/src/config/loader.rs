//! Configuration loading: single files, directory trees, format detection,
//! and identifier auto-fill.
//!
//! The loader is the only component that touches the filesystem for mock
//! configuration. It hands back a validated [`Collection`] together with the
//! modification times of every file it read, which the watcher polls for
//! hot reload.

use crate::config::env_subst::substitute_env;
use crate::config::model::{Collection, Mock};
use crate::config::validate::validate_collection;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Options controlling directory loads
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Descend into subdirectories (default on)
    pub recursive: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { recursive: true }
    }
}

/// A per-file failure collected during a directory load
#[derive(Debug)]
pub struct FileLoadError {
    /// File the failure came from
    pub path: PathBuf,
    /// What went wrong
    pub error: Error,
}

/// Result of loading a path: the merged collection plus watcher bookkeeping
#[derive(Debug)]
pub struct LoadedCollection {
    /// The validated (possibly partial, in directory mode) collection
    pub collection: Collection,
    /// Modification time of every file that was read, for the watcher
    pub tracked_files: HashMap<PathBuf, SystemTime>,
    /// Number of configuration files encountered
    pub file_count: usize,
    /// Non-fatal per-file errors from directory mode
    pub errors: Vec<FileLoadError>,
}

/// Load a configuration file or directory with default options.
pub async fn load_path<P: AsRef<Path>>(path: P) -> Result<LoadedCollection> {
    load_path_with_options(path, &LoaderOptions::default()).await
}

/// Load a configuration file or directory.
///
/// A file load fails on the first error. A directory load accumulates
/// per-file errors and still returns the partial collection so callers can
/// decide whether to proceed.
pub async fn load_path_with_options<P: AsRef<Path>>(
    path: P,
    options: &LoaderOptions,
) -> Result<LoadedCollection> {
    let path = path.as_ref();
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => return Err(io_error_for(path, e)),
    };

    if metadata.is_dir() {
        load_directory(path, options).await
    } else {
        load_single_file(path).await
    }
}

async fn load_single_file(path: &Path) -> Result<LoadedCollection> {
    let mut collection = parse_file(path).await?;
    for mock in &mut collection.mocks {
        mock.ensure_identity();
    }

    let failures = validate_collection(&collection);
    if !failures.is_empty() {
        return Err(Error::validation_all(failures));
    }

    let mut tracked_files = HashMap::new();
    if let Ok(modified) = file_mtime(path).await {
        tracked_files.insert(path.to_path_buf(), modified);
    }

    info!(path = %path.display(), mocks = collection.mocks.len(), "loaded collection");
    Ok(LoadedCollection {
        collection,
        tracked_files,
        file_count: 1,
        errors: Vec::new(),
    })
}

async fn load_directory(root: &Path, options: &LoaderOptions) -> Result<LoadedCollection> {
    let mut files = collect_config_files(root, options.recursive)?;
    files.sort();

    let mut merged = Collection::default();
    let mut tracked_files = HashMap::new();
    let mut errors = Vec::new();
    // Running counter for mocks that arrived without an id, shared across
    // every file of this load.
    let mut anonymous_counter = 0usize;

    for file in &files {
        if let Ok(modified) = file_mtime(file).await {
            tracked_files.insert(file.clone(), modified);
        }

        let mut collection = match parse_file(file).await {
            Ok(c) => c,
            Err(error) => {
                warn!(path = %file.display(), %error, "skipping unloadable file");
                errors.push(FileLoadError {
                    path: file.clone(),
                    error,
                });
                continue;
            }
        };

        disambiguate_ids(&mut collection.mocks, root, file, &mut anonymous_counter);
        for mock in &mut collection.mocks {
            mock.ensure_identity();
        }

        let failures = validate_collection(&collection);
        if !failures.is_empty() {
            errors.push(FileLoadError {
                path: file.clone(),
                error: Error::validation_all(failures),
            });
            continue;
        }

        merged.merge(collection);
    }

    let failures = validate_collection(&merged);
    if !failures.is_empty() {
        // Cross-file problems (duplicate resource or operation names) are
        // reported against the directory itself.
        errors.push(FileLoadError {
            path: root.to_path_buf(),
            error: Error::validation_all(failures),
        });
    }

    info!(
        path = %root.display(),
        files = files.len(),
        mocks = merged.mocks.len(),
        failed = errors.len(),
        "loaded collection directory"
    );

    Ok(LoadedCollection {
        file_count: files.len(),
        collection: merged,
        tracked_files,
        errors,
    })
}

/// Prefix every mock id with the file's root-relative path so two files with
/// the same name in different subdirectories can never collide.
fn disambiguate_ids(mocks: &mut [Mock], root: &Path, file: &Path, anonymous_counter: &mut usize) {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut stem = relative.with_extension("");
    if stem.as_os_str().is_empty() {
        stem = PathBuf::from("mock");
    }
    let prefix: String = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("-");

    for mock in mocks {
        let original = if mock.id.is_empty() {
            *anonymous_counter += 1;
            format!("mock-{anonymous_counter}")
        } else {
            mock.id.clone()
        };
        mock.id = format!("{prefix}-{original}");
    }
}

fn collect_config_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let pattern = if recursive {
        "**/*.{json,yaml,yml}"
    } else {
        "*.{json,yaml,yml}"
    };
    let walker = globwalk::GlobWalkerBuilder::from_patterns(root, &[pattern])
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::invalid_syntax(format!("bad glob pattern: {e}")))?;

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            Err(e) => debug!(%e, "skipping unreadable directory entry"),
        }
    }
    Ok(files)
}

async fn parse_file(path: &Path) -> Result<Collection> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => return Err(io_error_for(path, e)),
    };
    if raw.is_empty() {
        return Err(Error::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let substituted = substitute_env(&raw);
    let document = parse_document(path, &substituted)?;
    normalize_document(document)
}

/// Parse raw text by extension: `.yaml`/`.yml` are YAML, anything else is
/// JSON, and extensionless files that fail JSON are retried as YAML.
fn parse_document(path: &Path, text: &str) -> Result<Value> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(text)
            .map_err(|e| Error::invalid_syntax(format!("YAML parse error: {e}"))),
        Some(_) => serde_json::from_str(text)
            .map_err(|e| Error::invalid_syntax(format!("JSON parse error: {e}"))),
        None => match serde_json::from_str(text) {
            Ok(value) => Ok(value),
            Err(json_err) => serde_yaml::from_str(text).map_err(|yaml_err| {
                Error::invalid_syntax(format!(
                    "JSON parse error: {json_err}; YAML parse error: {yaml_err}"
                ))
            }),
        },
    }
}

/// Normalize the three accepted document shapes (collection, single mock,
/// mock sequence) into a collection.
fn normalize_document(document: Value) -> Result<Collection> {
    match document {
        Value::Object(map) => {
            if map.contains_key("endpoints") {
                return Err(Error::LegacyFormat);
            }
            let is_collection = map.contains_key("version");
            let document = Value::Object(map);
            if is_collection {
                return serde_json::from_value(document).map_err(Error::from);
            }
            let mock: Mock = serde_json::from_value(document)?;
            Ok(Collection {
                mocks: vec![mock],
                ..Default::default()
            })
        }
        Value::Array(_) => {
            let mocks: Vec<Mock> = serde_json::from_value(document)?;
            Ok(Collection {
                mocks,
                ..Default::default()
            })
        }
        other => Err(Error::invalid_syntax(format!(
            "expected an object or a sequence of mocks, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn file_mtime(path: &Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| io_error_for(path, e))?;
    metadata.modified().map_err(Error::from)
}

fn io_error_for(path: &Path, error: std::io::Error) -> Error {
    match error.kind() {
        std::io::ErrorKind::NotFound => Error::not_found(path),
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Error::Io(error),
    }
}

/// Serialize a collection back to disk, choosing the format by extension.
pub async fn save_collection<P: AsRef<Path>>(path: P, collection: &Collection) -> Result<()> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let content = match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::to_string(collection)?,
        _ => serde_json::to_string_pretty(collection)?,
    };
    tokio::fs::write(path, content).await.map_err(|e| io_error_for(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, content).expect("write");
        path
    }

    const SIMPLE_COLLECTION: &str = r#"
version: "1.0"
mocks:
  - id: get-users
    http:
      matcher:
        method: GET
        path: /users
      response:
        status: 200
"#;

    #[tokio::test]
    async fn test_load_yaml_collection() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "mocks.yaml", SIMPLE_COLLECTION);

        let loaded = load_path(&path).await.expect("load");
        assert_eq!(loaded.collection.mocks.len(), 1);
        assert_eq!(loaded.collection.mocks[0].id, "get-users");
        assert_eq!(loaded.file_count, 1);
        assert!(loaded.tracked_files.contains_key(&path));
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_path(dir.path().join("nope.yaml")).await.expect_err("must fail");
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_file_is_distinct_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "empty.json", "");
        let err = load_path(&path).await.expect_err("must fail");
        assert!(matches!(err, Error::EmptyFile { .. }));
    }

    #[tokio::test]
    async fn test_legacy_endpoints_format_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            "old.yaml",
            "endpoints:\n  - path: /users\n    method: GET\n",
        );
        let err = load_path(&path).await.expect_err("must fail");
        assert!(err.is_legacy_format());
    }

    #[tokio::test]
    async fn test_invalid_syntax() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "broken.json", "{ not json");
        let err = load_path(&path).await.expect_err("must fail");
        assert!(matches!(err, Error::InvalidSyntax { .. }));
    }

    #[tokio::test]
    async fn test_single_mock_document_normalizes() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            "one.yaml",
            "http:\n  matcher:\n    path: /ping\n  response:\n    status: 204\n",
        );
        let loaded = load_path(&path).await.expect("load");
        assert_eq!(loaded.collection.mocks.len(), 1);
        assert!(loaded.collection.mocks[0].id.starts_with("http_"));
    }

    #[tokio::test]
    async fn test_mock_sequence_document_normalizes() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            "many.yaml",
            r#"
- id: a
  http:
    matcher: { path: /a }
    response: { status: 200 }
- id: b
  http:
    matcher: { path: /b }
    response: { status: 200 }
"#,
        );
        let loaded = load_path(&path).await.expect("load");
        let ids: Vec<&str> = loaded.collection.mocks.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_extensionless_file_tries_json_then_yaml() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "mocks", SIMPLE_COLLECTION);
        let loaded = load_path(&path).await.expect("load");
        assert_eq!(loaded.collection.mocks.len(), 1);
    }

    #[tokio::test]
    async fn test_env_default_substitution_applies_before_parse() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(
            &dir,
            "subst.yaml",
            "version: \"1.0\"\nmocks:\n  - id: s\n    http:\n      matcher:\n        path: ${MOCKGRID_TEST_UNSET_PATH:-/fallback}\n      response:\n        status: 200\n",
        );
        let loaded = load_path(&path).await.expect("load");
        let matcher = &loaded.collection.mocks[0].http.as_ref().expect("http").matcher;
        assert_eq!(matcher.path.as_deref(), Some("/fallback"));
    }

    #[tokio::test]
    async fn test_directory_load_disambiguates_same_file_names() {
        let dir = TempDir::new().expect("tempdir");
        write(
            &dir,
            "users/api.yaml",
            "version: \"1.0\"\nmocks:\n  - id: get-item\n    http:\n      matcher: { path: /users }\n      response: { status: 200 }\n",
        );
        write(
            &dir,
            "products/api.yaml",
            "version: \"1.0\"\nmocks:\n  - id: get-item\n    http:\n      matcher: { path: /products }\n      response: { status: 200 }\n",
        );

        let loaded = load_path(dir.path()).await.expect("load");
        assert!(loaded.errors.is_empty(), "unexpected errors: {:?}", loaded.errors);
        let mut ids: Vec<&str> = loaded.collection.mocks.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["products-api-get-item", "users-api-get-item"]);
    }

    #[tokio::test]
    async fn test_directory_load_numbers_anonymous_mocks() {
        let dir = TempDir::new().expect("tempdir");
        write(
            &dir,
            "anon.yaml",
            "version: \"1.0\"\nmocks:\n  - http:\n      matcher: { path: /a }\n      response: { status: 200 }\n  - http:\n      matcher: { path: /b }\n      response: { status: 200 }\n",
        );
        let loaded = load_path(dir.path()).await.expect("load");
        let ids: Vec<&str> = loaded.collection.mocks.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"anon-mock-1"));
        assert!(ids.contains(&"anon-mock-2"));
    }

    #[tokio::test]
    async fn test_directory_load_accumulates_errors_and_partial_collection() {
        let dir = TempDir::new().expect("tempdir");
        write(&dir, "good.yaml", SIMPLE_COLLECTION);
        write(&dir, "bad.json", "{ nope");

        let loaded = load_path(dir.path()).await.expect("load");
        assert_eq!(loaded.file_count, 2);
        assert_eq!(loaded.collection.mocks.len(), 1);
        assert_eq!(loaded.errors.len(), 1);
        assert!(matches!(loaded.errors[0].error, Error::InvalidSyntax { .. }));
    }

    #[tokio::test]
    async fn test_non_recursive_skips_subdirectories() {
        let dir = TempDir::new().expect("tempdir");
        write(&dir, "top.yaml", SIMPLE_COLLECTION);
        write(&dir, "nested/deep.yaml", SIMPLE_COLLECTION);

        let options = LoaderOptions { recursive: false };
        let loaded = load_path_with_options(dir.path(), &options).await.expect("load");
        assert_eq!(loaded.file_count, 1);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let source = write(&dir, "in.yaml", SIMPLE_COLLECTION);
        let loaded = load_path(&source).await.expect("load");

        let out = dir.path().join("out.json");
        save_collection(&out, &loaded.collection).await.expect("save");
        let reloaded = load_path(&out).await.expect("reload");

        assert_eq!(reloaded.collection.mocks.len(), loaded.collection.mocks.len());
        assert_eq!(reloaded.collection.mocks[0].id, "get-users");
    }
}
