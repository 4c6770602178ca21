//! Configuration loading from disk.
//!
//! # Data Flow
//! ```text
//! search dirs ──first hit──▶ root file ─┐
//! project dir ──fallback───▶ root file ─┤
//!                                       ▼
//! path fragments d1, d1/d2, … ──▶ nested files (missing ones skipped)
//!                                       │
//!                 [root, d1, d1/d2, …]  ▼
//!     per item: YAML → generic mapping → version check → deep merge
//!                                       │
//!                     merged mapping ─▶ schema decode ─▶ validation
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::merge::deep_merge;
use crate::config::schema::{Config, CONFIG_VERSION};
use crate::config::validation::{validate_config, ValidationError};
use crate::error::ErrorKind;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the search locations holds the root file.
    #[error("root configuration file {name} not found")]
    RootConfigNotFound { name: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("missing config version in {}", .path.display())]
    MissingVersion { path: PathBuf },

    #[error("unsupported config version {version:?} in {}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: String },

    #[error("config version {found:?} in {} differs from {expected:?}", .path.display())]
    InconsistentVersion {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    /// The merged document does not match the schema.
    #[error("invalid configuration: {0}")]
    Schema(String),

    /// The chain path points outside the project directory.
    #[error("{} is outside the project directory", .path.display())]
    OutsideProject { path: PathBuf },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::RootConfigNotFound { .. } => ErrorKind::ConfigNotFound,
            ConfigError::Io { .. } => ErrorKind::Io,
            ConfigError::OutsideProject { .. } => ErrorKind::PathEscape,
            ConfigError::Validation(errors) if errors.iter().any(ValidationError::is_path_escape) => {
                ErrorKind::PathEscape
            }
            _ => ErrorKind::SchemaViolation,
        }
    }
}

/// One configuration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub contents: String,
}

/// Locates and merges the layered configuration files of a project.
#[derive(Debug, Clone)]
pub struct Loader {
    file_name: String,
    search_dirs: Vec<PathBuf>,
    project_dir: PathBuf,
    working_dir: PathBuf,
}

impl Loader {
    /// `name` and `ext` form the file name (`runme` + `yaml` → `runme.yaml`).
    /// The root file is looked up in `search_dirs` first, then in
    /// `project_dir`; nested files only under `project_dir`.
    pub fn new(
        name: &str,
        ext: &str,
        search_dirs: Vec<PathBuf>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            file_name: format!("{}.{}", name, ext),
            search_dirs,
            working_dir: project_dir.clone(),
            project_dir,
        }
    }

    /// Directory that path validation is relative to (defaults to the
    /// project directory).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Find the root configuration file.
    pub fn find_root(&self) -> Result<ConfigSource, ConfigError> {
        for dir in self.search_dirs.iter().chain(std::iter::once(&self.project_dir)) {
            let path = dir.join(&self.file_name);
            if let Some(contents) = read_optional(&path)? {
                tracing::debug!(path = %path.display(), "Found root config");
                return Ok(ConfigSource { path, contents });
            }
        }
        Err(ConfigError::RootConfigNotFound {
            name: self.file_name.clone(),
        })
    }

    /// Root file followed by every nested file on the way down to `path`.
    ///
    /// `path` is relative to the project directory (absolute paths must be
    /// inside it). A path naming a file contributes its parent directory.
    pub fn find_chain(&self, path: &Path) -> Result<Vec<ConfigSource>, ConfigError> {
        let root = self.find_root()?;
        let mut chain = vec![root];

        for dir in self.nested_dirs(path)? {
            let file = dir.join(&self.file_name);
            if chain.iter().any(|item| item.path == file) {
                continue;
            }
            if let Some(contents) = read_optional(&file)? {
                tracing::debug!(path = %file.display(), "Found nested config");
                chain.push(ConfigSource { path: file, contents });
            }
        }

        Ok(chain)
    }

    /// Load, merge and validate the chain for `path`.
    pub fn load(&self, path: &Path) -> Result<Config, ConfigError> {
        let chain = self.find_chain(path)?;
        parse_chain(&chain, &self.working_dir)
    }

    fn nested_dirs(&self, path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.project_dir)
                .map_err(|_| ConfigError::OutsideProject {
                    path: path.to_path_buf(),
                })?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };

        let mut fragments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => fragments.push(part.to_os_string()),
                Component::CurDir => {}
                _ => {
                    return Err(ConfigError::OutsideProject {
                        path: path.to_path_buf(),
                    })
                }
            }
        }

        if self.project_dir.join(&relative).is_file() {
            fragments.pop();
        }

        let mut dirs = Vec::with_capacity(fragments.len());
        let mut current = self.project_dir.clone();
        for fragment in fragments {
            current.push(fragment);
            dirs.push(current.clone());
        }
        Ok(dirs)
    }
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Decode one YAML document into a generic mapping.
fn parse_document(source: &ConfigSource) -> Result<Map<String, Value>, ConfigError> {
    let value: Value = serde_yaml::from_str(&source.contents).map_err(|e| ConfigError::Parse {
        path: source.path.clone(),
        message: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigError::Parse {
            path: source.path.clone(),
            message: "top level must be a mapping".to_string(),
        }),
    }
}

fn document_version(doc: &Map<String, Value>, path: &Path) -> Result<String, ConfigError> {
    match doc.get("version") {
        None | Some(Value::Null) => Err(ConfigError::MissingVersion {
            path: path.to_path_buf(),
        }),
        Some(Value::String(v)) if v == CONFIG_VERSION => Ok(v.clone()),
        Some(other) => Err(ConfigError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            },
        }),
    }
}

/// Merge a chain of configuration files (later items win) and decode it.
pub fn parse_chain(items: &[ConfigSource], cwd: &Path) -> Result<Config, ConfigError> {
    let mut merged = Value::Object(Map::new());
    let mut expected: Option<String> = None;

    for item in items {
        let doc = parse_document(item)?;
        let version = document_version(&doc, &item.path)?;
        match &expected {
            Some(v) if *v != version => {
                return Err(ConfigError::InconsistentVersion {
                    path: item.path.clone(),
                    expected: v.clone(),
                    found: version,
                })
            }
            Some(_) => {}
            None => expected = Some(version),
        }
        deep_merge(&mut merged, Value::Object(doc));
    }

    if expected.is_none() {
        return Err(ConfigError::MissingField("version"));
    }
    if merged.get("project").map_or(true, Value::is_null) {
        return Err(ConfigError::MissingField("project"));
    }

    let config: Config =
        serde_json::from_value(merged).map_err(|e| ConfigError::Schema(e.to_string()))?;
    validate_config(&config, cwd).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Decode a single YAML configuration document.
pub fn parse_yaml(contents: &str, cwd: &Path) -> Result<Config, ConfigError> {
    let item = ConfigSource {
        path: PathBuf::from("<inline>"),
        contents: contents.to_string(),
    };
    parse_chain(std::slice::from_ref(&item), cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FilterType;
    use tempfile::TempDir;

    const ROOT: &str = "version: v1alpha1\nproject:\n  root: .\nserver:\n  address: localhost:7998\n";

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_parse_minimal() {
        let config = parse_yaml("version: v1alpha1\nproject: {}\n", Path::new("/w")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
version: v1alpha1
project:
  root: "."
  find_repo_upward: false
  ignore: [build]
  disable_gitignore: true
  env:
    use_system_env: true
    sources: [.env.test]
  filters:
    - type: FILTER_TYPE_BLOCK
      condition: "name != ''"
    - type: FILTER_TYPE_DOCUMENT
      condition: "shell == 'bash'"
      extra:
        level: 2
runtime:
  docker:
    enabled: true
    image: custom:1
server:
  address: unix:///tmp/runme.sock
  max_message_size: 1024
  tls:
    enabled: false
log:
  enabled: true
  path: /tmp/runme.log
  verbose: true
future_key: ignored
"#;
        let config = parse_yaml(yaml, Path::new("/w")).unwrap();
        assert!(!config.project.find_repo_upward);
        assert_eq!(config.project.ignore, vec!["build"]);
        assert!(config.project.env.use_system_env);
        assert_eq!(config.project.filters.len(), 2);
        assert_eq!(config.project.filters[1].kind, FilterType::Document);
        assert_eq!(config.project.filters[1].extra["level"], 2);
        assert!(config.runtime.docker.enabled);
        assert_eq!(config.runtime.docker.build.dockerfile, "Dockerfile");
        assert_eq!(config.server.max_message_size, 1024);
        assert!(!config.server.tls.enabled);
        assert!(config.log.verbose);
    }

    #[test]
    fn test_missing_version_rejected() {
        let err = parse_yaml("project: {}\n", Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVersion { .. }));
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = parse_yaml("version: v2\nproject: {}\n", Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { ref version, .. } if version == "v2"));
    }

    #[test]
    fn test_missing_project_rejected() {
        let err = parse_yaml("version: v1alpha1\n", Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("project")));
    }

    #[test]
    fn test_unknown_filter_type_rejected() {
        let yaml = "version: v1alpha1\nproject:\n  filters:\n    - type: FILTER_TYPE_LINE\n      condition: 'true'\n";
        let err = parse_yaml(yaml, Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::Schema(_)));
    }

    #[test]
    fn test_path_escape_kind() {
        let err = parse_yaml("version: v1alpha1\nproject:\n  root: ../..\n", Path::new("/w/p")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathEscape);
    }

    #[test]
    fn test_root_not_found() {
        let dir = TempDir::new().unwrap();
        let loader = Loader::new("runme", "yaml", vec![], dir.path());
        let err = loader.find_root().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigNotFound);
    }

    #[test]
    fn test_search_dirs_take_precedence() {
        let search = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        write(search.path(), "runme.yaml", "version: v1alpha1\nproject: {}\n");
        write(project.path(), "runme.yaml", ROOT);

        let loader = Loader::new("runme", "yaml", vec![search.path().to_path_buf()], project.path());
        let root = loader.find_root().unwrap();
        assert_eq!(root.path, search.path().join("runme.yaml"));
    }

    #[test]
    fn test_nested_config_overrides_root() {
        let project = TempDir::new().unwrap();
        write(project.path(), "runme.yaml", ROOT);
        write(
            project.path(),
            "experimental/runme.yaml",
            "version: v1alpha1\nserver:\n  address: localhost:7863\n",
        );

        let loader = Loader::new("runme", "yaml", vec![], project.path());

        let config = loader.load(Path::new("experimental")).unwrap();
        assert_eq!(config.server.address, "localhost:7863");

        let config = loader.load(Path::new(".")).unwrap();
        assert_eq!(config.server.address, "localhost:7998");
    }

    #[test]
    fn test_chain_skips_missing_and_uses_file_parent() {
        let project = TempDir::new().unwrap();
        write(project.path(), "runme.yaml", ROOT);
        write(project.path(), "a/b/runme.yaml", "version: v1alpha1\nlog:\n  enabled: true\n");
        write(project.path(), "a/b/README.md", "# readme\n");

        let loader = Loader::new("runme", "yaml", vec![], project.path());
        let chain = loader.find_chain(Path::new("a/b/README.md")).unwrap();
        let paths: Vec<_> = chain.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![project.path().join("runme.yaml"), project.path().join("a/b/runme.yaml")]
        );

        let abs = loader.find_chain(&project.path().join("a/b")).unwrap();
        assert_eq!(abs.len(), 2);
    }

    #[test]
    fn test_chain_rejects_parent_traversal() {
        let project = TempDir::new().unwrap();
        write(project.path(), "runme.yaml", ROOT);
        let loader = Loader::new("runme", "yaml", vec![], project.path());
        let err = loader.find_chain(Path::new("../elsewhere")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathEscape);
    }

    #[test]
    fn test_nested_invalid_version_rejected() {
        let project = TempDir::new().unwrap();
        write(project.path(), "runme.yaml", ROOT);
        write(project.path(), "x/runme.yaml", "version: v0\n");
        let loader = Loader::new("runme", "yaml", vec![], project.path());
        let err = loader.load(Path::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_chain_equals_merged_document() {
        let items = vec![
            ConfigSource {
                path: "a".into(),
                contents: "version: v1alpha1\nproject:\n  ignore: [x]\n  env:\n    use_system_env: true\n".into(),
            },
            ConfigSource {
                path: "b".into(),
                contents: "version: v1alpha1\nproject:\n  env:\n    sources: [.env.b]\n".into(),
            },
        ];
        let merged = "version: v1alpha1\nproject:\n  ignore: [x]\n  env:\n    use_system_env: true\n    sources: [.env.b]\n";

        let from_chain = parse_chain(&items, Path::new("/w")).unwrap();
        let from_merged = parse_yaml(merged, Path::new("/w")).unwrap();
        assert_eq!(from_chain, from_merged);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.project.filename = Some("README.md".into());
        config.server.address = "unix:///tmp/r.sock".into();
        config.log.path = "/tmp/log".into();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let decoded = parse_yaml(&yaml, Path::new("/w")).unwrap();
        assert_eq!(decoded, config);
    }
}
