//! Project discovery: which Markdown files make up the project, and which
//! tasks they contain.
//!
//! # Responsibilities
//! - Resolve the project root (optionally ascending to the git repository)
//! - Walk the tree honoring `.gitignore` and configured ignore globs
//! - Parse documents into tasks, in a stable (path-sorted) order
//! - Load dotenv sources for the session
//!
//! # Design Decisions
//! - Cancellation is checked before every file read
//! - Hidden files and directories are skipped

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use crate::config::validation::normalize;
use crate::config::ProjectConfig;
use crate::error::{Error, Result};
use crate::project::markdown::parse_document;
use crate::project::task::Task;
use crate::project::ProjectError;

/// File extensions scanned for tasks.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "mdi", "mdr", "run", "runme"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    File(PathBuf),
    Directory,
}

/// A view over the documents of one project.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    source: Source,
    ignore: GlobSet,
    respect_gitignore: bool,
    env_sources: Vec<String>,
}

impl Project {
    /// Build the project described by `config`, resolving paths against `cwd`.
    pub fn from_config(config: &ProjectConfig, cwd: &Path) -> Result<Self, ProjectError> {
        let ignore = build_ignore_set(&config.ignore)?;

        let (root, source) = match &config.filename {
            Some(filename) => {
                let file = normalize(&cwd.join(filename));
                if !file.is_file() {
                    return Err(ProjectError::NotFound(file));
                }
                let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
                (dir, Source::File(file))
            }
            None => {
                let dir = normalize(&cwd.join(&config.root));
                if !dir.is_dir() {
                    return Err(ProjectError::NotFound(dir));
                }
                (dir, Source::Directory)
            }
        };

        let root = if config.find_repo_upward {
            find_repo_root(&root).unwrap_or(root)
        } else {
            root
        };

        tracing::debug!(
            root = %root.display(),
            single_file = matches!(source, Source::File(_)),
            "Project resolved"
        );

        Ok(Self {
            root,
            source,
            ignore,
            respect_gitignore: !config.disable_gitignore,
            env_sources: config.env.sources.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every task of the project, in document order.
    pub fn load_tasks(&self, cancel: &CancellationToken) -> Result<Vec<Task>> {
        let documents = match &self.source {
            Source::File(file) => vec![file.clone()],
            Source::Directory => self.walk(cancel)?,
        };

        let mut tasks = Vec::new();
        for path in documents {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tasks.extend(self.load_document(&path)?);
        }

        tracing::debug!(count = tasks.len(), "Tasks loaded");
        Ok(tasks)
    }

    fn walk(&self, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let ignore = self.ignore.clone();
        let root = self.root.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(false)
            .ignore(self.respect_gitignore)
            .parents(self.respect_gitignore)
            .require_git(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                !ignore.is_match(entry.file_name()) && !ignore.is_match(rel)
            })
            .build();

        let mut documents = Vec::new();
        for entry in walker {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let entry = entry.map_err(|e| ProjectError::Walk(e.to_string()))?;
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if is_file && is_markdown(entry.path()) {
                documents.push(entry.into_path());
            }
        }
        Ok(documents)
    }

    fn load_document(&self, path: &Path) -> Result<Vec<Task>, ProjectError> {
        let source = fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_document(&source).map_err(|message| ProjectError::Frontmatter {
            path: path.to_path_buf(),
            message,
        })?;

        let rel = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
        Ok(parsed
            .blocks
            .into_iter()
            .map(|code_block| Task {
                document_path: path.to_path_buf(),
                rel_document_path: rel.clone(),
                code_block,
                frontmatter: parsed.frontmatter.clone(),
            })
            .collect())
    }

    /// Variables from the dotenv sources under the project root, in order.
    /// Missing files are skipped.
    pub fn load_env(&self) -> Result<Vec<(String, String)>, ProjectError> {
        let mut vars = Vec::new();
        for source in &self.env_sources {
            let path = self.root.join(source);
            let iter = match dotenvy::from_path_iter(&path) {
                Ok(iter) => iter,
                Err(e) if e.not_found() => continue,
                Err(e) => {
                    return Err(ProjectError::Env {
                        path,
                        message: e.to_string(),
                    })
                }
            };
            for item in iter {
                let (key, value) = item.map_err(|e| ProjectError::Env {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                vars.push((key, value));
            }
        }
        Ok(vars)
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MARKDOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, ProjectError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ProjectError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ProjectError::Pattern {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

/// Nearest ancestor of `start` (inclusive) containing `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn config() -> ProjectConfig {
        ProjectConfig {
            find_repo_upward: false,
            ..Default::default()
        }
    }

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_walks_directory_in_path_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.md", "```sh {name=b}\necho b\n```\n");
        write(dir.path(), "a/README.md", "```sh {name=a}\necho a\n```\n");
        write(dir.path(), "notes.txt", "```sh {name=txt}\necho\n```\n");
        write(dir.path(), "node_modules/pkg/README.md", "```sh {name=dep}\necho\n```\n");
        write(dir.path(), ".hidden/README.md", "```sh {name=hidden}\necho\n```\n");

        let project = Project::from_config(&config(), dir.path()).unwrap();
        let tasks = project.load_tasks(&CancellationToken::new()).unwrap();
        assert_eq!(names(&tasks), vec!["a", "b"]);
        assert_eq!(tasks[0].rel_document_path, PathBuf::from("a/README.md"));
    }

    #[test]
    fn test_gitignore_respected_unless_disabled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "skipped/\n");
        write(dir.path(), "skipped/README.md", "```sh {name=skipped}\necho\n```\n");
        write(dir.path(), "README.md", "```sh {name=kept}\necho\n```\n");

        let project = Project::from_config(&config(), dir.path()).unwrap();
        let tasks = project.load_tasks(&CancellationToken::new()).unwrap();
        assert_eq!(names(&tasks), vec!["kept"]);

        let mut cfg = config();
        cfg.disable_gitignore = true;
        let project = Project::from_config(&cfg, dir.path()).unwrap();
        let tasks = project.load_tasks(&CancellationToken::new()).unwrap();
        assert_eq!(names(&tasks), vec!["kept", "skipped"]);
    }

    #[test]
    fn test_single_file_project() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/GUIDE.md", "```sh {name=guide}\necho\n```\n");
        write(dir.path(), "README.md", "```sh {name=readme}\necho\n```\n");

        let mut cfg = config();
        cfg.filename = Some("docs/GUIDE.md".into());
        let project = Project::from_config(&cfg, dir.path()).unwrap();
        let tasks = project.load_tasks(&CancellationToken::new()).unwrap();
        assert_eq!(names(&tasks), vec!["guide"]);
        assert_eq!(project.root(), dir.path().join("docs"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config();
        cfg.filename = Some("MISSING.md".into());
        assert!(matches!(
            Project::from_config(&cfg, dir.path()),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_repo_upward() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();

        let mut cfg = config();
        cfg.find_repo_upward = true;
        let project = Project::from_config(&cfg, &dir.path().join("sub/deeper")).unwrap();
        assert_eq!(project.root(), dir.path());
    }

    #[test]
    fn test_cancelled_discovery() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "```sh\necho\n```\n");
        let project = Project::from_config(&config(), dir.path()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(project.load_tasks(&cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_load_env_later_sources_win() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".env", "A=1\nB=2\n");
        write(dir.path(), ".env.local", "B=3\n");

        let project = Project::from_config(&config(), dir.path()).unwrap();
        let vars = project.load_env().unwrap();
        assert_eq!(
            vars,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string()),
                ("B".to_string(), "3".to_string()),
            ]
        );
    }
}
