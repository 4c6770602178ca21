//! Project model: documents, code blocks, and tasks.
//!
//! # Data Flow
//! ```text
//! ProjectConfig + cwd
//!     → discovery.rs (root, walk, .gitignore, ignore globs)
//!     → markdown.rs (front matter + fenced code blocks)
//!     → task.rs (Task = document + block)
//!     → filter pipeline (conjunction of configured filters)
//! ```

pub mod discovery;
pub mod markdown;
pub mod task;

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;

pub use discovery::{find_repo_root, Project, MARKDOWN_EXTENSIONS};
pub use task::{sort_by_proximity, CodeBlock, Frontmatter, Task};

/// Project discovery errors.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid front matter in {}: {message}", .path.display())]
    Frontmatter { path: PathBuf, message: String },

    #[error("invalid ignore pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("failed to walk project: {0}")]
    Walk(String),

    #[error("failed to load env file {}: {message}", .path.display())]
    Env { path: PathBuf, message: String },
}

impl ProjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectError::Pattern { .. } => ErrorKind::Usage,
            _ => ErrorKind::Io,
        }
    }
}
