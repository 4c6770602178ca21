//! Task model: a named code block inside a document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Document-level settings from YAML front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Frontmatter {
    pub shell: String,
    pub cwd: String,
}

/// An executable fenced code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub name: String,
    pub is_unnamed: bool,
    pub language: String,
    pub lines: Vec<String>,
    pub categories: Vec<String>,
    /// Paragraph preceding the block.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub interactive: bool,
    pub background: bool,
    pub prompt_env: bool,
    pub close_terminal_on_success: bool,
    pub exclude_from_run_all: bool,
}

impl Default for CodeBlock {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_unnamed: true,
            language: String::new(),
            lines: Vec::new(),
            categories: Vec::new(),
            description: String::new(),
            cwd: None,
            interactive: true,
            background: false,
            prompt_env: true,
            close_terminal_on_success: true,
            exclude_from_run_all: false,
        }
    }
}

impl CodeBlock {
    /// First line that is neither blank nor a comment.
    pub fn first_command(&self) -> &str {
        self.lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub document_path: PathBuf,
    /// Document path relative to the project root.
    pub rel_document_path: PathBuf,
    pub code_block: CodeBlock,
    #[serde(skip)]
    pub frontmatter: Option<Frontmatter>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.code_block.name
    }

    pub fn document_dir(&self) -> &Path {
        self.document_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Directory the task runs in: block `cwd`, else front matter `cwd`,
    /// resolved against the document's directory.
    pub fn working_dir(&self) -> PathBuf {
        let dir = self.document_dir();
        let configured = self
            .code_block
            .cwd
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.frontmatter
                    .as_ref()
                    .map(|f| f.cwd.as_str())
                    .filter(|c| !c.is_empty())
            });
        match configured {
            Some(cwd) => dir.join(cwd),
            None => dir.to_path_buf(),
        }
    }
}

/// Order tasks so those in or below `cwd` come first, shallowest first.
pub fn sort_by_proximity(tasks: &mut [Task], cwd: &Path) {
    tasks.sort_by_key(|task| {
        let dir = task.document_dir();
        match dir.strip_prefix(cwd) {
            Ok(rest) => (0usize, rest.components().count()),
            Err(_) => (1usize, dir.components().count()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(path: &str, name: &str) -> Task {
        Task {
            document_path: PathBuf::from(path),
            rel_document_path: PathBuf::from(path),
            code_block: CodeBlock {
                name: name.into(),
                ..Default::default()
            },
            frontmatter: None,
        }
    }

    #[test]
    fn test_first_command_skips_comments() {
        let block = CodeBlock {
            lines: vec!["".into(), "# setup".into(), "  echo hi  ".into()],
            ..Default::default()
        };
        assert_eq!(block.first_command(), "echo hi");
    }

    #[test]
    fn test_working_dir_precedence() {
        let mut t = task("/p/docs/README.md", "a");
        assert_eq!(t.working_dir(), PathBuf::from("/p/docs"));

        t.frontmatter = Some(Frontmatter {
            shell: String::new(),
            cwd: "..".into(),
        });
        assert_eq!(t.working_dir(), PathBuf::from("/p/docs/.."));

        t.code_block.cwd = Some("sub".into());
        assert_eq!(t.working_dir(), PathBuf::from("/p/docs/sub"));
    }

    #[test]
    fn test_sort_by_proximity() {
        let mut tasks = vec![
            task("/p/other/README.md", "far"),
            task("/p/docs/deep/README.md", "deep"),
            task("/p/docs/README.md", "near"),
        ];
        sort_by_proximity(&mut tasks, Path::new("/p/docs"));
        let names: Vec<_> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["near", "deep", "far"]);
    }
}
