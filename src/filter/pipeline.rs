//! Applying filters to tasks.
//!
//! A task is kept when every filter accepts it. Evaluation stops at the
//! first filter that rejects the task, and any filter error aborts the
//! whole pipeline.

use globset::{Glob, GlobSetBuilder};
use tokio_util::sync::CancellationToken;

use crate::config::{FilterConfig, FilterType};
use crate::error::{Error, Result};
use crate::filter::env::{BlockEnv, DocumentEnv};
use crate::filter::program::{Filter, FilterError};
use crate::project::Task;

/// A predicate over tasks.
pub type TaskFilter = Box<dyn Fn(&Task) -> std::result::Result<bool, FilterError> + Send + Sync>;

/// Block variables of `task`. `cwd` is the block's own attribute as
/// written, empty when unset.
pub fn block_env(task: &Task) -> BlockEnv {
    let block = &task.code_block;
    BlockEnv {
        language: block.language.clone(),
        name: block.name.clone(),
        cwd: block.cwd.clone().unwrap_or_default(),
        interactive: block.interactive,
        background: block.background,
        prompt_env: block.prompt_env,
        close_terminal_on_success: block.close_terminal_on_success,
        exclude_from_run_all: block.exclude_from_run_all,
        categories: block.categories.clone(),
        is_named: !block.is_unnamed,
    }
}

/// Document variables of `task`, if its document has front matter.
pub fn document_env(task: &Task) -> Option<DocumentEnv> {
    task.frontmatter.as_ref().map(|fm| DocumentEnv {
        shell: fm.shell.clone(),
        cwd: fm.cwd.clone(),
    })
}

/// Adapt a compiled [`Filter`] to a task predicate.
///
/// Document filters reject tasks whose document has no front matter.
pub fn task_filter(filter: std::sync::Arc<Filter>) -> TaskFilter {
    Box::new(move |task| match filter.kind() {
        FilterType::Block => filter.evaluate(&block_env(task)),
        FilterType::Document => match document_env(task) {
            Some(env) => filter.evaluate(&env),
            None => Ok(false),
        },
    })
}

/// Keep tasks whose name matches any of `patterns`. No patterns keeps all.
pub fn pattern_filter(patterns: &[String]) -> Result<TaskFilter> {
    if patterns.is_empty() {
        return Ok(Box::new(|_| Ok(true)));
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Usage(format!("invalid pattern {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| Error::Usage(format!("invalid patterns: {}", e)))?;
    Ok(Box::new(move |task| Ok(set.is_match(task.name()))))
}

/// Condition of the filter built from `--category`.
pub const CATEGORY_CONDITION: &str = "len(intersection(categories, extra.categories)) > 0";

/// Block filter config keeping tasks that carry at least one of `categories`.
pub fn category_filter_config(categories: &[String]) -> FilterConfig {
    let mut extra = std::collections::BTreeMap::new();
    extra.insert("categories".to_string(), serde_json::json!(categories));
    FilterConfig {
        kind: FilterType::Block,
        condition: CATEGORY_CONDITION.to_string(),
        extra,
    }
}

/// Compiled form of [`category_filter_config`].
pub fn category_filter(categories: &[String]) -> Filter {
    Filter::from_config(&category_filter_config(categories))
}

/// Keep the tasks every filter accepts, preserving order.
pub fn filter_tasks(
    tasks: Vec<Task>,
    filters: &[TaskFilter],
    cancel: &CancellationToken,
) -> Result<Vec<Task>> {
    let mut kept = Vec::with_capacity(tasks.len());
    'tasks: for task in tasks {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        for filter in filters {
            if !filter(&task)? {
                tracing::trace!(task = task.name(), "Task filtered out");
                continue 'tasks;
            }
        }
        kept.push(task);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::project::{CodeBlock, Frontmatter};

    fn task(name: &str, categories: &[&str], frontmatter: Option<Frontmatter>) -> Task {
        Task {
            document_path: PathBuf::from("/repo/README.md"),
            rel_document_path: PathBuf::from("README.md"),
            code_block: CodeBlock {
                name: name.into(),
                is_unnamed: false,
                language: "sh".into(),
                lines: vec!["echo".into()],
                categories: categories.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            },
            frontmatter,
        }
    }

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_category_filter() {
        let tasks = vec![
            task("build", &["ci"], None),
            task("deploy", &["release"], None),
            task("lint", &["ci", "fast"], None),
        ];
        let filters = vec![task_filter(Arc::new(category_filter(&["ci".to_string()])))];
        let kept = filter_tasks(tasks, &filters, &CancellationToken::new()).unwrap();
        assert_eq!(names(&kept), vec!["build", "lint"]);
    }

    #[test]
    fn test_document_filter_without_frontmatter() {
        let filter = Filter::new(FilterType::Document, "shell == 'bash'", BTreeMap::new());
        let tasks = vec![
            task("bare", &[], None),
            task(
                "bash",
                &[],
                Some(Frontmatter {
                    shell: "bash".into(),
                    cwd: String::new(),
                }),
            ),
        ];
        let kept =
            filter_tasks(tasks, &[task_filter(Arc::new(filter))], &CancellationToken::new()).unwrap();
        assert_eq!(names(&kept), vec!["bash"]);
    }

    #[test]
    fn test_first_error_aborts() {
        let filter = Filter::new(FilterType::Block, "name ==", BTreeMap::new());
        let tasks = vec![task("a", &[], None)];
        let err = filter_tasks(tasks, &[task_filter(Arc::new(filter))], &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::Compile { .. })));
    }

    #[test]
    fn test_short_circuit_skips_later_filters() {
        let reject: TaskFilter = Box::new(|_| Ok(false));
        let broken = Filter::new(FilterType::Block, "name ==", BTreeMap::new());
        let filters = vec![reject, task_filter(Arc::new(broken))];
        let kept = filter_tasks(vec![task("a", &[], None)], &filters, &CancellationToken::new())
            .unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_pattern_filter() {
        let tasks = vec![task("build-app", &[], None), task("test", &[], None)];
        let filters = vec![pattern_filter(&["build-*".to_string()]).unwrap()];
        let kept = filter_tasks(tasks, &filters, &CancellationToken::new()).unwrap();
        assert_eq!(names(&kept), vec!["build-app"]);

        let all = pattern_filter(&[]).unwrap();
        assert!(all(&task("x", &[], None)).unwrap());
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = filter_tasks(vec![task("a", &[], None)], &[], &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_block_cwd_is_the_attribute() {
        let mut scoped = task("scoped", &[], None);
        scoped.code_block.cwd = Some("web".into());
        let frontmatter = Frontmatter {
            shell: String::new(),
            cwd: "docs".into(),
        };
        let inherited = task("inherited", &[], Some(frontmatter));

        assert_eq!(block_env(&scoped).cwd, "web");
        assert_eq!(block_env(&inherited).cwd, "");

        let filter = Filter::new(FilterType::Block, "cwd == 'web'", BTreeMap::new());
        let kept = filter_tasks(
            vec![scoped, inherited],
            &[task_filter(Arc::new(filter))],
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(names(&kept), vec!["scoped"]);
    }
}
