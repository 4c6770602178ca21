//! `runme run`

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::project::Task;
use crate::resolver::Resolver;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Glob patterns matched against task names. Without patterns, every
    /// task not excluded from run-all is executed.
    pub patterns: Vec<String>,
}

pub async fn run(resolver: &mut Resolver, args: &RunArgs, cancel: &CancellationToken) -> Result<()> {
    let tasks = runnable_tasks(resolver, args, cancel)?;

    let factory = resolver.command_factory()?;
    factory.runtime().prepare().await?;

    for task in &tasks {
        factory.execute(task, cancel).await?;
    }
    tracing::info!(tasks = tasks.len(), "All tasks finished");
    Ok(())
}

/// Tasks `run` would execute, in document order.
fn runnable_tasks(
    resolver: &mut Resolver,
    args: &RunArgs,
    cancel: &CancellationToken,
) -> Result<Vec<Task>> {
    let mut tasks = super::select_tasks(resolver, &args.patterns, cancel)?;
    if args.patterns.is_empty() {
        tasks.retain(|task| !task.code_block.exclude_from_run_all);
    }
    if tasks.is_empty() {
        return Err(Error::Usage("no tasks to run".into()));
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::{resolver_for, README};
    use crate::error::ErrorKind;
    use crate::resolver::ResolverOptions;
    use std::fs;
    use tempfile::TempDir;

    fn project(readme: &str) -> (TempDir, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), readme).unwrap();
        (dir, TempDir::new().unwrap())
    }

    #[test]
    fn test_run_all_skips_excluded() {
        let (dir, user) = project(README);
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());
        let args = RunArgs { patterns: vec![] };
        let tasks = runnable_tasks(&mut resolver, &args, &CancellationToken::new()).unwrap();
        let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["hello"]);
    }

    #[test]
    fn test_explicit_pattern_includes_excluded() {
        let (dir, user) = project(README);
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());
        let args = RunArgs {
            patterns: vec!["build".into()],
        };
        let tasks = runnable_tasks(&mut resolver, &args, &CancellationToken::new()).unwrap();
        assert_eq!(tasks[0].name(), "build");
    }

    #[test]
    fn test_no_match_is_usage_error() {
        let (dir, user) = project(README);
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());
        let args = RunArgs {
            patterns: vec!["nope".into()],
        };
        let err = runnable_tasks(&mut resolver, &args, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn test_run_executes_in_order_and_stops_on_failure() {
        let (dir, user) = project(
            "```sh {name=first}\necho one >> out.txt\n```\n\n\
             ```sh {name=fail}\nexit 3\n```\n\n\
             ```sh {name=never}\necho three >> out.txt\n```\n",
        );
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());
        let args = RunArgs { patterns: vec![] };

        let err = run(&mut resolver, &args, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Task { ref name, .. } if name == "fail"));
        let written = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "one\n");
    }
}
