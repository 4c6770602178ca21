//! `runme print`

use std::io::Write;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::project::Task;
use crate::resolver::Resolver;

#[derive(Debug, Args)]
pub struct PrintArgs {
    /// Glob patterns matched against task names.
    pub patterns: Vec<String>,
}

pub fn run<W: Write>(
    resolver: &mut Resolver,
    args: &PrintArgs,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()> {
    let tasks = super::select_tasks(resolver, &args.patterns, cancel)?;
    for task in &tasks {
        write_task(out, task)
            .map_err(|e| Error::io(format!("failed to print task {}", task.name()), e))?;
    }
    Ok(())
}

fn write_task<W: Write>(out: &mut W, task: &Task) -> std::io::Result<()> {
    writeln!(out, "# {}:{}", task.rel_document_path.display(), task.name())?;
    for line in &task.code_block.lines {
        writeln!(out, "{}", line)?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::{resolver_for, README};
    use crate::resolver::ResolverOptions;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_print_selected_task() {
        let dir = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), README).unwrap();
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());

        let args = PrintArgs {
            patterns: vec!["hello".into()],
        };
        let mut out = Vec::new();
        run(&mut resolver, &args, &CancellationToken::new(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# README.md:hello\necho hello\n\n");
    }
}
