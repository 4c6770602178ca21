//! `runme list`

use std::io::Write;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::project::{sort_by_proximity, Task};
use crate::resolver::Resolver;

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Glob patterns matched against task names.
    pub patterns: Vec<String>,

    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

#[derive(Debug, Serialize)]
struct Row {
    name: String,
    file: String,
    first_command: String,
    description: String,
    named: bool,
}

impl Row {
    fn from_task(task: &Task) -> Self {
        let block = &task.code_block;
        Self {
            name: task.name().to_string(),
            file: task.rel_document_path.display().to_string(),
            first_command: block.first_command().to_string(),
            description: block.description.lines().next().unwrap_or("").to_string(),
            named: !block.is_unnamed,
        }
    }
}

pub fn run<W: Write>(
    resolver: &mut Resolver,
    args: &ListArgs,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()> {
    let mut tasks = super::select_tasks(resolver, &args.patterns, cancel)?;
    sort_by_proximity(&mut tasks, &resolver.options().cwd);

    let written = match args.format {
        Format::Table => write_table(out, &tasks),
        Format::Json => {
            let rows: Vec<Row> = tasks.iter().map(Row::from_task).collect();
            serde_json::to_writer_pretty(&mut *out, &rows)
                .map_err(std::io::Error::from)
                .and_then(|()| writeln!(out))
        }
    };
    written.map_err(|e| Error::io("failed to write task list", e))
}

const HEADERS: [&str; 5] = ["NAME", "FILE", "FIRST COMMAND", "DESCRIPTION", "NAMED"];

fn write_table<W: Write>(out: &mut W, tasks: &[Task]) -> std::io::Result<()> {
    let rows: Vec<[String; 5]> = tasks
        .iter()
        .map(|task| {
            let row = Row::from_task(task);
            let name = if task.code_block.exclude_from_run_all {
                row.name
            } else {
                format!("{}*", row.name)
            };
            let named = if row.named { "Yes" } else { "No" };
            [name, row.file, row.first_command, row.description, named.to_string()]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let headers = HEADERS.map(str::to_string);
    for row in std::iter::once(&headers).chain(&rows) {
        let mut line = String::new();
        for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{:<width$}  ", cell, width = width));
            }
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::{resolver_for, README};
    use crate::resolver::ResolverOptions;
    use std::fs;
    use tempfile::TempDir;

    fn list(format: Format) -> String {
        let dir = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), README).unwrap();
        let mut resolver = resolver_for(ResolverOptions::new(dir.path()), user.path());

        let args = ListArgs {
            patterns: Vec::new(),
            format,
        };
        let mut out = Vec::new();
        run(&mut resolver, &args, &CancellationToken::new(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_table_marks_run_all_tasks() {
        let output = list(Format::Table);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[0].contains("FIRST COMMAND"));
        assert!(lines[1].starts_with("hello*"));
        assert!(lines[1].contains("echo hello"));
        assert!(lines[1].contains("Say hello."));
        assert!(lines[2].starts_with("build "));
        assert!(lines[2].ends_with("Yes"));
    }

    #[test]
    fn test_json_rows() {
        let output = list(Format::Json);
        let rows: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["name"], "hello");
        assert_eq!(rows[0]["file"], "README.md");
        assert_eq!(rows[0]["first_command"], "echo hello");
        assert_eq!(rows[1]["named"], true);
    }
}
