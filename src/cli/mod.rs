//! Command-line verbs.
//!
//! Each verb builds a [`Resolver`] for the working directory and asks it
//! for exactly the values it consumes; nothing else is materialized.
//!
//! # Data Flow
//! ```text
//! argv → Cli (clap) → ResolverOptions (--filename, --category)
//!      → list / print / run    → Project + Filters → tasks
//!      → server start | stop   → Supervisor / PID file
//!      → server grpcurl ...    → introspect::Client (no configuration needed)
//! ```

pub mod list;
pub mod print;
pub mod run;
pub mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::filter::{filter_tasks, pattern_filter, task_filter, TaskFilter};
use crate::lifecycle::Shutdown;
use crate::project::Task;
use crate::resolver::{Resolver, ResolverOptions};

#[derive(Debug, Parser)]
#[command(name = "runme")]
#[command(about = "Execute commands inside your docs", long_about = None, version)]
pub struct Cli {
    /// Markdown file to read tasks from, relative to the project root.
    #[arg(long, global = true)]
    pub filename: Option<String>,

    /// Only keep tasks in one of these categories.
    #[arg(long, global = true, value_delimiter = ',')]
    pub category: Vec<String>,

    /// Run as if started in this directory.
    #[arg(long, short = 'C', global = true)]
    pub chdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List tasks
    List(list::ListArgs),
    /// Print the content of tasks
    Print(print::PrintArgs),
    /// Run tasks
    Run(run::RunArgs),
    /// Manage the gRPC server
    #[command(subcommand)]
    Server(server::ServerCommand),
}

impl Cli {
    pub fn resolver_options(&self) -> Result<ResolverOptions> {
        let cwd = match &self.chdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| Error::io("cannot determine the working directory", e))?,
        };
        let mut options = ResolverOptions::new(cwd);
        options.filename = self.filename.clone();
        options.categories = self.category.iter().filter(|c| !c.is_empty()).cloned().collect();
        Ok(options)
    }
}

/// Run the parsed command line to completion.
pub async fn execute(cli: Cli) -> Result<()> {
    let shutdown = Shutdown::new();
    let mut resolver = Resolver::new(cli.resolver_options()?).with_cancellation(shutdown.subscribe());
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::List(args) => {
            install_logger(&mut resolver)?;
            list::run(&mut resolver, &args, &shutdown.subscribe(), &mut stdout)
        }
        Commands::Print(args) => {
            install_logger(&mut resolver)?;
            print::run(&mut resolver, &args, &shutdown.subscribe(), &mut stdout)
        }
        Commands::Run(args) => {
            install_logger(&mut resolver)?;
            crate::lifecycle::signals::install(shutdown.clone())
                .map_err(|e| Error::io("failed to install signal handlers", e))?;
            run::run(&mut resolver, &args, &shutdown.subscribe()).await
        }
        Commands::Server(command) => {
            server::run(&mut resolver, command, shutdown, &mut stdout).await
        }
    }
}

/// Make the configured logger the process-wide subscriber.
pub(crate) fn install_logger(resolver: &mut Resolver) -> Result<()> {
    let logger = resolver.logger()?;
    if logger.is_enabled() && !logger.install_global() {
        tracing::debug!("Global subscriber already set");
    }
    Ok(())
}

/// Project tasks that pass the name patterns and every configured filter.
pub fn select_tasks(
    resolver: &mut Resolver,
    patterns: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<Task>> {
    let project = resolver.project()?;
    let filters = resolver.filters()?;

    let tasks = project.load_tasks(cancel)?;
    let mut chain: Vec<TaskFilter> = vec![pattern_filter(patterns)?];
    chain.extend(filters.iter().cloned().map(task_filter));

    let selected = filter_tasks(tasks, &chain, cancel)?;
    tracing::debug!(
        root = %project.root().display(),
        selected = selected.len(),
        "Tasks selected"
    );
    Ok(selected)
}
