//! runme: execute the code blocks of Markdown documents and serve them over gRPC.

use std::process::ExitCode;

use clap::Parser;

use runme::cli::{execute, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e.kind();
            let cause = e.root_cause();
            tracing::debug!(kind = %kind, error = %cause, "Command failed");
            eprintln!("Error: {}", cause);
            ExitCode::FAILURE
        }
    }
}
