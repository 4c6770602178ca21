//! `runme server {start,stop,grpcurl}`

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use tokio::io::AsyncReadExt;

use crate::config::schema::default_tls_dir;
use crate::error::{Error, Result};
use crate::introspect::{Client, DialOptions, RpcError, SessionSelector, SessionStrategy};
use crate::lifecycle::{signals, Shutdown};
use crate::net::ServerAddress;
use crate::resolver::Resolver;

/// Marker telling `invoke --data` to read request bodies from stdin.
pub const STDIN_MARKER: &str = "@";

#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Start the server and block until interrupted
    Start,
    /// Stop a server listening on a unix:// socket
    Stop {
        /// Address to stop instead of the configured one.
        #[arg(long)]
        address: Option<String>,
    },
    /// Inspect and call a running server
    #[command(subcommand)]
    Grpcurl(GrpcurlCommand),
}

#[derive(Debug, Subcommand)]
pub enum GrpcurlCommand {
    /// List services, or the methods of one service
    List {
        #[command(flatten)]
        connection: ConnectionArgs,
        service: Option<String>,
    },
    /// Describe services, methods, messages, enums or fields
    Describe {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Invoke a method with JSON request bodies
    Invoke {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// `package.Service/Method` or `package.Service.Method`.
        method: String,
        /// JSON request bodies, or `@` to read them from stdin.
        #[arg(short, long, default_value = "")]
        data: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "RUNME_SERVER_ADDR", default_value = "localhost:7998")]
    pub server_address: String,

    /// Directory holding cert.pem and key.pem.
    #[arg(long, env = "RUNME_TLS_DIR")]
    pub tls_dir: Option<PathBuf>,

    /// Connect without TLS.
    #[arg(long)]
    pub insecure: bool,

    #[arg(long, env = "RUNME_SESSION")]
    pub session: Option<String>,

    #[arg(long, env = "RUNME_SESSION_STRATEGY", value_enum)]
    pub session_strategy: Option<SessionStrategy>,
}

impl ConnectionArgs {
    fn dial_options(&self, resolver: &mut Resolver) -> Result<DialOptions> {
        let tls_dir = match &self.tls_dir {
            Some(dir) => dir.clone(),
            None => default_tls_dir(&resolver.user_config_dir()?),
        };
        Ok(DialOptions {
            address: self.server_address.clone(),
            tls_dir,
            insecure: self.insecure,
            max_message_size: resolver.config()?.server.max_message_size,
        })
    }

    fn session(&self) -> SessionSelector {
        SessionSelector {
            session: self.session.clone(),
            strategy: self.session_strategy,
        }
    }
}

pub async fn run<W: Write>(
    resolver: &mut Resolver,
    command: ServerCommand,
    shutdown: Shutdown,
    out: &mut W,
) -> Result<()> {
    match command {
        ServerCommand::Start => start(resolver, shutdown).await,
        ServerCommand::Stop { address } => {
            let address = match address {
                Some(address) => address,
                None => resolver.config()?.server.address.clone(),
            };
            let address: ServerAddress = address
                .parse()
                .map_err(|e| Error::Usage(format!("invalid server address {:?}: {}", address, e)))?;
            let pid = crate::server::stop(&address)?;
            writeln!(out, "Sent interrupt to process {}", pid)
                .map_err(|e| Error::io("failed to write output", e))
        }
        ServerCommand::Grpcurl(command) => grpcurl(resolver, command, out).await,
    }
}

async fn start(resolver: &mut Resolver, shutdown: Shutdown) -> Result<()> {
    super::install_logger(resolver)?;
    let supervisor = resolver.server()?;

    // Handlers go in before the socket and PID file exist.
    signals::install(shutdown.clone())
        .map_err(|e| Error::io("failed to install signal handlers", e))?;
    let bound = supervisor.bind().await?;
    bound.serve(shutdown.subscribe()).await
}

async fn grpcurl<W: Write>(
    resolver: &mut Resolver,
    command: GrpcurlCommand,
    out: &mut W,
) -> Result<()> {
    match command {
        GrpcurlCommand::List {
            connection,
            service,
        } => {
            let mut client = Client::connect(&connection.dial_options(resolver)?).await?;
            let names = match service {
                Some(service) => client.list_methods(&service).await?,
                None => client.list_services().await?,
            };
            for name in names {
                writeln!(out, "{}", name).map_err(RpcError::from)?;
            }
            Ok(())
        }
        GrpcurlCommand::Describe {
            connection,
            symbols,
        } => {
            let mut client = Client::connect(&connection.dial_options(resolver)?).await?;
            for symbol in symbols {
                let description = client.describe(&symbol).await?;
                write!(out, "{}", description).map_err(RpcError::from)?;
            }
            Ok(())
        }
        GrpcurlCommand::Invoke {
            connection,
            method,
            data,
        } => {
            let data = if data == STDIN_MARKER {
                let mut buf = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buf)
                    .await
                    .map_err(|e| Error::io("failed to read request data from stdin", e))?;
                buf
            } else {
                data
            };

            let mut client = Client::connect(&connection.dial_options(resolver)?).await?;
            let outcome = client
                .invoke(&method, &data, &connection.session(), out)
                .await?;

            writeln!(out, "{}", outcome).map_err(RpcError::from)?;
            if let Some(report) = outcome.error_report() {
                writeln!(out, "{}", report).map_err(RpcError::from)?;
            }
            match outcome.status {
                Some(status) => Err(RpcError::Status(status).into()),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_grpcurl_flags() {
        let cli = Cli::try_parse_from([
            "runme",
            "server",
            "grpcurl",
            "invoke",
            "--insecure",
            "--server-address",
            "unix:///tmp/runme.sock",
            "--session-strategy",
            "recent",
            "grpc.health.v1.Health/Check",
            "--data",
            "@",
        ])
        .unwrap();

        let Commands::Server(ServerCommand::Grpcurl(GrpcurlCommand::Invoke {
            connection,
            method,
            data,
        })) = cli.command
        else {
            panic!("unexpected command");
        };
        assert!(connection.insecure);
        assert_eq!(connection.server_address, "unix:///tmp/runme.sock");
        assert_eq!(connection.session_strategy, Some(SessionStrategy::Recent));
        assert_eq!(method, "grpc.health.v1.Health/Check");
        assert_eq!(data, STDIN_MARKER);
    }

    #[test]
    fn test_describe_requires_symbol() {
        let err = Cli::try_parse_from(["runme", "server", "grpcurl", "describe"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[tokio::test]
    async fn test_stop_rejects_tcp_address() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut resolver = Resolver::new(crate::resolver::ResolverOptions::new(dir.path()));
        let mut out = Vec::new();
        let err = run(
            &mut resolver,
            ServerCommand::Stop {
                address: Some("localhost:7998".into()),
            },
            Shutdown::new(),
            &mut out,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
    }
}
