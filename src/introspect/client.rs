//! Dialing a server and the high-level introspection verbs.

use std::io::Write;
use std::path::PathBuf;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use super::describe::{describe_symbol, find_service};
use super::invoke::{invoke, InvokeOutcome, SessionSelector};
use super::reflection::ReflectionClient;
use super::RpcError;
use crate::net::tls::{CERT_FILE_NAME, KEY_FILE_NAME};
use crate::net::{load_client, ServerAddress};

/// How to reach the server.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub address: String,
    /// Directory holding `cert.pem` and `key.pem`.
    pub tls_dir: PathBuf,
    /// Plaintext instead of mutual TLS.
    pub insecure: bool,
    /// Largest message the client sends or accepts, in bytes.
    pub max_message_size: usize,
}

/// A connected introspection client.
pub struct Client {
    channel: Channel,
    reflection: ReflectionClient,
    max_message_size: usize,
}

impl Client {
    pub async fn connect(options: &DialOptions) -> Result<Self, RpcError> {
        let channel = dial(options).await?;
        Ok(Self {
            reflection: ReflectionClient::new(channel.clone(), options.max_message_size),
            channel,
            max_message_size: options.max_message_size,
        })
    }

    /// Fully-qualified names of every exposed service, sorted.
    pub async fn list_services(&mut self) -> Result<Vec<String>, RpcError> {
        let mut services = self.reflection.list_services().await?;
        services.sort();
        services.dedup();
        Ok(services)
    }

    /// `<service>.<method>` for every method of `service`, sorted.
    pub async fn list_methods(&mut self, service: &str) -> Result<Vec<String>, RpcError> {
        let pool = self.reflection.pool_for_symbol(service).await?;
        let service = find_service(&pool, service)?;
        let mut methods: Vec<String> = service
            .methods()
            .map(|m| format!("{}.{}", service.full_name(), m.name()))
            .collect();
        methods.sort();
        Ok(methods)
    }

    /// Human-readable description of a symbol.
    pub async fn describe(&mut self, symbol: &str) -> Result<String, RpcError> {
        let symbol = symbol.trim_start_matches('.');
        let pool = self.reflection.pool_for_symbol(symbol).await?;
        describe_symbol(&pool, symbol)
    }

    /// Invoke `method` (`pkg.Service/Method` or `pkg.Service.Method`) with
    /// the JSON request stream in `data`, writing responses to `out`.
    pub async fn invoke<W: Write>(
        &mut self,
        method: &str,
        data: &str,
        session: &SessionSelector,
        out: &mut W,
    ) -> Result<InvokeOutcome, RpcError> {
        let (service, method) = split_method(method)?;
        let pool = self.reflection.pool_for_symbol(service).await?;
        let service = find_service(&pool, service)?;
        let method = service
            .methods()
            .find(|m| m.name() == method)
            .ok_or_else(|| {
                RpcError::SymbolNotFound(format!("{}.{}", service.full_name(), method))
            })?;

        invoke(
            self.channel.clone(),
            &method,
            data,
            session,
            self.max_message_size,
            out,
        )
        .await
    }
}

/// Split a method reference on its last `/` or `.`.
fn split_method(method: &str) -> Result<(&str, &str), RpcError> {
    let method = method.trim_start_matches('.');
    method
        .rsplit_once('/')
        .or_else(|| method.rsplit_once('.'))
        .filter(|(service, name)| !service.is_empty() && !name.is_empty())
        .ok_or_else(|| {
            RpcError::Input(format!(
                "method must be <service>/<method> or <service>.<method>, got {:?}",
                method
            ))
        })
}

async fn dial(options: &DialOptions) -> Result<Channel, RpcError> {
    let address: ServerAddress = options.address.parse().map_err(|e| RpcError::Address {
        address: options.address.clone(),
        reason: format!("{}", e),
    })?;
    let scheme = if options.insecure { "http" } else { "https" };
    let dial_error = |e: tonic::transport::Error| RpcError::Dial {
        address: options.address.clone(),
        message: format!("{}", e),
    };

    let uri = match &address {
        ServerAddress::Tcp { .. } => format!("{}://{}", scheme, address),
        ServerAddress::Unix(_) => format!("{}://localhost", scheme),
    };
    let mut endpoint = Endpoint::from_shared(uri).map_err(dial_error)?;

    if !options.insecure {
        let tls = load_client(
            &options.tls_dir.join(CERT_FILE_NAME),
            &options.tls_dir.join(KEY_FILE_NAME),
        )?;
        endpoint = endpoint.tls_config(tls).map_err(dial_error)?;
    }

    tracing::debug!(address = %address, insecure = options.insecure, "Dialing server");

    match address {
        ServerAddress::Tcp { .. } => endpoint.connect().await.map_err(dial_error),
        ServerAddress::Unix(path) => endpoint
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
            }))
            .await
            .map_err(dial_error),
    }
}
