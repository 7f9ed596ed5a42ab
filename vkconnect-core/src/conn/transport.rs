use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::VkResult;

use super::params::{Address, ConnectParams, Tls};

/// A connected transport, either plain TCP or TLS-over-TCP, grounded on the
/// teacher's `AsyncPlainTcpClient`/`AsyncTlsTcpClient` pair.
pub enum TcpClient {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl TcpClient {
    pub async fn try_new(params: &ConnectParams) -> VkResult<Self> {
        let stream = match params.address() {
            Address::Tcp { host, port } => TcpStream::connect((host.as_str(), *port)).await?,
            Address::Unix { .. } => {
                // Unix domain sockets use a distinct stream type; callers that
                // need one should use `UnixClient` instead. Kept as a
                // `ConnParams` error here so callers get a clear message
                // rather than a type mismatch at the call site.
                return Err(crate::error::VkError::Usage(
                    "ConnectParams with a unix socket address cannot build a TcpClient",
                ));
            }
        };
        stream.set_nodelay(true).ok();

        match params.tls() {
            Tls::Off => Ok(TcpClient::Plain(stream)),
            tls => {
                let config = tls.client_config()?;
                let connector = TlsConnector::from(config);
                let server_name = params
                    .server_name()
                    .or(match params.address() {
                        Address::Tcp { host, .. } => Some(host.as_str()),
                        Address::Unix { .. } => None,
                    })
                    .unwrap_or("localhost");
                let dns_name = rustls::ServerName::try_from(server_name).map_err(|_| {
                    crate::error::VkError::ConnParams(format!(
                        "invalid server name for TLS SNI: {server_name}"
                    ))
                })?;
                let tls_stream = connector.connect(dns_name, stream).await?;
                Ok(TcpClient::Tls(Box::new(tls_stream)))
            }
        }
    }

    /// Splits the transport into independent read/write halves so the
    /// connection handler's I/O loop can read and write concurrently.
    pub fn split(self) -> (Box<dyn AsyncRead + Send + Unpin>, Box<dyn AsyncWrite + Send + Unpin>) {
        match self {
            TcpClient::Plain(stream) => {
                let (r, w): (ReadHalf<_>, WriteHalf<_>) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            TcpClient::Tls(stream) => {
                let (r, w): (ReadHalf<_>, WriteHalf<_>) = tokio::io::split(*stream);
                (Box::new(r), Box::new(w))
            }
        }
    }
}
