use std::time::Duration;

use secstr::SecUtf8;

use crate::error::{VkError, VkResult};

use super::tls::Tls;

/// Where to reach the server: a TCP host/port pair or a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Unix { path: String },
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "{host}:{port}"),
            Address::Unix { path } => write!(f, "unix:{path}"),
        }
    }
}

/// Default TCP port for a Valkey/Redis-compatible server.
pub const DEFAULT_PORT: u16 = 6379;

/// AUTH credentials. `username` is empty for the legacy single-password
/// `AUTH password` form.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecUtf8,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecUtf8::from(password.into()),
        }
    }
}

/// Fully resolved connection parameters for a single connection.
///
/// `Display` (and `Debug`, derived from it indirectly through the builder)
/// never prints the password, matching the teacher's `cp_url::format_as_url`
/// redaction.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub(crate) address: Address,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) tls: Tls,
    pub(crate) server_name: Option<String>,
    pub(crate) client_name: Option<String>,
    pub(crate) database: u32,
    pub(crate) read_only: bool,
    pub(crate) command_timeout: Duration,
    pub(crate) blocking_command_timeout: Duration,
}

impl ConnectParams {
    pub fn builder() -> ConnectParamsBuilder {
        ConnectParamsBuilder::default()
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn tls(&self) -> &Tls {
        &self.tls
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn blocking_command_timeout(&self) -> Duration {
        self.blocking_command_timeout
    }
}

impl std::fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.tls {
            Tls::Off => "valkey",
            _ => "valkeys",
        };
        write!(f, "{scheme}://")?;
        if let Some(creds) = &self.credentials {
            if !creds.username.is_empty() {
                write!(f, "{}@", creds.username)?;
            }
        }
        write!(f, "{}", self.address)?;
        if self.database != 0 {
            write!(f, "/{}", self.database)?;
        }
        Ok(())
    }
}

/// Builder for [`ConnectParams`], grounded on the teacher's
/// `ConnectParamsBuilder`: every field has a `with_*` setter and the whole
/// thing is infallible to construct, only failing at [`ConnectParamsBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConnectParamsBuilder {
    host: Option<String>,
    port: Option<u16>,
    unix_path: Option<String>,
    username: Option<String>,
    password: Option<String>,
    tls: Tls,
    server_name: Option<String>,
    client_name: Option<String>,
    database: u32,
    read_only: bool,
    command_timeout: Option<Duration>,
    blocking_command_timeout: Option<Duration>,
}

impl ConnectParamsBuilder {
    pub fn with_hostname(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_unix_socket(mut self, path: impl Into<String>) -> Self {
        self.unix_path = Some(path.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, tls: Tls) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn with_blocking_command_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_command_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> VkResult<ConnectParams> {
        let address = if let Some(path) = self.unix_path {
            Address::Unix { path }
        } else {
            let host = self
                .host
                .ok_or(VkError::ConnParams("missing hostname".into()))?;
            Address::Tcp {
                host,
                port: self.port.unwrap_or(DEFAULT_PORT),
            }
        };
        let credentials = self.password.map(|password| Credentials {
            username: self.username.unwrap_or_default(),
            password: SecUtf8::from(password),
        });
        Ok(ConnectParams {
            address,
            credentials,
            tls: self.tls,
            server_name: self.server_name,
            client_name: self.client_name,
            database: self.database,
            read_only: self.read_only,
            command_timeout: self.command_timeout.unwrap_or(super::super::config::DEFAULT_COMMAND_TIMEOUT),
            blocking_command_timeout: self
                .blocking_command_timeout
                .unwrap_or(super::super::config::DEFAULT_BLOCKING_COMMAND_TIMEOUT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_minimal_tcp_params() {
        let params = ConnectParams::builder()
            .with_hostname("abcd123")
            .with_port(2222)
            .build()
            .unwrap();
        assert_eq!(
            params.address(),
            &Address::Tcp {
                host: "abcd123".into(),
                port: 2222
            }
        );
    }

    #[test]
    fn missing_hostname_is_an_error() {
        assert!(ConnectParams::builder().build().is_err());
    }

    #[test]
    fn display_redacts_password() {
        let params = ConnectParams::builder()
            .with_hostname("abcd123")
            .with_username("meier")
            .with_password("schLau")
            .build()
            .unwrap();
        let rendered = params.to_string();
        assert!(rendered.contains("meier@"));
        assert!(!rendered.contains("schLau"));
    }

    #[test]
    fn unix_socket_address() {
        let params = ConnectParams::builder()
            .with_unix_socket("/tmp/valkey.sock")
            .build()
            .unwrap();
        assert_eq!(
            params.address(),
            &Address::Unix {
                path: "/tmp/valkey.sock".into()
            }
        );
    }
}
