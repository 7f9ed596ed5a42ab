use std::time::Duration;

use super::params::{Credentials, Tls};

/// Per-connection configuration, mirroring the teacher's
/// `ConnectionConfiguration`: documented `DEFAULT_*` constants plus
/// paired `with_*` builder methods.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    auth: Option<Credentials>,
    command_timeout: Duration,
    blocking_command_timeout: Duration,
    tls: Tls,
    client_name: Option<String>,
    read_only: bool,
    database: u32,
}

impl ConnectionConfig {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = DEFAULT_COMMAND_TIMEOUT;
    pub const DEFAULT_BLOCKING_COMMAND_TIMEOUT: Duration = DEFAULT_BLOCKING_COMMAND_TIMEOUT;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth(&self) -> Option<&Credentials> {
        self.auth.as_ref()
    }

    pub fn with_auth(mut self, credentials: Credentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn blocking_command_timeout(&self) -> Duration {
        self.blocking_command_timeout
    }

    pub fn with_blocking_command_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_command_timeout = timeout;
        self
    }

    pub fn tls(&self) -> &Tls {
        &self.tls
    }

    pub fn with_tls(mut self, tls: Tls) -> Self {
        self.tls = tls;
        self
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auth: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            blocking_command_timeout: DEFAULT_BLOCKING_COMMAND_TIMEOUT,
            tls: Tls::default(),
            client_name: None,
            read_only: false,
            database: 0,
        }
    }
}

/// Default per-request timeout for ordinary commands (spec §5).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-request timeout for commands known to block server-side
/// (e.g. `BLPOP`), per spec §5.
pub const DEFAULT_BLOCKING_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ConnectionConfig::new();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.blocking_command_timeout(), Duration::from_secs(120));
        assert!(!config.read_only());
        assert_eq!(config.database(), 0);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ConnectionConfig::new()
            .with_command_timeout(Duration::from_secs(5))
            .with_database(3)
            .with_read_only(true);
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.database(), 3);
        assert!(config.read_only());
    }
}
