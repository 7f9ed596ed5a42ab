//! Connection parameters: address, credentials, TLS posture, and the
//! `valkey://`/`valkeys://` URL scheme.

mod connect_params;
mod tls;
mod url;

pub use connect_params::{Address, ConnectParams, ConnectParamsBuilder, Credentials, DEFAULT_PORT};
pub use tls::{ServerCerts, Tls};
pub use url::{parse_url, IntoConnectParams};
