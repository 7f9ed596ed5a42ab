use bytes::BytesMut;

use crate::error::{VkError, VkResult};
use crate::resp::{CommandEncoder, Value};

use super::config::ConnectionConfig;

/// Builds `HELLO 3 [AUTH user pass] [SETNAME clientName]` (spec §6).
pub fn build_hello(config: &ConnectionConfig) -> BytesMut {
    let mut encoder = CommandEncoder::new();
    encoder.arg("HELLO").arg_i64(3);
    if let Some(creds) = config.auth() {
        let username = if creds.username.is_empty() {
            "default"
        } else {
            creds.username.as_str()
        };
        encoder.arg("AUTH").arg(username).arg(creds.password.unsecure());
    }
    if let Some(name) = config.client_name() {
        encoder.arg("SETNAME").arg(name);
    }
    encoder.finish()
}

/// Builds a standalone `AUTH` request, used as a fallback when the server's
/// HELLO rejects inline `AUTH` arguments (spec §6).
pub fn build_auth_fallback(config: &ConnectionConfig) -> Option<BytesMut> {
    let creds = config.auth()?;
    let mut encoder = CommandEncoder::new();
    encoder.arg("AUTH");
    if !creds.username.is_empty() {
        encoder.arg(&creds.username);
    }
    encoder.arg(creds.password.unsecure());
    Some(encoder.finish())
}

/// A connection is active iff HELLO returned a non-error aggregate (map, or
/// the RESP2-compatible array-of-pairs shape some proxies still send).
pub fn validate_hello_reply(value: &Value<'_>) -> VkResult<()> {
    match value {
        Value::Map(_) | Value::Array(_) => Ok(()),
        _ => Err(VkError::Usage("HELLO reply was not an aggregate")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::params::Credentials;

    #[test]
    fn plain_hello_has_no_auth() {
        let bytes = build_hello(&ConnectionConfig::new());
        assert_eq!(bytes.as_ref(), b"*2\r\n$5\r\nHELLO\r\n$1\r\n3\r\n");
    }

    #[test]
    fn hello_with_auth_and_setname() {
        let config = ConnectionConfig::new()
            .with_auth(Credentials::new("meier", "schLau"))
            .with_client_name("myapp");
        let bytes = build_hello(&config);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("AUTH"));
        assert!(text.contains("meier"));
        assert!(text.contains("SETNAME"));
        assert!(text.contains("myapp"));
    }
}
