use std::sync::Arc;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};

use crate::error::{VkError, VkResult};

/// TLS posture for a connection, grounded on the teacher's `Tls` enum:
/// disabled by default, with an explicit insecure escape hatch for
/// development and a set of ways to supply trusted server certificates.
#[derive(Debug, Clone, Default)]
pub enum Tls {
    #[default]
    Off,
    /// TLS is negotiated but the server certificate is not verified at all.
    /// Never the default; callers must opt in explicitly.
    Insecure,
    /// TLS is negotiated and verified against the given certificate sources.
    Secure(Vec<ServerCerts>),
}

/// A source of trusted root certificates for [`Tls::Secure`].
#[derive(Debug, Clone)]
pub enum ServerCerts {
    /// Use the bundled Mozilla root store (`webpki-roots`).
    RootCertificates,
    /// Load every `*.pem`/`*.crt` file in a directory.
    Directory(String),
    /// Read a PEM bundle from the named environment variable.
    Environment(String),
    /// Use the given PEM bytes directly.
    Direct(Vec<u8>),
}

impl Tls {
    /// Builds a [`rustls::ClientConfig`] matching this posture.
    pub fn client_config(&self) -> VkResult<Arc<ClientConfig>> {
        match self {
            Tls::Off => Err(VkError::Usage("TLS is not enabled for this connection")),
            Tls::Insecure => {
                let mut config = ClientConfig::builder()
                    .with_safe_defaults()
                    .with_root_certificates(RootCertStore::empty())
                    .with_no_client_auth();
                config
                    .dangerous()
                    .set_certificate_verifier(Arc::new(NoCertificateVerification));
                Ok(Arc::new(config))
            }
            Tls::Secure(sources) => {
                let mut roots = RootCertStore::empty();
                for source in sources {
                    add_certs(&mut roots, source)?;
                }
                let config = ClientConfig::builder()
                    .with_safe_defaults()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                Ok(Arc::new(config))
            }
        }
    }
}

fn add_certs(roots: &mut RootCertStore, source: &ServerCerts) -> VkResult<()> {
    match source {
        ServerCerts::RootCertificates => {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            Ok(())
        }
        ServerCerts::Direct(pem) => add_pem(roots, pem),
        ServerCerts::Environment(var) => {
            let pem = std::env::var(var).map_err(|_| {
                VkError::ConnParams(format!("environment variable {var} is not set"))
            })?;
            add_pem(roots, pem.as_bytes())
        }
        ServerCerts::Directory(dir) => {
            for entry in std::fs::read_dir(dir)
                .map_err(|e| VkError::ConnParams(format!("cannot read {dir}: {e}")))?
            {
                let entry =
                    entry.map_err(|e| VkError::ConnParams(format!("cannot read {dir}: {e}")))?;
                let bytes = std::fs::read(entry.path())
                    .map_err(|e| VkError::ConnParams(format!("cannot read certificate: {e}")))?;
                add_pem(roots, &bytes)?;
            }
            Ok(())
        }
    }
}

fn add_pem(roots: &mut RootCertStore, pem: &[u8]) -> VkResult<()> {
    let mut reader = std::io::BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| VkError::ConnParams(format!("invalid PEM certificate: {e}")))?;
    for cert in certs {
        roots
            .add(&Certificate(cert))
            .map_err(|e| VkError::ConnParams(format!("invalid certificate: {e}")))?;
    }
    Ok(())
}

/// A verifier that accepts any server certificate. Only reachable via
/// [`Tls::Insecure`], never the default.
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_refuses_to_build_a_config() {
        assert!(Tls::Off.client_config().is_err());
    }

    #[test]
    fn insecure_builds_a_config() {
        assert!(Tls::Insecure.client_config().is_ok());
    }

    #[test]
    fn root_certificates_builds_a_config() {
        let tls = Tls::Secure(vec![ServerCerts::RootCertificates]);
        assert!(tls.client_config().is_ok());
    }
}
