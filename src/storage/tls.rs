//! TLS transport policy for the S3 client: TLS 1.2 minimum, system roots plus an
//! optional extra CA bundle.

use rustls::{Certificate, ClientConfig, RootCertStore};
use std::path::Path;
use tracing::{debug, trace};

use super::BackendInitError;

pub(crate) fn client_config(ca_cert: Option<&Path>) -> Result<ClientConfig, BackendInitError> {
    let mut roots = RootCertStore::empty();

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            for cert in certs {
                if let Err(e) = roots.add(&Certificate(cert.0)) {
                    trace!(error = %e, "Skipping unparsable system certificate");
                }
            }
        }
        Err(e) => debug!(error = %e, "System trust store unavailable, creating new CA pool"),
    }

    if let Some(path) = ca_cert {
        let pem = std::fs::read(path).map_err(|source| BackendInitError::CaCert {
            path: path.to_path_buf(),
            source,
        })?;
        let certs = rustls_pemfile::certs(&mut pem.as_slice()).map_err(|source| BackendInitError::CaCert {
            path: path.to_path_buf(),
            source,
        })?;

        let (added, _ignored) = roots.add_parsable_certificates(&certs);
        if added == 0 {
            debug!(path = %path.display(), "No certs appended, using system certs only");
        }
    }

    let config = ClientConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| BackendInitError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ca_file_is_an_error() {
        let result = client_config(Some(Path::new("/nonexistent/ca.pem")));
        assert!(matches!(result, Err(BackendInitError::CaCert { .. })));
    }

    #[test]
    fn test_ca_file_without_certificates_falls_back_to_system_roots() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a certificate").unwrap();

        assert!(client_config(Some(file.path())).is_ok());
    }
}
