//! HTTPS client construction
//!
//! The queue authenticates workers with TLS client certificates; the client
//! built here carries that identity (and the optional request timeout) and is
//! handed to `grader-client` as an already-configured collaborator.

use anyhow::{Context, Result};
use reqwest::{Certificate, Client, Identity};
use std::fs;

use crate::config::Config;

pub fn build_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder();

    if let Some(timeout) = config.http_timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(ca) = &config.tls.ca {
        let pem = fs::read(ca)
            .with_context(|| format!("failed to read CA bundle {}", ca.display()))?;
        let certificate = Certificate::from_pem(&pem)
            .with_context(|| format!("invalid CA bundle {}", ca.display()))?;
        builder = builder.add_root_certificate(certificate);
    }

    if let (Some(cert), Some(key)) = (&config.tls.cert, &config.tls.key) {
        // reqwest expects certificate and key concatenated in one PEM blob
        let mut pem = fs::read(cert)
            .with_context(|| format!("failed to read client certificate {}", cert.display()))?;
        pem.extend(
            fs::read(key)
                .with_context(|| format!("failed to read client key {}", key.display()))?,
        );
        let identity =
            Identity::from_pem(&pem).context("invalid client certificate/key pair")?;
        builder = builder.identity(identity);
    }

    builder.build().context("failed to build HTTPS client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builds_without_tls_material() {
        let config = Config::default();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_missing_ca_file_is_an_error() {
        let mut config = Config::default();
        config.tls.ca = Some(PathBuf::from("/nonexistent/ca.pem"));
        let err = build_client(&config).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/ca.pem"));
    }
}
