//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Check addresses and TLS file pairs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - File existence is left to the TLS factory, which knows the
//!   best-effort policy

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("tls.certificates[{0}] needs both cert and key")]
    IncompleteCertificatePair(usize),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// `host:port` with a numeric port; the host is resolved at bind time.
fn is_host_port(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("header_read_secs", timeouts.header_read_secs),
        ("read_secs", timeouts.read_secs),
        ("write_secs", timeouts.write_secs),
        ("idle_secs", timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if let Some(tls) = &config.tls {
        for (index, pair) in tls.certificates.iter().enumerate() {
            if pair.cert.as_os_str().is_empty() != pair.key.as_os_str().is_empty() {
                errors.push(ValidationError::IncompleteCertificatePair(index));
            }
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tls::TlsMaterial;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_host_names_allowed() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "localhost:8443".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "no-port".to_string();
        config.timeouts.idle_secs = 0;
        config.timeouts.write_secs = 0;
        config.limits.max_body_bytes = 0;
        config.tls = Some(TlsMaterial::new().with_certificate("server.pem", ""));
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidBindAddress("no-port".to_string()),
                ValidationError::ZeroTimeout("write_secs"),
                ValidationError::ZeroTimeout("idle_secs"),
                ValidationError::ZeroBodyLimit,
                ValidationError::IncompleteCertificatePair(0),
                ValidationError::InvalidMetricsAddress("nowhere".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_pair_is_ignored() {
        let mut config = ServiceConfig::default();
        config.tls = Some(TlsMaterial::new().with_certificate("", ""));
        assert!(validate_config(&config).is_ok());
    }
}
