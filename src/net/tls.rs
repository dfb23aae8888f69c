//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load CA pools and certificate/key chains from PEM files
//! - Build server and client rustls configurations from one policy
//! - Pick the presented chain per client hello
//!
//! # Design Decisions
//! - Best-effort loading: a bad file is logged and skipped unless the
//!   material asks for `require_all`
//! - A server without any usable chain is always an error
//! - One restricted ring provider shared by both sides

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::Resumption;
use rustls::crypto::ring::{cipher_suite, default_provider, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::{ClientHello, ResolvesServerCert, ServerSessionMemoryCache, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::version::{TLS12, TLS13};
use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme,
    SupportedProtocolVersion,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_SESSION_CACHE_SIZE: usize = 256;

static TLS12_AND_UP: &[&SupportedProtocolVersion] = &[&TLS13, &TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&TLS13];

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read {kind} file {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("unusable {kind} in {path}: {message}")]
    Invalid {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("no usable certificate chain configured")]
    MissingIdentity,

    #[error("client certificate verifier: {0}")]
    Verifier(String),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// One PEM certificate chain and its private key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateKeyPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// File-backed TLS material for a server or a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsMaterial {
    /// PEM bundle of trusted CAs.
    pub ca_certificate: Option<PathBuf>,
    pub certificates: Vec<CertificateKeyPair>,
    /// Skip peer verification.
    pub insecure: bool,
    /// Fail on the first unreadable file instead of skipping it.
    pub require_all: bool,
}

impl TlsMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    pub fn with_certificate(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.certificates.push(CertificateKeyPair {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn require_all(mut self, require_all: bool) -> Self {
        self.require_all = require_all;
        self
    }

    /// Log a loading failure and carry on, or return it under `require_all`.
    fn tolerate(&self, err: ConfigurationError) -> Result<(), ConfigurationError> {
        if self.require_all {
            return Err(err);
        }
        error!(error = %err, "Skipping TLS material");
        Ok(())
    }
}

/// Protocol floor and session cache size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsPolicy {
    pub min_tls13: bool,
    pub session_cache_size: usize,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            min_tls13: false,
            session_cache_size: DEFAULT_SESSION_CACHE_SIZE,
        }
    }
}

impl TlsPolicy {
    fn versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        if self.min_tls13 {
            TLS13_ONLY
        } else {
            TLS12_AND_UP
        }
    }
}

/// AES-GCM suites (256 first) over ECDHE with P-384 preferred to P-256.
pub fn restricted_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ],
        kx_groups: vec![kx_group::SECP384R1, kx_group::SECP256R1],
        ..default_provider()
    }
}

type Chain = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

#[derive(Default)]
struct LoadedMaterial {
    roots: Option<RootCertStore>,
    chains: Vec<Chain>,
}

/// Builds rustls configurations from [`TlsMaterial`].
#[derive(Debug, Clone)]
pub struct TlsFactory {
    policy: TlsPolicy,
    provider: Arc<CryptoProvider>,
}

impl Default for TlsFactory {
    fn default() -> Self {
        Self::new(TlsPolicy::default())
    }
}

impl TlsFactory {
    pub fn new(policy: TlsPolicy) -> Self {
        Self {
            policy,
            provider: Arc::new(restricted_provider()),
        }
    }

    pub fn policy(&self) -> &TlsPolicy {
        &self.policy
    }

    pub fn server_config(&self, material: &TlsMaterial) -> Result<Arc<ServerConfig>, ConfigurationError> {
        let loaded = self.load(material)?;

        let mut keys = Vec::with_capacity(loaded.chains.len());
        for (chain, key) in loaded.chains {
            match self.provider.key_provider.load_private_key(key) {
                Ok(signing_key) => keys.push(Arc::new(CertifiedKey::new(chain, signing_key))),
                Err(err) => material.tolerate(ConfigurationError::Rustls(err))?,
            }
        }
        if keys.is_empty() {
            return Err(ConfigurationError::MissingIdentity);
        }

        let builder = ServerConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(self.policy.versions())?;

        let builder = match loaded.roots {
            Some(roots) if !material.insecure => {
                let verifier = WebPkiClientVerifier::builder_with_provider(
                    Arc::new(roots),
                    self.provider.clone(),
                )
                .allow_unauthenticated()
                .build()
                .map_err(|e| ConfigurationError::Verifier(e.to_string()))?;
                builder.with_client_cert_verifier(verifier)
            }
            _ => builder.with_no_client_auth(),
        };

        debug!(chains = keys.len(), "Server TLS configuration ready");
        let mut config = builder.with_cert_resolver(Arc::new(ChainResolver { keys }));
        config.session_storage = ServerSessionMemoryCache::new(self.policy.session_cache_size);
        Ok(Arc::new(config))
    }

    pub fn client_config(&self, material: &TlsMaterial) -> Result<Arc<ClientConfig>, ConfigurationError> {
        let loaded = self.load(material)?;

        let builder = ClientConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(self.policy.versions())?;

        let builder = if material.insecure {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert {
                    provider: self.provider.clone(),
                }))
        } else {
            let roots = loaded.roots.unwrap_or_else(|| {
                RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
            });
            builder.with_root_certificates(roots)
        };

        let mut config = match loaded.chains.into_iter().next() {
            Some((chain, key)) => match self.provider.key_provider.load_private_key(key.clone_key()) {
                Ok(_) => builder.with_client_auth_cert(chain, key)?,
                Err(err) => {
                    material.tolerate(ConfigurationError::Rustls(err))?;
                    builder.with_no_client_auth()
                }
            },
            None => builder.with_no_client_auth(),
        };
        config.resumption = Resumption::in_memory_sessions(self.policy.session_cache_size);
        Ok(Arc::new(config))
    }

    fn load(&self, material: &TlsMaterial) -> Result<LoadedMaterial, ConfigurationError> {
        let mut loaded = LoadedMaterial::default();

        if let Some(path) = &material.ca_certificate {
            match load_roots(path) {
                Ok(roots) => loaded.roots = Some(roots),
                Err(err) => material.tolerate(err)?,
            }
        }

        for pair in &material.certificates {
            if pair.cert.as_os_str().is_empty() || pair.key.as_os_str().is_empty() {
                continue;
            }
            match load_chain(pair) {
                Ok(chain) => loaded.chains.push(chain),
                Err(err) => material.tolerate(err)?,
            }
        }

        Ok(loaded)
    }
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>, ConfigurationError> {
    fs::read(path).map_err(|source| ConfigurationError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(kind: &'static str, path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigurationError> {
    let pem = read_file(kind, path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigurationError::Invalid {
            kind,
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(ConfigurationError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore, ConfigurationError> {
    let certs = parse_certificates("CA certificate", path)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(ConfigurationError::Invalid {
            kind: "CA certificate",
            path: path.to_path_buf(),
            message: format!("none of {ignored} certificates is a usable trust anchor"),
        });
    }
    debug!(path = %path.display(), added, ignored, "Loaded CA pool");
    Ok(roots)
}

fn load_chain(pair: &CertificateKeyPair) -> Result<Chain, ConfigurationError> {
    let chain = parse_certificates("certificate", &pair.cert)?;
    let pem = read_file("private key", &pair.key)?;
    let key = rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| ConfigurationError::Invalid {
            kind: "private key",
            path: pair.key.clone(),
            message: e.to_string(),
        })?
        .ok_or_else(|| ConfigurationError::NoPrivateKey(pair.key.clone()))?;
    Ok((chain, key))
}

/// Presents the first chain able to sign with a scheme the client offers.
#[derive(Debug)]
struct ChainResolver {
    keys: Vec<Arc<CertifiedKey>>,
}

impl ResolvesServerCert for ChainResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let offered = client_hello.signature_schemes();
        self.keys
            .iter()
            .find(|certified| certified.key.choose_scheme(offered).is_some())
            .or_else(|| self.keys.first())
            .cloned()
    }
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
